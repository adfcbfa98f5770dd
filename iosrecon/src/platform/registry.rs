//! Device families by name, as given in the `device_type` option.

use indexmap::IndexMap;

use super::definition::PlatformDefinition;
use super::vendors;
use crate::error::{PlatformError, Result};

/// Known device families. Built by the caller; nothing is global.
#[derive(Debug, Default)]
pub struct PlatformRegistry {
    platforms: IndexMap<String, PlatformDefinition>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The families supported out of the box.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        let ios = vendors::cisco_ios::platform();
        registry.platforms.insert(ios.name.clone(), ios);
        registry
    }

    /// Add a family. Names are unique.
    pub fn register(&mut self, platform: PlatformDefinition) -> Result<()> {
        if self.platforms.contains_key(&platform.name) {
            return Err(PlatformError::InvalidDefinition {
                message: format!("'{}' is registered twice", platform.name),
            }
            .into());
        }
        self.platforms.insert(platform.name.clone(), platform);
        Ok(())
    }

    /// A copy of the named definition, ready to hand to a session.
    pub fn resolve(&self, name: &str) -> Result<PlatformDefinition> {
        match self.platforms.get(name) {
            Some(platform) => Ok(platform.clone()),
            None => Err(PlatformError::UnknownPlatform {
                name: name.to_string(),
            }
            .into()),
        }
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.platforms.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_builtin_families() {
        let registry = PlatformRegistry::builtin();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["cisco_ios"]);
        assert_eq!(registry.resolve("cisco_ios").unwrap().name, "cisco_ios");
    }

    #[test]
    fn test_resolve_unknown() {
        let registry = PlatformRegistry::builtin();
        assert!(matches!(
            registry.resolve("juniper_junos"),
            Err(Error::Platform(PlatformError::UnknownPlatform { .. }))
        ));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = PlatformRegistry::builtin();
        assert!(registry.register(vendors::cisco_ios::platform()).is_err());
    }
}
