//! Namespaced option registry.
//!
//! Options are loaded once from a YAML document shaped as
//!
//! ```yaml
//! target:
//!   host: ["10.0.0.1", "Target device address", ""]
//!   enable_http: ["false", "Serve payloads over HTTP", "true,false"]
//! ```
//!
//! i.e. `namespace -> option -> [value, description, allowed values CSV]`.
//! An empty allow-list means the option is unrestricted. Keys are matched
//! case-insensitively.

use std::path::Path;

use indexmap::IndexMap;
use log::debug;
use serde_yaml::Value;

use crate::error::OptionError;

type RawDocument = IndexMap<String, IndexMap<String, Vec<Value>>>;

/// A single mutable option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionCell {
    pub value: String,
    pub description: String,
    pub allowed: Vec<String>,
}

impl OptionCell {
    /// Create a cell from its value, description and comma-separated allow-list.
    pub fn new(value: impl Into<String>, description: impl Into<String>, allowed_csv: &str) -> Self {
        Self {
            value: value.into(),
            description: description.into(),
            allowed: split_allowed(allowed_csv),
        }
    }

    /// Whether `value` may be assigned to this option.
    pub fn accepts(&self, value: &str) -> bool {
        self.allowed.is_empty() || self.allowed.iter().any(|a| a == value)
    }
}

fn split_allowed(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

/// Registry of options grouped by namespace.
///
/// Owned by the front end and passed by reference to whatever needs it;
/// writes are last-writer-wins and validated against the allow-list.
#[derive(Debug, Clone, Default)]
pub struct OptionRegistry {
    namespaces: IndexMap<String, IndexMap<String, OptionCell>>,
}

impl OptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a registry from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, OptionError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    /// Parse a registry from a YAML document.
    pub fn from_yaml_str(content: &str) -> Result<Self, OptionError> {
        let raw: RawDocument = serde_yaml::from_str(content)?;
        let mut registry = Self::new();

        for (namespace, options) in raw {
            for (key, fields) in options {
                let cell = cell_from_fields(&key, &fields)?;
                registry.register(&namespace, &key, cell);
            }
        }

        debug!(
            "loaded {} options in {} namespaces",
            registry.len(),
            registry.namespaces.len()
        );
        Ok(registry)
    }

    /// Insert or replace an option.
    pub fn register(&mut self, namespace: &str, key: &str, cell: OptionCell) {
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_lowercase(), cell);
    }

    /// Look up an option cell in any namespace.
    pub fn cell(&self, key: &str) -> Option<&OptionCell> {
        let key = key.to_lowercase();
        self.namespaces.values().find_map(|options| options.get(&key))
    }

    /// Current value of an option.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.cell(key).map(|c| c.value.as_str())
    }

    /// Current value, or the empty string for unknown options.
    pub fn value(&self, key: &str) -> &str {
        self.get(key).unwrap_or_default()
    }

    /// Whether a boolean-style option is set to `true`.
    pub fn flag(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    /// Assign a new value, returning a confirmation line.
    pub fn set(&mut self, key: &str, value: &str) -> Result<String, OptionError> {
        let lowered = key.to_lowercase();
        let cell = self
            .namespaces
            .values_mut()
            .find_map(|options| options.get_mut(&lowered))
            .ok_or_else(|| OptionError::UnknownOption {
                key: key.to_string(),
            })?;

        if !cell.accepts(value) {
            return Err(OptionError::NotAllowed {
                value: value.to_string(),
                allowed: cell.allowed.clone(),
            });
        }

        cell.value = value.to_string();
        Ok(format!("{} => {}", key, value))
    }

    /// Iterate namespaces and their options in document order.
    pub fn namespaces(&self) -> impl Iterator<Item = (&str, &IndexMap<String, OptionCell>)> {
        self.namespaces.iter().map(|(ns, opts)| (ns.as_str(), opts))
    }

    /// Total number of options.
    pub fn len(&self) -> usize {
        self.namespaces.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn cell_from_fields(key: &str, fields: &[Value]) -> Result<OptionCell, OptionError> {
    if fields.is_empty() || fields.len() > 3 {
        return Err(OptionError::Malformed {
            key: key.to_string(),
            message: format!("expected [value, description, allowed], got {} fields", fields.len()),
        });
    }

    let mut text = fields
        .iter()
        .map(|v| scalar_to_string(key, v))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter();

    let value = text.next().unwrap_or_default();
    let description = text.next().unwrap_or_default();
    let allowed = text.next().unwrap_or_default();
    Ok(OptionCell::new(value, description, &allowed))
}

fn scalar_to_string(key: &str, value: &Value) -> Result<String, OptionError> {
    match value {
        Value::Null => Ok(String::new()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(s.clone()),
        _ => Err(OptionError::Malformed {
            key: key.to_string(),
            message: "option fields must be scalars".to_string(),
        }),
    }
}
