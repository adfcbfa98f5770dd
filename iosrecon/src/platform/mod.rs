//! Platform definitions.
//!
//! A platform captures everything vendor-specific the session needs: prompt
//! shapes, the escalation and scripting commands, and the marker strings used
//! to judge success or failure.

mod definition;
mod privilege_level;
mod registry;
pub mod vendors;

pub use definition::{MarkerTable, PlatformDefinition, ScriptPaths};
pub use privilege_level::{Mode, Privilege, PromptLevel, SessionState};
pub use registry::PlatformRegistry;
