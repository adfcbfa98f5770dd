//! Platform definition for a device family.

use regex::bytes::Regex;

use super::privilege_level::{Mode, Privilege, PromptLevel};
use crate::error::PlatformError;

/// Marker strings the device uses in place of status codes.
///
/// These are a compatibility contract with one firmware family; a second
/// firmware line with different wording gets its own table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerTable {
    /// Firmware family these markers were taken from.
    pub firmware: String,

    /// Substring present in any device-side error (`% Invalid input`, `%Error copying`).
    pub error: String,

    /// Substring of a successful copy summary.
    pub copied: String,

    /// Substring of a transfer that never reached the server.
    pub timed_out: String,

    /// End of the "Destination filename [x]?" style question.
    pub filename_prompt: String,

    /// End of a `[confirm]` style question.
    pub confirm_prompt: String,
}

/// Paths of the Tcl helpers staged on device storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptPaths {
    /// Network mapper (ping sweeps and port scans).
    pub mapper: String,

    /// SOCKS-style proxy listener.
    pub proxy: String,
}

/// Platform definition containing all vendor-specific configuration.
#[derive(Debug, Clone)]
pub struct PlatformDefinition {
    /// Platform name (the device-family identifier, e.g. "cisco_ios").
    pub name: String,

    /// Prompt shapes, checked in order.
    pub prompts: Vec<PromptLevel>,

    /// Literal tail of the enable secret question.
    pub password_prompt: String,

    /// Command that requests privileged EXEC.
    pub escalate_command: String,

    /// Command that starts the interactive Tcl interpreter.
    pub scripting_enter: String,

    /// Command that leaves the interactive Tcl interpreter.
    pub scripting_exit: String,

    /// Command that launches a Tcl script in one shot.
    pub script_runner: String,

    /// Status markers.
    pub markers: MarkerTable,

    /// Staged script locations.
    pub scripts: ScriptPaths,

    /// Commands to run when connection is established.
    pub on_open_commands: Vec<String>,

    /// Terminal width for PTY.
    pub terminal_width: u32,

    /// Terminal height for PTY.
    pub terminal_height: u32,
}

impl PlatformDefinition {
    /// Create a new platform definition with minimal required fields.
    pub fn new(name: impl Into<String>, markers: MarkerTable, scripts: ScriptPaths) -> Self {
        Self {
            name: name.into(),
            prompts: vec![],
            password_prompt: "assword:".to_string(),
            escalate_command: "enable".to_string(),
            scripting_enter: "tclsh".to_string(),
            scripting_exit: "tclquit".to_string(),
            script_runner: "tclsh".to_string(),
            markers,
            scripts,
            on_open_commands: vec![],
            terminal_width: 511,
            terminal_height: 24,
        }
    }

    /// Add a prompt level.
    pub fn with_prompt(mut self, level: PromptLevel) -> Self {
        self.prompts.push(level);
        self
    }

    /// Set the enable secret question marker.
    pub fn with_password_prompt(mut self, marker: impl Into<String>) -> Self {
        self.password_prompt = marker.into();
        self
    }

    /// Add an on_open command.
    pub fn with_on_open_command(mut self, command: impl Into<String>) -> Self {
        self.on_open_commands.push(command.into());
        self
    }

    /// Set terminal dimensions.
    pub fn with_terminal_size(mut self, width: u32, height: u32) -> Self {
        self.terminal_width = width;
        self.terminal_height = height;
        self
    }

    /// Determine privilege and mode from a prompt string.
    pub fn classify_prompt(&self, prompt: &str) -> Option<(Privilege, Mode)> {
        self.prompts
            .iter()
            .find(|level| level.matches(prompt))
            .map(|level| (level.privilege, level.mode))
    }

    /// Build a regex that matches any of this platform's prompts.
    pub fn combined_prompt(&self) -> Result<Regex, PlatformError> {
        if self.prompts.is_empty() {
            return Err(PlatformError::InvalidDefinition {
                message: format!("platform '{}' defines no prompts", self.name),
            });
        }

        let combined = self
            .prompts
            .iter()
            .map(|level| format!("(?:{})", level.pattern.as_str()))
            .collect::<Vec<_>>()
            .join("|");

        Regex::new(&combined).map_err(|e| PlatformError::InvalidDefinition {
            message: e.to_string(),
        })
    }
}
