//! Privilege levels, shell modes and the prompt patterns that identify them.

use std::fmt;

use regex::bytes::Regex;

/// Command set available on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Privilege {
    /// User EXEC (`router>`).
    Unprivileged,
    /// Privileged EXEC (`router#`).
    Privileged,
}

/// Which interpreter is reading our lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// The vendor CLI.
    Shell,
    /// The embedded Tcl interpreter (`router(tcl)#`).
    Scripting,
}

/// Session state machine position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected { privilege: Privilege, mode: Mode },
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected { .. })
    }

    pub fn privilege(&self) -> Option<Privilege> {
        match self {
            SessionState::Connected { privilege, .. } => Some(*privilege),
            SessionState::Disconnected => None,
        }
    }

    pub fn mode(&self) -> Option<Mode> {
        match self {
            SessionState::Connected { mode, .. } => Some(*mode),
            SessionState::Disconnected => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "Disconnected"),
            SessionState::Connected { privilege, mode } => {
                write!(f, "Connected({:?}, {:?})", privilege, mode)
            }
        }
    }
}

/// A prompt shape and the session position it identifies.
#[derive(Debug, Clone)]
pub struct PromptLevel {
    /// Privilege implied by the prompt.
    pub privilege: Privilege,

    /// Mode implied by the prompt.
    pub mode: Mode,

    /// Regex pattern to match the prompt.
    pub pattern: Regex,

    /// Strings that must NOT be in the prompt for this level to match.
    /// Used for disambiguation (`#` ends both exec and Tcl prompts).
    pub not_contains: Vec<String>,
}

impl PromptLevel {
    /// Create a new prompt level.
    pub fn new(privilege: Privilege, mode: Mode, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            privilege,
            mode,
            pattern: Regex::new(pattern)?,
            not_contains: vec![],
        })
    }

    /// Add a not_contains pattern.
    pub fn with_not_contains(mut self, pattern: impl Into<String>) -> Self {
        self.not_contains.push(pattern.into());
        self
    }

    /// Check if this level matches a prompt.
    pub fn matches(&self, prompt: &str) -> bool {
        if self.not_contains.iter().any(|nc| prompt.contains(nc.as_str())) {
            return false;
        }
        self.pattern.is_match(prompt.as_bytes())
    }
}
