//! Result of one command/response exchange.

use std::time::Duration;

/// How an exchange reached completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// A device prompt appeared at the end of the output.
    Prompt,
    /// The caller's literal continuation pattern was seen.
    Pattern,
    /// Output stopped arriving for the idle window.
    Idle,
}

/// Accumulated text of one exchange.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// The command that was sent (`<hidden>` for secrets).
    pub command: String,

    /// The output with command echo, trailing prompt and carriage returns removed.
    pub output: String,

    /// Everything received, ANSI-stripped but otherwise untouched.
    pub raw_output: String,

    /// The prompt matched at the end, if the exchange ended on one.
    pub prompt: Option<String>,

    /// How the exchange ended.
    pub completion: Completion,

    /// Time taken by the exchange.
    pub elapsed: Duration,

    /// Whether the device signalled an error marker.
    pub device_error: bool,
}

impl CommandResult {
    /// Build a result from raw transcript text.
    pub fn from_raw(
        command: impl Into<String>,
        raw_output: impl Into<String>,
        prompt: Option<String>,
        completion: Completion,
        elapsed: Duration,
        error_marker: &str,
    ) -> Self {
        let command = command.into();
        let raw_output = raw_output.into();
        let output = normalize_output(&raw_output, &command, prompt.as_deref());
        let device_error = !error_marker.is_empty() && output.contains(error_marker);

        Self {
            command,
            output,
            raw_output,
            prompt,
            completion,
            elapsed,
            device_error,
        }
    }

    /// Check if the device accepted the command.
    pub fn is_success(&self) -> bool {
        !self.device_error
    }

    /// Get the output lines.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.output.lines()
    }

    /// Check if the output contains a substring.
    pub fn contains(&self, pattern: &str) -> bool {
        self.output.contains(pattern)
    }
}

impl std::fmt::Display for CommandResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.output)
    }
}

/// Strip the command echo and trailing prompt, and fold line endings.
pub(crate) fn normalize_output(raw: &str, command: &str, prompt: Option<&str>) -> String {
    let text = raw.replace("\r\n", "\n").replace('\r', "");
    let mut lines: Vec<&str> = text.lines().collect();

    if let Some(first) = lines.first() {
        let echoed = if command.is_empty() {
            first.trim().is_empty()
        } else {
            first.trim_end().ends_with(command)
        };
        if echoed {
            lines.remove(0);
        }
    }

    if let (Some(prompt), Some(last)) = (prompt, lines.last()) {
        if last.trim() == prompt {
            lines.pop();
        }
    }

    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }

    lines.join("\n")
}
