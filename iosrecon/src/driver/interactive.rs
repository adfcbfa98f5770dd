//! Multi-step device dialogs.
//!
//! Several IOS commands ask follow-up questions before they act:
//! - `copy tftp://... flash:` asks "Destination filename [x]?"
//! - `delete flash:x` asks "Delete filename [x]?" and then "[confirm]"
//! - `enable` asks for the secret
//!
//! A [`Dialog`] is the scripted sequence of answers, each paired with the
//! [`Expect`] condition that ends the step.

use std::time::Duration;

use super::exchange::Expect;
use super::response::CommandResult;

/// One step: send `input`, then wait for `expect`.
#[derive(Debug, Clone)]
pub struct DialogStep {
    /// The text to send (a command or an answer such as an empty line).
    pub input: String,

    /// Completion condition for this step.
    pub expect: Expect,

    /// Whether the input must be kept out of logs and results.
    pub hidden: bool,

    /// Deadline override for this step.
    pub timeout: Option<Duration>,
}

/// An ordered sequence of dialog steps.
#[derive(Debug, Clone, Default)]
pub struct Dialog {
    steps: Vec<DialogStep>,
}

impl Dialog {
    pub fn builder() -> DialogBuilder {
        DialogBuilder::default()
    }

    pub fn steps(&self) -> &[DialogStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Outcome of a dialog run.
#[derive(Debug, Clone)]
pub struct DialogResult {
    /// Per-step results, in order.
    pub steps: Vec<CommandResult>,

    /// Total time for the dialog.
    pub elapsed: Duration,

    /// The device returned to its prompt before the last step was sent.
    pub ended_early: bool,
}

impl DialogResult {
    pub fn new(steps: Vec<CommandResult>, elapsed: Duration, ended_early: bool) -> Self {
        Self {
            steps,
            elapsed,
            ended_early,
        }
    }

    /// Everything the device printed across all steps.
    pub fn transcript(&self) -> String {
        self.steps
            .iter()
            .map(|s| s.raw_output.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Case-insensitive substring search over the whole transcript.
    pub fn transcript_contains(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.steps
            .iter()
            .any(|s| s.raw_output.to_lowercase().contains(&needle))
    }

    /// Output of the last step that ran.
    pub fn final_output(&self) -> Option<&str> {
        self.steps.last().map(|s| s.output.as_str())
    }
}

/// Builder for dialogs.
///
/// Every `send` has to be followed by one of the `until_*` calls.
///
/// ```rust
/// use iosrecon::driver::Dialog;
///
/// let dialog = Dialog::builder()
///     .send("copy tftp://10.0.0.2/iosmap.tcl flash:")
///     .until_literal("]?")
///     .send("")
///     .until_prompt()
///     .build();
/// assert_eq!(dialog.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct DialogBuilder {
    steps: Vec<DialogStep>,
    default_timeout: Option<Duration>,
}

impl DialogBuilder {
    /// Send a visible line.
    pub fn send(self, input: impl Into<String>) -> PendingStep {
        PendingStep {
            builder: self,
            input: input.into(),
            hidden: false,
            timeout: None,
        }
    }

    /// Send a line that must not be logged.
    pub fn send_hidden(self, input: impl Into<String>) -> PendingStep {
        PendingStep {
            builder: self,
            input: input.into(),
            hidden: true,
            timeout: None,
        }
    }

    /// Default deadline for steps that do not set their own.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Dialog {
        Dialog { steps: self.steps }
    }
}

/// Builder state after `send()`.
#[derive(Debug)]
pub struct PendingStep {
    builder: DialogBuilder,
    input: String,
    hidden: bool,
    timeout: Option<Duration>,
}

impl PendingStep {
    /// Deadline for this step only.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Wait for a literal substring.
    pub fn until_literal(self, pattern: impl Into<String>) -> DialogBuilder {
        self.until(Expect::Literal(pattern.into()))
    }

    /// Wait for a literal substring, or the prompt if the device gives up.
    pub fn until_literal_or_prompt(self, pattern: impl Into<String>) -> DialogBuilder {
        self.until(Expect::LiteralOrPrompt(pattern.into()))
    }

    /// Wait for the device prompt.
    pub fn until_prompt(self) -> DialogBuilder {
        self.until(Expect::Prompt)
    }

    fn until(mut self, expect: Expect) -> DialogBuilder {
        let timeout = self.timeout.or(self.builder.default_timeout);
        self.builder.steps.push(DialogStep {
            input: self.input,
            expect,
            hidden: self.hidden,
            timeout,
        });
        self.builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::mock::ScriptedChannel;
    use crate::driver::exchange::{CommandExchange, ExchangeTiming};
    use crate::driver::response::Completion;
    use crate::platform::vendors::cisco_ios;
    use crate::shutdown::Shutdown;

    fn exchange(channel: ScriptedChannel) -> CommandExchange<ScriptedChannel> {
        let timing = ExchangeTiming {
            idle: Duration::from_millis(30),
            timeout: Duration::from_millis(300),
            long_timeout: Duration::from_millis(600),
        };
        let prompt = cisco_ios::platform().combined_prompt().unwrap();
        CommandExchange::new(channel, prompt, "%", timing, Shutdown::never())
    }

    #[test]
    fn test_builder_steps() {
        let dialog = Dialog::builder()
            .with_timeout(Duration::from_secs(60))
            .send("enable")
            .until_literal_or_prompt("assword:")
            .send_hidden("s3cret")
            .with_timeout(Duration::from_secs(5))
            .until_prompt()
            .build();

        assert_eq!(dialog.len(), 2);
        assert!(!dialog.steps()[0].hidden);
        assert_eq!(dialog.steps()[0].timeout, Some(Duration::from_secs(60)));
        assert!(dialog.steps()[1].hidden);
        assert_eq!(dialog.steps()[1].timeout, Some(Duration::from_secs(5)));
        assert_eq!(dialog.steps()[1].expect, Expect::Prompt);
    }

    #[tokio::test]
    async fn test_dialog_runs_every_step() {
        let (channel, log) = ScriptedChannel::new("");
        let channel = channel
            .expect(
                "copy tftp://10.0.0.2/iosmap.tcl flash:",
                "copy tftp://10.0.0.2/iosmap.tcl flash:\r\nDestination filename [iosmap.tcl]? ",
            )
            .expect(
                "",
                "\r\nAccessing tftp://10.0.0.2/iosmap.tcl...\r\n[OK - 1024 bytes]\r\n\r\n1024 bytes copied in 0.5 secs\r\nrouter#",
            );
        let mut ex = exchange(channel);

        let dialog = Dialog::builder()
            .send("copy tftp://10.0.0.2/iosmap.tcl flash:")
            .until_literal("]?")
            .send("")
            .until_prompt()
            .build();
        let result = ex.run_dialog(&dialog).await.unwrap();

        assert!(!result.ended_early);
        assert_eq!(result.steps.len(), 2);
        assert_eq!(result.steps[0].completion, Completion::Pattern);
        assert!(result.transcript_contains("BYTES COPIED"));
        assert_eq!(log.lines().len(), 2);
    }

    #[tokio::test]
    async fn test_dialog_keeps_output_after_literal_match() {
        let (channel, _) = ScriptedChannel::new("");
        let channel = channel
            .expect("copy ftp://10.0.0.2/x.tcl flash:", "copy ftp://10.0.0.2/x.tcl flash:\r\nDestination filename [x.tcl]? ")
            .expect_chunks("", &["\r\n[OK - 10/10 bytes]\r\n", "\r\n10 bytes copied in 0.1 secs\r\nrouter#"])
            .expect("", "\r\nrouter#");
        let mut ex = exchange(channel);

        let dialog = Dialog::builder()
            .send("copy ftp://10.0.0.2/x.tcl flash:")
            .until_literal("]?")
            .send("")
            .until_literal_or_prompt("]")
            .send("")
            .until_prompt()
            .build();
        let result = ex.run_dialog(&dialog).await.unwrap();

        assert_eq!(result.steps.len(), 3);
        assert!(result.steps[2].raw_output.contains("10 bytes copied"));
        assert!(result.transcript_contains("bytes copied"));
    }

    #[tokio::test]
    async fn test_dialog_stops_when_device_returns_to_prompt() {
        let (channel, log) = ScriptedChannel::new("");
        let channel = channel.expect(
            "enable",
            "enable\r\nrouter#",
        );
        let mut ex = exchange(channel);

        let dialog = Dialog::builder()
            .send("enable")
            .until_literal_or_prompt("assword:")
            .send_hidden("s3cret")
            .until_prompt()
            .build();
        let result = ex.run_dialog(&dialog).await.unwrap();

        assert!(result.ended_early);
        assert_eq!(result.steps.len(), 1);
        assert_eq!(log.lines(), vec!["enable"]);
    }

    #[tokio::test]
    async fn test_hidden_input_is_masked() {
        let (channel, log) = ScriptedChannel::new("");
        let channel = channel
            .expect("enable", "enable\r\nPassword: ")
            .expect("s3cret", "\r\nrouter#");
        let mut ex = exchange(channel);

        let dialog = Dialog::builder()
            .send("enable")
            .until_literal_or_prompt("assword:")
            .send_hidden("s3cret")
            .until_prompt()
            .build();
        let result = ex.run_dialog(&dialog).await.unwrap();

        assert_eq!(result.steps[1].command, "<hidden>");
        assert!(!result.transcript().contains("s3cret"));
        assert_eq!(log.lines()[1], "s3cret");
    }
}
