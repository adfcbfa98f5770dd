//! Command exchange: one line out, one framed response back.
//!
//! The device shell is not a structured protocol, so every response is
//! framed by one of a handful of completion conditions (see [`Expect`]).
//! Higher layers never send without one.

use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use regex::bytes::Regex;

use super::interactive::{Dialog, DialogResult};
use super::response::{CommandResult, Completion};
use crate::channel::{PatternBuffer, ShellChannel};
use crate::error::{Result, TransportError};
use crate::shutdown::Shutdown;

/// Exchange timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeTiming {
    /// Quiescence window: once output has started, this much silence ends
    /// an [`Expect::PromptOrIdle`] exchange.
    pub idle: Duration,

    /// Deadline for ordinary commands.
    pub timeout: Duration,

    /// Deadline for scans and transfers.
    pub long_timeout: Duration,
}

impl Default for ExchangeTiming {
    fn default() -> Self {
        Self {
            idle: Duration::from_secs(2),
            timeout: Duration::from_secs(30),
            long_timeout: Duration::from_secs(600),
        }
    }
}

/// Completion condition for one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expect {
    /// A device prompt, or the idle window after output started.
    PromptOrIdle,
    /// A device prompt only.
    Prompt,
    /// A literal substring (dialog questions such as `]?`).
    Literal(String),
    /// A literal substring, or the prompt if the device ends the dialog early.
    LiteralOrPrompt(String),
}

impl Expect {
    fn literal(&self) -> Option<&str> {
        match self {
            Expect::Literal(p) | Expect::LiteralOrPrompt(p) => Some(p),
            _ => None,
        }
    }

    fn accepts_prompt(&self) -> bool {
        !matches!(self, Expect::Literal(_))
    }
}

/// Sends commands over a [`ShellChannel`] and frames the responses.
pub struct CommandExchange<C> {
    channel: C,
    buffer: PatternBuffer,
    prompt: Regex,
    error_marker: String,
    timing: ExchangeTiming,
    shutdown: Shutdown,
    closed: bool,
}

impl<C: ShellChannel> CommandExchange<C> {
    /// Create an exchange over an open channel.
    pub fn new(
        channel: C,
        prompt: Regex,
        error_marker: impl Into<String>,
        timing: ExchangeTiming,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            channel,
            buffer: PatternBuffer::default(),
            prompt,
            error_marker: error_marker.into(),
            timing,
            shutdown,
            closed: false,
        }
    }

    /// Current timing.
    pub fn timing(&self) -> ExchangeTiming {
        self.timing
    }

    /// Replace the timing.
    pub fn set_timing(&mut self, timing: ExchangeTiming) {
        self.timing = timing;
    }

    /// Whether the underlying channel has been closed or lost.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Send `command` and read until the prompt/idle heuristic, or until the
    /// literal `continuation` pattern when one is given.
    pub async fn execute(&mut self, command: &str, continuation: Option<&str>) -> Result<CommandResult> {
        let expect = match continuation {
            Some(pattern) => Expect::Literal(pattern.to_string()),
            None => Expect::PromptOrIdle,
        };
        self.execute_until(command, &expect, self.timing.timeout).await
    }

    /// Send `command` and read until `expect` is satisfied or `timeout` passes.
    pub async fn execute_until(
        &mut self,
        command: &str,
        expect: &Expect,
        timeout: Duration,
    ) -> Result<CommandResult> {
        debug!("exchange: sending {:?} (expect {:?})", command, expect);
        self.exchange(command, command, expect, timeout, true).await
    }

    /// Like [`execute_until`](Self::execute_until) for input that must not
    /// appear in logs or results.
    pub async fn send_hidden(
        &mut self,
        secret: &str,
        expect: &Expect,
        timeout: Duration,
    ) -> Result<CommandResult> {
        debug!("exchange: sending <hidden> (expect {:?})", expect);
        self.exchange(secret, "<hidden>", expect, timeout, true).await
    }

    /// Run a multi-step dialog, stopping early if the device returns to its
    /// prompt before the dialog's last step.
    ///
    /// Stale output is discarded only before the first step. Anything that
    /// arrives after a step's literal matched belongs to the next step.
    pub async fn run_dialog(&mut self, dialog: &Dialog) -> Result<DialogResult> {
        let start = Instant::now();
        let mut steps = Vec::with_capacity(dialog.steps().len());
        let mut ended_early = false;

        for (i, step) in dialog.steps().iter().enumerate() {
            let timeout = step.timeout.unwrap_or(self.timing.timeout);
            let label = if step.hidden { "<hidden>" } else { step.input.as_str() };
            debug!("dialog: step {} sending {:?} (expect {:?})", i + 1, label, step.expect);
            let result = self
                .exchange(&step.input, label, &step.expect, timeout, i == 0)
                .await?;

            let is_last = i + 1 == dialog.steps().len();
            let back_at_prompt = result.completion == Completion::Prompt;
            steps.push(result);

            if back_at_prompt && !is_last && step.expect.literal().is_some() {
                debug!("dialog: device returned to prompt after step {}", i + 1);
                ended_early = true;
                break;
            }
        }

        Ok(DialogResult::new(steps, start.elapsed(), ended_early))
    }

    /// Wait for a prompt without sending anything (login banner).
    pub async fn read_prompt(&mut self) -> Result<String> {
        self.ensure_open()?;
        self.buffer.clear();
        self.read(&Expect::Prompt, self.timing.timeout).await?;
        let prompt = self.buffer.trailing_prompt(&self.prompt).unwrap_or_default();
        self.buffer.clear();
        Ok(prompt)
    }

    /// Close the channel. Idempotent.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.channel.close().await
    }

    async fn exchange(
        &mut self,
        input: &str,
        label: &str,
        expect: &Expect,
        timeout: Duration,
        discard_stale: bool,
    ) -> Result<CommandResult> {
        self.ensure_open()?;
        if discard_stale {
            self.drain().await?;
        }
        self.buffer.clear();

        let start = Instant::now();
        if let Err(e) = self.channel.send_line(input).await {
            self.closed = true;
            return Err(e);
        }

        let completion = self.read(expect, timeout).await?;
        let prompt = match completion {
            Completion::Prompt => self.buffer.trailing_prompt(&self.prompt),
            _ => None,
        };
        let raw = self.buffer.take_text();
        trace!("exchange: {:?} completed by {:?}:\n{}", label, completion, raw);

        Ok(CommandResult::from_raw(
            label,
            raw,
            prompt,
            completion,
            start.elapsed(),
            &self.error_marker,
        ))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(TransportError::Disconnected.into());
        }
        if self.shutdown.is_triggered() {
            return Err(TransportError::Cancelled.into());
        }
        Ok(())
    }

    /// Discard output left over from a previous exchange.
    async fn drain(&mut self) -> Result<()> {
        loop {
            match self.channel.read_chunk(Duration::ZERO).await {
                Ok(Some(stale)) => trace!("exchange: discarding {} stale bytes", stale.len()),
                Ok(None) => return Ok(()),
                Err(e) => {
                    self.closed = true;
                    return Err(e);
                }
            }
        }
    }

    fn satisfied(&self, expect: &Expect) -> Option<Completion> {
        if let Some(literal) = expect.literal() {
            if self.buffer.contains(literal) {
                return Some(Completion::Pattern);
            }
        }
        if expect.accepts_prompt() && self.buffer.trailing_prompt(&self.prompt).is_some() {
            return Some(Completion::Prompt);
        }
        None
    }

    async fn read(&mut self, expect: &Expect, timeout: Duration) -> Result<Completion> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!("exchange: no completion within {:?}", timeout);
                return Err(TransportError::Timeout(timeout).into());
            }

            let idle_applies = *expect == Expect::PromptOrIdle && !self.buffer.is_empty();
            let wait = if idle_applies {
                remaining.min(self.timing.idle)
            } else {
                remaining
            };

            let chunk = tokio::select! {
                _ = self.shutdown.cancelled() => None,
                read = self.channel.read_chunk(wait) => Some(read),
            };

            let Some(chunk) = chunk else {
                debug!("exchange: shutdown requested, closing channel");
                self.closed = true;
                if let Err(e) = self.channel.close().await {
                    warn!("exchange: close after shutdown failed: {}", e);
                }
                return Err(TransportError::Cancelled.into());
            };

            match chunk {
                Ok(Some(data)) => {
                    self.buffer.push(&data);
                    if let Some(completion) = self.satisfied(expect) {
                        return Ok(completion);
                    }
                }
                Ok(None) if idle_applies => return Ok(Completion::Idle),
                Ok(None) => {}
                Err(e) => {
                    self.closed = true;
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::mock::ScriptedChannel;
    use crate::channel::StreamChannel;
    use crate::error::Error;
    use crate::platform::vendors::cisco_ios;

    fn timing() -> ExchangeTiming {
        ExchangeTiming {
            idle: Duration::from_millis(30),
            timeout: Duration::from_millis(300),
            long_timeout: Duration::from_millis(600),
        }
    }

    fn exchange<C: ShellChannel>(channel: C) -> CommandExchange<C> {
        let prompt = cisco_ios::platform().combined_prompt().unwrap();
        CommandExchange::new(channel, prompt, "%", timing(), Shutdown::never())
    }

    #[tokio::test]
    async fn test_execute_until_prompt() {
        let (channel, log) = ScriptedChannel::new("router#");
        let channel = channel.expect_chunks(
            "show clock",
            &["show clock\r\n", "*10:00:01.123 UTC Mon Mar 1 2021\r\n", "router#"],
        );
        let mut ex = exchange(channel);
        assert_eq!(ex.read_prompt().await.unwrap(), "router#");

        let result = ex.execute("show clock", None).await.unwrap();
        assert_eq!(result.completion, Completion::Prompt);
        assert_eq!(result.prompt.as_deref(), Some("router#"));
        assert_eq!(result.output, "*10:00:01.123 UTC Mon Mar 1 2021");
        assert!(result.is_success());
        assert_eq!(log.lines(), vec!["show clock"]);
    }

    #[tokio::test]
    async fn test_execute_idle_completion() {
        let (channel, _) = ScriptedChannel::new("");
        let channel = channel.expect("ping 10.0.0.1", "ping 10.0.0.1\r\n!!!!!");
        let mut ex = exchange(channel);

        let result = ex.execute("ping 10.0.0.1", None).await.unwrap();
        assert_eq!(result.completion, Completion::Idle);
        assert_eq!(result.output, "!!!!!");
    }

    #[tokio::test]
    async fn test_execute_continuation_pattern() {
        let (channel, _) = ScriptedChannel::new("");
        let channel = channel
            .expect(
                "delete flash:old.tcl",
                "delete flash:old.tcl\r\nDelete filename [old.tcl]? ",
            )
            .expect("", "\r\nDelete flash:/old.tcl? [confirm]");
        let mut ex = exchange(channel);

        let first = ex.execute("delete flash:old.tcl", Some("]?")).await.unwrap();
        assert_eq!(first.completion, Completion::Pattern);
        let second = ex.execute("", Some("]")).await.unwrap();
        assert!(second.contains("[confirm]"));
    }

    #[tokio::test]
    async fn test_silence_times_out() {
        let (channel, _) = ScriptedChannel::new("");
        let channel = channel.expect("show version", "");
        let mut ex = exchange(channel);

        let err = ex
            .execute_until("show version", &Expect::Prompt, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_disconnect_is_fatal() {
        let (channel, _) = ScriptedChannel::new("");
        let channel = channel
            .expect("show version", "show version\r\nCisco IOS")
            .hang_up_when_drained();
        let mut ex = exchange(channel);

        let err = ex
            .execute_until("show version", &Expect::Prompt, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(ex.is_closed());
        assert!(ex.execute("show version", None).await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_read() {
        let (trigger, shutdown) = crate::shutdown::channel();
        let (channel, _) = ScriptedChannel::new("");
        let channel = channel.expect("tclsh flash:iosmap.tcl -sP 10.0.0.0/8", "");
        let prompt = cisco_ios::platform().combined_prompt().unwrap();
        let mut ex = CommandExchange::new(channel, prompt, "%", timing(), shutdown);

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.trigger();
            trigger
        });

        let err = ex
            .execute_until(
                "tclsh flash:iosmap.tcl -sP 10.0.0.0/8",
                &Expect::Prompt,
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Cancelled)));
        assert!(ex.is_closed());
        let _trigger = canceller.await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_output_is_discarded() {
        let (channel, _) = ScriptedChannel::new("");
        let channel = channel
            .expect_chunks("", &["\r\nrouter#", "\r\nrouter#"])
            .expect("show clock", "show clock\r\n*10:00:01 UTC\r\nrouter#");
        let mut ex = exchange(channel);

        ex.execute_until("", &Expect::Prompt, Duration::from_millis(200))
            .await
            .unwrap();
        let result = ex.execute("show clock", None).await.unwrap();
        assert_eq!(result.output, "*10:00:01 UTC");
    }

    #[tokio::test]
    async fn test_over_stream_channel() {
        let mock = tokio_test::io::Builder::new()
            .write(b"show clock\n")
            .read(b"show clock\r\n*10:00:01 UTC\r\nrouter>")
            .build();
        let mut ex = exchange(StreamChannel::new(mock));

        let result = ex
            .execute_until("show clock", &Expect::Prompt, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(result.prompt.as_deref(), Some("router>"));
        assert_eq!(result.output, "*10:00:01 UTC");
    }
}
