//! Device session: the privilege/mode state machine over a command exchange.

use std::net::Ipv4Addr;

use log::{debug, info, warn};
use secrecy::{ExposeSecret, SecretString};

use super::exchange::{CommandExchange, ExchangeTiming, Expect};
use super::interactive::{Dialog, DialogResult};
use super::response::{CommandResult, Completion};
use crate::channel::ShellChannel;
use crate::error::{Error, Result, SessionError};
use crate::platform::{MarkerTable, Mode, PlatformDefinition, Privilege, SessionState};
use crate::shutdown::Shutdown;

/// Everything a session needs besides the channel itself.
#[derive(Debug)]
pub struct SessionParams {
    /// Resolved device family.
    pub platform: PlatformDefinition,

    /// Enable secret, if the device asks for one.
    pub secret: Option<SecretString>,

    /// Address the session is connected through; networks containing it are
    /// never reported as targets.
    pub management_addr: Option<Ipv4Addr>,

    pub timing: ExchangeTiming,

    pub shutdown: Shutdown,
}

/// A connected device shell.
///
/// Every operation takes `&mut self`: exchanges on one session are strictly
/// sequential. A transport failure in any operation leaves the session
/// [`Disconnected`](SessionState::Disconnected).
pub struct DeviceSession<C> {
    exchange: CommandExchange<C>,
    platform: PlatformDefinition,
    state: SessionState,
    secret: Option<SecretString>,
    management_addr: Option<Ipv4Addr>,
}

impl<C: ShellChannel> DeviceSession<C> {
    /// Take over an open shell channel: wait for the first prompt, classify
    /// it and run the platform's on-open commands.
    pub async fn open(channel: C, params: SessionParams) -> Result<Self> {
        let prompt_pattern = params.platform.combined_prompt()?;
        let exchange = CommandExchange::new(
            channel,
            prompt_pattern,
            params.platform.markers.error.clone(),
            params.timing,
            params.shutdown,
        );

        let mut session = Self {
            exchange,
            platform: params.platform,
            state: SessionState::Disconnected,
            secret: params.secret,
            management_addr: params.management_addr,
        };

        let prompt = match session.exchange.read_prompt().await {
            Ok(prompt) => prompt,
            Err(e) => {
                session.exchange.close().await.ok();
                return Err(e);
            }
        };
        session.state = session.classify(&prompt);
        info!("session: connected at '{}' ({})", prompt, session.state);

        for command in session.platform.on_open_commands.clone() {
            let result = session.exchange_op(&command, &Expect::Prompt, None).await?;
            if result.device_error {
                warn!("session: on-open command '{}' was rejected", command);
            }
        }

        Ok(session)
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn platform(&self) -> &PlatformDefinition {
        &self.platform
    }

    pub fn markers(&self) -> &MarkerTable {
        &self.platform.markers
    }

    pub fn management_addr(&self) -> Option<Ipv4Addr> {
        self.management_addr
    }

    pub fn timing(&self) -> ExchangeTiming {
        self.exchange.timing()
    }

    /// Request privileged EXEC. No-op when already privileged.
    pub async fn escalate_privilege(&mut self) -> Result<()> {
        self.require_connected("escalate_privilege")?;
        if self.state.privilege() == Some(Privilege::Privileged) {
            debug!("session: already privileged");
            return Ok(());
        }

        let secret = self
            .secret
            .as_ref()
            .map(|s| s.expose_secret().to_string())
            .unwrap_or_default();
        let dialog = Dialog::builder()
            .send(self.platform.escalate_command.clone())
            .until_literal_or_prompt(self.platform.password_prompt.clone())
            .send_hidden(secret)
            .until_literal_or_prompt(self.platform.password_prompt.clone())
            .build();

        let result = self.dialog_op(&dialog).await?;
        let mut last = result.steps.last().cloned();

        // IOS asks again after a wrong secret; answer with empty lines until
        // it gives up and prints the prompt.
        let mut retries = 0;
        while last.as_ref().is_some_and(|r| r.completion == Completion::Pattern) && retries < 3 {
            let expect = Expect::LiteralOrPrompt(self.platform.password_prompt.clone());
            last = Some(self.exchange_op("", &expect, None).await?);
            retries += 1;
        }

        let prompt = last.and_then(|r| r.prompt).unwrap_or_default();
        self.state = self.classify(&prompt);

        if self.state.privilege() == Some(Privilege::Privileged) {
            info!("session: privilege escalated ({})", self.state);
            Ok(())
        } else {
            warn!("session: enable refused, still at '{}'", prompt);
            Err(SessionError::PrivilegeDenied { prompt }.into())
        }
    }

    /// Start the interactive Tcl interpreter. No-op when already in it.
    pub async fn enter_scripting_environment(&mut self) -> Result<()> {
        self.require_privileged("enter_scripting_environment", None)?;
        if self.state.mode() == Some(Mode::Scripting) {
            return Ok(());
        }

        let command = self.platform.scripting_enter.clone();
        let result = self.exchange_op(&command, &Expect::Prompt, None).await?;
        if result.device_error || self.state.mode() != Some(Mode::Scripting) {
            return Err(SessionError::Unsupported {
                feature: command,
            }
            .into());
        }
        info!("session: scripting environment active");
        Ok(())
    }

    /// Leave the interactive Tcl interpreter. No-op when not in it.
    pub async fn exit_scripting_environment(&mut self) -> Result<()> {
        self.require_privileged("exit_scripting_environment", None)?;
        if self.state.mode() != Some(Mode::Scripting) {
            return Ok(());
        }

        let command = self.platform.scripting_exit.clone();
        self.exchange_op(&command, &Expect::Prompt, None).await?;
        debug!("session: scripting environment closed ({})", self.state);
        Ok(())
    }

    /// Probe for the Tcl interpreter by entering and leaving it.
    pub async fn check_scripting_support(&mut self) -> Result<bool> {
        match self.enter_scripting_environment().await {
            Ok(()) => {}
            Err(Error::Session(SessionError::Unsupported { .. })) => return Ok(false),
            Err(e) => return Err(e),
        }
        self.exit_scripting_environment().await?;
        Ok(true)
    }

    /// Send one line verbatim and return what came back.
    pub async fn raw_command(&mut self, text: &str) -> Result<CommandResult> {
        self.require_privileged("raw_command", None)?;
        self.exchange_op(text, &Expect::PromptOrIdle, None).await
    }

    /// Fetch `show running-config`.
    pub async fn running_config(&mut self) -> Result<String> {
        self.require_privileged("running_config", Some(Mode::Shell))?;
        let result = self
            .exchange_op("show running-config", &Expect::Prompt, None)
            .await?;
        Ok(result.output)
    }

    /// Fetch `show version`. Works at any privilege level.
    pub async fn show_version(&mut self) -> Result<String> {
        self.require_connected("show_version")?;
        if self.state.mode() != Some(Mode::Shell) {
            return Err(self.invalid_state("show_version"));
        }
        let result = self.exchange_op("show version", &Expect::Prompt, None).await?;
        Ok(result.output)
    }

    /// List flash entries matching `name`.
    pub async fn list_flash_file(&mut self, name: &str) -> Result<CommandResult> {
        self.require_privileged("list_flash_file", Some(Mode::Shell))?;
        let command = format!("dir flash: | include {}", name);
        self.exchange_op(&command, &Expect::Prompt, None).await
    }

    /// Run a Tcl script in one shot from the privileged shell.
    ///
    /// Scans can run for minutes, so this waits for the prompt up to the
    /// long timeout.
    pub async fn run_script(&mut self, script: &str, args: &str) -> Result<CommandResult> {
        self.require_privileged("run_script", Some(Mode::Shell))?;
        let command = format!("{} {} {}", self.platform.script_runner, script, args)
            .trim_end()
            .to_string();
        let long = self.exchange.timing().long_timeout;
        self.exchange_op(&command, &Expect::Prompt, Some(long)).await
    }

    /// Launch a long-lived Tcl script (a listener) and return once the device
    /// either prompts again or goes quiet.
    pub async fn start_script(&mut self, script: &str, args: &str) -> Result<CommandResult> {
        self.require_privileged("start_script", Some(Mode::Shell))?;
        let command = format!("{} {} {}", self.platform.script_runner, script, args)
            .trim_end()
            .to_string();
        self.exchange_op(&command, &Expect::PromptOrIdle, None).await
    }

    /// Run a confirmation dialog from the privileged shell.
    pub async fn run_dialog(&mut self, dialog: &Dialog) -> Result<DialogResult> {
        self.require_privileged("run_dialog", Some(Mode::Shell))?;
        self.dialog_op(dialog).await
    }

    /// Close the channel. Idempotent.
    pub async fn close(&mut self) -> Result<()> {
        if !self.state.is_connected() && self.exchange.is_closed() {
            return Ok(());
        }
        self.state = SessionState::Disconnected;
        info!("session: closing");
        self.exchange.close().await
    }

    fn classify(&self, prompt: &str) -> SessionState {
        match self.platform.classify_prompt(prompt) {
            Some((privilege, mode)) => SessionState::Connected { privilege, mode },
            None => {
                warn!("session: unrecognised prompt '{}', assuming unprivileged", prompt);
                SessionState::Connected {
                    privilege: Privilege::Unprivileged,
                    mode: Mode::Shell,
                }
            }
        }
    }

    /// Follow the prompt the device ended on.
    fn observe(&mut self, result: &CommandResult) {
        if let Some(prompt) = &result.prompt {
            if let Some((privilege, mode)) = self.platform.classify_prompt(prompt) {
                self.state = SessionState::Connected { privilege, mode };
            }
        }
    }

    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_fatal() {
                warn!("session: transport failure, disconnecting: {}", e);
                self.state = SessionState::Disconnected;
            }
        }
        result
    }

    async fn exchange_op(
        &mut self,
        command: &str,
        expect: &Expect,
        timeout: Option<std::time::Duration>,
    ) -> Result<CommandResult> {
        let timeout = timeout.unwrap_or(self.exchange.timing().timeout);
        let result = self.exchange.execute_until(command, expect, timeout).await;
        let result = self.track(result)?;
        self.observe(&result);
        Ok(result)
    }

    async fn dialog_op(&mut self, dialog: &Dialog) -> Result<DialogResult> {
        let result = self.exchange.run_dialog(dialog).await;
        let result = self.track(result)?;
        if let Some(last) = result.steps.last() {
            self.observe(last);
        }
        Ok(result)
    }

    fn invalid_state(&self, operation: &str) -> Error {
        SessionError::InvalidState {
            operation: operation.to_string(),
            state: self.state.to_string(),
        }
        .into()
    }

    fn require_connected(&self, operation: &str) -> Result<()> {
        if !self.state.is_connected() {
            debug!("session: '{}' refused, not connected", operation);
            return Err(SessionError::NotConnected.into());
        }
        Ok(())
    }

    fn require_privileged(&self, operation: &str, mode: Option<Mode>) -> Result<()> {
        self.require_connected(operation)?;
        if self.state.privilege() != Some(Privilege::Privileged) {
            return Err(self.invalid_state(operation));
        }
        if mode.is_some() && self.state.mode() != mode {
            return Err(self.invalid_state(operation));
        }
        Ok(())
    }
}
