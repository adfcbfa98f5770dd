//! The read-eval-print loop.
//!
//! Line editing runs on a dedicated thread because rustyline blocks. The
//! thread hands each line over and waits for an acknowledgement before
//! printing the next prompt, so command output never interleaves with it.

use std::io::Write;
use std::sync::mpsc as std_mpsc;
use std::thread;

use iosrecon::display::{self, DisplaySink, Message};
use iosrecon::options::OptionRegistry;
use iosrecon::shutdown;
use log::{debug, warn};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;

use crate::commands::CommandRegistry;
use crate::render::render_message;

/// One event from the line editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Line(String),
    /// Ctrl-C at the prompt.
    Interrupted,
    /// Ctrl-D at the prompt.
    Eof,
    Failed(String),
}

pub struct Console {
    registry: CommandRegistry,
    options: OptionRegistry,
    prompt: String,
}

impl Console {
    pub fn new(options: OptionRegistry, prompt: impl Into<String>) -> Self {
        Self {
            registry: CommandRegistry::builtin(),
            options,
            prompt: prompt.into(),
        }
    }

    /// Run on the terminal until `exit`, `quit`, Ctrl-C, SIGTERM or end of
    /// input.
    pub async fn run(self) {
        let (lines_tx, lines) = mpsc::channel(1);
        let (ack_tx, ack_rx) = std_mpsc::channel();
        let prompt = self.prompt.clone();
        thread::spawn(move || read_lines(&prompt, lines_tx, ack_rx));

        let (signal_tx, signals) = mpsc::unbounded_channel();
        tokio::spawn(forward_signals(signal_tx));

        let mut stdout = std::io::stdout();
        self.serve(lines, signals, ack_tx, &mut stdout).await;
    }

    /// Process editor input, writing rendered messages to `out`. Anything
    /// received on `signals` ends the session, stopping a running command
    /// first.
    pub async fn serve<W: Write>(
        mut self,
        mut lines: mpsc::Receiver<Input>,
        mut signals: mpsc::UnboundedReceiver<()>,
        ack: std_mpsc::Sender<()>,
        out: &mut W,
    ) {
        let (display, mut messages) = display::channel();
        let mut announced = false;

        loop {
            let input = tokio::select! {
                biased;
                input = lines.recv() => input,
                Some(()) = signals.recv() => {
                    debug!("console: signal at the prompt");
                    None
                }
            };

            match input {
                Some(Input::Line(line)) => {
                    if matches!(line.trim(), "exit" | "quit") {
                        break;
                    }
                    if self
                        .execute(&line, &display, &mut messages, &mut signals, out)
                        .await
                    {
                        announced = true;
                        break;
                    }
                }
                Some(Input::Failed(e)) => {
                    display.error(format!("Line editor failed: {}", e));
                    break;
                }
                Some(Input::Interrupted) | Some(Input::Eof) | None => break,
            }

            drain(&mut messages, out);
            if ack.send(()).is_err() {
                break;
            }
        }

        if !announced {
            display.emphasis("Closing application gracefully!");
        }
        display.emphasis("Stopping all running tasks...");
        drain(&mut messages, out);
    }

    /// Dispatch one line, printing messages as they arrive. A signal stops
    /// the command and waits for it to wind down; the return value says
    /// whether that happened.
    async fn execute<W: Write>(
        &mut self,
        line: &str,
        display: &DisplaySink,
        messages: &mut mpsc::UnboundedReceiver<Message>,
        signals: &mut mpsc::UnboundedReceiver<()>,
        out: &mut W,
    ) -> bool {
        let (trigger, shutdown) = shutdown::channel();
        let dispatch = self
            .registry
            .dispatch(line, &mut self.options, display, shutdown);
        tokio::pin!(dispatch);
        let mut stopping = false;

        loop {
            tokio::select! {
                biased;
                _ = &mut dispatch => break,
                Some(message) = messages.recv() => print(out, &message),
                Some(()) = signals.recv(), if !stopping => {
                    debug!("console: signal during '{}'", line.trim());
                    stopping = true;
                    display.emphasis("Closing application gracefully!");
                    trigger.trigger();
                }
            }
        }
        stopping
    }
}

fn read_lines(prompt: &str, tx: mpsc::Sender<Input>, ack: std_mpsc::Receiver<()>) {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            let _ = tx.blocking_send(Input::Failed(e.to_string()));
            return;
        }
    };

    loop {
        let input = match editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = editor.add_history_entry(line.as_str());
                }
                Input::Line(line)
            }
            Err(ReadlineError::Interrupted) => Input::Interrupted,
            Err(ReadlineError::Eof) => Input::Eof,
            Err(e) => Input::Failed(e.to_string()),
        };

        let last = matches!(input, Input::Eof | Input::Failed(_));
        if tx.blocking_send(input).is_err() || last {
            return;
        }
        if ack.recv().is_err() {
            return;
        }
    }
}

/// Forward SIGINT and SIGTERM to the console for the life of the process.
/// Once installed, tokio's handlers replace the default action.
async fn forward_signals(tx: mpsc::UnboundedSender<()>) {
    loop {
        shutdown_signal().await;
        if tx.send(()).is_err() {
            return;
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("console: cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn drain<W: Write>(messages: &mut mpsc::UnboundedReceiver<Message>, out: &mut W) {
    while let Ok(message) = messages.try_recv() {
        print(out, &message);
    }
}

fn print<W: Write>(out: &mut W, message: &Message) {
    let _ = writeln!(out, "{}", render_message(message));
    let _ = out.flush();
}
