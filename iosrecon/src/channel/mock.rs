//! Scripted shell channel for exercising the exchange and session layers
//! against recorded device transcripts.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::ShellChannel;
use crate::error::{Result, TransportError};

/// Lines written to a [`ScriptedChannel`], shared so tests can inspect them
/// after the channel has moved into a session.
#[derive(Debug, Clone, Default)]
pub(crate) struct WriteLog(Arc<Mutex<Vec<String>>>);

impl WriteLog {
    pub(crate) fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn push(&self, line: String) {
        self.0.lock().unwrap().push(line);
    }
}

struct Step {
    expect: String,
    reply: Vec<Vec<u8>>,
}

/// Replays canned replies: every written line must match the next scripted
/// step, whose reply chunks then become readable.
pub(crate) struct ScriptedChannel {
    pending: VecDeque<Vec<u8>>,
    script: VecDeque<Step>,
    log: WriteLog,
    hang_up_when_drained: bool,
    closed: bool,
}

impl ScriptedChannel {
    /// New channel whose first readable data is `banner` (usually a prompt).
    pub(crate) fn new(banner: &str) -> (Self, WriteLog) {
        let log = WriteLog::default();
        let mut pending = VecDeque::new();
        if !banner.is_empty() {
            pending.push_back(banner.as_bytes().to_vec());
        }
        let channel = Self {
            pending,
            script: VecDeque::new(),
            log: log.clone(),
            hang_up_when_drained: false,
            closed: false,
        };
        (channel, log)
    }

    /// Expect `line` to be written next and answer with `reply`.
    pub(crate) fn expect(mut self, line: &str, reply: &str) -> Self {
        self.script.push_back(Step {
            expect: line.to_string(),
            reply: vec![reply.as_bytes().to_vec()],
        });
        self
    }

    /// Like [`expect`](Self::expect) but the reply arrives in several chunks.
    pub(crate) fn expect_chunks(mut self, line: &str, chunks: &[&str]) -> Self {
        self.script.push_back(Step {
            expect: line.to_string(),
            reply: chunks.iter().map(|c| c.as_bytes().to_vec()).collect(),
        });
        self
    }

    /// Report a disconnect once every scripted step has been written and
    /// all queued output has been read.
    pub(crate) fn hang_up_when_drained(mut self) -> Self {
        self.hang_up_when_drained = true;
        self
    }
}

impl ShellChannel for ScriptedChannel {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(TransportError::Disconnected.into());
        }

        let text = String::from_utf8_lossy(data);
        let line = text.strip_suffix('\n').unwrap_or(&text).to_string();
        self.log.push(line.clone());

        match self.script.pop_front() {
            Some(step) => {
                assert_eq!(step.expect, line, "unexpected line written to device");
                self.pending.extend(step.reply);
            }
            None => panic!("no scripted reply for {:?}", line),
        }
        Ok(())
    }

    async fn read_chunk(&mut self, wait: Duration) -> Result<Option<Vec<u8>>> {
        if self.closed {
            return Err(TransportError::Disconnected.into());
        }
        if let Some(chunk) = self.pending.pop_front() {
            return Ok(Some(chunk));
        }
        if self.hang_up_when_drained && self.script.is_empty() {
            return Err(TransportError::Disconnected.into());
        }
        tokio::time::sleep(wait).await;
        Ok(None)
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
