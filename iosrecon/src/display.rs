//! Display sink for user-facing status messages.
//!
//! The core pushes tagged [`Message`]s and never waits for them to be
//! rendered; the front end owns the receiving end and decides how to draw
//! them.

use std::fmt;

use tokio::sync::mpsc;

/// How a message should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Plain,
    Error,
    Success,
    Emphasis,
}

/// A single display message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub text: String,
}

impl Message {
    pub fn new(kind: MessageKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Fire-and-forget producer side of the display queue.
#[derive(Debug, Clone)]
pub struct DisplaySink {
    tx: mpsc::UnboundedSender<Message>,
}

/// Create a sink and the receiver the front end drains.
pub fn channel() -> (DisplaySink, mpsc::UnboundedReceiver<Message>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (DisplaySink { tx }, rx)
}

impl DisplaySink {
    /// Queue a message. A closed receiver silently drops it.
    pub fn send(&self, message: Message) {
        let _ = self.tx.send(message);
    }

    pub fn plain(&self, text: impl Into<String>) {
        self.send(Message::new(MessageKind::Plain, text));
    }

    pub fn error(&self, text: impl Into<String>) {
        self.send(Message::new(MessageKind::Error, text));
    }

    pub fn success(&self, text: impl Into<String>) {
        self.send(Message::new(MessageKind::Success, text));
    }

    pub fn emphasis(&self, text: impl Into<String>) {
        self.send(Message::new(MessageKind::Emphasis, text));
    }
}
