//! Channel layer: the byte stream to the device shell.
//!
//! [`ShellChannel`] is the seam between the command exchange and whatever
//! actually carries the bytes (an SSH PTY, a raw TCP console server, a test
//! double). Implementations only move bytes; framing lives in
//! [`CommandExchange`](crate::driver::CommandExchange).

mod buffer;
#[cfg(test)]
pub(crate) mod mock;
mod stream;

pub use buffer::PatternBuffer;
pub use stream::StreamChannel;

use std::future::Future;
use std::time::Duration;

use crate::error::Result;

/// Ordered, reliable, bidirectional byte stream to a remote shell.
pub trait ShellChannel: Send {
    /// Write raw bytes to the shell.
    fn write(&mut self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Wait up to `wait` for the next chunk of output.
    ///
    /// Returns `Ok(None)` when nothing arrived in time and
    /// `TransportError::Disconnected` once the remote end has closed.
    fn read_chunk(&mut self, wait: Duration) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Close the channel. Further reads fail.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Send one line, terminated by a line feed.
    fn send_line(&mut self, line: &str) -> impl Future<Output = Result<()>> + Send {
        async move {
            let mut data = Vec::with_capacity(line.len() + 1);
            data.extend_from_slice(line.as_bytes());
            data.push(b'\n');
            self.write(&data).await
        }
    }
}
