//! [`ShellChannel`] over any tokio byte stream.

use std::time::Duration;

use bytes::BytesMut;
use log::trace;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::ShellChannel;
use crate::error::{Result, TransportError};

/// Shell channel over a plain stream, e.g. a TCP connection to a console
/// server that drops straight into the device CLI.
pub struct StreamChannel<S> {
    stream: S,
    read_buf: BytesMut,
    closed: bool,
}

impl<S> StreamChannel<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(4096),
            closed: false,
        }
    }

    /// Get the underlying stream back.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S> ShellChannel for StreamChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(TransportError::Disconnected.into());
        }
        self.stream.write_all(data).await.map_err(TransportError::Io)?;
        self.stream.flush().await.map_err(TransportError::Io)?;
        Ok(())
    }

    async fn read_chunk(&mut self, wait: Duration) -> Result<Option<Vec<u8>>> {
        if self.closed {
            return Err(TransportError::Disconnected.into());
        }

        self.read_buf.reserve(4096);
        match tokio::time::timeout(wait, self.stream.read_buf(&mut self.read_buf)).await {
            Err(_) => Ok(None),
            Ok(Ok(0)) => {
                self.closed = true;
                Err(TransportError::Disconnected.into())
            }
            Ok(Ok(n)) => {
                trace!("stream read {} bytes", n);
                Ok(Some(self.read_buf.split().to_vec()))
            }
            Ok(Err(e)) => Err(TransportError::Io(e).into()),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.stream.shutdown().await.map_err(TransportError::Io)?;
        }
        Ok(())
    }
}
