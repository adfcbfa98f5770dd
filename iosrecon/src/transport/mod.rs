//! SSH transport layer wrapping russh.
//!
//! Connection setup, authentication and the PTY shell channel.

pub mod config;
mod ssh;

pub use config::{AuthMethod, HostKeyVerification, PtySize, SshConfig};
pub use ssh::{SshChannel, SshTransport};
