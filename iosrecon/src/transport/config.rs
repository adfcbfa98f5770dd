//! Parameters for the SSH leg to the device.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

/// What to do with the device's host key. Spelled `strict`, `accept_new` or
/// `disabled` in option files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKeyVerification {
    /// Only hosts already in known_hosts are accepted.
    Strict,

    /// Unknown hosts are recorded on first contact; a changed key is refused.
    #[default]
    AcceptNew,

    /// Anything goes. Lab routers are re-imaged often enough to need this.
    Disabled,
}

/// Terminal geometry requested for the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtySize {
    pub cols: u32,
    pub rows: u32,
}

/// Everything needed to reach a device shell over SSH.
#[derive(Debug)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: AuthMethod,

    /// Upper bound on TCP connect plus key exchange.
    pub connect_timeout: Duration,
    pub pty: PtySize,
    pub host_keys: HostKeyVerification,

    /// Overrides `~/.ssh/known_hosts`.
    pub known_hosts: Option<PathBuf>,
}

impl SshConfig {
    /// `host:port`, for log lines and errors.
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Credentials presented after key exchange.
#[derive(Debug)]
pub enum AuthMethod {
    /// `none` authentication; only useful against test servers.
    None,
    Password(SecretString),
    PrivateKey {
        path: PathBuf,
        passphrase: Option<SecretString>,
    },
}
