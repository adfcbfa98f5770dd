//! SSH leg to the device, on russh.
//!
//! IOS exposes its CLI as an interactive shell, so the only thing this
//! module hands out is a PTY shell channel. There is no exec or subsystem
//! support.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, trace, warn};
use russh::client::{self, Handle, Msg};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey, load_secret_key};
use russh::{Channel, ChannelMsg, Disconnect};
use secrecy::ExposeSecret;

use super::config::{AuthMethod, HostKeyVerification, PtySize, SshConfig};
use crate::channel::ShellChannel;
use crate::error::{Result, TransportError};

/// An authenticated SSH connection with no shell open yet.
pub struct SshTransport {
    handle: Handle<HostKeyCheck>,
    target: String,
    pty: PtySize,
}

impl SshTransport {
    /// Dial, verify the host key and log in.
    pub async fn connect(config: SshConfig) -> Result<Self> {
        let target = config.target();
        let rejection = Arc::new(Mutex::new(None));
        let check = HostKeyCheck {
            host: config.host.clone(),
            port: config.port,
            policy: config.host_keys,
            known_hosts: config.known_hosts.clone(),
            rejection: rejection.clone(),
        };
        let client_config = Arc::new(client::Config {
            inactivity_timeout: None,
            ..Default::default()
        });

        debug!("ssh: dialing {}", target);
        let dial = client::connect(client_config, (config.host.as_str(), config.port), check);
        let mut handle = tokio::time::timeout(config.connect_timeout, dial)
            .await
            .map_err(|_| TransportError::Timeout(config.connect_timeout))?
            .map_err(|e| {
                // A refused host key surfaces from russh as a bare UnknownKey.
                let refused = rejection.lock().ok().and_then(|mut slot| slot.take());
                refused.unwrap_or(TransportError::Ssh(e))
            })?;

        login(&mut handle, &config.username, &config.auth).await?;
        debug!("ssh: logged in to {} as {}", target, config.username);

        Ok(Self {
            handle,
            target,
            pty: config.pty,
        })
    }

    /// Request a PTY and a shell. The returned channel owns the connection.
    pub async fn into_shell(self) -> Result<SshChannel> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(TransportError::Ssh)?;
        channel
            .request_pty(true, "vt100", self.pty.cols, self.pty.rows, 0, 0, &[])
            .await
            .map_err(TransportError::Ssh)?;
        channel
            .request_shell(true)
            .await
            .map_err(TransportError::Ssh)?;

        trace!("ssh: shell open on {}", self.target);
        Ok(SshChannel {
            channel,
            connection: Some(self),
            closed: false,
        })
    }

    async fn disconnect(self) -> Result<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(TransportError::Ssh)?;
        Ok(())
    }
}

async fn login(handle: &mut Handle<HostKeyCheck>, user: &str, auth: &AuthMethod) -> Result<()> {
    let accepted = match auth {
        AuthMethod::None => handle.authenticate_none(user).await,
        AuthMethod::Password(password) => {
            handle
                .authenticate_password(user, password.expose_secret())
                .await
        }
        AuthMethod::PrivateKey { path, passphrase } => {
            let key = load_secret_key(path, passphrase.as_ref().map(|p| p.expose_secret()))
                .map_err(|e| TransportError::Key(e.to_string()))?;
            let hash_alg = handle
                .best_supported_rsa_hash()
                .await
                .map_err(TransportError::Ssh)?
                .flatten();
            handle
                .authenticate_publickey(user, PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg))
                .await
        }
    }
    .map_err(TransportError::Ssh)?
    .success();

    if accepted {
        Ok(())
    } else {
        Err(TransportError::AuthenticationFailed {
            user: user.to_string(),
        }
        .into())
    }
}

/// Host key policy, applied during key exchange.
struct HostKeyCheck {
    host: String,
    port: u16,
    policy: HostKeyVerification,
    known_hosts: Option<PathBuf>,
    /// Why the key was refused, for `connect` to report.
    rejection: Arc<Mutex<Option<TransportError>>>,
}

impl HostKeyCheck {
    fn verdict(&self, key: &PublicKey) -> std::result::Result<(), TransportError> {
        if self.policy == HostKeyVerification::Disabled {
            return Ok(());
        }

        let known = match &self.known_hosts {
            Some(path) => russh::keys::check_known_hosts_path(&self.host, self.port, key, path),
            None => russh::keys::check_known_hosts(&self.host, self.port, key),
        };
        match known {
            Ok(true) => Ok(()),
            Ok(false) if self.policy == HostKeyVerification::AcceptNew => {
                if let Err(e) = self.remember(key) {
                    warn!("ssh: could not record host key for {}: {}", self.host, e);
                }
                Ok(())
            }
            Ok(false) => Err(TransportError::HostKeyUnknown {
                host: self.host.clone(),
                port: self.port,
            }),
            Err(russh::keys::Error::KeyChanged { line }) => Err(TransportError::HostKeyChanged {
                host: self.host.clone(),
                port: self.port,
                line,
            }),
            Err(e) => Err(TransportError::KnownHosts(e.to_string())),
        }
    }

    fn remember(&self, key: &PublicKey) -> std::result::Result<(), russh::keys::Error> {
        use russh::keys::known_hosts::{learn_known_hosts, learn_known_hosts_path};

        match &self.known_hosts {
            Some(path) => learn_known_hosts_path(&self.host, self.port, key, path),
            None => learn_known_hosts(&self.host, self.port, key),
        }
    }
}

impl client::Handler for HostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match self.verdict(server_public_key) {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!("ssh: refusing host key: {}", e);
                if let Ok(mut slot) = self.rejection.lock() {
                    *slot = Some(e);
                }
                Ok(false)
            }
        }
    }
}

/// Interactive shell on an SSH PTY channel.
///
/// Closing the shell also disconnects the session it was opened on.
pub struct SshChannel {
    channel: Channel<Msg>,
    connection: Option<SshTransport>,
    closed: bool,
}

impl ShellChannel for SshChannel {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(TransportError::Disconnected.into());
        }
        self.channel.data(data).await.map_err(TransportError::Ssh)?;
        Ok(())
    }

    async fn read_chunk(&mut self, wait: Duration) -> Result<Option<Vec<u8>>> {
        if self.closed {
            return Err(TransportError::Disconnected.into());
        }

        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let Ok(msg) = tokio::time::timeout_at(deadline, self.channel.wait()).await else {
                return Ok(None);
            };

            match msg {
                Some(ChannelMsg::Data { data }) | Some(ChannelMsg::ExtendedData { data, .. }) => {
                    trace!("ssh: {} bytes", data.len());
                    return Ok(Some(data.to_vec()));
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                    debug!("ssh: device closed the shell");
                    self.closed = true;
                    return Err(TransportError::Disconnected.into());
                }
                Some(other) => trace!("ssh: skipping {:?}", other),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed && self.connection.is_none() {
            return Ok(());
        }
        self.closed = true;
        if let Err(e) = self.channel.close().await {
            debug!("ssh: channel close: {}", e);
        }
        match self.connection.take() {
            Some(connection) => connection.disconnect().await,
            None => Ok(()),
        }
    }
}
