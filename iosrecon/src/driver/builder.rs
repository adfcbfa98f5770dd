//! Builder for device sessions.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use log::debug;
use secrecy::SecretString;

use super::exchange::ExchangeTiming;
use super::session::{DeviceSession, SessionParams};
use crate::channel::ShellChannel;
use crate::error::{OptionError, PlatformError, Result};
use crate::options::OptionRegistry;
use crate::platform::{PlatformDefinition, PlatformRegistry};
use crate::shutdown::Shutdown;
use crate::transport::{
    AuthMethod, HostKeyVerification, PtySize, SshChannel, SshConfig, SshTransport,
};

/// Builder for constructing device sessions.
///
/// # Example
///
/// ```rust,no_run
/// use iosrecon::driver::SessionBuilder;
///
/// # async fn example() -> Result<(), iosrecon::Error> {
/// let mut session = SessionBuilder::new("192.168.1.1")
///     .username("admin")
///     .password("cisco")
///     .secret("enable-secret")
///     .platform("cisco_ios")
///     .connect()
///     .await?;
/// session.escalate_privilege().await?;
/// # Ok(())
/// # }
/// ```
pub struct SessionBuilder {
    host: String,
    port: u16,
    username: Option<String>,
    auth: AuthMethod,
    secret: Option<SecretString>,
    platform_name: Option<String>,
    custom_platform: Option<PlatformDefinition>,
    timing: ExchangeTiming,
    terminal_width: Option<u32>,
    terminal_height: Option<u32>,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    shutdown: Shutdown,
}

impl SessionBuilder {
    /// Create a new session builder for the specified host.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            username: None,
            auth: AuthMethod::None,
            secret: None,
            platform_name: None,
            custom_platform: None,
            timing: ExchangeTiming::default(),
            terminal_width: None,
            terminal_height: None,
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
            shutdown: Shutdown::never(),
        }
    }

    /// Resolve the `target` namespace of an option registry.
    ///
    /// Recognised keys: `host`, `port`, `username`, `password`, `secret`,
    /// `device_type`, `command_timeout`, `idle_timeout`, `host_key_policy`.
    /// Empty values leave the builder default in place.
    pub fn from_options(options: &OptionRegistry) -> Result<Self> {
        let mut builder = Self::new(options.value("host"));

        if let Some(port) = non_empty(options, "port") {
            builder.port = parse_option("port", port)?;
        }
        if let Some(username) = non_empty(options, "username") {
            builder = builder.username(username);
        }
        if let Some(password) = non_empty(options, "password") {
            builder = builder.password(password);
        }
        if let Some(secret) = non_empty(options, "secret") {
            builder = builder.secret(secret);
        }
        if let Some(device_type) = non_empty(options, "device_type") {
            builder = builder.platform(device_type);
        }
        if let Some(secs) = non_empty(options, "command_timeout") {
            builder.timing.timeout = Duration::from_secs(parse_option("command_timeout", secs)?);
        }
        if let Some(secs) = non_empty(options, "idle_timeout") {
            builder.timing.idle = Duration::from_secs(parse_option("idle_timeout", secs)?);
        }
        if let Some(policy) = non_empty(options, "host_key_policy") {
            builder.host_key_verification =
                serde_yaml::from_str(policy).map_err(|e| OptionError::Malformed {
                    key: "host_key_policy".to_string(),
                    message: e.to_string(),
                })?;
        }

        Ok(builder)
    }

    /// Set the SSH port (default: 22).
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the username for authentication.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set password authentication.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.auth = AuthMethod::Password(SecretString::from(password.into()));
        self
    }

    /// Set private key authentication.
    pub fn private_key(mut self, key_path: impl Into<PathBuf>) -> Self {
        self.auth = AuthMethod::PrivateKey {
            path: key_path.into(),
            passphrase: None,
        };
        self
    }

    /// Set the enable secret used by privilege escalation.
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(SecretString::from(secret.into()));
        self
    }

    /// Set the platform name (e.g. "cisco_ios").
    pub fn platform(mut self, platform: impl Into<String>) -> Self {
        self.platform_name = Some(platform.into());
        self
    }

    /// Set a custom platform definition.
    pub fn custom_platform(mut self, platform: PlatformDefinition) -> Self {
        self.custom_platform = Some(platform);
        self
    }

    /// Set the exchange timing.
    pub fn timing(mut self, timing: ExchangeTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Override the platform's terminal dimensions.
    pub fn terminal_size(mut self, width: u32, height: u32) -> Self {
        self.terminal_width = Some(width);
        self.terminal_height = Some(height);
        self
    }

    /// Set the host key verification mode.
    pub fn host_key_verification(mut self, mode: HostKeyVerification) -> Self {
        self.host_key_verification = mode;
        self
    }

    /// Use a known_hosts file other than `~/.ssh/known_hosts`.
    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    /// Abort in-flight exchanges when `shutdown` fires.
    pub fn shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Connect over SSH and open the device shell.
    pub async fn connect(self) -> Result<DeviceSession<SshChannel>> {
        let username = self.username.clone().ok_or_else(|| OptionError::Malformed {
            key: "username".to_string(),
            message: "a username is required".to_string(),
        })?;
        let platform = self.resolve_platform()?;
        let management_addr = resolve_ipv4(&self.host, self.port).await;

        let ssh_config = SshConfig {
            host: self.host,
            port: self.port,
            username,
            auth: self.auth,
            connect_timeout: self.timing.timeout,
            pty: PtySize {
                cols: self.terminal_width.unwrap_or(platform.terminal_width),
                rows: self.terminal_height.unwrap_or(platform.terminal_height),
            },
            host_keys: self.host_key_verification,
            known_hosts: self.known_hosts_path,
        };

        let channel = SshTransport::connect(ssh_config).await?.into_shell().await?;
        let params = SessionParams {
            platform,
            secret: self.secret,
            management_addr,
            timing: self.timing,
            shutdown: self.shutdown,
        };
        DeviceSession::open(channel, params).await
    }

    /// Open a session over an already-established shell channel, such as a
    /// console server's raw TCP stream.
    pub async fn open_on<C: ShellChannel>(self, channel: C) -> Result<DeviceSession<C>> {
        let platform = self.resolve_platform()?;
        let management_addr = self.host.parse::<Ipv4Addr>().ok();
        let params = SessionParams {
            platform,
            secret: self.secret,
            management_addr,
            timing: self.timing,
            shutdown: self.shutdown,
        };
        DeviceSession::open(channel, params).await
    }

    fn resolve_platform(&self) -> Result<PlatformDefinition> {
        if let Some(custom) = &self.custom_platform {
            return Ok(custom.clone());
        }
        match &self.platform_name {
            Some(name) => PlatformRegistry::builtin().resolve(name),
            None => Err(PlatformError::InvalidDefinition {
                message: "Platform must be specified".to_string(),
            }
            .into()),
        }
    }
}

fn non_empty<'a>(options: &'a OptionRegistry, key: &str) -> Option<&'a str> {
    options.get(key).filter(|v| !v.is_empty())
}

fn parse_option<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| {
        OptionError::Malformed {
            key: key.to_string(),
            message: e.to_string(),
        }
        .into()
    })
}

/// The IPv4 address the connection will use, for excluding the management
/// network from discovery.
async fn resolve_ipv4(host: &str, port: u16) -> Option<Ipv4Addr> {
    if let Ok(addr) = host.parse::<Ipv4Addr>() {
        return Some(addr);
    }
    match tokio::net::lookup_host((host, port)).await {
        Ok(mut addrs) => addrs.find_map(|a| match a.ip() {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        }),
        Err(e) => {
            debug!("builder: could not resolve {}: {}", host, e);
            None
        }
    }
}
