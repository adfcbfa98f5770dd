//! Error types for iosrecon.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Main error type for iosrecon operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level errors. Always terminal for the session.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Session state machine errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Malformed input to one of the parsing helpers
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Platform/vendor errors
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Option registry errors
    #[error("Option error: {0}")]
    Options(#[from] OptionError),
}

impl Error {
    /// Whether this error ends the session it happened on.
    ///
    /// Transport failures leave the device shell in an unknown position in
    /// its transcript, so the caller has to reconnect.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

/// Transport layer errors (SSH connection, authentication, stream I/O).
#[derive(Error, Debug)]
pub enum TransportError {
    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// SSH key error
    #[error("SSH key error: {0}")]
    Key(String),

    /// Host is not present in known_hosts and verification is strict
    #[error("Host key for {host}:{port} is not in known_hosts")]
    HostKeyUnknown { host: String, port: u16 },

    /// Host key differs from the one recorded in known_hosts
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Connection was closed unexpectedly
    #[error("Connection disconnected")]
    Disconnected,

    /// No completion condition was met in time
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Shutdown was requested while an exchange was in flight
    #[error("Operation cancelled by shutdown")]
    Cancelled,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Session state machine errors.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Session is not connected
    #[error("Session not connected")]
    NotConnected,

    /// The device rejected the enable secret
    #[error("Privilege escalation denied by device (prompt: '{prompt}')")]
    PrivilegeDenied { prompt: String },

    /// Operation invoked in the wrong session state
    #[error("'{operation}' is not valid in state {state}")]
    InvalidState { operation: String, state: String },

    /// The device lacks a feature the operation needs
    #[error("Device does not support {feature}")]
    Unsupported { feature: String },
}

/// Errors from the address, netmask and port parsing helpers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid IPv4 address '{0}'")]
    Address(String),

    #[error("invalid netmask '{0}'")]
    Netmask(String),

    #[error("invalid prefix length '{0}'")]
    Prefix(String),

    #[error("invalid CIDR block '{0}'")]
    Cidr(String),

    #[error("invalid port list '{0}'")]
    Ports(String),
}

/// Platform/vendor definition errors.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// No platform registered under this name
    #[error("Unknown platform '{name}'")]
    UnknownPlatform { name: String },

    /// Invalid platform definition
    #[error("Invalid platform definition: {message}")]
    InvalidDefinition { message: String },
}

/// Option registry errors.
#[derive(Error, Debug)]
pub enum OptionError {
    #[error("Unknown option '{key}'")]
    UnknownOption { key: String },

    #[error("{value} is not in the list of allowed values: {allowed:?}")]
    NotAllowed { value: String, allowed: Vec<String> },

    #[error("Failed to read options file: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse options document: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Malformed option '{key}': {message}")]
    Malformed { key: String, message: String },
}

/// Result type alias using iosrecon's Error.
pub type Result<T> = std::result::Result<T, Error>;
