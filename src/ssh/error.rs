//! SSH Error types

use std::fmt;

use thiserror::Error;

/// Which recursive hop of a route failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopKind {
    /// The default connection, used as the first hop
    DefaultAsBastion,
    /// An explicit bastion block
    Bastion,
    /// The default connection, used as a fallback for an empty override
    Default,
}

impl fmt::Display for HopKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HopKind::DefaultAsBastion => f.write_str("default connection as bastion"),
            HopKind::Bastion => f.write_str("bastion"),
            HopKind::Default => f.write_str("default connection"),
        }
    }
}

#[derive(Error, Debug)]
pub enum SshError {
    #[error("Unable to parse private key for {host}: {reason}")]
    KeyError { host: String, reason: String },

    #[error("Connection to {host}:{port} failed: {reason}")]
    ConnectionFailed {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("Connection to {host}:{port} through {via} failed: {reason}")]
    ChainedDialFailed {
        via: String,
        host: String,
        port: u16,
        reason: String,
    },

    #[error("Authentication failed for {user}@{host}: {reason}")]
    AuthenticationFailed {
        user: String,
        host: String,
        reason: String,
    },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Failed to connect to {hop} {host}: {source}")]
    Route {
        hop: HopKind,
        host: String,
        #[source]
        source: Box<SshError>,
    },

    #[error("Route exceeds {depth} hops, check for a bastion cycle")]
    RouteTooDeep { depth: usize },

    #[error("Invalid connection config: {0}")]
    InvalidConfig(String),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Session error: {0}")]
    SessionError(String),

    #[error("Command exited with non-zero status: {exit_code}\nOutput: {output}")]
    CommandFailed { exit_code: i64, output: String },

    #[error("Disconnected")]
    Disconnected,

    #[error("SSH protocol error: {0}")]
    ProtocolError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SshError {
    /// Wrap an error with the hop that produced it
    pub fn at_hop(self, hop: HopKind, host: impl Into<String>) -> Self {
        SshError::Route {
            hop,
            host: host.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, skipping route context
    pub fn root_cause(&self) -> &SshError {
        match self {
            SshError::Route { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl From<russh::Error> for SshError {
    fn from(err: russh::Error) -> Self {
        SshError::ProtocolError(err.to_string())
    }
}
