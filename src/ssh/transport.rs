//! Transport handle abstraction
//!
//! A [`Transport`] is an established, authenticated SSH connection. The
//! manager only deals in `Arc<dyn Transport>` so the route resolver can be
//! driven by the russh implementation in production and by a recording fake
//! in tests.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use russh::client::Msg;
use russh::Channel;
use russh_sftp::client::SftpSession;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use super::config::{ConnectionSpec, Secret, DEFAULT_SSH_PORT};
use super::error::SshError;

/// Shared reference to an established transport; compare with `Arc::ptr_eq`
pub type TransportHandle = Arc<dyn Transport>;

/// Byte stream usable as the underlying transport of a nested SSH session
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Raw connection opened through an existing transport (direct-tcpip)
pub type TunnelStream = Box<dyn AsyncStream>;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Unique ID, used in logs
    fn id(&self) -> &str;

    /// Route label of the remote end, e.g. `jump:22/db:22` for a tunnel
    fn remote_endpoint(&self) -> &str;

    /// Open a session channel for command execution
    async fn open_session(&self) -> Result<Channel<Msg>, SshError>;

    /// Open a direct-tcpip tunnel to a further hop
    async fn dial(&self, host: &str, port: u16) -> Result<TunnelStream, SshError>;

    /// Disconnect the underlying SSH connection
    async fn close(&self);

    /// Open an SFTP client on a fresh session channel
    async fn open_file_transfer(&self) -> Result<SftpSession, SshError> {
        let channel = self.open_session().await?;
        channel.request_subsystem(true, "sftp").await.map_err(|e| {
            SshError::ChannelError(format!("Failed to request SFTP subsystem: {}", e))
        })?;

        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| SshError::ChannelError(format!("Failed to start SFTP session: {}", e)))?;

        debug!("SFTP subsystem opened on {}", self.remote_endpoint());
        Ok(sftp)
    }
}

/// Fully resolved dial parameters for one hop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hop {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<Secret>,
    pub private_key: Option<Secret>,
}

impl Hop {
    /// Build a hop from a spec whose leaf fields have already been merged
    pub fn from_spec(spec: &ConnectionSpec) -> Result<Self, SshError> {
        let host = spec
            .host
            .clone()
            .ok_or_else(|| SshError::InvalidConfig("host is required to dial".into()))?;
        let user = spec.user.clone().ok_or_else(|| {
            SshError::InvalidConfig(format!("user is required to connect to {}", host))
        })?;

        Ok(Self {
            host,
            port: spec.port.unwrap_or(DEFAULT_SSH_PORT),
            user,
            password: spec.password.clone(),
            private_key: spec.private_key.clone(),
        })
    }

    /// `host:port`, bracketing IPv6 literals
    pub fn address(&self) -> String {
        join_host_port(&self.host, self.port)
    }
}

impl fmt::Display for Hop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.address())
    }
}

pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Establishes transports; the manager is generic over this seam
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Check `hop` for errors that need no network, such as bad key material
    ///
    /// Called before a tunnel is opened for the hop.
    fn validate(&self, _hop: &Hop) -> Result<(), SshError> {
        Ok(())
    }

    /// Dial `hop` over TCP and authenticate
    async fn connect(&self, hop: &Hop) -> Result<TransportHandle, SshError>;

    /// Run the SSH handshake for `hop` over an already-open tunnel
    ///
    /// `via` is the transport that carries the tunnel; implementations keep
    /// it alive for as long as the new transport exists.
    async fn connect_over(
        &self,
        via: TransportHandle,
        stream: TunnelStream,
        hop: &Hop,
    ) -> Result<TransportHandle, SshError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hop_defaults_port() {
        let hop = Hop::from_spec(&ConnectionSpec::new("db", "app")).unwrap();
        assert_eq!(hop.port, 22);
        assert_eq!(hop.address(), "db:22");
        assert_eq!(hop.to_string(), "app@db:22");
    }

    #[test]
    fn test_hop_requires_host_and_user() {
        assert!(matches!(
            Hop::from_spec(&ConnectionSpec::default()),
            Err(SshError::InvalidConfig(_))
        ));
        assert!(matches!(
            Hop::from_spec(&ConnectionSpec::default().host("db")),
            Err(SshError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_join_host_port_ipv6() {
        assert_eq!(join_host_port("::1", 2222), "[::1]:2222");
        assert_eq!(join_host_port("10.0.0.1", 22), "10.0.0.1:22");
    }
}
