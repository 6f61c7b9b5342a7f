//! SSH Client implementation using russh
//!
//! [`RusshConnector`] is the production [`Connector`]: it dials hops over TCP
//! or over a direct-tcpip tunnel of a previous hop (SSH-over-SSH via
//! `russh::client::connect_stream`), authenticates, and hands the
//! `Handle` to a single owner task.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use russh::client::{self, Handle, Msg};
use russh::keys::key::PrivateKeyWithHashAlg;
use russh::keys::{PrivateKey, PublicKey, PublicKeyBase64};
use russh::Channel;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::error::SshError;
use super::handle_owner::{spawn_handle_owner_task, HandleController};
use super::transport::{Connector, Hop, Transport, TransportHandle, TunnelStream};

/// Default timeout for TCP connect plus handshake
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client handler for russh callbacks
pub struct ClientHandler {
    /// Target host, for log messages
    host: String,
    port: u16,
    /// Accepted `SHA256:` fingerprints; empty accepts any key
    trusted_host_keys: Arc<Vec<String>>,
}

impl ClientHandler {
    pub fn new(host: String, port: u16, trusted_host_keys: Arc<Vec<String>>) -> Self {
        Self {
            host,
            port,
            trusted_host_keys,
        }
    }
}

impl client::Handler for ClientHandler {
    type Error = SshError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = host_key_fingerprint(server_public_key);

        if self.trusted_host_keys.is_empty() {
            debug!(
                "Accepting host key for {}:{} (fingerprint: {})",
                self.host, self.port, fingerprint
            );
            return Ok(true);
        }

        if self.trusted_host_keys.iter().any(|k| k == &fingerprint) {
            info!("Host key verified for {}:{}", self.host, self.port);
            Ok(true)
        } else {
            warn!(
                "Untrusted host key for {}:{} (fingerprint: {}), rejecting",
                self.host, self.port, fingerprint
            );
            Err(SshError::ConnectionFailed {
                host: self.host.clone(),
                port: self.port,
                reason: format!("host key {} is not in the trusted list", fingerprint),
            })
        }
    }
}

/// `SHA256:<base64>` fingerprint, as printed by `ssh-keygen -l`
pub fn host_key_fingerprint(key: &PublicKey) -> String {
    fingerprint_of_key_bytes(&key.public_key_bytes())
}

fn fingerprint_of_key_bytes(key_bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key_bytes);
    let hash = hasher.finalize();
    format!("SHA256:{}", BASE64.encode(hash).trim_end_matches('='))
}

/// Parse an in-memory private key
pub fn load_private_key(pem: &str, host: &str) -> Result<PrivateKey, SshError> {
    russh::keys::decode_secret_key(pem, None).map_err(|e| SshError::KeyError {
        host: host.to_string(),
        reason: e.to_string(),
    })
}

/// Production connector backed by russh
#[derive(Clone)]
pub struct RusshConnector {
    connect_timeout: Duration,
    trusted_host_keys: Arc<Vec<String>>,
}

impl Default for RusshConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT, Vec::new())
    }
}

impl RusshConnector {
    pub fn new(connect_timeout: Duration, trusted_host_keys: Vec<String>) -> Self {
        Self {
            connect_timeout,
            trusted_host_keys: Arc::new(trusted_host_keys),
        }
    }

    fn ssh_config() -> Arc<client::Config> {
        Arc::new(client::Config {
            inactivity_timeout: None,
            keepalive_interval: Some(Duration::from_secs(30)),
            keepalive_max: 3, // 90s of silence before disconnect
            ..Default::default()
        })
    }

    fn handler_for(&self, hop: &Hop) -> ClientHandler {
        ClientHandler::new(hop.host.clone(), hop.port, Arc::clone(&self.trusted_host_keys))
    }

    /// Try the password first, then the key
    async fn authenticate(
        handle: &mut Handle<ClientHandler>,
        hop: &Hop,
        key: Option<PrivateKey>,
    ) -> Result<(), SshError> {
        let auth_failed = |reason: String| SshError::AuthenticationFailed {
            user: hop.user.clone(),
            host: hop.host.clone(),
            reason,
        };

        if let Some(password) = &hop.password {
            let result = handle
                .authenticate_password(&hop.user, password.expose())
                .await
                .map_err(|e| auth_failed(e.to_string()))?;
            if result.success() {
                info!("Authenticated to {} with password", hop);
                return Ok(());
            }
            debug!("Password rejected by {}", hop);
        }

        if let Some(key) = key {
            let key_with_hash = PrivateKeyWithHashAlg::new(Arc::new(key), None);
            let result = handle
                .authenticate_publickey(&hop.user, key_with_hash)
                .await
                .map_err(|e| auth_failed(e.to_string()))?;
            if result.success() {
                info!("Authenticated to {} with private key", hop);
                return Ok(());
            }
            debug!("Private key rejected by {}", hop);
        }

        if hop.password.is_none() && hop.private_key.is_none() {
            return Err(auth_failed("no password or private key configured".into()));
        }
        Err(auth_failed("Authentication rejected by server".into()))
    }

    fn parse_key(hop: &Hop) -> Result<Option<PrivateKey>, SshError> {
        hop.private_key
            .as_ref()
            .map(|pem| load_private_key(pem.expose(), &hop.host))
            .transpose()
    }

    fn into_transport(
        &self,
        handle: Handle<ClientHandler>,
        endpoint: String,
        via: Option<TransportHandle>,
    ) -> TransportHandle {
        let id = uuid::Uuid::new_v4().to_string();
        let controller = spawn_handle_owner_task(handle, id.clone());
        Arc::new(RusshTransport::new(
            id,
            endpoint,
            controller,
            self.connect_timeout,
            via,
        ))
    }
}

#[async_trait]
impl Connector for RusshConnector {
    fn validate(&self, hop: &Hop) -> Result<(), SshError> {
        Self::parse_key(hop).map(|_| ())
    }

    async fn connect(&self, hop: &Hop) -> Result<TransportHandle, SshError> {
        // Bad key material fails before any network traffic
        let key = Self::parse_key(hop)?;
        let address = hop.address();

        info!("Connecting to SSH server at {}", address);

        let connection_failed = |reason: String| SshError::ConnectionFailed {
            host: hop.host.clone(),
            port: hop.port,
            reason,
        };

        let handle = tokio::time::timeout(self.connect_timeout, async {
            let socket_addr = tokio::net::lookup_host(address.as_str())
                .await
                .map_err(|e| connection_failed(format!("Failed to resolve address: {}", e)))?
                .next()
                .ok_or_else(|| connection_failed("No address found".to_string()))?;

            let mut handle = client::connect(Self::ssh_config(), socket_addr, self.handler_for(hop))
                .await
                .map_err(|e| match e {
                    rejected @ SshError::ConnectionFailed { .. } => rejected,
                    other => connection_failed(other.to_string()),
                })?;

            debug!("SSH handshake with {} completed", address);

            Self::authenticate(&mut handle, hop, key).await?;
            Ok::<_, SshError>(handle)
        })
        .await
        .map_err(|_| SshError::Timeout(format!("Connection to {} timed out", address)))??;

        Ok(self.into_transport(handle, address, None))
    }

    async fn connect_over(
        &self,
        via: TransportHandle,
        stream: TunnelStream,
        hop: &Hop,
    ) -> Result<TransportHandle, SshError> {
        let key = Self::parse_key(hop)?;
        let endpoint = format!("{}/{}", via.remote_endpoint(), hop.address());

        info!("Connecting via stream to {} (SSH-over-SSH)", endpoint);

        let handle = tokio::time::timeout(self.connect_timeout, async {
            let mut handle =
                client::connect_stream(Self::ssh_config(), stream, self.handler_for(hop))
                    .await
                    .map_err(|e| SshError::ChainedDialFailed {
                        via: via.remote_endpoint().to_string(),
                        host: hop.host.clone(),
                        port: hop.port,
                        reason: e.to_string(),
                    })?;

            debug!("SSH handshake via stream completed");

            Self::authenticate(&mut handle, hop, key).await?;
            Ok::<_, SshError>(handle)
        })
        .await
        .map_err(|_| SshError::Timeout(format!("Connection to {} via stream timed out", endpoint)))??;

        Ok(self.into_transport(handle, endpoint, Some(via)))
    }
}

/// An authenticated russh connection
///
/// Holds the transport it tunnels through, so a cached chain stays up for
/// as long as its last hop is referenced.
pub struct RusshTransport {
    id: String,
    endpoint: String,
    controller: HandleController,
    /// Bound on opening a direct-tcpip tunnel to the next hop
    dial_timeout: Duration,
    _via: Option<TransportHandle>,
}

impl RusshTransport {
    fn new(
        id: String,
        endpoint: String,
        controller: HandleController,
        dial_timeout: Duration,
        via: Option<TransportHandle>,
    ) -> Self {
        Self {
            id,
            endpoint,
            controller,
            dial_timeout,
            _via: via,
        }
    }
}

#[async_trait]
impl Transport for RusshTransport {
    fn id(&self) -> &str {
        &self.id
    }

    fn remote_endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn open_session(&self) -> Result<Channel<Msg>, SshError> {
        self.controller.open_session_channel().await
    }

    async fn dial(&self, host: &str, port: u16) -> Result<TunnelStream, SshError> {
        let dial_failed = |reason: String| SshError::ChainedDialFailed {
            via: self.endpoint.clone(),
            host: host.to_string(),
            port,
            reason,
        };

        let channel = tokio::time::timeout(
            self.dial_timeout,
            self.controller.open_direct_tcpip(host, port),
        )
        .await
        .map_err(|_| dial_failed(format!("timed out after {:?}", self.dial_timeout)))?
        .map_err(|e| dial_failed(e.to_string()))?;
        debug!("Opened direct-tcpip {}:{} via {}", host, port, self.endpoint);
        Ok(Box::new(channel.into_stream()))
    }

    async fn close(&self) {
        if self.controller.is_connected() {
            self.controller.disconnect().await;
        }
    }
}
