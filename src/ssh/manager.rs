//! SSH Connection Manager
//!
//! Hands out shared, cached transports for [`ConnectionRequest`]s.
//!
//! Each fingerprint has its own async mutex, created at most once. The
//! creating caller holds it across the whole dial; concurrent callers for
//! the same fingerprint wait on it and then read the cache. A failed attempt
//! leaves the slot empty, so the next call retries from scratch.
//!
//! Routes are resolved recursively through [`SshManager::get_client`], so
//! every intermediate hop (default connection, bastion) is cached and
//! shared as well:
//!
//! 1. `use_default_as_bastion`: reach the default connection, then resolve
//!    the request again through it with the flag cleared.
//! 2. `bastion`: reach the bastion (through the current `chain_from`, if
//!    any), then resolve again through it with the bastion cleared.
//! 3. `chain_from`: validate the target hop, then dial it through the given
//!    transport.
//! 4. no target host: fall back to the default connection.
//! 5. otherwise: dial the target directly.

use std::sync::Arc;

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::client::RusshConnector;
use super::config::{BastionSpec, ConnectionRequest, ConnectionSpec};
use super::error::{HopKind, SshError};
use super::fingerprint::Fingerprint;
use super::transport::{Connector, Hop, TransportHandle};

/// Upper bound on recursive hops of one route
pub const MAX_ROUTE_DEPTH: usize = 8;

/// Result of [`SshManager::get_client`]
#[derive(Clone)]
pub struct AcquiredClient {
    pub handle: TransportHandle,
    /// `false` for cache hits and for the shared default connection.
    /// Callers must never close the handle either way; the manager owns it.
    pub newly_created: bool,
}

impl std::fmt::Debug for AcquiredClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquiredClient")
            .field("endpoint", &self.handle.remote_endpoint())
            .field("newly_created", &self.newly_created)
            .finish()
    }
}

enum Resolved {
    /// A transport owned by this request's slot
    Route(AcquiredClient),
    /// The default connection, owned by its own slot
    Fallback(TransportHandle),
}

pub struct SshManager<C: Connector = RusshConnector> {
    default: ConnectionSpec,
    default_bastion: Option<BastionSpec>,
    connector: C,
    locks: DashMap<Fingerprint, Arc<Mutex<()>>>,
    cache: DashMap<Fingerprint, TransportHandle>,
}

impl<C: Connector> SshManager<C> {
    pub fn new(
        default: ConnectionSpec,
        default_bastion: Option<BastionSpec>,
        connector: C,
    ) -> Result<Self, SshError> {
        // A default without a host would resolve to itself through the fallback rule
        if default.host.is_none() {
            return Err(SshError::InvalidConfig(
                "default connection requires a host".into(),
            ));
        }
        if default.user.is_none() {
            return Err(SshError::InvalidConfig(
                "default connection requires a user".into(),
            ));
        }

        Ok(Self {
            default,
            default_bastion,
            connector,
            locks: DashMap::new(),
            cache: DashMap::new(),
        })
    }

    /// Eagerly dial the default connection to validate its credentials
    pub async fn connect_default(&self) -> Result<TransportHandle, SshError> {
        let handle = self.default_client().await?;
        info!("Default connection ready: {}", handle.remote_endpoint());
        Ok(handle)
    }

    /// The shared default connection, dialed on first use
    pub async fn default_client(&self) -> Result<TransportHandle, SshError> {
        Ok(self.get_client(self.default_request()).await?.handle)
    }

    /// Get a transport satisfying `request`, creating it at most once
    pub async fn get_client(&self, request: ConnectionRequest) -> Result<AcquiredClient, SshError> {
        self.get_client_at(request, 0).await
    }

    /// Snapshot of the cache as `(fingerprint, remote endpoint)` pairs
    pub fn cached_connections(&self) -> Vec<(Fingerprint, String)> {
        let mut entries: Vec<(Fingerprint, String)> = self
            .cache
            .iter()
            .map(|e| (e.key().clone(), e.value().remote_endpoint().to_string()))
            .collect();
        entries.sort();
        entries
    }

    /// Close every cached transport once and clear the cache
    ///
    /// Only for process teardown; handles already handed out become dead.
    pub async fn shutdown(&self) {
        let mut distinct: Vec<TransportHandle> = Vec::new();
        for entry in self.cache.iter() {
            if !distinct.iter().any(|h| Arc::ptr_eq(h, entry.value())) {
                distinct.push(Arc::clone(entry.value()));
            }
        }
        self.cache.clear();

        // Last hop first, so tunnels close before the transports carrying them
        distinct.sort_by_key(|h| std::cmp::Reverse(h.remote_endpoint().matches('/').count()));

        info!("Closing {} SSH connections", distinct.len());
        for handle in distinct {
            debug!("Closing {} ({})", handle.remote_endpoint(), handle.id());
            handle.close().await;
        }
    }

    fn default_request(&self) -> ConnectionRequest {
        ConnectionRequest {
            target: self.default.clone(),
            use_default_as_bastion: false,
            bastion: self.default_bastion.clone(),
            chain_from: None,
        }
    }

    fn default_host(&self) -> String {
        self.default.host.clone().unwrap_or_default()
    }

    /// Mutex for `fingerprint`; concurrent first callers get the same instance
    fn lock_for(&self, fingerprint: &Fingerprint) -> Arc<Mutex<()>> {
        self.locks
            .entry(fingerprint.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    fn get_client_at(
        &self,
        request: ConnectionRequest,
        depth: usize,
    ) -> BoxFuture<'_, Result<AcquiredClient, SshError>> {
        Box::pin(async move {
            if depth > MAX_ROUTE_DEPTH {
                return Err(SshError::RouteTooDeep {
                    depth: MAX_ROUTE_DEPTH,
                });
            }

            let fingerprint = Fingerprint::of(&request);
            let lock = self.lock_for(&fingerprint);
            let _guard = lock.lock().await;

            if let Some(handle) = self.cache.get(&fingerprint).map(|e| Arc::clone(e.value())) {
                debug!("Reusing cached connection {}", handle.remote_endpoint());
                return Ok(AcquiredClient {
                    handle,
                    newly_created: false,
                });
            }

            debug!("No cached connection for {}", fingerprint);

            match self.resolve(request, depth).await {
                Ok(Resolved::Route(acquired)) => {
                    self.cache.insert(fingerprint, Arc::clone(&acquired.handle));
                    Ok(acquired)
                }
                Ok(Resolved::Fallback(handle)) => Ok(AcquiredClient {
                    handle,
                    newly_created: false,
                }),
                Err(e) => {
                    warn!("Connection attempt failed: {}", e);
                    Err(e)
                }
            }
        })
    }

    async fn resolve(&self, request: ConnectionRequest, depth: usize) -> Result<Resolved, SshError> {
        // Rule 1
        if request.use_default_as_bastion {
            let default = self
                .get_client_at(self.default_request(), depth + 1)
                .await
                .map_err(|e| e.at_hop(HopKind::DefaultAsBastion, self.default_host()))?;

            let next = ConnectionRequest {
                use_default_as_bastion: false,
                ..request
            }
            .chained(default.handle);
            return self.get_client_at(next, depth + 1).await.map(Resolved::Route);
        }

        // Rule 2
        if let Some(bastion) = request.bastion.clone() {
            let bastion_request = ConnectionRequest {
                target: bastion.as_connection_spec(),
                use_default_as_bastion: false,
                bastion: None,
                chain_from: request.chain_from.clone(),
            };
            let via = self
                .get_client_at(bastion_request, depth + 1)
                .await
                .map_err(|e| e.at_hop(HopKind::Bastion, bastion.host.clone()))?;

            let next = ConnectionRequest {
                bastion: None,
                ..request
            }
            .chained(via.handle);
            return self.get_client_at(next, depth + 1).await.map(Resolved::Route);
        }

        // Rule 3
        if let Some(via) = request.chain_from.clone() {
            let hop = Hop::from_spec(&request.target.inherit_from(&self.default))?;
            info!("Dialing {} through {}", hop, via.remote_endpoint());

            // No tunnel is opened for a hop that cannot authenticate
            self.connector.validate(&hop)?;
            let stream = via.dial(&hop.host, hop.port).await?;
            let handle = self.connector.connect_over(via, stream, &hop).await?;
            return Ok(Resolved::Route(AcquiredClient {
                handle,
                newly_created: true,
            }));
        }

        // Rule 4
        if request.target.host.is_none() {
            let default = self
                .get_client_at(self.default_request(), depth + 1)
                .await
                .map_err(|e| e.at_hop(HopKind::Default, self.default_host()))?;
            return Ok(Resolved::Fallback(default.handle));
        }

        // Rule 5
        let hop = Hop::from_spec(&request.target.inherit_from(&self.default))?;
        info!("Dialing {} directly", hop);
        let handle = self.connector.connect(&hop).await?;
        Ok(Resolved::Route(AcquiredClient {
            handle,
            newly_created: true,
        }))
    }
}
