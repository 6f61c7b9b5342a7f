//! SSH module - shared, cached SSH transports
//!
//! This module provides connection management on top of the russh library.
//!
//! # Features
//! - Connection cache keyed by a secret-free fingerprint
//! - Single-flight creation per fingerprint
//! - Bastion (jump host) routes, including the default connection as first hop
//! - SSH-over-SSH through direct-tcpip channels

mod client;
mod config;
mod error;
mod fingerprint;
mod handle_owner;
mod manager;
mod transport;

pub use client::{
    host_key_fingerprint, load_private_key, ClientHandler, RusshConnector, RusshTransport,
    DEFAULT_CONNECT_TIMEOUT,
};
pub use config::{BastionSpec, ConnectionRequest, ConnectionSpec, Secret, DEFAULT_SSH_PORT};
pub use error::{HopKind, SshError};
pub use fingerprint::Fingerprint;
pub use handle_owner::{spawn_handle_owner_task, HandleCommand, HandleController};
pub use manager::{AcquiredClient, SshManager, MAX_ROUTE_DEPTH};
pub use transport::{
    join_host_port, AsyncStream, Connector, Hop, Transport, TransportHandle, TunnelStream,
};
