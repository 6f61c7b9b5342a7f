//! Configuration Management Module
//!
//! Provider settings (the default connection) and per-operation connection
//! overrides, loaded from JSON.

pub mod storage;
pub mod types;

pub use storage::{expand_tilde, load_connection_override, load_provider_config, StorageError};
pub use types::{BastionBlock, ConnectionOverride, ProviderConfig, DEFAULT_CONNECT_TIMEOUT_SECS};
