//! Configuration Types
//!
//! JSON shapes of the provider (default connection) and of per-operation
//! connection overrides. Field names are the external configuration surface.

use std::time::Duration;

use serde::Deserialize;

use crate::ssh::{BastionSpec, ConnectionRequest, ConnectionSpec, RusshConnector, Secret};

/// Default TCP connect plus handshake timeout, seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

/// Nested `bastion` block; `host` and `user` are required
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BastionBlock {
    pub host: String,
    pub user: String,
    #[serde(default)]
    pub password: Option<Secret>,
    #[serde(default)]
    pub private_key: Option<Secret>,
    #[serde(default)]
    pub port: Option<u16>,
}

impl BastionBlock {
    pub fn to_spec(&self) -> BastionSpec {
        BastionSpec {
            host: self.host.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            private_key: self.private_key.clone(),
            port: self.port,
        }
    }
}

/// Provider-level settings: the default connection and transport policy
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub host: String,
    pub user: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub password: Option<Secret>,
    #[serde(default)]
    pub private_key: Option<Secret>,
    /// Read into `private_key` when the config is loaded
    #[serde(default)]
    pub private_key_path: Option<String>,
    #[serde(default)]
    pub bastion: Option<BastionBlock>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// `SHA256:` host key fingerprints; empty accepts any host key
    #[serde(default)]
    pub trusted_host_keys: Vec<String>,
}

impl ProviderConfig {
    pub fn default_spec(&self) -> ConnectionSpec {
        ConnectionSpec {
            host: Some(self.host.clone()),
            user: Some(self.user.clone()),
            password: self.password.clone(),
            private_key: self.private_key.clone(),
            port: self.port,
        }
    }

    pub fn default_bastion(&self) -> Option<BastionSpec> {
        self.bastion.as_ref().map(BastionBlock::to_spec)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn connector(&self) -> RusshConnector {
        RusshConnector::new(self.connect_timeout(), self.trusted_host_keys.clone())
    }
}

/// Per-operation connection override; every field is optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionOverride {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<Secret>,
    #[serde(default)]
    pub private_key: Option<Secret>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub use_provider_as_bastion: bool,
    #[serde(default)]
    pub bastion: Option<BastionBlock>,
}

impl ConnectionOverride {
    pub fn into_request(self) -> ConnectionRequest {
        let target = ConnectionSpec {
            host: self.host,
            user: self.user,
            password: self.password,
            private_key: self.private_key,
            port: self.port,
        };

        let mut request = ConnectionRequest::for_target(target);
        if self.use_provider_as_bastion {
            request = request.via_default();
        }
        if let Some(bastion) = self.bastion {
            request = request.with_bastion(bastion.to_spec());
        }
        request
    }
}
