//! SSH Configuration
//!
//! Connection data model shared by the fingerprint builder, the route
//! resolver and the config layer. Every field of a [`ConnectionSpec`] is
//! optional: at the request level an unset field means "no override".

use std::fmt;

use serde::{Deserialize, Deserializer};
use zeroize::Zeroizing;

use super::transport::TransportHandle;

/// Port used whenever a hop does not name one
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Password or private key material
///
/// Wiped from memory on drop. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(Zeroizing<String>);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Secret::new(value)
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Secret::new(value)
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Secret::new)
    }
}

/// Connection parameters for a single hop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionSpec {
    pub host: Option<String>,
    pub user: Option<String>,
    pub password: Option<Secret>,
    pub private_key: Option<Secret>,
    pub port: Option<u16>,
}

impl ConnectionSpec {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
            user: Some(user.into()),
            ..Default::default()
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn password(mut self, password: impl Into<Secret>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn private_key(mut self, key: impl Into<Secret>) -> Self {
        self.private_key = Some(key.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_SSH_PORT)
    }

    pub fn has_credentials(&self) -> bool {
        self.password.is_some() || self.private_key.is_some()
    }

    /// Fill unset leaf fields from the default connection.
    ///
    /// `user` is inherited on its own. Credentials are inherited as a pair,
    /// and only when neither a password nor a key was supplied. `host` and
    /// `port` are never inherited.
    pub fn inherit_from(&self, default: &ConnectionSpec) -> ConnectionSpec {
        let mut merged = self.clone();
        if merged.user.is_none() {
            merged.user = default.user.clone();
        }
        if !merged.has_credentials() {
            merged.password = default.password.clone();
            merged.private_key = default.private_key.clone();
        }
        merged
    }
}

/// Jump host configuration; host and user are mandatory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BastionSpec {
    pub host: String,
    pub user: String,
    pub password: Option<Secret>,
    pub private_key: Option<Secret>,
    pub port: Option<u16>,
}

impl BastionSpec {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            password: None,
            private_key: None,
            port: None,
        }
    }

    pub fn password(mut self, password: impl Into<Secret>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn private_key(mut self, key: impl Into<Secret>) -> Self {
        self.private_key = Some(key.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_SSH_PORT)
    }

    pub fn as_connection_spec(&self) -> ConnectionSpec {
        ConnectionSpec {
            host: Some(self.host.clone()),
            user: Some(self.user.clone()),
            password: self.password.clone(),
            private_key: self.private_key.clone(),
            port: self.port,
        }
    }
}

/// A consumer's request for "a connection matching this route"
#[derive(Clone, Default)]
pub struct ConnectionRequest {
    pub target: ConnectionSpec,
    pub use_default_as_bastion: bool,
    pub bastion: Option<BastionSpec>,
    /// Only set by the resolver when dialing through an open transport
    pub(crate) chain_from: Option<TransportHandle>,
}

impl ConnectionRequest {
    /// A request with no overrides; resolves to the default connection
    pub fn default_override() -> Self {
        Self::default()
    }

    pub fn for_target(target: ConnectionSpec) -> Self {
        Self {
            target,
            ..Default::default()
        }
    }

    pub fn with_bastion(mut self, bastion: BastionSpec) -> Self {
        self.bastion = Some(bastion);
        self
    }

    pub fn via_default(mut self) -> Self {
        self.use_default_as_bastion = true;
        self
    }

    pub fn chain_from(&self) -> Option<&TransportHandle> {
        self.chain_from.as_ref()
    }

    pub(crate) fn chained(mut self, via: TransportHandle) -> Self {
        self.chain_from = Some(via);
        self
    }
}

impl fmt::Debug for ConnectionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRequest")
            .field("target", &self.target)
            .field("use_default_as_bastion", &self.use_default_as_bastion)
            .field("bastion", &self.bastion)
            .field(
                "chain_from",
                &self.chain_from.as_ref().map(|t| t.remote_endpoint().to_string()),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_debug_is_redacted() {
        let spec = ConnectionSpec::new("db.internal", "deploy").password("hunter2");
        let rendered = format!("{:?}", spec);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("Secret(***)"));
    }

    #[test]
    fn test_effective_port_defaults_to_22() {
        assert_eq!(ConnectionSpec::default().effective_port(), 22);
        assert_eq!(ConnectionSpec::default().port(2222).effective_port(), 2222);
        assert_eq!(BastionSpec::new("jump", "ops").effective_port(), 22);
    }

    #[test]
    fn test_inherit_user_and_credentials_pair() {
        let default = ConnectionSpec::new("gateway", "root")
            .password("default-pass")
            .private_key("default-key");

        let bare = ConnectionSpec::default().host("app1");
        let merged = bare.inherit_from(&default);
        assert_eq!(merged.host.as_deref(), Some("app1"));
        assert_eq!(merged.user.as_deref(), Some("root"));
        assert_eq!(merged.password, default.password);
        assert_eq!(merged.private_key, default.private_key);
        assert_eq!(merged.port, None);

        // Any supplied credential blocks inheritance of both
        let own = ConnectionSpec::default()
            .host("app2")
            .user("svc")
            .password("own-pass");
        let merged = own.inherit_from(&default);
        assert_eq!(merged.user.as_deref(), Some("svc"));
        assert_eq!(merged.password.as_ref().map(Secret::expose), Some("own-pass"));
        assert!(merged.private_key.is_none());
    }

    #[test]
    fn test_bastion_as_connection_spec() {
        let bastion = BastionSpec::new("jump", "ops").port(2200).password("pw");
        let spec = bastion.as_connection_spec();
        assert_eq!(spec.host.as_deref(), Some("jump"));
        assert_eq!(spec.user.as_deref(), Some("ops"));
        assert_eq!(spec.port, Some(2200));
        assert!(spec.password.is_some());
    }

    #[test]
    fn test_secret_deserializes_from_string() {
        let secret: Secret = serde_json::from_str("\"s3cret\"").unwrap();
        assert_eq!(secret.expose(), "s3cret");
    }
}
