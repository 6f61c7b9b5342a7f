//! Configuration Storage
//!
//! Loads provider and connection override JSON files from disk.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tokio::fs;
use tracing::debug;

use super::types::{ConnectionOverride, ProviderConfig};
use crate::ssh::Secret;

/// Configuration storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Expand a leading `~` to the home directory
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    let content = fs::read_to_string(path).await.map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| StorageError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Load the provider config, reading `private_key_path` into `private_key`
pub async fn load_provider_config(path: &Path) -> Result<ProviderConfig, StorageError> {
    let mut config: ProviderConfig = read_json(path).await?;

    if let Some(key_path) = config.private_key_path.take() {
        if config.private_key.is_some() {
            return Err(StorageError::Invalid(
                "private_key and private_key_path are mutually exclusive".into(),
            ));
        }
        let key_path = expand_tilde(&key_path);
        debug!("Loading private key from {}", key_path.display());
        let pem = fs::read_to_string(&key_path)
            .await
            .map_err(|source| StorageError::Io {
                path: key_path.clone(),
                source,
            })?;
        config.private_key = Some(Secret::new(pem));
    }

    Ok(config)
}

pub async fn load_connection_override(path: &Path) -> Result<ConnectionOverride, StorageError> {
    read_json(path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_provider_with_key_path() {
        let temp = tempdir().unwrap();
        let key_path = temp.path().join("id_ed25519");
        fs::write(&key_path, "PEM DATA").await.unwrap();

        let config_path = temp.path().join("provider.json");
        let json = serde_json::json!({
            "host": "gateway",
            "user": "root",
            "private_key_path": key_path.to_string_lossy(),
            "connect_timeout_secs": 5,
        });
        fs::write(&config_path, json.to_string()).await.unwrap();

        let config = load_provider_config(&config_path).await.unwrap();
        assert_eq!(config.private_key.as_ref().map(Secret::expose), Some("PEM DATA"));
        assert!(config.private_key_path.is_none());
        assert_eq!(config.connect_timeout_secs, 5);
    }

    #[tokio::test]
    async fn test_key_and_key_path_conflict() {
        let temp = tempdir().unwrap();
        let config_path = temp.path().join("provider.json");
        fs::write(
            &config_path,
            r#"{"host": "gateway", "user": "root", "private_key": "K", "private_key_path": "/k"}"#,
        )
        .await
        .unwrap();

        assert!(matches!(
            load_provider_config(&config_path).await,
            Err(StorageError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("missing.json");
        assert!(matches!(
            load_connection_override(&path).await,
            Err(StorageError::Io { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_invalid_json() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("override.json");
        fs::write(&path, "{ not json").await.unwrap();
        assert!(matches!(
            load_connection_override(&path).await,
            Err(StorageError::Json { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_override() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("override.json");
        fs::write(&path, r#"{"host": "db", "use_provider_as_bastion": true}"#)
            .await
            .unwrap();

        let connection = load_connection_override(&path).await.unwrap();
        assert_eq!(connection.host.as_deref(), Some("db"));
        assert!(connection.use_provider_as_bastion);
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde("/etc/key"), PathBuf::from("/etc/key"));
        assert_eq!(expand_tilde("relative/key"), PathBuf::from("relative/key"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/.ssh/id"), home.join(".ssh/id"));
            assert_eq!(expand_tilde("~"), home);
        }
    }
}
