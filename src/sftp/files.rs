//! Whole-file operations over SFTP
//!
//! Text content round-trips with a single trailing newline: writes append
//! one if missing, reads strip one.

use md5::{Digest, Md5};
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::{FileAttributes, OpenFlags};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::error::SftpError;
use super::path_utils::{parent_remote_path, remote_ancestors};
use crate::ssh::{SshError, TransportHandle};

/// Mode applied when the requested permissions do not parse
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// SFTP client bound to one transport; closed on [`RemoteFiles::close`]
pub struct RemoteFiles {
    sftp: SftpSession,
    endpoint: String,
}

impl RemoteFiles {
    pub async fn open(transport: &TransportHandle) -> Result<Self, SftpError> {
        let sftp = transport.open_file_transfer().await.map_err(|e| match e {
            SshError::ChannelError(msg) => SftpError::SubsystemNotAvailable(msg),
            other => SftpError::Ssh(other),
        })?;
        Ok(Self {
            sftp,
            endpoint: transport.remote_endpoint().to_string(),
        })
    }

    /// Read a text file, stripping one trailing newline
    pub async fn read_file(&self, path: &str) -> Result<String, SftpError> {
        debug!("Reading {} on {}", path, self.endpoint);
        let content = self
            .sftp
            .read(path)
            .await
            .map_err(|e| SftpError::from_remote(e, path))?;
        Ok(strip_trailing_newline(String::from_utf8_lossy(&content).to_string()))
    }

    /// Like [`read_file`](Self::read_file), but a missing file reads as
    /// empty content unless `fail_if_absent` is set
    pub async fn read_file_opt(&self, path: &str, fail_if_absent: bool) -> Result<String, SftpError> {
        match self.read_file(path).await {
            Err(SftpError::FileNotFound(_)) if !fail_if_absent => {
                debug!("{} does not exist on {}, returning empty content", path, self.endpoint);
                Ok(String::new())
            }
            other => other,
        }
    }

    /// Create or overwrite a text file, creating its parent directories
    ///
    /// `permissions` is an octal string such as `"0644"`. Applying it is
    /// best-effort: a failed chmod is logged, not returned.
    pub async fn write_file(
        &self,
        path: &str,
        content: &str,
        permissions: &str,
    ) -> Result<(), SftpError> {
        if let Some(parent) = parent_remote_path(path) {
            self.create_dir_all(&parent).await?;
        }

        let content = ensure_trailing_newline(content);

        let mut file = self
            .sftp
            .open_with_flags(path, OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE)
            .await
            .map_err(|e| SftpError::from_remote(e, path))?;

        file.write_all(content.as_bytes())
            .await
            .map_err(|e| SftpError::WriteError(format!("Failed to write content: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| SftpError::WriteError(format!("Failed to flush file: {}", e)))?;
        file.shutdown()
            .await
            .map_err(|e| SftpError::WriteError(format!("Failed to close file: {}", e)))?;
        drop(file);

        let mode = parse_file_mode(permissions);
        debug!("Attempting to chmod {} to {:o}", path, mode);
        let attrs = FileAttributes {
            permissions: Some(mode),
            ..Default::default()
        };
        if let Err(e) = self.sftp.set_metadata(path, attrs).await {
            warn!("Could not set permissions on {} to {:o}: {}", path, mode, e);
        }

        info!("Wrote {} bytes to {} on {}", content.len(), path, self.endpoint);
        Ok(())
    }

    pub async fn delete_file(&self, path: &str) -> Result<(), SftpError> {
        info!("Deleting {} on {}", path, self.endpoint);
        self.sftp
            .remove_file(path)
            .await
            .map_err(|e| SftpError::from_remote(e, path))
    }

    /// `mkdir -p`
    async fn create_dir_all(&self, dir: &str) -> Result<(), SftpError> {
        for ancestor in remote_ancestors(dir) {
            if self.sftp.try_exists(&ancestor).await.unwrap_or(false) {
                continue;
            }
            debug!("Creating directory {}", ancestor);
            if let Err(e) = self.sftp.create_dir(&ancestor).await {
                // Another writer may have created it in between
                if !self.sftp.try_exists(&ancestor).await.unwrap_or(false) {
                    return Err(SftpError::from_remote(e, &ancestor));
                }
            }
        }
        Ok(())
    }

    pub async fn close(self) {
        if let Err(e) = self.sftp.close().await {
            debug!("Error closing SFTP session on {}: {}", self.endpoint, e);
        }
    }
}

/// Parse an octal mode string, falling back to `0644`
pub fn parse_file_mode(mode: &str) -> u32 {
    let digits = mode.trim();
    let digits = digits.strip_prefix("0o").unwrap_or(digits);
    u32::from_str_radix(digits, 8).unwrap_or(DEFAULT_FILE_MODE)
}

/// Stable identifier for a remote file path
pub fn file_id(path: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(path.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn strip_trailing_newline(mut content: String) -> String {
    if content.ends_with('\n') {
        content.pop();
    }
    content
}

fn ensure_trailing_newline(content: &str) -> String {
    if content.is_empty() || content.ends_with('\n') {
        content.to_string()
    } else {
        format!("{}\n", content)
    }
}
