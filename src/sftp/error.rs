//! SFTP error types

use thiserror::Error;

use crate::ssh::SshError;

/// SFTP-specific errors
#[derive(Debug, Error)]
pub enum SftpError {
    #[error("SFTP subsystem not available: {0}")]
    SubsystemNotAvailable(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Write error: {0}")]
    WriteError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    Ssh(#[from] SshError),
}

impl SftpError {
    /// Classify a russh-sftp error by its status message
    pub(crate) fn from_remote(err: russh_sftp::client::error::Error, path: &str) -> Self {
        classify(&err.to_string(), path)
    }
}

fn classify(message: &str, path: &str) -> SftpError {
    if message.contains("No such file") || message.contains("not found") {
        SftpError::FileNotFound(path.to_string())
    } else if message.contains("Permission denied") {
        SftpError::PermissionDenied(path.to_string())
    } else {
        SftpError::ProtocolError(format!("{}: {}", path, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status_messages() {
        assert!(matches!(
            classify("No such file", "/etc/app.conf"),
            SftpError::FileNotFound(p) if p == "/etc/app.conf"
        ));
        assert!(matches!(
            classify("Permission denied", "/root/x"),
            SftpError::PermissionDenied(_)
        ));
        assert!(matches!(
            classify("Failure", "/tmp/x"),
            SftpError::ProtocolError(m) if m.contains("/tmp/x")
        ));
    }
}
