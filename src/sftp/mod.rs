//! SFTP file management module
//!
//! Reads, writes and deletes whole remote files over a cached transport.

pub mod error;
pub mod files;
pub mod path_utils;

pub use error::SftpError;
pub use files::{file_id, parse_file_mode, RemoteFiles, DEFAULT_FILE_MODE};
