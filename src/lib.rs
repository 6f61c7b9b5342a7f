//! OxideLink - shared SSH connections with bastion chaining
//!
//! Built on russh. [`ssh::SshManager`] hands out cached transports keyed by
//! connection fingerprint; [`exec`] and [`sftp`] run commands and manage
//! remote files over them.

pub mod config;
pub mod exec;
pub mod sftp;
pub mod ssh;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging
///
/// `RUST_LOG` overrides the default `info` filter. Logs go to stderr so
/// command output on stdout stays clean.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
