//! Startup errors
//!
//! Request handling never fails (every failure becomes an HTTP response), so
//! the only errors that escape are the ones that stop the server from starting.

use std::net::SocketAddr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    /// Port already in use, permission denied, or address not available
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("{0}")]
    InvalidAddress(String),

    /// Serving root missing or unreadable
    #[error("Cannot serve '{path}': {source}")]
    Root {
        path: String,
        source: std::io::Error,
    },

    #[error("Cannot serve '{0}': not a directory")]
    NotADirectory(String),

    #[error("Failed to open log file: {0}")]
    Logger(std::io::Error),

    #[error("Failed to start runtime: {0}")]
    Runtime(std::io::Error),
}
