//! No-cache static file server
//!
//! Serves a directory over HTTP/1.1 and marks every response, whatever its
//! status, with `Cache-Control: no-cache, no-store, must-revalidate`,
//! `Pragma: no-cache` and `Expires: 0`.

pub mod config;
pub mod error;
pub mod handler;
pub mod http;
pub mod logger;
pub mod server;

pub use error::ServerError;
