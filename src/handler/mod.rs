//! Request handler module
//!
//! Request dispatch, static file serving and directory listings, plus the
//! `NoCache` decorator every response passes through.

pub mod listing;
pub mod no_cache;
pub mod router;
pub mod static_files;

// Re-export main entry points
pub use no_cache::NoCache;
pub use router::handle_request;
