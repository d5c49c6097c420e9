//! HTTP protocol layer module
//!
//! Provides HTTP protocol-related base functionality, decoupled from request routing.

pub mod cache;
pub mod date;
pub mod mime;
pub mod range;
pub mod response;

// Re-export commonly used types
pub use cache::apply_no_cache_headers;
pub use range::parse_range_header;
pub use response::{
    build_304_response, build_400_response, build_403_response, build_404_response,
    build_405_response, build_416_response, build_500_response, build_options_response,
    build_redirect_response,
};
