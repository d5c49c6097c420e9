//! HTTP cache control module
//!
//! Every response leaves the server marked as non-cacheable. Validators
//! (`ETag`, `Last-Modified`) are still produced so that clients revalidating
//! on each request can get a cheap 304.

use chrono::{DateTime, Utc};
use hyper::header::{HeaderMap, HeaderValue, CACHE_CONTROL, EXPIRES, PRAGMA};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::SystemTime;

use super::date::parse_http_date;

pub const NO_CACHE_CONTROL: &str = "no-cache, no-store, must-revalidate";
pub const NO_CACHE_PRAGMA: &str = "no-cache";
pub const NO_CACHE_EXPIRES: &str = "0";

/// Insert the three cache-defeating headers, replacing any existing values
pub fn apply_no_cache_headers(headers: &mut HeaderMap) {
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(NO_CACHE_CONTROL));
    headers.insert(PRAGMA, HeaderValue::from_static(NO_CACHE_PRAGMA));
    headers.insert(EXPIRES, HeaderValue::from_static(NO_CACHE_EXPIRES));
}

/// Generate `ETag` using fast hashing
///
/// # Returns
/// Quoted `ETag` string, e.g., `"abc123def"`
pub fn generate_etag(content: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    let v = hasher.finish();
    format!("\"{v:x}\"")
}

/// Check if client's `If-None-Match` header matches the server's `ETag`
///
/// Supports:
/// - Single `ETag`: `"abc123"`
/// - Multiple `ETags`: `"abc123", "def456"`
/// - Weak comparison: `W/"abc123"`
/// - Wildcard: `*`
pub fn check_etag_match(if_none_match: Option<&str>, etag: &str) -> bool {
    if_none_match.is_some_and(|client_etag| {
        client_etag.split(',').map(str::trim).any(|e| {
            e == "*" || e.strip_prefix("W/").unwrap_or(e) == etag
        })
    })
}

/// Decide whether a conditional GET/HEAD can be answered with 304
///
/// `If-None-Match` takes precedence; `If-Modified-Since` is only consulted when
/// it is absent. An unparseable date is ignored.
pub fn is_not_modified(
    if_none_match: Option<&str>,
    if_modified_since: Option<&str>,
    etag: &str,
    last_modified: Option<SystemTime>,
) -> bool {
    if if_none_match.is_some() {
        return check_etag_match(if_none_match, etag);
    }

    let since = if_modified_since.and_then(parse_http_date);
    match (since, last_modified) {
        // HTTP dates carry whole seconds only
        (Some(since), Some(modified)) => {
            DateTime::<Utc>::from(modified).timestamp() <= since.timestamp()
        }
        _ => false,
    }
}
