//! Request routing dispatch module
//!
//! Entry point for HTTP request processing, responsible for method validation,
//! request-target decoding, and dispatching to the static file handler.

use crate::config::AppState;
use crate::handler::static_files;
use crate::http;
use crate::logger::{self, AccessLogEntry};
use http_body_util::Full;
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderValue, SERVER};
use hyper::http::request::Parts;
use hyper::{Method, Request, Response, Version};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// Request context encapsulating information needed for request processing
pub struct RequestContext<'a> {
    /// Percent-decoded path
    pub path: String,
    /// Path exactly as sent, used when building redirects
    pub raw_path: &'a str,
    pub query: Option<&'a str>,
    pub is_head: bool,
    pub if_none_match: Option<&'a str>,
    pub if_modified_since: Option<&'a str>,
    pub range_header: Option<&'a str>,
}

/// Main entry point for HTTP request handling
///
/// Never fails: every problem is reported to the client as an HTTP status.
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
    peer_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let started = Instant::now();
    // GET and HEAD carry no body worth reading
    let (parts, _) = req.into_parts();
    let mut response = route_request(&parts, &state).await;

    if let Ok(server) = HeaderValue::from_str(&state.config.http.server_name) {
        response.headers_mut().insert(SERVER, server);
    }

    if state.access_log {
        log_access(&parts, &response, &state, peer_addr, started);
    }
    Ok(response)
}

async fn route_request(req: &Parts, state: &AppState) -> Response<Full<Bytes>> {
    let method = &req.method;
    let uri = &req.uri;

    // 1. Check HTTP method
    if let Some(resp) = check_http_method(method, state.config.http.enable_cors) {
        return resp;
    }

    // 2. Decode the request target
    let raw_path = uri.path();
    let path = match decode_path(raw_path) {
        Ok(path) => path,
        Err(reason) => {
            logger::log_warning(&format!("Bad request target '{uri}': {reason}"));
            return http::build_400_response(reason);
        }
    };

    // 3. Extract headers for conditional and range requests
    let header = |name: &str| req.headers.get(name).and_then(|v| v.to_str().ok());
    let ctx = RequestContext {
        path,
        raw_path,
        query: uri.query(),
        is_head: *method == Method::HEAD,
        if_none_match: header("if-none-match"),
        if_modified_since: header("if-modified-since"),
        range_header: header("range"),
    };

    // 4. Serve from the root
    static_files::serve(&ctx, state).await
}

/// Check HTTP method and return appropriate response for non-GET/HEAD methods
fn check_http_method(method: &Method, enable_cors: bool) -> Option<Response<Full<Bytes>>> {
    match *method {
        Method::GET | Method::HEAD => None,
        Method::OPTIONS => Some(http::build_options_response(enable_cors)),
        _ => {
            logger::log_warning(&format!("Method not allowed: {method}"));
            Some(http::build_405_response())
        }
    }
}

/// Percent-decode an origin-form path
fn decode_path(raw_path: &str) -> Result<String, &'static str> {
    if !raw_path.starts_with('/') {
        return Err("Request target must be an absolute path");
    }

    let decoded = urlencoding::decode(raw_path).map_err(|_| "Path is not valid UTF-8")?;
    if decoded.contains('\0') {
        return Err("Path contains a NUL byte");
    }
    Ok(decoded.into_owned())
}

fn log_access(
    req: &Parts,
    response: &Response<Full<Bytes>>,
    state: &AppState,
    peer_addr: SocketAddr,
    started: Instant,
) {
    let header = |name: &str| {
        req.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
    };

    let mut entry = AccessLogEntry::new(
        peer_addr.ip().to_string(),
        req.method.to_string(),
        req.uri.path().to_string(),
    );
    entry.query = req.uri.query().map(ToString::to_string);
    entry.http_version = version_label(req.version).to_string();
    entry.status = response.status().as_u16();
    entry.body_bytes = response
        .body()
        .size_hint()
        .exact()
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(0);
    entry.referer = header("referer");
    entry.user_agent = header("user-agent");
    entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);

    logger::log_access(&entry, &state.config.logging.access_log_format);
}

fn version_label(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_2 => "2",
        Version::HTTP_3 => "3",
        _ => "1.1",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use http_body_util::BodyExt;
    use hyper::StatusCode;

    fn test_state(root: &std::path::Path) -> Arc<AppState> {
        let mut config = Config::from_defaults().unwrap();
        config.serve.root = root.display().to_string();
        config.logging.access_log = false;
        Arc::new(AppState::new(config).unwrap())
    }

    async fn request(state: &Arc<AppState>, method: Method, uri: &str) -> Response<Full<Bytes>> {
        let req = Request::builder().method(method).uri(uri).body(()).unwrap();
        let peer = SocketAddr::from(([127, 0, 0, 1], 40000));
        handle_request(req, Arc::clone(state), peer).await.unwrap()
    }

    #[test]
    fn test_decode_path() {
        assert_eq!(decode_path("/a%20b/c.txt").unwrap(), "/a b/c.txt");
        assert_eq!(decode_path("/%2e%2e/etc").unwrap(), "/../etc");
        assert!(decode_path("/%ff%fe").is_err());
        assert!(decode_path("/a%00b").is_err());
        assert!(decode_path("*").is_err());
    }

    #[tokio::test]
    async fn test_methods() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());

        let response = request(&state, Method::POST, "/").await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        let response = request(&state, Method::DELETE, "/").await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        let response = request(&state, Method::OPTIONS, "*").await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_serves_file_with_server_header() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "hi there").unwrap();
        let state = test_state(dir.path());

        let response = request(&state, Method::GET, "/hello.txt?x=1").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[SERVER]
            .to_str()
            .unwrap()
            .starts_with("nocache-server/"));
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, "hi there");
    }

    #[tokio::test]
    async fn test_invalid_encoding_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());

        let response = request(&state, Method::GET, "/%C3%28").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
