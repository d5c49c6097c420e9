//! HTTP response building module
//!
//! Builders for the responses the file server produces. None of them set
//! caching headers; those are added to every response by `handler::no_cache`.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{
    ACCEPT_RANGES, ALLOW, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, ETAG, LAST_MODIFIED,
    LOCATION,
};
use hyper::http::response::Builder;
use hyper::{Response, StatusCode};

use super::range::ByteRange;

const ALLOWED_METHODS: &str = "GET, HEAD, OPTIONS";

/// Validators and type of a file being served
pub struct FileHeaders<'a> {
    pub content_type: &'a str,
    pub etag: &'a str,
    pub last_modified: Option<&'a str>,
}

impl FileHeaders<'_> {
    fn apply(&self, mut builder: Builder) -> Builder {
        builder = builder
            .header(CONTENT_TYPE, self.content_type)
            .header(ACCEPT_RANGES, "bytes")
            .header(ETAG, self.etag);
        if let Some(last_modified) = self.last_modified {
            builder = builder.header(LAST_MODIFIED, last_modified);
        }
        builder
    }
}

/// Build 200 response carrying a whole file
pub fn build_file_response(data: Bytes, headers: &FileHeaders<'_>, is_head: bool) -> Response<Full<Bytes>> {
    let content_length = data.len();
    let body = if is_head { Bytes::new() } else { data };

    let builder = headers
        .apply(Response::builder().status(StatusCode::OK))
        .header(CONTENT_LENGTH, content_length);
    finish(builder, body, "200")
}

/// Build 206 Partial Content response; `data` is the whole file
pub fn build_partial_response(
    data: &Bytes,
    range: ByteRange,
    headers: &FileHeaders<'_>,
    is_head: bool,
) -> Response<Full<Bytes>> {
    let body = if is_head {
        Bytes::new()
    } else {
        data.slice(range.start..=range.end)
    };

    let builder = headers
        .apply(Response::builder().status(StatusCode::PARTIAL_CONTENT))
        .header(CONTENT_LENGTH, range.content_length())
        .header(CONTENT_RANGE, range.content_range(data.len()));
    finish(builder, body, "206")
}

/// Build 304 Not Modified response
pub fn build_304_response(etag: &str, last_modified: Option<&str>) -> Response<Full<Bytes>> {
    let mut builder = Response::builder()
        .status(StatusCode::NOT_MODIFIED)
        .header(ETAG, etag);
    if let Some(last_modified) = last_modified {
        builder = builder.header(LAST_MODIFIED, last_modified);
    }
    finish(builder, Bytes::new(), "304")
}

/// Build generated HTML response (directory listings)
pub fn build_html_response(content: String, is_head: bool) -> Response<Full<Bytes>> {
    let content_length = content.len();
    let body = if is_head {
        Bytes::new()
    } else {
        Bytes::from(content)
    };

    let builder = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/html; charset=utf-8")
        .header(CONTENT_LENGTH, content_length);
    finish(builder, body, "HTML")
}

/// Build 301 redirect, used to add the trailing slash to directory URLs
pub fn build_redirect_response(location: &str) -> Response<Full<Bytes>> {
    let builder = Response::builder()
        .status(StatusCode::MOVED_PERMANENTLY)
        .header(LOCATION, location)
        .header(CONTENT_TYPE, "text/plain");
    finish(builder, Bytes::from("301 Moved Permanently"), "301")
}

/// Build OPTIONS response (preflight request)
pub fn build_options_response(enable_cors: bool) -> Response<Full<Bytes>> {
    let mut builder = Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header(ALLOW, ALLOWED_METHODS);

    if enable_cors {
        builder = builder
            .header("Access-Control-Allow-Origin", "*")
            .header("Access-Control-Allow-Methods", ALLOWED_METHODS)
            .header("Access-Control-Allow-Headers", "Range, If-None-Match, If-Modified-Since")
            .header("Access-Control-Max-Age", "86400");
    }

    finish(builder, Bytes::new(), "OPTIONS")
}

/// Build 400 Bad Request response
pub fn build_400_response(reason: &str) -> Response<Full<Bytes>> {
    build_error_response(StatusCode::BAD_REQUEST, reason)
}

/// Build 403 Forbidden response
pub fn build_403_response() -> Response<Full<Bytes>> {
    build_error_response(StatusCode::FORBIDDEN, "Permission denied")
}

/// Build 404 Not Found response
pub fn build_404_response() -> Response<Full<Bytes>> {
    build_error_response(StatusCode::NOT_FOUND, "File not found")
}

/// Build 405 Method Not Allowed response
pub fn build_405_response() -> Response<Full<Bytes>> {
    let message = status_line(StatusCode::METHOD_NOT_ALLOWED, "Unsupported method");
    let builder = Response::builder()
        .status(StatusCode::METHOD_NOT_ALLOWED)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(ALLOW, ALLOWED_METHODS);
    finish(builder, Bytes::from(message), "405")
}

/// Build 416 Range Not Satisfiable response
pub fn build_416_response(file_size: usize) -> Response<Full<Bytes>> {
    let message = status_line(StatusCode::RANGE_NOT_SATISFIABLE, "Requested range not satisfiable");
    let builder = Response::builder()
        .status(StatusCode::RANGE_NOT_SATISFIABLE)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(CONTENT_RANGE, format!("bytes */{file_size}"));
    finish(builder, Bytes::from(message), "416")
}

/// Build 500 Internal Server Error response
pub fn build_500_response() -> Response<Full<Bytes>> {
    build_error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

/// Plain-text error page: `404 Not Found: File not found`
pub fn build_error_response(status: StatusCode, reason: &str) -> Response<Full<Bytes>> {
    let builder = Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8");
    finish(builder, Bytes::from(status_line(status, reason)), status.as_str())
}

fn status_line(status: StatusCode, reason: &str) -> String {
    format!(
        "{} {}: {reason}\n",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Error")
    )
}

/// Attach the body, falling back to an empty 500 if a header was invalid
fn finish(builder: Builder, body: Bytes, label: &str) -> Response<Full<Bytes>> {
    builder.body(Full::new(body)).unwrap_or_else(|e| {
        log_build_error(label, &e);
        let mut response = Response::new(Full::new(Bytes::new()));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    })
}

/// Log response build error
fn log_build_error(status: &str, error: &hyper::http::Error) {
    crate::logger::log_error(&format!("Failed to build {status} response: {error}"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_of(response: Response<Full<Bytes>>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    fn sample_headers() -> FileHeaders<'static> {
        FileHeaders {
            content_type: "text/plain; charset=utf-8",
            etag: "\"abc\"",
            last_modified: Some("Sun, 06 Nov 1994 08:49:37 GMT"),
        }
    }

    #[tokio::test]
    async fn test_file_response() {
        let response = build_file_response(Bytes::from_static(b"hello"), &sample_headers(), false);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_LENGTH], "5");
        assert_eq!(response.headers()[ETAG], "\"abc\"");
        assert_eq!(response.headers()[LAST_MODIFIED], "Sun, 06 Nov 1994 08:49:37 GMT");
        assert_eq!(body_of(response).await, Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn test_head_keeps_length() {
        let response = build_file_response(Bytes::from_static(b"hello"), &sample_headers(), true);
        assert_eq!(response.headers()[CONTENT_LENGTH], "5");
        assert!(body_of(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_partial_response() {
        let data = Bytes::from_static(b"0123456789");
        let range = ByteRange { start: 2, end: 5 };
        let response = build_partial_response(&data, range, &sample_headers(), false);
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[CONTENT_RANGE], "bytes 2-5/10");
        assert_eq!(response.headers()[CONTENT_LENGTH], "4");
        assert_eq!(body_of(response).await, Bytes::from_static(b"2345"));
    }

    #[tokio::test]
    async fn test_error_responses() {
        let response = build_404_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_of(response).await, "404 Not Found: File not found\n");

        let response = build_405_response();
        assert_eq!(response.headers()[ALLOW], "GET, HEAD, OPTIONS");

        let response = build_416_response(10);
        assert_eq!(response.headers()[CONTENT_RANGE], "bytes */10");
    }

    #[test]
    fn test_no_caching_headers_from_builders() {
        for response in [
            build_304_response("\"abc\"", None),
            build_404_response(),
            build_redirect_response("/dir/"),
        ] {
            assert!(!response.headers().contains_key(hyper::header::CACHE_CONTROL));
        }
    }

    #[test]
    fn test_options_cors() {
        let response = build_options_response(true);
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()["Access-Control-Allow-Origin"], "*");
        assert!(!build_options_response(false)
            .headers()
            .contains_key("Access-Control-Allow-Origin"));
    }
}
