//! Static file serving module
//!
//! Maps request paths onto the serving root, keeps them inside it, and builds
//! file responses with conditional and range request support.

use crate::config::AppState;
use crate::handler::listing;
use crate::handler::router::RequestContext;
use crate::http::response::{build_file_response, build_partial_response, FileHeaders};
use crate::http::{self, cache, date, mime, range::RangeParseResult};
use crate::logger;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// Where a request path leads inside the serving root
#[derive(Debug)]
pub enum Resolved {
    File(PathBuf),
    /// Directory without an index file
    Directory(PathBuf),
    /// Directory requested without its trailing slash
    RedirectToSlash,
    NotFound,
    Forbidden,
    Failed(io::Error),
}

/// Serve a request from the configured root
pub async fn serve(ctx: &RequestContext<'_>, state: &AppState) -> Response<Full<Bytes>> {
    let serve_config = &state.config.serve;

    match resolve(&state.root, &ctx.path, &serve_config.index_files).await {
        Resolved::File(path) => serve_file(ctx, &path).await,
        Resolved::Directory(path) if serve_config.directory_listing => {
            listing::serve_listing(ctx, &path).await
        }
        Resolved::Directory(_) => http::response::build_error_response(
            StatusCode::FORBIDDEN,
            "Directory listing is disabled",
        ),
        Resolved::Forbidden => http::build_403_response(),
        Resolved::RedirectToSlash => {
            http::build_redirect_response(&slash_redirect_location(ctx.raw_path, ctx.query))
        }
        Resolved::NotFound => http::build_404_response(),
        Resolved::Failed(e) => io_error_response(&e, Path::new(&ctx.path)),
    }
}

/// Resolve a decoded URL path against the canonical root
///
/// `..` segments are clamped at the root, and the final path is canonicalised
/// so that symlinks pointing outside the root are refused as well.
pub async fn resolve(root: &Path, url_path: &str, index_files: &[String]) -> Resolved {
    let candidate = root.join(normalize_url_path(url_path));

    let path = match contained(root, &candidate).await {
        Ok(Some(path)) => path,
        Ok(None) => {
            logger::log_warning(&format!(
                "Path traversal attempt blocked: {url_path} -> {}",
                candidate.display()
            ));
            return Resolved::NotFound;
        }
        Err(e) => return from_io_error(e),
    };

    let metadata = match fs::metadata(&path).await {
        Ok(m) => m,
        Err(e) => return from_io_error(e),
    };

    if metadata.is_dir() {
        if !url_path.ends_with('/') {
            return Resolved::RedirectToSlash;
        }
        for index_file in index_files {
            if let Ok(Some(index)) = contained(root, &path.join(index_file)).await {
                if fs::metadata(&index).await.is_ok_and(|m| m.is_file()) {
                    return Resolved::File(index);
                }
            }
        }
        return Resolved::Directory(path);
    }

    // A file cannot be addressed as a directory
    if url_path.ends_with('/') {
        return Resolved::NotFound;
    }
    Resolved::File(path)
}

/// `Location` for a directory requested without its trailing slash
///
/// Leading slashes are collapsed to one, so `//host` cannot become a
/// scheme-relative redirect to another site.
pub fn slash_redirect_location(raw_path: &str, query: Option<&str>) -> String {
    let path = raw_path.trim_start_matches('/');
    match query {
        Some(query) => format!("/{path}/?{query}"),
        None => format!("/{path}/"),
    }
}

/// Turn a URL path into a relative filesystem path with no `..`, `.` or
/// empty segments. Segments that are not plain names on this platform are
/// dropped.
pub fn normalize_url_path(url_path: &str) -> PathBuf {
    let mut segments: Vec<&str> = Vec::new();
    for segment in url_path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s if is_plain_name(s) => segments.push(s),
            _ => {}
        }
    }
    segments.iter().collect()
}

fn is_plain_name(segment: &str) -> bool {
    let mut components = Path::new(segment).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Canonicalise `path`; `Ok(None)` when it resolves outside `root`
async fn contained(root: &Path, path: &Path) -> io::Result<Option<PathBuf>> {
    let canonical = fs::canonicalize(path).await?;
    Ok(canonical.starts_with(root).then_some(canonical))
}

fn from_io_error(e: io::Error) -> Resolved {
    match e.kind() {
        io::ErrorKind::NotFound
        | io::ErrorKind::NotADirectory
        | io::ErrorKind::InvalidFilename => Resolved::NotFound,
        io::ErrorKind::PermissionDenied => Resolved::Forbidden,
        _ => Resolved::Failed(e),
    }
}

/// Map a filesystem error to the matching HTTP error
pub fn io_error_response(e: &io::Error, path: &Path) -> Response<Full<Bytes>> {
    match e.kind() {
        io::ErrorKind::NotFound
        | io::ErrorKind::NotADirectory
        | io::ErrorKind::InvalidFilename => http::build_404_response(),
        io::ErrorKind::PermissionDenied => http::build_403_response(),
        _ => {
            logger::log_error(&format!("Failed to read '{}': {e}", path.display()));
            http::build_500_response()
        }
    }
}

/// Serve a single resolved file
async fn serve_file(ctx: &RequestContext<'_>, path: &Path) -> Response<Full<Bytes>> {
    let content = match fs::read(path).await {
        Ok(c) => Bytes::from(c),
        Err(e) => return io_error_response(&e, path),
    };

    let last_modified = fs::metadata(path)
        .await
        .ok()
        .and_then(|m| m.modified().ok());
    let last_modified_header = last_modified.map(date::format_http_date);
    let etag = cache::generate_etag(&content);

    if cache::is_not_modified(ctx.if_none_match, ctx.if_modified_since, &etag, last_modified) {
        return http::build_304_response(&etag, last_modified_header.as_deref());
    }

    let headers = FileHeaders {
        content_type: mime::content_type_for(path),
        etag: &etag,
        last_modified: last_modified_header.as_deref(),
    };

    match http::parse_range_header(ctx.range_header, content.len()) {
        RangeParseResult::Valid(range) => {
            build_partial_response(&content, range, &headers, ctx.is_head)
        }
        RangeParseResult::NotSatisfiable => http::build_416_response(content.len()),
        RangeParseResult::None => build_file_response(content, &headers, ctx.is_head),
    }
}
