//! Directory listing module
//!
//! Renders an HTML index for directories that have no index file.

use crate::handler::router::RequestContext;
use crate::handler::static_files::io_error_response;
use crate::http::response::build_html_response;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::Response;
use std::fmt::Write;
use std::io;
use std::path::Path;
use tokio::fs;

/// One row of a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub name: String,
    pub is_dir: bool,
    pub is_symlink: bool,
}

/// Serve the listing of `dir`, titled with the request path
pub async fn serve_listing(ctx: &RequestContext<'_>, dir: &Path) -> Response<Full<Bytes>> {
    match read_entries(dir).await {
        Ok(entries) => build_html_response(render_listing(&ctx.path, &entries), ctx.is_head),
        Err(e) => io_error_response(&e, dir),
    }
}

/// Read a directory, sorted case-insensitively by name
pub async fn read_entries(dir: &Path) -> io::Result<Vec<ListingEntry>> {
    let mut reader = fs::read_dir(dir).await?;
    let mut entries = Vec::new();

    while let Some(entry) = reader.next_entry().await? {
        let file_type = entry.file_type().await?;
        let is_symlink = file_type.is_symlink();
        // Symlinked directories are listed as directories
        let is_dir = if is_symlink {
            fs::metadata(entry.path()).await.is_ok_and(|m| m.is_dir())
        } else {
            file_type.is_dir()
        };

        entries.push(ListingEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir,
            is_symlink,
        });
    }

    entries.sort_by_cached_key(|e| e.name.to_lowercase());
    Ok(entries)
}

/// Render the listing page for `display_path`
pub fn render_listing(display_path: &str, entries: &[ListingEntry]) -> String {
    let title = format!("Directory listing for {}", escape_html(display_path));

    let mut html = String::with_capacity(256 + entries.len() * 64);
    html.push_str("<!DOCTYPE HTML>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    let _ = writeln!(html, "<title>{title}</title>");
    html.push_str("</head>\n<body>\n");
    let _ = writeln!(html, "<h1>{title}</h1>");
    html.push_str("<hr>\n<ul>\n");

    for entry in entries {
        let suffix = if entry.is_dir { "/" } else { "" };
        let href = format!("{}{suffix}", urlencoding::encode(&entry.name));
        // Symlinks are labelled `name@`; the href still marks directories
        let label_suffix = if entry.is_symlink { "@" } else { suffix };
        let label = format!("{}{label_suffix}", entry.name);
        let _ = writeln!(
            html,
            "<li><a href=\"{}\">{}</a></li>",
            escape_html(&href),
            escape_html(&label)
        );
    }

    html.push_str("</ul>\n<hr>\n</body>\n</html>\n");
    html
}

/// Escape text for HTML element content and double-quoted attributes
fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, is_dir: bool) -> ListingEntry {
        ListingEntry {
            name: name.to_string(),
            is_dir,
            is_symlink: false,
        }
    }

    #[test]
    fn test_render_listing() {
        let html = render_listing(
            "/docs/",
            &[entry("notes", true), entry("a b.txt", false), entry("<x>&.md", false)],
        );
        assert!(html.contains("<title>Directory listing for /docs/</title>"));
        assert!(html.contains("<li><a href=\"notes/\">notes/</a></li>"));
        assert!(html.contains("<li><a href=\"a%20b.txt\">a b.txt</a></li>"));
        assert!(html.contains("<li><a href=\"%3Cx%3E%26.md\">&lt;x&gt;&amp;.md</a></li>"));
    }

    #[test]
    fn test_title_is_escaped() {
        let html = render_listing("/<script>/", &[]);
        assert!(html.contains("Directory listing for /&lt;script&gt;/"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_symlink_marker() {
        let dir_link = ListingEntry {
            name: "latest".to_string(),
            is_dir: true,
            is_symlink: true,
        };
        let file_link = ListingEntry {
            name: "current.log".to_string(),
            is_dir: false,
            is_symlink: true,
        };
        let html = render_listing("/", &[dir_link, file_link]);
        assert!(html.contains("<a href=\"latest/\">latest@</a>"));
        assert!(html.contains("<a href=\"current.log\">current.log@</a>"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_read_entries_symlinked_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("v2")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("v2"), dir.path().join("latest")).unwrap();

        let entries = read_entries(dir.path()).await.unwrap();
        assert_eq!(
            entries[0],
            ListingEntry {
                name: "latest".to_string(),
                is_dir: true,
                is_symlink: true,
            }
        );
        assert!(render_listing("/", &entries).contains("<a href=\"latest/\">latest@</a>"));
    }

    #[tokio::test]
    async fn test_read_entries_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::write(dir.path().join("A.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("c")).unwrap();

        let entries = read_entries(dir.path()).await.unwrap();
        assert_eq!(
            entries,
            vec![entry("A.txt", false), entry("b.txt", false), entry("c", true)]
        );
    }

    #[tokio::test]
    async fn test_read_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_entries(&dir.path().join("gone")).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
