//! Static file serving module
//!
//! Resolves request paths against the document root and serves files,
//! index files and generated directory listings.

use crate::config::AppState;
use crate::handler::router::RequestContext;
use crate::http::{self, cache, listing, mime, Body, RequestPath};
use crate::logger;
use hyper::{Response, StatusCode};
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncReadExt;

/// Files up to this size are read into memory, larger ones are streamed
const BUFFERED_FILE_LIMIT: u64 = 64 * 1024;

/// Serve a GET or HEAD request from the document root
pub async fn serve(ctx: &RequestContext<'_>, state: &AppState) -> Response<Body> {
    let request_path = match RequestPath::parse(ctx.raw_path) {
        Ok(p) => p,
        Err(e) => {
            logger::log_warning(&format!("Rejected path '{}': {e}", ctx.raw_path));
            return http::build_error_response(StatusCode::BAD_REQUEST, &e.to_string(), ctx.is_head);
        }
    };

    let target = request_path.resolve(state.root());
    let metadata = match fs::metadata(&target).await {
        Ok(m) => m,
        Err(e) => return io_error_response(&e, "File not found", ctx.is_head),
    };

    if !is_within_root(&target, state.root()).await {
        return http::build_404_response(ctx.is_head);
    }

    if metadata.is_dir() {
        serve_directory(ctx, state, &request_path, &target).await
    } else if request_path.trailing_slash {
        // A file cannot be addressed as a directory
        http::build_404_response(ctx.is_head)
    } else {
        serve_file(ctx, &target, &metadata).await
    }
}

/// Serve a directory: redirect, index file, or generated listing
async fn serve_directory(
    ctx: &RequestContext<'_>,
    state: &AppState,
    request_path: &RequestPath,
    dir: &Path,
) -> Response<Body> {
    if !request_path.trailing_slash {
        // Built from the normalized segments, never echoing the raw target
        let mut location = request_path.to_url_path();
        if !request_path.is_root() {
            location.push('/');
        }
        if let Some(q) = ctx.query {
            location.push('?');
            location.push_str(q);
        }
        return http::build_redirect_response(&location);
    }

    if let Some((index_path, metadata)) = find_index_file(dir, &state.config.root.index_files).await
    {
        return serve_file(ctx, &index_path, &metadata).await;
    }

    if !state.config.root.directory_listing {
        return http::build_404_response(ctx.is_head);
    }

    match listing::read_entries(dir).await {
        Ok(entries) => {
            let display_path = display_path(request_path);
            http::build_html_response(listing::render(&display_path, &entries), ctx.is_head)
        }
        Err(e) => io_error_response(&e, "No permission to list directory", ctx.is_head),
    }
}

/// Serve a regular file with conditional request support
async fn serve_file(ctx: &RequestContext<'_>, path: &Path, metadata: &Metadata) -> Response<Body> {
    let modified = metadata.modified().ok();
    let last_modified = modified.map(cache::http_date);

    if let (Some(modified), Some(date)) = (modified, last_modified.as_deref()) {
        if cache::is_not_modified(ctx.if_modified_since, ctx.has_if_none_match, modified) {
            return http::build_304_response(date);
        }
    }

    let (body, content_length) = match file_body(path, ctx.is_head).await {
        Ok(b) => b,
        Err(e) => {
            logger::log_error(&format!("Failed to read file '{}': {e}", path.display()));
            return io_error_response(&e, "File not found", ctx.is_head);
        }
    };

    http::build_file_response(
        body,
        content_length,
        mime::for_path(path),
        last_modified.as_deref(),
    )
}

/// Open a file and pick its body: empty for HEAD, buffered when small,
/// streamed otherwise. Returns the body and the file length.
async fn file_body(path: &Path, is_head: bool) -> io::Result<(Body, u64)> {
    let mut file = fs::File::open(path).await?;
    let len = file.metadata().await?.len();

    if is_head {
        return Ok((http::empty_body(), len));
    }
    if len > BUFFERED_FILE_LIMIT {
        return Ok((http::stream_body(file), len));
    }

    let mut content = Vec::with_capacity(usize::try_from(len).unwrap_or_default());
    file.read_to_end(&mut content).await?;
    let len = u64::try_from(content.len()).unwrap_or(len);
    Ok((http::full_body(content), len))
}

/// First configured index file that exists as a regular file
async fn find_index_file(dir: &Path, index_files: &[String]) -> Option<(PathBuf, Metadata)> {
    for name in index_files {
        let candidate = dir.join(name);
        if let Ok(metadata) = fs::metadata(&candidate).await {
            if metadata.is_file() {
                return Some((candidate, metadata));
            }
        }
    }
    None
}

/// Check that symlinks do not lead outside the document root
async fn is_within_root(target: &Path, root: &Path) -> bool {
    let Ok(canonical) = fs::canonicalize(target).await else {
        return false;
    };
    if canonical.starts_with(root) {
        true
    } else {
        logger::log_warning(&format!(
            "Path traversal attempt blocked: {} -> {}",
            target.display(),
            canonical.display()
        ));
        false
    }
}

/// Map a filesystem error to an error page
fn io_error_response(err: &io::Error, not_found_message: &str, is_head: bool) -> Response<Body> {
    match err.kind() {
        io::ErrorKind::PermissionDenied => {
            http::build_error_response(StatusCode::FORBIDDEN, "Permission denied", is_head)
        }
        _ => http::build_error_response(StatusCode::NOT_FOUND, not_found_message, is_head),
    }
}

/// Decoded path shown as the listing title
fn display_path(request_path: &RequestPath) -> String {
    if request_path.is_root() {
        "/".to_string()
    } else {
        format!("/{}/", request_path.segments.join("/"))
    }
}
