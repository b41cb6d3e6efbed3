//! HTTP response building module
//!
//! Builders for the handful of responses the file server produces. Headers
//! common to every response (`Server`, cross-origin) are added later by
//! [`finalize`].

use std::io;

use futures_util::TryStreamExt;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Bytes, Frame};
use hyper::header::{HeaderValue, SERVER};
use hyper::{Response, StatusCode};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use super::cors;
use super::listing::escape_html;

/// Response body: in-memory bytes or a file streamed in chunks
pub type Body = BoxBody<Bytes, io::Error>;

/// Read size for streamed file bodies
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

pub fn full_body(data: impl Into<Bytes>) -> Body {
    Full::new(data.into()).map_err(|never| match never {}).boxed()
}

pub fn empty_body() -> Body {
    full_body(Bytes::new())
}

/// Stream an open file without loading it into memory
pub fn stream_body(file: File) -> Body {
    let frames = ReaderStream::with_capacity(file, STREAM_CHUNK_SIZE).map_ok(Frame::data);
    StreamBody::new(frames).boxed()
}

pub const SERVER_NAME: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Stamp the headers every response must carry, right before it is sent
pub fn finalize(mut response: Response<Body>) -> Response<Body> {
    response
        .headers_mut()
        .insert(SERVER, HeaderValue::from_static(SERVER_NAME));
    cors::apply(&mut response);
    response
}

/// Build 200 response for a file
///
/// `content_length` is the file size; for HEAD the body is empty but the
/// length is still advertised.
pub fn build_file_response(
    body: Body,
    content_length: u64,
    content_type: &str,
    last_modified: Option<&str>,
) -> Response<Body> {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", content_type)
        .header("Content-Length", content_length);
    if let Some(date) = last_modified {
        builder = builder.header("Last-Modified", date);
    }

    builder.body(body).unwrap_or_else(|e| {
        log_build_error("200", &e);
        Response::new(empty_body())
    })
}

/// Build 200 HTML response (directory listings)
pub fn build_html_response(content: String, is_head: bool) -> Response<Body> {
    let content_length = content.len();
    let body = if is_head {
        Bytes::new()
    } else {
        Bytes::from(content)
    };

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/html; charset=utf-8")
        .header("Content-Length", content_length)
        .body(full_body(body))
        .unwrap_or_else(|e| {
            log_build_error("HTML", &e);
            Response::new(empty_body())
        })
}

/// Build 304 Not Modified response
pub fn build_304_response(last_modified: &str) -> Response<Body> {
    Response::builder()
        .status(StatusCode::NOT_MODIFIED)
        .header("Last-Modified", last_modified)
        .body(empty_body())
        .unwrap_or_else(|e| {
            log_build_error("304", &e);
            Response::new(empty_body())
        })
}

/// Build 301 redirect, used to add the trailing slash to directory paths
pub fn build_redirect_response(location: &str) -> Response<Body> {
    Response::builder()
        .status(StatusCode::MOVED_PERMANENTLY)
        .header("Location", location)
        .header("Content-Length", 0)
        .body(empty_body())
        .unwrap_or_else(|e| {
            log_build_error("301", &e);
            error_fallback(StatusCode::MOVED_PERMANENTLY)
        })
}

/// Build OPTIONS response (preflight request)
pub fn build_options_response() -> Response<Body> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Allow", "GET, HEAD, OPTIONS")
        .body(empty_body())
        .unwrap_or_else(|e| {
            log_build_error("OPTIONS", &e);
            Response::new(empty_body())
        })
}

/// Build an HTML error page for any 4xx/5xx status
pub fn build_error_response(status: StatusCode, message: &str, is_head: bool) -> Response<Body> {
    let html = format!(
        "<!DOCTYPE HTML>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Error response</title>\n</head>\n<body>\n<h1>Error response</h1>\n\
         <p>Error code: {}</p>\n<p>Message: {}.</p>\n</body>\n</html>\n",
        status.as_u16(),
        escape_html(message),
    );
    let content_length = html.len();
    let body = if is_head {
        Bytes::new()
    } else {
        Bytes::from(html)
    };

    Response::builder()
        .status(status)
        .header("Content-Type", "text/html;charset=utf-8")
        .header("Content-Length", content_length)
        .body(full_body(body))
        .unwrap_or_else(|e| {
            log_build_error(status.as_str(), &e);
            error_fallback(status)
        })
}

pub fn build_404_response(is_head: bool) -> Response<Body> {
    build_error_response(StatusCode::NOT_FOUND, "File not found", is_head)
}

/// Empty response that still carries the intended status
fn error_fallback(status: StatusCode) -> Response<Body> {
    let mut resp = Response::new(empty_body());
    *resp.status_mut() = status;
    resp
}

/// Log response build error
fn log_build_error(status: &str, error: &hyper::http::Error) {
    crate::logger::log_error(&format!("Failed to build {status} response: {error}"));
}
