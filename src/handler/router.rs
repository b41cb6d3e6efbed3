//! Request dispatch module
//!
//! Entry point for HTTP request processing: method validation, dispatch to the
//! static file responder, common header stamping and access logging.

use crate::config::AppState;
use crate::handler::static_files;
use crate::http::{self, Body};
use crate::logger::{self, AccessLogEntry};
use hyper::body::Body as _;
use hyper::header::{HeaderMap, CONTENT_LENGTH, IF_MODIFIED_SINCE, IF_NONE_MATCH, REFERER, USER_AGENT};
use hyper::http::request::Parts;
use hyper::{Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// Request context encapsulating information needed for request processing
pub struct RequestContext<'a> {
    /// Path as sent by the client, still percent-encoded
    pub raw_path: &'a str,
    pub query: Option<&'a str>,
    pub is_head: bool,
    pub if_modified_since: Option<&'a str>,
    pub has_if_none_match: bool,
}

impl<'a> RequestContext<'a> {
    pub fn from_parts(parts: &'a Parts) -> Self {
        let headers = &parts.headers;
        Self {
            raw_path: parts.uri.path(),
            query: parts.uri.query(),
            is_head: parts.method == Method::HEAD,
            if_modified_since: header_str(headers, &IF_MODIFIED_SINCE),
            has_if_none_match: headers.contains_key(IF_NONE_MATCH),
        }
    }
}

/// Main entry point for HTTP request handling
///
/// Never fails: every outcome, including errors, is an HTTP response carrying
/// the cross-origin headers.
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
    peer_addr: SocketAddr,
) -> Result<Response<Body>, Infallible> {
    let started = Instant::now();
    // The request body is never read
    let (parts, _) = req.into_parts();
    let ctx = RequestContext::from_parts(&parts);

    let response = match &parts.method {
        &Method::GET | &Method::HEAD => static_files::serve(&ctx, &state).await,
        &Method::OPTIONS => http::build_options_response(),
        method => {
            logger::log_debug(&format!("Unsupported method: {method}"));
            http::build_error_response(
                StatusCode::NOT_IMPLEMENTED,
                &format!("Unsupported method ('{method}')"),
                false,
            )
        }
    };
    let response = http::finalize(response);

    if state.access_log_enabled() {
        let entry = access_entry(&parts, &response, peer_addr, started);
        logger::log_access(&entry, &state.config.logging.access_log_format);
    }

    Ok(response)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &hyper::header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn access_entry(
    req: &Parts,
    response: &Response<Body>,
    peer_addr: SocketAddr,
    started: Instant,
) -> AccessLogEntry {
    let mut entry = AccessLogEntry::new(
        peer_addr.ip().to_string(),
        &req.method,
        req.uri.path().to_string(),
    );
    entry.query = req.uri.query().map(ToString::to_string);
    entry.set_version(req.version);
    entry.status = response.status().as_u16();
    // Streamed bodies have no exact size hint, their length is in the header
    entry.body_bytes = response
        .body()
        .size_hint()
        .exact()
        .or_else(|| {
            header_str(response.headers(), &CONTENT_LENGTH).and_then(|v| v.parse().ok())
        })
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or_default();
    entry.referer = header_str(&req.headers, &REFERER).map(ToString::to_string);
    entry.user_agent = header_str(&req.headers, &USER_AGENT).map(ToString::to_string);
    entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
    entry
}
