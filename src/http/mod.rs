//! HTTP protocol layer module
//!
//! Protocol helpers shared by the request handler: header stamping, MIME
//! detection, path decoding, conditional requests, listings and response
//! builders.

pub mod cache;
pub mod cors;
pub mod listing;
pub mod mime;
pub mod path;
pub mod response;

// Re-export commonly used types
pub use path::{PathError, RequestPath};
pub use response::{
    build_304_response, build_404_response, build_error_response, build_file_response,
    build_html_response, build_options_response, build_redirect_response, empty_body, finalize,
    full_body, stream_body, Body,
};
