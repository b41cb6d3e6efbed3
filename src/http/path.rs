//! Request path decoding module
//!
//! Turns the raw request target into a list of safe path segments that can be
//! joined onto the document root without ever leaving it.

use std::fmt;
use std::path::{Path, PathBuf};

/// Decoded and normalized request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPath {
    /// Normal segments only: no empty, `.` or `..` entries
    pub segments: Vec<String>,
    /// Whether the client path ended with `/`
    pub trailing_slash: bool,
}

/// Reasons a request path is rejected outright
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathError {
    /// Percent-decoded bytes are not UTF-8
    InvalidEncoding,
    /// Path contains a NUL byte
    NulByte,
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEncoding => f.write_str("Path is not valid UTF-8"),
            Self::NulByte => f.write_str("Path contains a NUL byte"),
        }
    }
}

impl std::error::Error for PathError {}

impl RequestPath {
    /// Decode a request path (query and fragment are ignored)
    ///
    /// `..` removes the previous segment and is dropped at the root, so the
    /// result can never point above the directory it is joined to.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let raw = raw.split(|c| c == '?' || c == '#').next().unwrap_or_default();
        // Malformed escapes are kept literally
        let decoded = urlencoding::decode(raw).map_err(|_| PathError::InvalidEncoding)?;
        if decoded.contains('\0') {
            return Err(PathError::NulByte);
        }

        let trailing_slash = decoded.trim_end().ends_with('/');
        let mut segments: Vec<String> = Vec::new();
        for segment in decoded.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                s => segments.push(s.to_string()),
            }
        }

        Ok(Self {
            segments,
            trailing_slash,
        })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Normalized path, percent-encoded again, for use in a `Location` header
    ///
    /// Always a single leading `/`, so it can never be read as a
    /// protocol-relative URL.
    pub fn to_url_path(&self) -> String {
        let mut out = String::from("/");
        let encoded: Vec<_> = self
            .segments
            .iter()
            .map(|s| urlencoding::encode(s))
            .collect();
        out.push_str(&encoded.join("/"));
        out
    }

    /// Join the segments onto a base directory
    pub fn resolve(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        path.extend(&self.segments);
        path
    }
}
