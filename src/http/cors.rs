//! Cross-origin header stamping
//!
//! Every response leaving the server passes through [`apply`], so browsers on
//! any origin may read it.

use hyper::header::{
    HeaderMap, HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN,
};
use hyper::Response;

pub const ALLOW_ORIGIN: &str = "*";
pub const ALLOW_METHODS: &str = "GET, POST, OPTIONS";
pub const ALLOW_HEADERS: &str = "*";

/// Append the three cross-origin headers to a response
///
/// Any earlier value for these names is dropped first, so each header ends
/// up present exactly once and after every other header.
pub fn apply<B>(response: &mut Response<B>) {
    apply_headers(response.headers_mut());
}

pub fn apply_headers(headers: &mut HeaderMap) {
    let entries = [
        (ACCESS_CONTROL_ALLOW_ORIGIN, ALLOW_ORIGIN),
        (ACCESS_CONTROL_ALLOW_METHODS, ALLOW_METHODS),
        (ACCESS_CONTROL_ALLOW_HEADERS, ALLOW_HEADERS),
    ];
    // Removal may reorder entries, so clear all three before appending any
    for (name, _) in &entries {
        headers.remove(name);
    }
    for (name, value) in entries {
        headers.append(name, HeaderValue::from_static(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::CONTENT_TYPE;

    #[test]
    fn test_headers_added() {
        let mut resp = Response::new(());
        apply(&mut resp);
        let h = resp.headers();
        assert_eq!(h[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(h[ACCESS_CONTROL_ALLOW_METHODS], "GET, POST, OPTIONS");
        assert_eq!(h[ACCESS_CONTROL_ALLOW_HEADERS], "*");
    }

    #[test]
    fn test_existing_values_replaced_once() {
        let mut resp = Response::new(());
        resp.headers_mut()
            .append(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("https://a.test"));
        resp.headers_mut()
            .append(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("https://b.test"));
        apply(&mut resp);
        apply(&mut resp);

        let origins: Vec<_> = resp
            .headers()
            .get_all(ACCESS_CONTROL_ALLOW_ORIGIN)
            .iter()
            .collect();
        assert_eq!(origins, vec!["*"]);
        assert_eq!(resp.headers().get_all(ACCESS_CONTROL_ALLOW_METHODS).iter().count(), 1);
    }

    #[test]
    fn test_appended_after_other_headers() {
        let mut resp = Response::new(());
        resp.headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        apply(&mut resp);

        let names: Vec<_> = resp.headers().keys().map(|k| k.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "content-type",
                "access-control-allow-origin",
                "access-control-allow-methods",
                "access-control-allow-headers",
            ]
        );
    }
}
