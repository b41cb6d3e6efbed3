//! HTTP conditional request module
//!
//! Provides `Last-Modified` formatting and `If-Modified-Since` evaluation.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::time::SystemTime;

const IMF_FIXDATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Format a timestamp as an HTTP date, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`
pub fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).format(IMF_FIXDATE).to_string()
}

/// Parse an HTTP date (IMF-fixdate or any RFC 2822 date)
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    DateTime::parse_from_rfc2822(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, IMF_FIXDATE)
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// Decide whether a `304 Not Modified` should be sent
///
/// `If-None-Match` takes precedence, and since no entity tags are produced
/// its presence disables the date check. Unparseable dates are ignored.
pub fn is_not_modified(
    if_modified_since: Option<&str>,
    has_if_none_match: bool,
    modified: SystemTime,
) -> bool {
    if has_if_none_match {
        return false;
    }
    let Some(since) = if_modified_since.and_then(parse_http_date) else {
        return false;
    };
    // Header dates have whole-second precision
    DateTime::<Utc>::from(modified).timestamp() <= since.timestamp()
}
