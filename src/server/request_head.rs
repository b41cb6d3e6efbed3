// Request head pre-read module
//
// Reads and checks the request head before hyper sees the connection, so a
// malformed request is answered by the server's own error page (with the
// cross-origin headers) instead of hyper's bare 400.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, SystemTime};

use http_body_util::BodyExt;
use hyper::body::Bytes;
use hyper::header::{
    HeaderName, HeaderValue, CONNECTION, CONTENT_LENGTH, DATE, TRANSFER_ENCODING,
};
use hyper::{Method, Response, StatusCode, Uri};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};

use crate::http::{self, cache, Body};

/// Largest request head accepted, in bytes
pub const MAX_HEAD_SIZE: usize = 64 * 1024;

/// Most header lines accepted in one request
pub const MAX_HEADERS: usize = 100;

const LINGER_TIMEOUT: Duration = Duration::from_secs(1);
const LINGER_LIMIT: u64 = 1024 * 1024;

/// Outcome of reading the request head
#[derive(Debug)]
pub enum RequestHead {
    /// A well-formed head; the bytes read so far, possibly including body bytes
    Complete(Bytes),
    /// The head is unusable and must be answered with this status
    Invalid(StatusCode),
    /// The peer closed before sending a complete head
    Closed,
}

/// Read from `stream` until the request head is complete or known to be bad
pub async fn read_head<R>(stream: &mut R) -> io::Result<RequestHead>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(4096);
    loop {
        match check_head(&buf) {
            Ok(true) => return Ok(RequestHead::Complete(Bytes::from(buf))),
            Ok(false) => {}
            Err(status) => return Ok(RequestHead::Invalid(status)),
        }
        if buf.len() >= MAX_HEAD_SIZE {
            return Ok(RequestHead::Invalid(
                StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            ));
        }
        if stream.read_buf(&mut buf).await? == 0 {
            return Ok(RequestHead::Closed);
        }
    }
}

/// Check a possibly partial request head
///
/// `Ok(false)` means more bytes are needed. Beyond the syntax checked by
/// `httparse`, this rejects what hyper would refuse to serve: a target that is
/// not a valid URI, unusable header values, a bad `Content-Length` and a
/// `Transfer-Encoding` that cannot be framed.
pub fn check_head(buf: &[u8]) -> Result<bool, StatusCode> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);
    match req.parse(buf) {
        Ok(httparse::Status::Partial) => return Ok(false),
        Ok(httparse::Status::Complete(_)) => {}
        Err(httparse::Error::TooManyHeaders) => {
            return Err(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE)
        }
        Err(_) => return Err(StatusCode::BAD_REQUEST),
    }

    let method = req.method.unwrap_or_default();
    Method::from_bytes(method.as_bytes()).map_err(|_| StatusCode::BAD_REQUEST)?;
    let target = req.path.unwrap_or_default();
    Uri::try_from(target).map_err(|_| StatusCode::BAD_REQUEST)?;

    let mut content_length: Option<u64> = None;
    let mut transfer_encoding: Option<&[u8]> = None;
    for header in req.headers.iter() {
        let name =
            HeaderName::from_bytes(header.name.as_bytes()).map_err(|_| StatusCode::BAD_REQUEST)?;
        HeaderValue::from_bytes(header.value).map_err(|_| StatusCode::BAD_REQUEST)?;

        if name == CONTENT_LENGTH {
            let len = parse_content_length(header.value).ok_or(StatusCode::BAD_REQUEST)?;
            if content_length.is_some_and(|prev| prev != len) {
                return Err(StatusCode::BAD_REQUEST);
            }
            content_length = Some(len);
        } else if name == TRANSFER_ENCODING {
            transfer_encoding = Some(header.value);
        }
    }

    if let Some(encoding) = transfer_encoding {
        let chunked_last = std::str::from_utf8(encoding)
            .ok()
            .and_then(|v| v.rsplit(',').next())
            .is_some_and(|last| last.trim().eq_ignore_ascii_case("chunked"));
        // HTTP/1.0 has no transfer codings
        if req.version == Some(0) || !chunked_last {
            return Err(StatusCode::BAD_REQUEST);
        }
    }

    Ok(true)
}

fn parse_content_length(value: &[u8]) -> Option<u64> {
    let value = std::str::from_utf8(value).ok()?.trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

/// Build the error page sent for an unusable request head
pub fn error_response(status: StatusCode) -> Response<Body> {
    let message = if status == StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE {
        "Request header too large"
    } else {
        "Bad request syntax"
    };
    let mut response = http::build_error_response(status, message, false);
    let headers = response.headers_mut();
    if let Ok(date) = HeaderValue::from_str(&cache::http_date(SystemTime::now())) {
        headers.insert(DATE, date);
    }
    headers.insert(CONNECTION, HeaderValue::from_static("close"));
    http::finalize(response)
}

/// Write `response` as a complete HTTP/1.1 message and close the write side
pub async fn write_response<W>(stream: &mut W, response: Response<Body>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let (parts, body) = response.into_parts();
    let body = body.collect().await?.to_bytes();

    let mut out = Vec::with_capacity(256 + body.len());
    out.extend_from_slice(format!("HTTP/1.1 {}\r\n", parts.status).as_bytes());
    for (name, value) in &parts.headers {
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(&body);

    stream.write_all(&out).await?;
    stream.flush().await?;
    stream.shutdown().await
}

/// Discard what the client is still sending after an early error response
///
/// Closing with unread input resets the connection, which can destroy the
/// response before the client reads it. Bounded in time and bytes.
pub async fn linger<R>(stream: &mut R)
where
    R: AsyncRead + Unpin,
{
    let mut rest = stream.take(LINGER_LIMIT);
    let mut sink = tokio::io::sink();
    let drain = tokio::io::copy(&mut rest, &mut sink);
    let _ = tokio::time::timeout(LINGER_TIMEOUT, drain).await;
}

/// Stream that replays already-read bytes before reading from `inner`
pub struct Rewind<T> {
    prefix: Bytes,
    inner: T,
}

impl<T> Rewind<T> {
    pub const fn new(prefix: Bytes, inner: T) -> Self {
        Self { prefix, inner }
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for Rewind<T> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if !self.prefix.is_empty() {
            let n = self.prefix.len().min(buf.remaining());
            let chunk = self.prefix.split_to(n);
            buf.put_slice(&chunk);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for Rewind<T> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
