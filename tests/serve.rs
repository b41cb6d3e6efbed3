//! End-to-end tests: a real server on an ephemeral port, spoken to over raw TCP.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use cors_static_server::server::create_listener;
use cors_static_server::{Config, Server, ServerHandle};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const TIMEOUT: Duration = Duration::from_secs(5);

/// Document root populated with a few files, removed on drop
struct TempRoot(PathBuf);

impl TempRoot {
    fn new() -> Self {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let dir = std::env::temp_dir().join(format!(
            "cors-static-it-{}-{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::SeqCst)
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(dir.join("assets").join("img")).unwrap();
        std::fs::write(dir.join("index.html"), "<h1>Formatter</h1>").unwrap();
        std::fs::write(dir.join("script.js"), "console.log('ok');").unwrap();
        std::fs::write(dir.join("assets").join("notes.txt"), "plain notes").unwrap();
        let binary: Vec<u8> = (0..=255u8).cycle().take(70_000).collect();
        std::fs::write(dir.join("assets").join("blob.bin"), binary).unwrap();
        Self(dir)
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for TempRoot {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

fn start(root: &Path) -> ServerHandle {
    start_with(root, |_| {})
}

fn start_with(root: &Path, customize: impl FnOnce(&mut Config)) -> ServerHandle {
    let mut cfg = Config::default();
    cfg.server.host = "127.0.0.1".to_string();
    cfg.server.port = 0;
    cfg.root.dir = root.to_string_lossy().into_owned();
    cfg.logging.access_log = false;
    cfg.performance.shutdown_timeout = 1;
    customize(&mut cfg);
    Server::bind(cfg).unwrap().start()
}

struct RawResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl RawResponse {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn header_count(&self, name: &str) -> usize {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .count()
    }

    fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    fn assert_cors(&self) {
        assert_eq!(self.header("Access-Control-Allow-Origin"), Some("*"));
        assert_eq!(
            self.header("Access-Control-Allow-Methods"),
            Some("GET, POST, OPTIONS")
        );
        assert_eq!(self.header("Access-Control-Allow-Headers"), Some("*"));
        assert_eq!(self.header_count("Access-Control-Allow-Origin"), 1);
        assert_eq!(self.header_count("Access-Control-Allow-Methods"), 1);
        assert_eq!(self.header_count("Access-Control-Allow-Headers"), 1);
    }
}

fn parse_response(raw: &[u8]) -> RawResponse {
    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response has no header terminator");
    let head = String::from_utf8_lossy(&raw[..split]).into_owned();
    let mut lines = head.split("\r\n");
    let status_line = lines.next().unwrap();
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .expect("bad status line");
    let headers = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(n, v)| (n.trim().to_string(), v.trim().to_string()))
        .collect();

    RawResponse {
        status,
        headers,
        body: raw[split + 4..].to_vec(),
    }
}

async fn send_raw(addr: SocketAddr, request: &str) -> RawResponse {
    parse_response(&exchange(addr, request).await)
}

async fn exchange(addr: SocketAddr, request: &str) -> Vec<u8> {
    let exchange = async {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        buf
    };
    tokio::time::timeout(TIMEOUT, exchange)
        .await
        .expect("request timed out")
}

async fn request(addr: SocketAddr, method: &str, path: &str) -> RawResponse {
    send_raw(
        addr,
        &format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"),
    )
    .await
}

#[tokio::test]
async fn index_html_is_served_with_cors() {
    let root = TempRoot::new();
    let server = start(root.path());

    let resp = request(server.local_addr(), "GET", "/index.html").await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.header("Content-Type"), Some("text/html"));
    assert_eq!(resp.body_text(), "<h1>Formatter</h1>");
    resp.assert_cors();

    server.stop().await.unwrap();
}

#[tokio::test]
async fn missing_file_is_404_with_cors() {
    let root = TempRoot::new();
    let server = start(root.path());

    let resp = request(server.local_addr(), "GET", "/does-not-exist.txt").await;
    assert_eq!(resp.status, 404);
    resp.assert_cors();

    server.stop().await.unwrap();
}

#[tokio::test]
async fn binary_body_is_byte_identical() {
    let root = TempRoot::new();
    let server = start(root.path());

    let resp = request(server.local_addr(), "GET", "/assets/blob.bin").await;
    let expected = std::fs::read(root.path().join("assets").join("blob.bin")).unwrap();
    assert_eq!(resp.status, 200);
    assert_eq!(resp.header("Content-Length"), Some("70000"));
    assert_eq!(resp.header("Content-Type"), Some("application/octet-stream"));
    assert_eq!(resp.body, expected);
    resp.assert_cors();

    server.stop().await.unwrap();
}

#[tokio::test]
async fn directory_listing_has_cors() {
    let root = TempRoot::new();
    let server = start(root.path());

    let resp = request(server.local_addr(), "GET", "/assets/").await;
    assert_eq!(resp.status, 200);
    let body = resp.body_text();
    assert!(body.contains("Directory listing for /assets/"));
    assert!(body.contains("<a href=\"img/\">img/</a>"));
    assert!(body.contains("<a href=\"notes.txt\">notes.txt</a>"));
    resp.assert_cors();

    server.stop().await.unwrap();
}

#[tokio::test]
async fn root_serves_index_file() {
    let root = TempRoot::new();
    let server = start(root.path());

    let resp = request(server.local_addr(), "GET", "/").await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body_text(), "<h1>Formatter</h1>");
    resp.assert_cors();

    server.stop().await.unwrap();
}

#[tokio::test]
async fn directory_without_slash_redirects() {
    let root = TempRoot::new();
    let server = start(root.path());

    let resp = request(server.local_addr(), "GET", "/assets").await;
    assert_eq!(resp.status, 301);
    assert_eq!(resp.header("Location"), Some("/assets/"));
    resp.assert_cors();

    server.stop().await.unwrap();
}

#[tokio::test]
async fn traversal_outside_root_is_404() {
    let root = TempRoot::new();
    let server = start(root.path());

    let resp = request(server.local_addr(), "GET", "/../../../../etc/passwd").await;
    assert_eq!(resp.status, 404);
    resp.assert_cors();

    let resp = request(server.local_addr(), "GET", "/%2e%2e/%2e%2e/etc/passwd").await;
    assert_eq!(resp.status, 404);
    resp.assert_cors();

    server.stop().await.unwrap();
}

#[tokio::test]
async fn post_is_rejected_with_cors() {
    let root = TempRoot::new();
    let server = start(root.path());

    let resp = send_raw(
        server.local_addr(),
        "POST /index.html HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
    )
    .await;
    assert_eq!(resp.status, 501);
    resp.assert_cors();

    server.stop().await.unwrap();
}

#[tokio::test]
async fn options_preflight_has_cors() {
    let root = TempRoot::new();
    let server = start(root.path());

    let resp = request(server.local_addr(), "OPTIONS", "/script.js").await;
    assert_eq!(resp.status, 204);
    assert_eq!(resp.header("Allow"), Some("GET, HEAD, OPTIONS"));
    resp.assert_cors();

    server.stop().await.unwrap();
}

#[tokio::test]
async fn head_returns_headers_only() {
    let root = TempRoot::new();
    let server = start(root.path());

    let resp = request(server.local_addr(), "HEAD", "/script.js").await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.header("Content-Type"), Some("text/javascript"));
    assert_eq!(resp.header("Content-Length"), Some("18"));
    assert!(resp.body.is_empty());
    resp.assert_cors();

    server.stop().await.unwrap();
}

#[tokio::test]
async fn conditional_get_not_modified() {
    let root = TempRoot::new();
    let server = start(root.path());

    let resp = send_raw(
        server.local_addr(),
        "GET /index.html HTTP/1.1\r\nHost: localhost\r\nIf-Modified-Since: Fri, 01 Jan 2100 00:00:00 GMT\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert_eq!(resp.status, 304);
    assert!(resp.body.is_empty());
    resp.assert_cors();

    server.stop().await.unwrap();
}

#[tokio::test]
async fn malformed_request_does_not_stop_server() {
    let root = TempRoot::new();
    let server = start(root.path());

    // Header line without a colon
    let resp = send_raw(server.local_addr(), "GET / HTTP/1.1\r\nBad Header\r\n\r\n").await;
    assert_eq!(resp.status, 400);
    assert!(resp.body_text().contains("Error code: 400"));
    resp.assert_cors();

    let resp = send_raw(server.local_addr(), "NOT AN HTTP REQUEST\r\n\r\n").await;
    assert_eq!(resp.status, 400);
    resp.assert_cors();

    let resp = request(server.local_addr(), "GET", "/index.html").await;
    assert_eq!(resp.status, 200);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn oversized_header_is_rejected_with_cors() {
    let root = TempRoot::new();
    let server = start(root.path());

    let big = "a".repeat(80 * 1024);
    let resp = send_raw(
        server.local_addr(),
        &format!("GET / HTTP/1.1\r\nX-Big: {big}\r\n\r\n"),
    )
    .await;
    assert_eq!(resp.status, 431);
    resp.assert_cors();

    server.stop().await.unwrap();
}

#[tokio::test]
async fn double_slash_redirect_stays_on_host() {
    let root = TempRoot::new();
    std::fs::create_dir_all(root.path().join("evil.test")).unwrap();
    let server = start(root.path());

    let resp = send_raw(server.local_addr(), "GET //evil.test HTTP/1.0\r\n\r\n").await;
    assert_eq!(resp.status, 301);
    assert_eq!(resp.header("Location"), Some("/evil.test/"));
    resp.assert_cors();

    server.stop().await.unwrap();
}

#[tokio::test]
async fn slow_reader_receives_whole_file() {
    let root = TempRoot::new();
    let data: Vec<u8> = (0..=255u8).cycle().take(16 * 1024 * 1024).collect();
    std::fs::write(root.path().join("large.bin"), &data).unwrap();
    let server = start_with(root.path(), |cfg| cfg.performance.read_timeout = 1);

    let mut stream = TcpStream::connect(server.local_addr()).await.unwrap();
    stream
        .write_all(b"GET /large.bin HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    // Stall well past the read timeout before draining the response
    tokio::time::sleep(Duration::from_millis(2500)).await;
    let mut raw = Vec::new();
    tokio::time::timeout(Duration::from_secs(30), stream.read_to_end(&mut raw))
        .await
        .expect("download timed out")
        .unwrap();

    let resp = parse_response(&raw);
    assert_eq!(resp.status, 200);
    assert_eq!(resp.header("Content-Length"), Some("16777216"));
    assert_eq!(resp.body.len(), data.len());
    assert!(resp.body == data);
    resp.assert_cors();

    server.stop().await.unwrap();
}

#[tokio::test]
async fn idle_connection_does_not_block_accept() {
    let root = TempRoot::new();
    let server = start(root.path());

    let _idle = TcpStream::connect(server.local_addr()).await.unwrap();
    let resp = request(server.local_addr(), "GET", "/assets/notes.txt").await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body_text(), "plain notes");

    tokio::time::timeout(TIMEOUT, server.stop())
        .await
        .expect("stop hung on idle connection")
        .unwrap();
}

#[tokio::test]
async fn stop_releases_port() {
    let root = TempRoot::new();
    let server = start(root.path());
    let addr = server.local_addr();

    assert_eq!(request(addr, "GET", "/").await.status, 200);

    tokio::time::timeout(TIMEOUT, server.stop())
        .await
        .expect("stop did not complete")
        .unwrap();

    assert!(TcpStream::connect(addr).await.is_err());
    let rebound = create_listener(addr).expect("port still held after stop");
    drop(rebound);
}

#[tokio::test]
async fn second_bind_on_same_port_fails() {
    let root = TempRoot::new();
    let server = start(root.path());

    let mut cfg = Config::default();
    cfg.server.host = "127.0.0.1".to_string();
    cfg.server.port = server.local_addr().port();
    let err = Server::bind(cfg).err().expect("second bind succeeded");
    assert_eq!(err.kind(), std::io::ErrorKind::AddrInUse);

    server.stop().await.unwrap();
}
