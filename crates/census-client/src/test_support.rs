//! Minimal in-process HTTP/1.1 server for client tests.

use std::sync::Arc;
use std::time::Duration;

use census_core::HttpConfig;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
pub struct TestRequest {
    pub method: String,
    /// Path and query, as sent on the request line.
    pub target: String,
}

#[derive(Debug, Clone)]
pub struct TestResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub omit_length: bool,
}

impl TestResponse {
    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body,
            omit_length: false,
        }
    }

    pub fn json(value: serde_json::Value) -> Self {
        Self::ok(value.to_string().into_bytes()).with_header("Content-Type", "application/json")
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            ..Self::ok(Vec::new())
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Sends no `Content-Length`; the body ends when the connection closes.
    pub fn without_length(mut self) -> Self {
        self.omit_length = true;
        self
    }
}

/// HTTP settings that keep retry tests fast.
pub fn fast_http_config() -> HttpConfig {
    HttpConfig {
        timeout: Duration::from_secs(5),
        max_retries: 2,
        retry_base_delay: Duration::from_millis(1),
        ..HttpConfig::default()
    }
}

/// Starts a server on an ephemeral port and returns its base URL
/// (`http://127.0.0.1:PORT`, no trailing slash).
pub async fn serve<F>(handler: F) -> String
where
    F: Fn(TestRequest) -> TestResponse + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let handler = handler.clone();
            tokio::spawn(async move {
                let _ = handle_connection(socket, handler.as_ref()).await;
            });
        }
    });

    format!("http://{addr}")
}

async fn handle_connection<F>(mut socket: TcpStream, handler: &F) -> std::io::Result<()>
where
    F: Fn(TestRequest) -> TestResponse,
{
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        head.extend_from_slice(&buf[..n]);
    }

    let text = String::from_utf8_lossy(&head);
    let mut parts = text.lines().next().unwrap_or_default().split_whitespace();
    let request = TestRequest {
        method: parts.next().unwrap_or_default().to_string(),
        target: parts.next().unwrap_or_default().to_string(),
    };
    let is_head = request.method == "HEAD";
    let response = handler(request);

    let mut out = format!("HTTP/1.1 {} Test\r\nConnection: close\r\n", response.status);
    let has_length = response
        .headers
        .iter()
        .any(|(name, _)| name.eq_ignore_ascii_case("content-length"));
    for (name, value) in &response.headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    if !has_length && !response.omit_length {
        out.push_str(&format!("Content-Length: {}\r\n", response.body.len()));
    }
    out.push_str("\r\n");

    socket.write_all(out.as_bytes()).await?;
    if !is_head {
        socket.write_all(&response.body).await?;
    }
    socket.shutdown().await
}
