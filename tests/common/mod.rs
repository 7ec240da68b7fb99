//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use webrelay::config::ProxyConfig;
use webrelay::http::HttpServer;
use webrelay::lifecycle::Shutdown;
use webrelay::RelayExecutor;

/// A request as seen by the mock upstream.
#[derive(Debug, Clone)]
pub struct MockRequest {
    pub method: String,
    pub target: String,
    /// Header names are lowercased.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl MockRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// What the mock upstream sends back.
pub enum MockReply {
    Full {
        status: u16,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    },
    /// Chunked body that never ends.
    Endless,
    /// Announce `declared` body bytes, write only `sent`, then hang up.
    Truncated { declared: usize, sent: usize },
    /// Never answer.
    Stall,
}

impl MockReply {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::status(200, body)
    }

    pub fn status(status: u16, body: impl Into<Vec<u8>>) -> Self {
        MockReply::Full {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn redirect(location: &str) -> Self {
        Self::status(302, Vec::new()).with_header("location", location)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let MockReply::Full { headers, .. } = &mut self {
            headers.push((name.to_string(), value.to_string()));
        }
        self
    }
}

/// Handle to a running mock upstream.
pub struct MockUpstream {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<MockRequest>>>,
}

impl MockUpstream {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn requests(&self) -> Vec<MockRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> MockRequest {
        self.requests().pop().expect("upstream received no request")
    }
}

/// Start a programmable HTTP/1.1 upstream on an ephemeral port.
pub async fn start_upstream<F>(handler: F) -> MockUpstream
where
    F: Fn(&MockRequest) -> MockReply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let handler = Arc::new(handler);

    let recorded = requests.clone();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let handler = handler.clone();
                    let recorded = recorded.clone();
                    tokio::spawn(async move {
                        let _ = serve_connection(socket, handler, recorded).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    MockUpstream { addr, requests }
}

async fn serve_connection<F>(
    socket: TcpStream,
    handler: Arc<F>,
    recorded: Arc<Mutex<Vec<MockRequest>>>,
) -> std::io::Result<()>
where
    F: Fn(&MockRequest) -> MockReply + Send + Sync + 'static,
{
    let mut reader = BufReader::new(socket);

    while let Some(request) = read_request(&mut reader).await? {
        recorded.lock().unwrap().push(request.clone());

        match handler(&request) {
            MockReply::Full {
                status,
                headers,
                body,
            } => {
                let mut head = format!("HTTP/1.1 {} Mock\r\nContent-Length: {}\r\n", status, body.len());
                let mut close = false;
                for (name, value) in &headers {
                    if name.eq_ignore_ascii_case("connection") && value.contains("close") {
                        close = true;
                    }
                    head.push_str(&format!("{}: {}\r\n", name, value));
                }
                head.push_str("\r\n");

                let socket = reader.get_mut();
                socket.write_all(head.as_bytes()).await?;
                if request.method != "HEAD" {
                    socket.write_all(&body).await?;
                }
                socket.flush().await?;
                if close {
                    return socket.shutdown().await;
                }
            }
            MockReply::Endless => {
                let socket = reader.get_mut();
                socket
                    .write_all(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n")
                    .await?;
                let chunk = [b'x'; 1024];
                loop {
                    socket.write_all(b"400\r\n").await?;
                    socket.write_all(&chunk).await?;
                    socket.write_all(b"\r\n").await?;
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            }
            MockReply::Truncated { declared, sent } => {
                let socket = reader.get_mut();
                let head = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", declared);
                socket.write_all(head.as_bytes()).await?;
                socket.write_all(&vec![b'x'; sent]).await?;
                socket.flush().await?;
                return socket.shutdown().await;
            }
            MockReply::Stall => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                return Ok(());
            }
        }
    }
    Ok(())
}

async fn read_request(reader: &mut BufReader<TcpStream>) -> std::io::Result<Option<MockRequest>> {
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(None);
    }

    let mut parts = line.trim_end().splitn(3, ' ');
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();

    let mut headers = Vec::new();
    loop {
        line.clear();
        reader.read_line(&mut line).await?;
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            break;
        }
        if let Some((name, value)) = trimmed.split_once(':') {
            headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
        }
    }

    let mut request = MockRequest {
        method,
        target,
        headers,
        body: Vec::new(),
    };

    if request
        .header("transfer-encoding")
        .map(|v| v.contains("chunked"))
        .unwrap_or(false)
    {
        loop {
            line.clear();
            reader.read_line(&mut line).await?;
            let size = usize::from_str_radix(line.trim().split(';').next().unwrap_or("0"), 16).unwrap_or(0);
            if size == 0 {
                line.clear();
                reader.read_line(&mut line).await?;
                break;
            }
            let mut chunk = vec![0; size];
            reader.read_exact(&mut chunk).await?;
            request.body.extend_from_slice(&chunk);
            let mut crlf = [0; 2];
            reader.read_exact(&mut crlf).await?;
        }
    } else if let Some(len) = request.header("content-length").and_then(|v| v.parse::<usize>().ok()) {
        let mut body = vec![0; len];
        reader.read_exact(&mut body).await?;
        request.body = body;
    }

    Ok(Some(request))
}

/// Relay settings suited to tests: loopback bind and short deadlines.
pub fn test_config() -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.relay.timeout_secs = 2;
    config.relay.connect_timeout_secs = 1;
    config
}

/// Handle to a running relay.
pub struct TestRelay {
    pub addr: SocketAddr,
    pub executor: Arc<RelayExecutor>,
    pub shutdown: Shutdown,
}

impl TestRelay {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Start the relay on an ephemeral port.
pub async fn start_relay(config: ProxyConfig) -> TestRelay {
    let server = HttpServer::from_config(config).unwrap();
    let executor = server.executor();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    TestRelay {
        addr,
        executor,
        shutdown,
    }
}

/// Test client that talks to the relay directly and never follows redirects itself.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// Poll `check` until it holds or `timeout` elapses.
pub async fn eventually<F>(timeout: Duration, check: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
