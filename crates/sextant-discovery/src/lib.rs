//! Finding MCP servers on the local network.
//!
//! Discovery is best-effort and fully separate from the protocol
//! engine: it probes a port window and reports candidates as
//! `(name, kind, address)` entries that convert into a
//! [`ServerConfig`] for connecting. Ports that refuse, time out, or
//! answer nonsense are logged at trace level and skipped; nothing
//! here returns an error.

use futures_util::future::join_all;
use sextant_client::{Endpoint, ServerConfig};
use sextant_proto::{Message, method};
use sextant_transport::SESSION_HEADER;
use std::fmt;
use std::time::Duration;
use tokio::net::TcpStream;

/// Port window MCP servers conventionally listen on.
pub const DEFAULT_PORT_FROM: u16 = 8810;
pub const DEFAULT_PORT_TO: u16 = 8820;

/// How long one TCP connect probe may take.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

const HTTP_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// How a discovered server expects to be spoken to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerKind {
    Tcp,
    Sse,
    StreamableHttp,
}

impl fmt::Display for ServerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerKind::Tcp => write!(f, "tcp"),
            ServerKind::Sse => write!(f, "sse"),
            ServerKind::StreamableHttp => write!(f, "http"),
        }
    }
}

/// One candidate server found by a probe.
#[derive(Debug, Clone)]
pub struct DiscoveredServer {
    pub name: String,
    pub kind: ServerKind,
    pub host: String,
    pub port: u16,
    pub description: String,
}

impl DiscoveredServer {
    fn tcp(host: &str, port: u16) -> Self {
        Self {
            name: format!("TCP Server on port {port}"),
            kind: ServerKind::Tcp,
            host: host.to_string(),
            port,
            description: format!("TCP MCP server at {host}:{port}"),
        }
    }

    fn sse(host: &str, port: u16) -> Self {
        Self {
            name: format!("SSE Server on port {port}"),
            kind: ServerKind::Sse,
            host: host.to_string(),
            port,
            description: format!("HTTP SSE MCP server at http://{host}:{port}/sse"),
        }
    }

    fn streamable(host: &str, port: u16) -> Self {
        Self {
            name: format!("Streaming Server on port {port}"),
            kind: ServerKind::StreamableHttp,
            host: host.to_string(),
            port,
            description: format!("Streamable HTTP MCP server at http://{host}:{port}/mcp"),
        }
    }

    /// Where to reach the server, in the form its transport expects.
    pub fn address(&self) -> String {
        match self.kind {
            ServerKind::Tcp => format!("{}:{}", self.host, self.port),
            ServerKind::Sse => format!("http://{}:{}/sse", self.host, self.port),
            ServerKind::StreamableHttp => format!("http://{}:{}/mcp", self.host, self.port),
        }
    }

    /// Endpoint settings a [`sextant_client::Client`] can connect with.
    pub fn server_config(&self) -> ServerConfig {
        let endpoint = match self.kind {
            ServerKind::Tcp => Endpoint::Tcp {
                host: self.host.clone(),
                port: self.port,
            },
            ServerKind::Sse => Endpoint::Sse {
                base_url: format!("http://{}:{}", self.host, self.port),
                events_path: "/sse".to_string(),
            },
            ServerKind::StreamableHttp => Endpoint::Http {
                base_url: format!("http://{}:{}", self.host, self.port),
                path: "/mcp".to_string(),
            },
        };
        ServerConfig::new(endpoint)
    }
}

/// Probe every port in `from..=to` with a concurrent TCP connect. An
/// accepted connection marks the port as a candidate; it is closed
/// again immediately.
pub async fn scan_tcp(host: &str, from: u16, to: u16, per_port: Duration) -> Vec<DiscoveredServer> {
    let probes = (from..=to).map(|port| async move {
        let target = format!("{host}:{port}");
        match tokio::time::timeout(per_port, TcpStream::connect(&target)).await {
            Ok(Ok(_stream)) => Some(DiscoveredServer::tcp(host, port)),
            Ok(Err(e)) => {
                tracing::trace!(%target, "port closed: {e}");
                None
            }
            Err(_) => {
                tracing::trace!(%target, "port probe timed out");
                None
            }
        }
    });
    join_all(probes).await.into_iter().flatten().collect()
}

/// Probe every port in `from..=to` for the two HTTP flavors: a GET on
/// `/sse` that answers with an event stream, and a POST of a JSON-RPC
/// ping on `/mcp` that answers like an MCP endpoint.
pub async fn probe_http(host: &str, from: u16, to: u16) -> Vec<DiscoveredServer> {
    let http = match reqwest::Client::builder()
        .connect_timeout(DEFAULT_PROBE_TIMEOUT)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!("building http probe client: {e}");
            return Vec::new();
        }
    };

    let probes = (from..=to).map(|port| {
        let http = http.clone();
        async move {
            let mut found = Vec::new();
            if probe_sse(&http, host, port).await {
                found.push(DiscoveredServer::sse(host, port));
            }
            if probe_streamable(&http, host, port).await {
                found.push(DiscoveredServer::streamable(host, port));
            }
            found
        }
    });
    join_all(probes).await.into_iter().flatten().collect()
}

/// Run both probe families over the default port window.
pub async fn discover_all(host: &str) -> Vec<DiscoveredServer> {
    let mut servers = scan_tcp(
        host,
        DEFAULT_PORT_FROM,
        DEFAULT_PORT_TO,
        DEFAULT_PROBE_TIMEOUT,
    )
    .await;
    servers.extend(probe_http(host, DEFAULT_PORT_FROM, DEFAULT_PORT_TO).await);
    tracing::debug!(count = servers.len(), %host, "discovery finished");
    servers
}

async fn probe_sse(http: &reqwest::Client, host: &str, port: u16) -> bool {
    let url = format!("http://{host}:{port}/sse");
    let response = match http
        .get(&url)
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .timeout(HTTP_PROBE_TIMEOUT)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            tracing::trace!(%url, "sse probe failed: {e}");
            return false;
        }
    };
    // the stream body is never read; headers are enough to classify
    response.status().is_success() && content_type(&response).contains("text/event-stream")
}

async fn probe_streamable(http: &reqwest::Client, host: &str, port: u16) -> bool {
    let url = format!("http://{host}:{port}/mcp");
    let ping = Message::request(1, method::PING, None);
    let response = match http
        .post(&url)
        .header(reqwest::header::ACCEPT, "application/json, text/event-stream")
        .json(&ping)
        .timeout(HTTP_PROBE_TIMEOUT)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            tracing::trace!(%url, "streamable probe failed: {e}");
            return false;
        }
    };
    if !response.status().is_success() {
        return false;
    }
    if response.headers().contains_key(SESSION_HEADER) {
        return true;
    }
    if content_type(&response).contains("text/event-stream") {
        return true;
    }
    match response.text().await {
        Ok(body) => Message::decode(&body).is_ok(),
        Err(e) => {
            tracing::trace!(%url, "streamable probe body: {e}");
            false
        }
    }
}

fn content_type(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    enum Canned {
        Sse,
        SessionJson(&'static str),
        NotFound,
    }

    fn bind_port() -> std::net::TcpListener {
        std::net::TcpListener::bind("127.0.0.1:0").unwrap()
    }

    /// Serve canned HTTP responses chosen by (method, path).
    async fn spawn_probe_server(pick: fn(&str, &str) -> Canned) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(handle_connection(stream, pick));
            }
        });
        port
    }

    async fn handle_connection(stream: tokio::net::TcpStream, pick: fn(&str, &str) -> Canned) {
        let (read, mut write) = stream.into_split();
        let mut reader = BufReader::new(read);
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                return;
            }
            let mut parts = line.split_whitespace();
            let method = parts.next().unwrap_or_default().to_string();
            let path = parts.next().unwrap_or_default().to_string();

            let mut content_length = 0usize;
            loop {
                let mut header = String::new();
                if reader.read_line(&mut header).await.unwrap_or(0) == 0 {
                    return;
                }
                let header = header.trim();
                if header.is_empty() {
                    break;
                }
                if let Some(value) = header.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap_or(0);
                }
            }
            if content_length > 0 {
                let mut body = vec![0u8; content_length];
                reader.read_exact(&mut body).await.unwrap();
            }

            match pick(&method, &path) {
                Canned::Sse => {
                    write
                        .write_all(
                            b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\n\r\ndata: ok\n\n",
                        )
                        .await
                        .unwrap();
                    write.flush().await.unwrap();
                    // hold the stream open briefly, like a real SSE endpoint
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    return;
                }
                Canned::SessionJson(body) => {
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n{SESSION_HEADER}: probe-1\r\ncontent-length: {}\r\n\r\n{body}",
                        body.len(),
                    );
                    write.write_all(response.as_bytes()).await.unwrap();
                }
                Canned::NotFound => {
                    write
                        .write_all(b"HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\n\r\n")
                        .await
                        .unwrap();
                }
            }
            write.flush().await.unwrap();
        }
    }

    #[tokio::test]
    async fn scan_finds_an_open_port_and_skips_closed_ones() {
        let open = bind_port();
        let open_port = open.local_addr().unwrap().port();
        let closed = bind_port();
        let closed_port = closed.local_addr().unwrap().port();
        drop(closed);

        let found = scan_tcp("127.0.0.1", open_port, open_port, DEFAULT_PROBE_TIMEOUT).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, ServerKind::Tcp);
        assert_eq!(found[0].address(), format!("127.0.0.1:{open_port}"));
        assert!(found[0].name.contains("TCP"));

        let none = scan_tcp("127.0.0.1", closed_port, closed_port, DEFAULT_PROBE_TIMEOUT).await;
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn probe_classifies_an_sse_server() {
        let port = spawn_probe_server(|method, path| match (method, path) {
            ("GET", "/sse") => Canned::Sse,
            _ => Canned::NotFound,
        })
        .await;

        let found = probe_http("127.0.0.1", port, port).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, ServerKind::Sse);
        assert!(found[0].name.contains("SSE"));
        assert_eq!(found[0].address(), format!("http://127.0.0.1:{port}/sse"));
    }

    #[tokio::test]
    async fn probe_classifies_a_streamable_server() {
        let port = spawn_probe_server(|method, path| match (method, path) {
            ("POST", "/mcp") => Canned::SessionJson(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#),
            _ => Canned::NotFound,
        })
        .await;

        let found = probe_http("127.0.0.1", port, port).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, ServerKind::StreamableHttp);
        assert!(found[0].name.contains("Streaming"));
    }

    #[tokio::test]
    async fn probing_a_dead_port_finds_nothing() {
        let listener = bind_port();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let found = probe_http("127.0.0.1", port, port).await;
        assert!(found.is_empty());
    }

    #[test]
    fn discovered_servers_convert_to_endpoints() {
        let tcp = DiscoveredServer::tcp("localhost", 8811);
        match tcp.server_config().endpoint {
            Endpoint::Tcp { host, port } => {
                assert_eq!(host, "localhost");
                assert_eq!(port, 8811);
            }
            other => panic!("expected tcp endpoint, got {other:?}"),
        }

        let sse = DiscoveredServer::sse("localhost", 8812);
        match sse.server_config().endpoint {
            Endpoint::Sse {
                base_url,
                events_path,
            } => {
                assert_eq!(base_url, "http://localhost:8812");
                assert_eq!(events_path, "/sse");
            }
            other => panic!("expected sse endpoint, got {other:?}"),
        }

        let streaming = DiscoveredServer::streamable("localhost", 8813);
        match streaming.server_config().endpoint {
            Endpoint::Http { base_url, path } => {
                assert_eq!(base_url, "http://localhost:8813");
                assert_eq!(path, "/mcp");
            }
            other => panic!("expected http endpoint, got {other:?}"),
        }
    }
}
