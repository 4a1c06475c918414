//! Hand-rolled HTTP/1.1 plumbing for transport tests.
//!
//! Real dependencies stay out of the dev graph; the HTTP the transports
//! emit is simple enough to parse with a buffered reader.

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

pub struct Request {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Request {
    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Parse one request off the connection. `None` on EOF or a request the
/// parser does not understand.
pub async fn read_request(stream: &mut BufReader<TcpStream>) -> Option<Request> {
    let mut line = String::new();
    if stream.read_line(&mut line).await.ok()? == 0 {
        return None;
    }
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();

    let mut headers = Vec::new();
    let mut content_length = 0usize;
    loop {
        let mut header = String::new();
        stream.read_line(&mut header).await.ok()?;
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        let (name, value) = header.split_once(':')?;
        let name = name.trim().to_ascii_lowercase();
        let value = value.trim().to_string();
        if name == "content-length" {
            content_length = value.parse().unwrap_or(0);
        }
        headers.push((name, value));
    }

    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        stream.read_exact(&mut body).await.ok()?;
    }
    Some(Request {
        method,
        path,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

/// Write a JSON response with a correct content-length, keeping the
/// connection open for the next request.
pub async fn write_json(
    stream: &mut BufReader<TcpStream>,
    status: &str,
    extra_headers: &[(&str, &str)],
    body: &str,
) {
    let mut response = format!(
        "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\n",
        body.len()
    );
    for (name, value) in extra_headers {
        response.push_str(&format!("{name}: {value}\r\n"));
    }
    response.push_str("\r\n");
    response.push_str(body);
    let _ = stream.get_mut().write_all(response.as_bytes()).await;
    let _ = stream.get_mut().flush().await;
}

/// Start a `text/event-stream` response. The body is then written with
/// [`write_sse_event`] until the connection drops.
pub async fn write_sse_headers(stream: &mut BufReader<TcpStream>) {
    let headers =
        "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncache-control: no-cache\r\n\r\n";
    let _ = stream.get_mut().write_all(headers.as_bytes()).await;
    let _ = stream.get_mut().flush().await;
}

pub async fn write_sse_event(stream: &mut BufReader<TcpStream>, data: &str) {
    let event = format!("data: {data}\n\n");
    let _ = stream.get_mut().write_all(event.as_bytes()).await;
    let _ = stream.get_mut().flush().await;
}
