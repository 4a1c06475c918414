//! Streamable HTTP transport.
//!
//! Every message is POSTed to one endpoint. The server hands out a
//! session token in the `mcp-session-id` response header (in practice on
//! the handshake reply); once seen, the token rides along on every later
//! request. Response bodies come back as plain JSON or as a short
//! SSE-framed body, and are queued for `receive`. A `202 Accepted`
//! acknowledges a notification and carries nothing.
//!
//! Requests are not bounded here; callers apply their own deadlines.

use crate::error::TransportError;
use crate::sse_stream::first_event_data;
use crate::{Transport, TransportFuture};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use sextant_proto::Message;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use url::Url;

/// Header carrying the session token.
pub const SESSION_HEADER: &str = "mcp-session-id";

pub struct StreamableHttpTransport {
    endpoint: Url,
    http: reqwest::Client,
    connected: AtomicBool,
    session: Mutex<Option<String>>,
    inbound_tx: Mutex<Option<UnboundedSender<Message>>>,
    inbound: Mutex<Option<UnboundedReceiver<Message>>>,
}

impl StreamableHttpTransport {
    /// Transport against `base_url` with the conventional `/mcp` path.
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        Self::with_path(base_url, "/mcp")
    }

    pub fn with_path(base_url: &str, path: &str) -> Result<Self, TransportError> {
        let base = Url::parse(base_url).map_err(|e| TransportError::Endpoint {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        let endpoint = base.join(path).map_err(|e| TransportError::Endpoint {
            url: path.to_string(),
            reason: e.to_string(),
        })?;
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            endpoint,
            http,
            connected: AtomicBool::new(false),
            session: Mutex::new(None),
            inbound_tx: Mutex::new(None),
            inbound: Mutex::new(None),
        })
    }

    /// Local-only arming; the server is first contacted by `send`.
    pub async fn connect(&self) -> Result<(), TransportError> {
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }
        let (tx, rx) = unbounded_channel();
        *self.inbound_tx.lock().await = Some(tx);
        *self.inbound.lock().await = Some(rx);
        *self.session.lock().await = None;
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub async fn send(&self, message: &Message) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }

        let mut request = self
            .http
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json, text/event-stream")
            .json(message);
        if let Some(session) = self.session.lock().await.clone() {
            request = request.header(SESSION_HEADER, session);
        }

        let response = request.send().await?;

        // the token can appear on any response; keep the latest
        let token = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if let Some(token) = token {
            let mut session = self.session.lock().await;
            if session.as_deref() != Some(token.as_str()) {
                tracing::debug!("streamable http session established");
                *session = Some(token);
            }
        }

        let status = response.status();
        if status == StatusCode::ACCEPTED {
            return Ok(());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response.text().await?;
        let body = body.trim();
        if body.is_empty() {
            return Ok(());
        }
        let payload = if content_type.starts_with("text/event-stream") {
            match first_event_data(body) {
                Some(data) => data,
                None => return Ok(()),
            }
        } else {
            body.to_string()
        };

        let reply = Message::decode(&payload)?;
        if let Some(tx) = self.inbound_tx.lock().await.as_ref() {
            let _ = tx.send(reply);
        }
        Ok(())
    }

    /// Next queued message. Blocks until a send produces one, and fails
    /// with `Closed` once the transport shuts down.
    pub async fn receive(&self) -> Result<Message, TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        let mut inbound = self.inbound.lock().await;
        let Some(rx) = inbound.as_mut() else {
            return Err(TransportError::NotConnected);
        };
        match rx.recv().await {
            Some(message) => Ok(message),
            None => Err(TransportError::Closed),
        }
    }

    /// Forget the session. Dropping the queue sender wakes a blocked
    /// receive with `Closed`.
    pub async fn close(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        *self.inbound_tx.lock().await = None;
        *self.session.lock().await = None;
        Ok(())
    }

    /// Session token most recently issued by the server.
    pub async fn session_id(&self) -> Option<String> {
        self.session.lock().await.clone()
    }
}

impl Transport for StreamableHttpTransport {
    fn connect(&self) -> TransportFuture<'_, Result<(), TransportError>> {
        Box::pin(self.connect())
    }

    fn send<'a>(&'a self, message: &'a Message) -> TransportFuture<'a, Result<(), TransportError>> {
        Box::pin(self.send(message))
    }

    fn receive(&self) -> TransportFuture<'_, Result<Message, TransportError>> {
        Box::pin(self.receive())
    }

    fn close(&self) -> TransportFuture<'_, Result<(), TransportError>> {
        Box::pin(self.close())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn describe(&self) -> String {
        format!("http:{}", self.endpoint)
    }
}
