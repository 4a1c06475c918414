//! HTTP+SSE transport.
//!
//! The session dance, in order:
//!
//! 1. `connect` is local-only; no bytes move yet.
//! 2. The first `send` must carry the `initialize` request. It opens a
//!    GET to the events URL, and the first event on that stream names
//!    the session's POST endpoint (e.g. `/messages?sessionId=abc`).
//! 3. That first message, and every later one, is POSTed to the session
//!    endpoint. Response bodies that carry a message are queued for
//!    `receive`; everything else arrives over the retained event stream.
//!
//! Sending anything else first is a session violation: without the
//! handshake there is no endpoint to POST to.
//!
//! Requests are not bounded here; callers apply their own deadlines
//! (the engine wraps every operation in its configured timeout).

use crate::error::TransportError;
use crate::sse_stream::EventStreamReader;
use crate::{Transport, TransportFuture};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use sextant_proto::{Message, method};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use url::Url;

/// Messages pushed by the server over the retained event stream, or the
/// error that ended it.
type StreamItem = Result<Message, TransportError>;

#[derive(Debug)]
pub struct SseTransport {
    base_url: Url,
    events_url: Url,
    http: reqwest::Client,
    connected: AtomicBool,
    /// Session POST endpoint; `None` until the handshake GET succeeds.
    /// Held across each send, which also serializes concurrent senders.
    endpoint: Mutex<Option<Url>>,
    response_tx: Mutex<Option<UnboundedSender<Message>>>,
    responses: Mutex<Option<UnboundedReceiver<Message>>>,
    event_tx: Mutex<Option<UnboundedSender<StreamItem>>>,
    events: Mutex<Option<UnboundedReceiver<StreamItem>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl SseTransport {
    /// Transport against `base_url` with the conventional `/sse` events
    /// path.
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        Self::with_events_path(base_url, "/sse")
    }

    pub fn with_events_path(base_url: &str, events_path: &str) -> Result<Self, TransportError> {
        let base = parse_url(base_url)?;
        let events_url = join_url(&base, events_path)?;
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            base_url: base,
            events_url,
            http,
            connected: AtomicBool::new(false),
            endpoint: Mutex::new(None),
            response_tx: Mutex::new(None),
            responses: Mutex::new(None),
            event_tx: Mutex::new(None),
            events: Mutex::new(None),
            pump: Mutex::new(None),
        })
    }

    /// Arm the transport. The handshake GET is deferred to the first
    /// send so that connect itself stays cheap and cannot half-open a
    /// session.
    pub async fn connect(&self) -> Result<(), TransportError> {
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }
        let (response_tx, responses) = unbounded_channel();
        let (event_tx, events) = unbounded_channel();
        *self.response_tx.lock().await = Some(response_tx);
        *self.responses.lock().await = Some(responses);
        *self.event_tx.lock().await = Some(event_tx);
        *self.events.lock().await = Some(events);
        *self.endpoint.lock().await = None;
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub async fn send(&self, message: &Message) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }

        let mut endpoint = self.endpoint.lock().await;
        if endpoint.is_none() {
            if message.method.as_deref() != Some(method::INITIALIZE) {
                return Err(TransportError::Session(format!(
                    "first message must be {:?} to establish the session, got {:?}",
                    method::INITIALIZE,
                    message.method.as_deref().unwrap_or("<response>"),
                )));
            }
            *endpoint = Some(self.open_event_stream().await?);
        }
        let Some(target) = endpoint.clone() else {
            return Err(TransportError::Session("session endpoint missing".into()));
        };

        let response = self
            .http
            .post(target)
            .header(CONTENT_TYPE, "application/json")
            .json(message)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        if message.id.is_none() {
            // notification: nothing to correlate, ignore the body
            return Ok(());
        }

        let body = response.text().await?;
        let body = body.trim();
        if body.is_empty() {
            // response will arrive over the event stream instead
            return Ok(());
        }
        let reply = Message::decode(body)?;
        if let Some(tx) = self.response_tx.lock().await.as_ref() {
            let _ = tx.send(reply);
        }
        Ok(())
    }

    /// Open the event stream and read the session endpoint from its
    /// first event. Spawns the pump that forwards later events.
    async fn open_event_stream(&self) -> Result<Url, TransportError> {
        let response = self
            .http
            .get(self.events_url.clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let mut reader = EventStreamReader::new(response);
        let first = reader.next_event().await?;
        let reference = first.data.trim();
        if reference.is_empty() {
            return Err(TransportError::Session(
                "event stream sent no session endpoint".into(),
            ));
        }
        let endpoint = join_url(&self.base_url, reference)?;
        tracing::debug!(%endpoint, "sse session established");

        let Some(event_tx) = self.event_tx.lock().await.clone() else {
            return Err(TransportError::NotConnected);
        };
        let handle = tokio::spawn(async move {
            loop {
                match reader.next_event().await {
                    Ok(event) => {
                        let data = event.data.trim();
                        if data.is_empty() {
                            continue;
                        }
                        match Message::decode(data) {
                            Ok(message) => {
                                if event_tx.send(Ok(message)).is_err() {
                                    break;
                                }
                            }
                            Err(e) => tracing::warn!("skipping undecodable event: {e}"),
                        }
                    }
                    Err(e) => {
                        let _ = event_tx.send(Err(e));
                        break;
                    }
                }
            }
        });
        *self.pump.lock().await = Some(handle);
        Ok(endpoint)
    }

    /// Next inbound message. POST-buffered responses win over event
    /// stream traffic when both are ready.
    pub async fn receive(&self) -> Result<Message, TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        let mut responses = self.responses.lock().await;
        let Some(response_rx) = responses.as_mut() else {
            return Err(TransportError::NotConnected);
        };
        let mut events = self.events.lock().await;
        let Some(event_rx) = events.as_mut() else {
            return Err(TransportError::NotConnected);
        };

        if let Ok(message) = response_rx.try_recv() {
            return Ok(message);
        }
        tokio::select! {
            biased;
            buffered = response_rx.recv() => match buffered {
                Some(message) => Ok(message),
                None => Err(TransportError::Closed),
            },
            pushed = event_rx.recv() => match pushed {
                Some(Ok(message)) => Ok(message),
                Some(Err(e)) => {
                    self.connected.store(false, Ordering::SeqCst);
                    Err(e)
                }
                None => Err(TransportError::Closed),
            },
        }
    }

    /// Tear down the session. Dropping the response sender wakes a
    /// blocked receive with `Closed`.
    pub async fn close(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(pump) = self.pump.lock().await.take() {
            pump.abort();
        }
        *self.response_tx.lock().await = None;
        *self.event_tx.lock().await = None;
        *self.endpoint.lock().await = None;
        Ok(())
    }
}

impl Transport for SseTransport {
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
        format!("sse:{}", self.events_url)
    }
}

fn parse_url(raw: &str) -> Result<Url, TransportError> {
    Url::parse(raw).map_err(|e| TransportError::Endpoint {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}

fn join_url(base: &Url, reference: &str) -> Result<Url, TransportError> {
    base.join(reference).map_err(|e| TransportError::Endpoint {
        url: reference.to_string(),
        reason: e.to_string(),
    })
}
