//! Incremental Server-Sent Events decoding.
//!
//! Events arrive as arbitrary byte chunks; [`SseDecoder`] reassembles
//! them line by line. Lines may end in `\n` or `\r\n`, `data:` lines
//! accumulate until a blank line dispatches the event, `:` comments and
//! `id:`/`retry:` fields are skipped.

use crate::error::TransportError;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;

/// One decoded SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field, if the server set one.
    pub event: Option<String>,
    /// All `data:` lines of the event, joined with `\n`.
    pub data: String,
}

/// Stateful decoder fed with text chunks as they come off the wire.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
    pending_event: Option<String>,
    pending_data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk, returning every event it completed.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let mut line: String = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    events.push(event);
                }
            } else {
                self.field(&line);
            }
        }
        events
    }

    fn field(&mut self, line: &str) {
        if line.starts_with(':') {
            return;
        }
        let (name, value) = match line.split_once(':') {
            Some((name, value)) => (name, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match name {
            "event" => self.pending_event = Some(value.to_string()),
            "data" => self.pending_data.push(value.to_string()),
            // id and retry don't matter to a request/response client
            _ => {}
        }
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.pending_event.take();
        if self.pending_data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.pending_data).join("\n");
        Some(SseEvent { event, data })
    }
}

/// First `data` payload of an SSE-framed body that is already fully in
/// memory, as the streamable HTTP transport sees for single responses.
pub fn first_event_data(body: &str) -> Option<String> {
    let mut decoder = SseDecoder::new();
    let mut events = decoder.feed(body);
    if events.is_empty() {
        // tolerate bodies that omit the final blank line
        events = decoder.feed("\n\n");
    }
    events.into_iter().map(|e| e.data).find(|d| !d.trim().is_empty())
}

/// Pull-based reader over a live `text/event-stream` response.
pub struct EventStreamReader {
    stream: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    decoder: SseDecoder,
    ready: VecDeque<SseEvent>,
}

impl EventStreamReader {
    pub fn new(response: reqwest::Response) -> Self {
        Self {
            stream: Box::pin(response.bytes_stream()),
            decoder: SseDecoder::new(),
            ready: VecDeque::new(),
        }
    }

    /// Next complete event. [`TransportError::Closed`] once the server
    /// ends the stream.
    pub async fn next_event(&mut self) -> Result<SseEvent, TransportError> {
        loop {
            if let Some(event) = self.ready.pop_front() {
                return Ok(event);
            }
            match self.stream.next().await {
                Some(Ok(bytes)) => {
                    let text = String::from_utf8_lossy(&bytes);
                    self.ready.extend(self.decoder.feed(&text));
                }
                Some(Err(e)) => return Err(TransportError::Http(e)),
                None => return Err(TransportError::Closed),
            }
        }
    }
}
