//! Pluggable wire transports for the MCP client engine.
//!
//! Every transport moves encoded [`Message`]s and nothing else: no
//! correlation, no handshake tracking, no protocol knowledge beyond what
//! its framing forces on it (the HTTP transports must peek at the session
//! dance). The engine above owns ids, matching, and timeouts.
//!
//! Five transports are provided:
//!
//! | type                        | wire                                        |
//! |-----------------------------|---------------------------------------------|
//! | [`TcpTransport`]            | newline-delimited JSON over a socket        |
//! | [`StdioTransport`]          | newline-delimited JSON over child pipes     |
//! | [`WebSocketTransport`]      | one message per text frame                  |
//! | [`SseTransport`]            | HTTP POST + retained `text/event-stream`    |
//! | [`StreamableHttpTransport`] | HTTP POST with `mcp-session-id` header      |

use sextant_proto::Message;
use std::future::Future;
use std::pin::Pin;

pub mod error;
pub mod sse;
pub(crate) mod sse_stream;
pub mod stdio;
pub mod streamable;
pub mod tcp;
pub mod ws;

#[cfg(test)]
pub(crate) mod testserver;

pub use error::TransportError;
pub use sse::SseTransport;
pub use stdio::StdioTransport;
pub use streamable::{SESSION_HEADER, StreamableHttpTransport};
pub use tcp::TcpTransport;
pub use ws::WebSocketTransport;

/// Boxed future returned by [`Transport`] methods, so the trait stays
/// dyn-compatible.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A bidirectional message pipe to one MCP server.
///
/// Dyn-compatible so the engine works with `Box<dyn Transport>`; each
/// implementation also exposes the same methods as inherent `async fn`s.
///
/// Contract:
/// - `send` and `receive` fail with [`TransportError::NotConnected`]
///   before `connect` or after `close`.
/// - `receive` blocks until a message arrives and returns
///   [`TransportError::Closed`] once the peer is gone. It is meant to be
///   driven by a single reader task.
/// - `close` is idempotent and releases owned resources (sockets, child
///   processes, event streams).
pub trait Transport: Send + Sync {
    fn connect(&self) -> TransportFuture<'_, Result<(), TransportError>>;

    fn send<'a>(&'a self, message: &'a Message) -> TransportFuture<'a, Result<(), TransportError>>;

    fn receive(&self) -> TransportFuture<'_, Result<Message, TransportError>>;

    fn close(&self) -> TransportFuture<'_, Result<(), TransportError>>;

    /// Cheap liveness snapshot. `true` means the transport has not yet
    /// observed the connection die; it is not a probe.
    fn is_connected(&self) -> bool;

    /// Endpoint description for logs, e.g. `tcp://localhost:8811`.
    fn describe(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn transport_is_dyn_compatible() {
        // Compile-time check: Transport can be used as a trait object.
        fn _accept(_t: &dyn Transport) {}
        fn _boxed(_t: Box<dyn Transport>) {}
    }

    #[test]
    fn arc_transport_is_send_sync() {
        // Compile-time assert: Arc<dyn Transport> is Send + Sync.
        fn _assert_send_sync<T: Send + Sync>() {}
        _assert_send_sync::<Arc<dyn Transport>>();
    }
}
