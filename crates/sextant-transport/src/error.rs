//! Transport-level error taxonomy.

use sextant_proto::ParseError;
use thiserror::Error;

/// Anything that can go wrong below the protocol engine.
///
/// The engine treats most of these as fatal for the connection; the
/// variants exist so logs and callers can tell an endpoint typo from a
/// peer that hung up.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Establishing the underlying connection failed.
    #[error("connect to {target} failed: {source}")]
    Connect {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// The server child process could not be started.
    #[error("failed to spawn {command:?}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// An operation was attempted before `connect` (or after `close`).
    #[error("transport is not connected")]
    NotConnected,

    /// The peer ended the conversation: EOF, closed socket, process exit,
    /// or an exhausted event stream.
    #[error("connection closed by peer")]
    Closed,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success HTTP status.
    #[error("server returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// A URL could not be parsed or joined.
    #[error("invalid endpoint {url:?}: {reason}")]
    Endpoint { url: String, reason: String },

    /// The transport's session rules were broken, e.g. sending over
    /// HTTP+SSE before the handshake establishes the session endpoint.
    #[error("session violation: {0}")]
    Session(String),

    /// A message could not be encoded, or a response body that had to be
    /// a message could not be decoded.
    #[error(transparent)]
    Encode(#[from] ParseError),
}
