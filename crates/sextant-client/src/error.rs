//! Client-level error taxonomy.

use sextant_proto::ParseError;
use sextant_transport::TransportError;
use thiserror::Error;

/// Everything an operation on [`crate::Client`] can fail with.
///
/// The distinction that matters to callers: [`ClientError::Rpc`] means
/// the server answered and said no; everything else means the exchange
/// itself broke down.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The connection failed, died mid-flight, or refused to establish.
    #[error("connection error: {0}")]
    Connection(String),

    /// The server answered with a JSON-RPC error object.
    #[error("server error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The exchange broke the protocol's rules (missing result, session
    /// violations, handshake misuse).
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A payload could not be decoded into its typed shape.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// No response arrived within the configured deadline.
    #[error("{method} timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },

    /// An operation that needs the handshake ran before `initialize`.
    #[error("client is not initialized; call initialize() first")]
    NotInitialized,

    /// An operation ran before `connect`, or the connection is gone.
    #[error("client is not connected")]
    NotConnected,
}

impl From<TransportError> for ClientError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Encode(parse) => Self::Parse(parse),
            TransportError::Session(reason) => Self::Protocol(reason),
            TransportError::NotConnected => Self::NotConnected,
            other => Self::Connection(other.to_string()),
        }
    }
}

/// Failures loading or resolving the TOML server book.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("no server named {name:?} (known: {known})")]
    UnknownServer { name: String, known: String },
}
