//! TOML server book: named endpoints the client can dial.
//!
//! ```toml
//! [servers.math]
//! transport = "tcp"
//! host = "localhost"
//! port = 8811
//!
//! [servers.files]
//! transport = "stdio"
//! command = "npx"
//! args = ["-y", "@modelcontextprotocol/server-filesystem", "/tmp"]
//! timeout_ms = 10000
//! ```

use crate::error::{ClientError, ConfigError};
use serde::{Deserialize, Serialize};
use sextant_transport::{
    SseTransport, StdioTransport, StreamableHttpTransport, TcpTransport, Transport,
    WebSocketTransport,
};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Where and how to reach one server. The `transport` field picks the
/// variant; the remaining fields are that transport's address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum Endpoint {
    Tcp {
        host: String,
        port: u16,
    },
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    Websocket {
        url: String,
    },
    Sse {
        base_url: String,
        #[serde(default = "default_events_path")]
        events_path: String,
    },
    Http {
        base_url: String,
        #[serde(default = "default_http_path")]
        path: String,
    },
}

fn default_events_path() -> String {
    "/sse".to_string()
}

fn default_http_path() -> String {
    "/mcp".to_string()
}

fn default_timeout() -> u64 {
    30_000
}

/// One configured server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(flatten)]
    pub endpoint: Endpoint,
    /// Per-operation deadline in milliseconds.
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

impl ServerConfig {
    /// An endpoint with the default deadline.
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            timeout_ms: default_timeout(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Construct the transport this endpoint describes. Fails only for
    /// endpoints whose URL cannot be parsed; no I/O happens here.
    pub fn build_transport(&self) -> Result<Box<dyn Transport>, ClientError> {
        let transport: Box<dyn Transport> = match &self.endpoint {
            Endpoint::Tcp { host, port } => Box::new(TcpTransport::new(host.clone(), *port)),
            Endpoint::Stdio { command, args, env } => Box::new(StdioTransport::with_env(
                command.clone(),
                args.clone(),
                env.clone(),
            )),
            Endpoint::Websocket { url } => Box::new(WebSocketTransport::new(url.clone())),
            Endpoint::Sse {
                base_url,
                events_path,
            } => Box::new(SseTransport::with_events_path(base_url, events_path)?),
            Endpoint::Http { base_url, path } => {
                Box::new(StreamableHttpTransport::with_path(base_url, path)?)
            }
        };
        Ok(transport)
    }
}

/// The full config file: a map of server name to endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerBook {
    #[serde(default)]
    pub servers: HashMap<String, ServerConfig>,
}

impl ServerBook {
    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml(&raw).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            source: e,
        })
    }

    pub fn get(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.get(name)
    }

    /// Like [`ServerBook::get`], but an error that names the known
    /// servers when the lookup misses.
    pub fn require(&self, name: &str) -> Result<&ServerConfig, ConfigError> {
        self.get(name).ok_or_else(|| {
            let mut known: Vec<_> = self.servers.keys().cloned().collect();
            known.sort();
            ConfigError::UnknownServer {
                name: name.to_string(),
                known: if known.is_empty() {
                    "none".to_string()
                } else {
                    known.join(", ")
                },
            }
        })
    }
}
