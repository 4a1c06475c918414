//! High-level MCP client: connection lifecycle, the initialize
//! handshake, and the tool/resource/prompt operations, over any
//! [`sextant_transport::Transport`].
//!
//! ```no_run
//! use sextant_client::Client;
//! use sextant_transport::TcpTransport;
//!
//! # async fn run() -> Result<(), sextant_client::ClientError> {
//! let client = Client::new(TcpTransport::new("127.0.0.1", 8811));
//! client.connect().await?;
//! let server = client.initialize().await?;
//! println!("connected to {} {}", server.name, server.version);
//! for tool in client.list_tools().await? {
//!     println!("  {}", tool.name);
//! }
//! client.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;

pub use client::{Client, ClientConfig};
pub use config::{Endpoint, ServerBook, ServerConfig};
pub use error::{ClientError, ConfigError};
