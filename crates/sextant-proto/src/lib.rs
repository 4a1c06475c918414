//! JSON-RPC 2.0 message model and MCP payload types.
//!
//! This crate is the wire vocabulary shared by every transport and by the
//! client engine: the [`Message`] envelope, the typed payloads exchanged
//! during the handshake and the tool/resource/prompt operations, and the
//! validation rules for server-advertised metadata.
//!
//! Nothing here performs I/O. Transports move encoded [`Message`]s;
//! the client engine interprets them.

pub mod message;
pub mod types;
pub mod validate;

pub use message::{
    JSONRPC_VERSION, Message, MessageId, ParseError, RpcError, decode_result, error_code,
};
pub use types::{
    CallToolResult, ClientCapabilities, ClientInfo, ContentBlock, GetPromptResult, Icon,
    InitializeParams, InitializeResult, ListPromptsResult, ListResourcesResult, ListToolsResult,
    PROTOCOL_VERSION, Prompt, PromptArgument, PromptMessage, ReadResourceResult, Resource,
    ResourceContents, Role, ServerCapabilities, ServerInfo, Tool, method,
};
pub use validate::{TOOL_NAME_MAX_LEN, ValidationError, validate_tool, validate_tool_name};
