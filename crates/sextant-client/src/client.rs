//! The protocol engine: handshake, request correlation, pagination.
//!
//! One dispatch task per connection reads every inbound message and
//! routes responses to their callers through a pending table keyed by
//! request id. Callers park on a oneshot channel; nobody except the
//! dispatch task ever calls `receive` on the transport, so concurrent
//! requests cannot steal each other's responses.
//!
//! Session state moves through `Disconnected -> Connected ->
//! Initializing -> Ready`, and only `connect`, `initialize`, and
//! `disconnect` (serialized by one lifecycle lock) move it forward.
//! A failed send, or the dispatch task seeing the connection die,
//! moves it back to `Disconnected`.

use crate::config::ServerConfig;
use crate::error::ClientError;
use serde_json::{Value, json};
use sextant_proto::{
    CallToolResult, ClientCapabilities, ClientInfo, GetPromptResult, InitializeParams,
    InitializeResult, ListPromptsResult, ListResourcesResult, ListToolsResult, Message, MessageId,
    PROTOCOL_VERSION, Prompt, ReadResourceResult, Resource, ServerCapabilities, ServerInfo, Tool,
    decode_result, method, validate_tool,
};
use sextant_transport::Transport;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;

/// Identity and deadline settings for one client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Name reported in the handshake's `clientInfo`.
    pub name: String,
    pub version: String,
    /// Deadline applied to connect and to every request.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: "sextant".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Phase {
    #[default]
    Disconnected,
    Connected,
    Initializing,
    Ready,
}

#[derive(Default)]
struct Session {
    phase: Phase,
    server_info: Option<ServerInfo>,
    server_capabilities: Option<ServerCapabilities>,
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Message>>>>;
type NotificationHandler = Arc<dyn Fn(Message) + Send + Sync>;

/// An MCP client bound to one server over one transport.
///
/// All methods take `&self`; the client is safe to share behind an
/// `Arc` and call from many tasks at once.
pub struct Client {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    next_id: AtomicU64,
    pending: PendingMap,
    session: Arc<StdMutex<Session>>,
    /// Serializes connect/initialize/disconnect so the session phase
    /// cannot be raced through the state machine.
    lifecycle: Mutex<()>,
    dispatch: StdMutex<Option<JoinHandle<()>>>,
    notification_handler: Arc<StdMutex<Option<NotificationHandler>>>,
}

impl Client {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::with_config(transport, ClientConfig::default())
    }

    pub fn with_config(transport: impl Transport + 'static, config: ClientConfig) -> Self {
        Self::from_arc(Arc::new(transport), config)
    }

    pub fn from_arc(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        Self {
            transport,
            config,
            next_id: AtomicU64::new(1),
            pending: Arc::new(Mutex::new(HashMap::new())),
            session: Arc::new(StdMutex::new(Session::default())),
            lifecycle: Mutex::new(()),
            dispatch: StdMutex::new(None),
            notification_handler: Arc::new(StdMutex::new(None)),
        }
    }

    /// Build a client from a configured endpoint, taking the endpoint's
    /// timeout.
    pub fn from_server_config(server: &ServerConfig) -> Result<Self, ClientError> {
        let transport = server.build_transport()?;
        let config = ClientConfig {
            timeout: server.timeout(),
            ..ClientConfig::default()
        };
        Ok(Self::from_arc(Arc::from(transport), config))
    }

    /// Install a callback for server-initiated notifications. Without
    /// one, notifications are logged at debug level and dropped.
    pub fn on_notification<F>(&self, handler: F)
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        *self.notification_handler.lock().unwrap() = Some(Arc::new(handler));
    }

    /// Open the transport and start the dispatch task. A no-op when
    /// already connected.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let _guard = self.lifecycle.lock().await;
        if self.phase() != Phase::Disconnected {
            return Ok(());
        }

        tokio::time::timeout(self.config.timeout, self.transport.connect())
            .await
            .map_err(|_| {
                ClientError::Connection(format!(
                    "connect to {} timed out after {}ms",
                    self.transport.describe(),
                    self.config.timeout.as_millis()
                ))
            })??;

        self.spawn_dispatch();
        self.set_phase(Phase::Connected);
        tracing::debug!(transport = %self.transport.describe(), "connected");
        Ok(())
    }

    /// Run the handshake: send `initialize`, record the server's
    /// identity and capabilities, confirm with the `initialized`
    /// notification. Idempotent once the session is ready.
    pub async fn initialize(&self) -> Result<ServerInfo, ClientError> {
        let _guard = self.lifecycle.lock().await;
        match self.phase() {
            Phase::Disconnected => return Err(ClientError::NotConnected),
            Phase::Ready => {
                return self.server_info().ok_or_else(|| {
                    ClientError::Protocol("ready session has no server info".into())
                });
            }
            Phase::Initializing => {
                return Err(ClientError::Protocol("initialize already in progress".into()));
            }
            Phase::Connected => {}
        }
        self.set_phase(Phase::Initializing);

        let result = self.run_handshake().await;
        if result.is_err() && self.phase() == Phase::Initializing {
            // roll back so the caller can retry; drop anything the
            // failed handshake recorded
            let mut session = self.session.lock().unwrap();
            session.phase = Phase::Connected;
            session.server_info = None;
            session.server_capabilities = None;
        }
        result
    }

    async fn run_handshake(&self) -> Result<ServerInfo, ClientError> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities {
                experimental: Some(json!({})),
                sampling: Some(json!({})),
                roots: None,
            },
            client_info: ClientInfo {
                name: self.config.name.clone(),
                version: self.config.version.clone(),
            },
        };
        let params = serde_json::to_value(&params)
            .map_err(|e| ClientError::Protocol(format!("initialize params: {e}")))?;

        let reply = self.request(method::INITIALIZE, Some(params)).await?;
        let result = expect_result(reply, method::INITIALIZE)?;
        let init: InitializeResult = decode_result(&result)?;
        tracing::debug!(
            server = %init.server_info.name,
            version = %init.server_info.version,
            protocol = %init.protocol_version,
            "handshake accepted"
        );

        {
            let mut session = self.session.lock().unwrap();
            session.server_info = Some(init.server_info.clone());
            session.server_capabilities = Some(init.capabilities);
        }

        // the notification completes the handshake; the session is not
        // usable until the server has seen it
        if let Err(e) = self
            .transport
            .send(&Message::notification(method::INITIALIZED, None))
            .await
        {
            self.mark_disconnected();
            return Err(e.into());
        }
        self.set_phase(Phase::Ready);
        Ok(init.server_info)
    }

    /// All pages of `tools/list`, followed through `nextCursor` until
    /// the server stops returning one.
    pub async fn list_tools(&self) -> Result<Vec<Tool>, ClientError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self.list_tools_page(cursor.as_deref()).await?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(tools)
    }

    /// One page of `tools/list`.
    pub async fn list_tools_page(
        &self,
        cursor: Option<&str>,
    ) -> Result<ListToolsResult, ClientError> {
        self.ensure_ready()?;
        let params = cursor.map(|c| json!({ "cursor": c }));
        let reply = self.request(method::TOOLS_LIST, params).await?;
        let result = expect_result(reply, method::TOOLS_LIST)?;
        let page: ListToolsResult = decode_result(&result)?;
        for tool in &page.tools {
            if let Err(e) = validate_tool(tool) {
                tracing::warn!(tool = %tool.name, "server advertised invalid tool: {e}");
            }
        }
        Ok(page)
    }

    /// Invoke a tool. A result with `is_error` set is still `Ok`: the
    /// protocol exchange succeeded, the tool itself failed.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<CallToolResult, ClientError> {
        self.ensure_ready()?;
        let params = json!({ "name": name, "arguments": arguments });
        let reply = self.request(method::TOOLS_CALL, Some(params)).await?;
        let result = expect_result(reply, method::TOOLS_CALL)?;
        Ok(decode_result(&result)?)
    }

    pub async fn list_resources(&self) -> Result<Vec<Resource>, ClientError> {
        self.ensure_ready()?;
        let reply = self.request(method::RESOURCES_LIST, None).await?;
        let result = expect_result(reply, method::RESOURCES_LIST)?;
        let listed: ListResourcesResult = decode_result(&result)?;
        Ok(listed.resources)
    }

    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, ClientError> {
        self.ensure_ready()?;
        let params = json!({ "uri": uri });
        let reply = self.request(method::RESOURCES_READ, Some(params)).await?;
        let result = expect_result(reply, method::RESOURCES_READ)?;
        Ok(decode_result(&result)?)
    }

    pub async fn list_prompts(&self) -> Result<Vec<Prompt>, ClientError> {
        self.ensure_ready()?;
        let reply = self.request(method::PROMPTS_LIST, None).await?;
        let result = expect_result(reply, method::PROMPTS_LIST)?;
        let listed: ListPromptsResult = decode_result(&result)?;
        Ok(listed.prompts)
    }

    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<Value>,
    ) -> Result<GetPromptResult, ClientError> {
        self.ensure_ready()?;
        let mut params = json!({ "name": name });
        if let Some(arguments) = arguments {
            params["arguments"] = arguments;
        }
        let reply = self.request(method::PROMPTS_GET, Some(params)).await?;
        let result = expect_result(reply, method::PROMPTS_GET)?;
        Ok(decode_result(&result)?)
    }

    /// Stop the dispatch task, close the transport, and fail any
    /// in-flight requests with a connection error. Idempotent.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        let _guard = self.lifecycle.lock().await;
        if self.phase() == Phase::Disconnected {
            return Ok(());
        }
        // stop the dispatch task first so the transport's reader side
        // is free while close runs
        if let Some(handle) = self.dispatch.lock().unwrap().take() {
            handle.abort();
        }
        let closed = self.transport.close().await;
        self.pending.lock().await.clear();
        self.mark_disconnected();
        tracing::debug!(transport = %self.transport.describe(), "disconnected");
        closed.map_err(ClientError::from)
    }

    pub fn is_connected(&self) -> bool {
        self.phase() != Phase::Disconnected && self.transport.is_connected()
    }

    pub fn is_initialized(&self) -> bool {
        self.phase() == Phase::Ready
    }

    /// Server identity recorded during the handshake.
    pub fn server_info(&self) -> Option<ServerInfo> {
        self.session.lock().unwrap().server_info.clone()
    }

    /// Capabilities the server advertised during the handshake.
    pub fn server_capabilities(&self) -> Option<ServerCapabilities> {
        self.session.lock().unwrap().server_capabilities.clone()
    }

    /// Issue a request and wait for its correlated response.
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Message, ClientError> {
        // fail fast on a dead transport instead of burning the timeout
        if !self.transport.is_connected() {
            self.mark_disconnected();
            return Err(ClientError::NotConnected);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let message = Message::request(id, method, params);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let exchange = async {
            if let Err(e) = self.transport.send(&message).await {
                // a send that fails means the connection is gone; flip
                // the session so later operations fail fast
                self.mark_disconnected();
                return Err(ClientError::from(e));
            }
            match rx.await {
                Ok(reply) => Ok(reply),
                // the dispatch task dropped the table: connection died
                Err(_) => Err(ClientError::Connection(
                    "connection closed while waiting for response".into(),
                )),
            }
        };

        match tokio::time::timeout(self.config.timeout, exchange).await {
            Ok(result) => {
                if result.is_err() {
                    self.pending.lock().await.remove(&id);
                }
                result
            }
            Err(_) => {
                // remove the entry so a late response is discarded as
                // unknown instead of waking a vanished caller
                self.pending.lock().await.remove(&id);
                Err(ClientError::Timeout {
                    method: method.to_string(),
                    timeout_ms: self.config.timeout.as_millis() as u64,
                })
            }
        }
    }

    fn ensure_ready(&self) -> Result<(), ClientError> {
        match self.phase() {
            Phase::Ready => Ok(()),
            Phase::Disconnected => Err(ClientError::NotConnected),
            Phase::Connected | Phase::Initializing => Err(ClientError::NotInitialized),
        }
    }

    fn spawn_dispatch(&self) {
        let transport = Arc::clone(&self.transport);
        let pending = Arc::clone(&self.pending);
        let session = Arc::clone(&self.session);
        let handler = Arc::clone(&self.notification_handler);
        let handle = tokio::spawn(dispatch_loop(transport, pending, session, handler));
        *self.dispatch.lock().unwrap() = Some(handle);
    }

    fn phase(&self) -> Phase {
        self.session.lock().unwrap().phase
    }

    fn set_phase(&self, phase: Phase) {
        self.session.lock().unwrap().phase = phase;
    }

    fn mark_disconnected(&self) {
        let mut session = self.session.lock().unwrap();
        session.phase = Phase::Disconnected;
        session.server_info = None;
        session.server_capabilities = None;
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(handle) = self.dispatch.lock().unwrap().take() {
            handle.abort();
        }
    }
}

/// Single reader over the transport. Owns response routing; exits when
/// the transport reports the connection gone, failing all waiters.
async fn dispatch_loop(
    transport: Arc<dyn Transport>,
    pending: PendingMap,
    session: Arc<StdMutex<Session>>,
    handler: Arc<StdMutex<Option<NotificationHandler>>>,
) {
    loop {
        match transport.receive().await {
            Ok(message) => {
                if message.is_notification() {
                    let method = message.method.clone().unwrap_or_default();
                    let callback = handler.lock().unwrap().clone();
                    match callback {
                        Some(callback) => {
                            tracing::trace!(%method, "delivering server notification");
                            callback(message);
                        }
                        None => tracing::debug!(%method, "dropping unhandled notification"),
                    }
                    continue;
                }

                let Some(id) = message.id.as_ref().and_then(MessageId::as_u64) else {
                    match &message.id {
                        Some(id) => tracing::warn!(%id, "discarding response with non-numeric id"),
                        None => tracing::warn!("discarding message with neither method nor id"),
                    }
                    continue;
                };
                let waiter = pending.lock().await.remove(&id);
                match waiter {
                    Some(tx) => {
                        if tx.send(message).is_err() {
                            tracing::debug!(id, "caller gave up before the response arrived");
                        }
                    }
                    None => tracing::warn!(id, "discarding response for unknown request id"),
                }
            }
            Err(e) => {
                tracing::debug!("receive loop ended: {e}");
                break;
            }
        }
    }

    // fail every waiter: dropping the senders wakes their callers with
    // a connection error
    pending.lock().await.clear();
    let mut session = session.lock().unwrap();
    session.phase = Phase::Disconnected;
    session.server_info = None;
    session.server_capabilities = None;
}

fn expect_result(reply: Message, method: &str) -> Result<Value, ClientError> {
    if let Some(err) = reply.error {
        return Err(ClientError::Rpc {
            code: err.code,
            message: err.message,
        });
    }
    reply.result.ok_or_else(|| {
        ClientError::Protocol(format!("{method} response carried neither result nor error"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sextant_proto::RpcError;
    use sextant_transport::{TransportError, TransportFuture};
    use std::sync::atomic::AtomicUsize;

    /// Transport that refuses everything and counts send attempts.
    struct DeadTransport {
        sends: AtomicUsize,
    }

    impl DeadTransport {
        fn new() -> Self {
            Self {
                sends: AtomicUsize::new(0),
            }
        }
    }

    impl Transport for DeadTransport {
        fn connect(&self) -> TransportFuture<'_, Result<(), TransportError>> {
            Box::pin(async { Err(TransportError::NotConnected) })
        }
        fn send<'a>(
            &'a self,
            _message: &'a Message,
        ) -> TransportFuture<'a, Result<(), TransportError>> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err(TransportError::NotConnected) })
        }
        fn receive(&self) -> TransportFuture<'_, Result<Message, TransportError>> {
            Box::pin(async { Err(TransportError::NotConnected) })
        }
        fn close(&self) -> TransportFuture<'_, Result<(), TransportError>> {
            Box::pin(async { Ok(()) })
        }
        fn is_connected(&self) -> bool {
            false
        }
        fn describe(&self) -> String {
            "dead:".to_string()
        }
    }

    #[tokio::test]
    async fn operations_before_connect_never_touch_the_wire() {
        let transport = Arc::new(DeadTransport::new());
        let client = Client::from_arc(transport.clone(), ClientConfig::default());
        assert!(matches!(
            client.list_tools().await,
            Err(ClientError::NotConnected)
        ));
        assert!(matches!(
            client.call_tool("echo", json!({})).await,
            Err(ClientError::NotConnected)
        ));
        assert!(matches!(
            client.initialize().await,
            Err(ClientError::NotConnected)
        ));
        assert!(!client.is_connected());
        assert!(!client.is_initialized());
        assert!(client.server_info().is_none());
        assert_eq!(transport.sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn disconnect_without_connect_is_a_no_op() {
        let client = Client::new(DeadTransport::new());
        client.disconnect().await.unwrap();
        client.disconnect().await.unwrap();
    }

    #[test]
    fn expect_result_maps_rpc_errors() {
        let reply = Message {
            jsonrpc: "2.0".to_string(),
            id: Some(MessageId::Number(1)),
            method: None,
            params: None,
            result: None,
            error: Some(RpcError {
                code: -32602,
                message: "tool not found: nope".to_string(),
                data: None,
            }),
        };
        match expect_result(reply, "tools/call") {
            Err(ClientError::Rpc { code, message }) => {
                assert_eq!(code, -32602);
                assert!(message.contains("nope"));
            }
            other => panic!("expected Rpc error, got {other:?}"),
        }
    }

    #[test]
    fn expect_result_requires_result_or_error() {
        let reply = Message {
            jsonrpc: "2.0".to_string(),
            id: Some(MessageId::Number(1)),
            method: None,
            params: None,
            result: None,
            error: None,
        };
        match expect_result(reply, "tools/list") {
            Err(ClientError::Protocol(reason)) => {
                assert!(reason.contains("tools/list"), "{reason}");
            }
            other => panic!("expected Protocol error, got {other:?}"),
        }
    }

    #[test]
    fn default_config_has_thirty_second_deadline() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.name, "sextant");
    }
}
