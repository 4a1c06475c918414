//! WebSocket transport: one JSON-RPC message per text frame.

use crate::error::TransportError;
use crate::{Transport, TransportFuture};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use sextant_proto::Message;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Transport over a `ws://` or `wss://` endpoint.
pub struct WebSocketTransport {
    url: String,
    sink: Mutex<Option<WsSink>>,
    stream: Mutex<Option<WsSource>>,
    connected: AtomicBool,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            sink: Mutex::new(None),
            stream: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    pub async fn connect(&self) -> Result<(), TransportError> {
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }
        let (socket, response) = connect_async(self.url.as_str()).await?;
        tracing::debug!(url = %self.url, status = %response.status(), "websocket connected");
        let (sink, stream) = socket.split();
        *self.sink.lock().await = Some(sink);
        *self.stream.lock().await = Some(stream);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub async fn send(&self, message: &Message) -> Result<(), TransportError> {
        let text = message.encode()?;
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(TransportError::NotConnected)?;
        if let Err(e) = sink.send(WsMessage::Text(text)).await {
            self.connected.store(false, Ordering::SeqCst);
            return Err(TransportError::WebSocket(e));
        }
        Ok(())
    }

    pub async fn receive(&self) -> Result<Message, TransportError> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(TransportError::NotConnected)?;
        loop {
            match stream.next().await {
                Some(Ok(WsMessage::Text(text))) => match Message::decode(&text) {
                    Ok(message) => return Ok(message),
                    Err(e) => tracing::warn!("skipping undecodable frame: {e}"),
                },
                Some(Ok(WsMessage::Binary(data))) => {
                    let text = String::from_utf8_lossy(&data);
                    match Message::decode(&text) {
                        Ok(message) => return Ok(message),
                        Err(e) => tracing::warn!("skipping undecodable binary frame: {e}"),
                    }
                }
                Some(Ok(WsMessage::Ping(payload))) => {
                    // the sink lock is free here; receive holds only the stream
                    if let Some(sink) = self.sink.lock().await.as_mut() {
                        let _ = sink.send(WsMessage::Pong(payload)).await;
                    }
                }
                Some(Ok(WsMessage::Close(_))) => {
                    self.connected.store(false, Ordering::SeqCst);
                    return Err(TransportError::Closed);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    self.connected.store(false, Ordering::SeqCst);
                    return Err(TransportError::WebSocket(e));
                }
                None => {
                    self.connected.store(false, Ordering::SeqCst);
                    return Err(TransportError::Closed);
                }
            }
        }
    }

    /// Send a close frame and drop the sink. A receive blocked on the
    /// stream resolves when the close handshake completes.
    pub async fn close(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(mut sink) = self.sink.lock().await.take() {
            let _ = sink.send(WsMessage::Close(None)).await;
        }
        Ok(())
    }
}

impl Transport for WebSocketTransport {
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
        self.url.clone()
    }
}
