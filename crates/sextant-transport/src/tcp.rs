//! Raw TCP socket transport: one JSON-RPC message per line.

use crate::error::TransportError;
use crate::{Transport, TransportFuture};
use sextant_proto::Message;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;

/// Newline-delimited JSON over a plain TCP socket.
///
/// Reader and writer halves live behind separate locks so one task can
/// sit in [`TcpTransport::receive`] while others send.
pub struct TcpTransport {
    host: String,
    port: u16,
    reader: Mutex<Option<BufReader<OwnedReadHalf>>>,
    writer: Mutex<Option<OwnedWriteHalf>>,
    connected: AtomicBool,
}

impl TcpTransport {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            reader: Mutex::new(None),
            writer: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    pub async fn connect(&self) -> Result<(), TransportError> {
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }
        let target = format!("{}:{}", self.host, self.port);
        let stream = TcpStream::connect(&target)
            .await
            .map_err(|e| TransportError::Connect {
                target: target.clone(),
                source: e,
            })?;
        let _ = stream.set_nodelay(true);
        let (read_half, write_half) = stream.into_split();
        *self.reader.lock().await = Some(BufReader::new(read_half));
        *self.writer.lock().await = Some(write_half);
        self.connected.store(true, Ordering::SeqCst);
        tracing::debug!(%target, "tcp transport connected");
        Ok(())
    }

    pub async fn send(&self, message: &Message) -> Result<(), TransportError> {
        let line = message.encode()?;
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::NotConnected)?;
        let result = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = result {
            self.connected.store(false, Ordering::SeqCst);
            return Err(TransportError::Io(e));
        }
        Ok(())
    }

    pub async fn receive(&self) -> Result<Message, TransportError> {
        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or(TransportError::NotConnected)?;
        let mut line = String::new();
        loop {
            line.clear();
            let n = reader.read_line(&mut line).await.inspect_err(|_| {
                self.connected.store(false, Ordering::SeqCst);
            })?;
            if n == 0 {
                self.connected.store(false, Ordering::SeqCst);
                return Err(TransportError::Closed);
            }
            let raw = line.trim();
            if raw.is_empty() {
                continue;
            }
            match Message::decode(raw) {
                Ok(message) => return Ok(message),
                Err(e) => {
                    tracing::warn!("skipping undecodable line: {e}");
                    continue;
                }
            }
        }
    }

    /// Shut down the write side and mark the transport dead. A receive
    /// blocked on the socket resolves once the peer closes in response.
    pub async fn close(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        Ok(())
    }
}

impl Transport for TcpTransport {
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
        format!("tcp://{}:{}", self.host, self.port)
    }
}
