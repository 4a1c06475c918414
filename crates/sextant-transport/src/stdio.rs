//! Child-process transport: newline-delimited JSON over stdio pipes.
//!
//! The transport owns the server process for its whole lifetime. stderr
//! is discarded so a chatty server cannot corrupt the protocol stream or
//! fill a pipe nobody drains.

use crate::error::TransportError;
use crate::{Transport, TransportFuture};
use sextant_proto::Message;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

/// How long a closed server gets to exit on its own before being killed.
const GRACEFUL_EXIT: Duration = Duration::from_secs(5);

/// Transport over the stdin/stdout of a spawned MCP server.
pub struct StdioTransport {
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    stdout: Mutex<Option<Lines<BufReader<ChildStdout>>>>,
    connected: AtomicBool,
}

impl StdioTransport {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self::with_env(command, args, HashMap::new())
    }

    pub fn with_env(
        command: impl Into<String>,
        args: Vec<String>,
        env: HashMap<String, String>,
    ) -> Self {
        Self {
            command: command.into(),
            args,
            env,
            child: Mutex::new(None),
            stdin: Mutex::new(None),
            stdout: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    /// Spawn the server process and take its pipes.
    pub async fn connect(&self) -> Result<(), TransportError> {
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }

        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| TransportError::Spawn {
            command: self.command.clone(),
            source: e,
        })?;

        let stdin = child.stdin.take().expect("stdin was piped");
        let stdout = child.stdout.take().expect("stdout was piped");

        *self.stdin.lock().await = Some(stdin);
        *self.stdout.lock().await = Some(BufReader::new(stdout).lines());
        *self.child.lock().await = Some(child);
        self.connected.store(true, Ordering::SeqCst);
        tracing::debug!(command = %self.command, "stdio transport spawned server");
        Ok(())
    }

    pub async fn send(&self, message: &Message) -> Result<(), TransportError> {
        let line = message.encode()?;
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(TransportError::NotConnected)?;
        let result = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        }
        .await;
        if let Err(e) = result {
            self.connected.store(false, Ordering::SeqCst);
            return Err(TransportError::Io(e));
        }
        Ok(())
    }

    pub async fn receive(&self) -> Result<Message, TransportError> {
        let mut guard = self.stdout.lock().await;
        let lines = guard.as_mut().ok_or(TransportError::NotConnected)?;
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
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
                // EOF: the server exited or closed its stdout
                Ok(None) => {
                    self.connected.store(false, Ordering::SeqCst);
                    return Err(TransportError::Closed);
                }
                Err(e) => {
                    self.connected.store(false, Ordering::SeqCst);
                    return Err(TransportError::Io(e));
                }
            }
        }
    }

    /// Close stdin to signal EOF, give the server [`GRACEFUL_EXIT`] to
    /// quit, then kill it. Idempotent.
    pub async fn close(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        self.stdin.lock().await.take();

        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };
        if tokio::time::timeout(GRACEFUL_EXIT, child.wait()).await.is_err() {
            tracing::debug!(command = %self.command, "server ignored EOF, killing");
            let _ = child.kill().await;
        }
        Ok(())
    }
}

impl Transport for StdioTransport {
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
        format!("stdio:{}", self.command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cat_echoes_messages_back() {
        let transport = StdioTransport::new("cat", vec![]);
        transport.connect().await.unwrap();

        let request = Message::request(1, "tools/list", None);
        transport.send(&request).await.unwrap();

        let echoed = transport.receive().await.unwrap();
        assert_eq!(echoed, request);

        transport.close().await.unwrap();
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn spawn_nonexistent_command_fails() {
        let transport = StdioTransport::new("this_command_does_not_exist_xyz123", vec![]);
        match transport.connect().await {
            Err(TransportError::Spawn { command, .. }) => {
                assert_eq!(command, "this_command_does_not_exist_xyz123");
            }
            other => panic!("expected Spawn error, got {other:?}"),
        }
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn server_exit_surfaces_as_closed() {
        // `true` exits immediately without writing anything
        let transport = StdioTransport::new("true", vec![]);
        transport.connect().await.unwrap();

        let err = transport.receive().await.unwrap_err();
        assert!(matches!(err, TransportError::Closed), "{err:?}");
        assert!(!transport.is_connected());

        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_reaps_a_server_that_exits_on_eof() {
        let transport = StdioTransport::new("cat", vec![]);
        transport.connect().await.unwrap();
        // cat exits when its stdin closes, so this returns within the
        // graceful window without killing
        transport.close().await.unwrap();
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let transport = StdioTransport::new("cat", vec![]);
        transport.connect().await.unwrap();
        transport.close().await.unwrap();

        let err = transport
            .send(&Message::request(1, "tools/list", None))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
    }

    #[tokio::test]
    async fn env_is_passed_to_the_server() {
        let mut env = HashMap::new();
        env.insert("SEXTANT_TEST_MARKER".to_string(), "42".to_string());
        let transport = StdioTransport::with_env(
            "sh",
            vec![
                "-c".to_string(),
                r#"printf '{"jsonrpc":"2.0","id":%s,"result":{}}\n' "$SEXTANT_TEST_MARKER""#
                    .to_string(),
            ],
            env,
        );
        transport.connect().await.unwrap();

        let message = transport.receive().await.unwrap();
        assert_eq!(message.id.unwrap().as_u64(), Some(42));

        transport.close().await.unwrap();
    }
}
