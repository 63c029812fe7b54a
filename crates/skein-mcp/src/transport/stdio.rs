//! Stdio transport: a local server process speaking framed JSON on
//! stdin/stdout.

use std::fmt;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::RpcChannel;
use crate::codec::{FrameDecoder, FramingMode, encode_frame};
use crate::config::StdioConfig;
use crate::correlator::{Correlator, Shutdown, deadline_after};
use crate::entry::TransportKind;
use crate::error::{McpError, Result};
use crate::protocol::{JsonRpcNotification, JsonRpcRequest};

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Which output stream a log line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    /// Protocol output.
    Stdout,
    /// Diagnostic output.
    Stderr,
}

impl fmt::Display for LogStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        })
    }
}

/// Callback receiving raw server output, used by diagnostic probes.
pub type LogObserver = Arc<dyn Fn(LogStream, &str) + Send + Sync>;

/// Stdio carrier owning the child process.
pub struct StdioChannel {
    server: String,
    framing: FramingMode,
    request_timeout: Duration,
    correlator: Arc<Correlator>,
    stdin: Mutex<Option<ChildStdin>>,
    child: Mutex<Option<Child>>,
}

impl StdioChannel {
    /// Spawn the configured command and start reading its output.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        server: impl Into<String>,
        config: &StdioConfig,
        observer: Option<LogObserver>,
    ) -> Result<Self> {
        let server = server.into();

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &config.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| {
            McpError::spawn_failed(format!("failed to spawn '{}': {}", config.command, e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::spawn_failed("failed to capture stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::spawn_failed("failed to capture stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| McpError::spawn_failed("failed to capture stderr"))?;

        tracing::info!(
            server = %server,
            command = %config.command,
            pid = child.id(),
            framing = %config.framing,
            "spawned MCP server"
        );

        let correlator = Arc::new(Correlator::new());
        tokio::spawn(read_stdout(
            server.clone(),
            stdout,
            FrameDecoder::new(config.framing),
            Arc::clone(&correlator),
            observer.clone(),
        ));
        tokio::spawn(drain_stderr(server.clone(), stderr, observer));

        Ok(Self {
            server,
            framing: config.framing,
            request_timeout: config.request_timeout,
            correlator,
            stdin: Mutex::new(Some(stdin)),
            child: Mutex::new(Some(child)),
        })
    }

    /// Framing used on the pipes.
    pub fn framing(&self) -> FramingMode {
        self.framing
    }

    async fn write_frame<T: Serialize>(&self, message: &T) -> Result<()> {
        let frame = encode_frame(message, self.framing)?;
        let mut stdin = self.stdin.lock().await;
        let stdin = stdin.as_mut().ok_or(McpError::SessionClosed)?;

        tracing::trace!(server = %self.server, bytes = frame.len(), "sending MCP frame");
        stdin
            .write_all(&frame)
            .await
            .map_err(|e| McpError::transport(format!("failed to write to server stdin: {e}")))?;
        stdin
            .flush()
            .await
            .map_err(|e| McpError::transport(format!("failed to flush server stdin: {e}")))?;
        Ok(())
    }

    /// Write a frame, giving up at `deadline`.
    ///
    /// A write that misses its deadline may have left a partial frame on the
    /// pipe, so the channel is failed.
    async fn send_frame<T: Serialize>(
        &self,
        message: &T,
        method: &str,
        deadline: Instant,
    ) -> Result<()> {
        match tokio::time::timeout_at(deadline, self.write_frame(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(self.correlator.shutdown_error().unwrap_or(e)),
            Err(_) => {
                let reason = format!("timed out writing '{method}' to server stdin");
                tracing::warn!(server = %self.server, reason = %reason, "stdio transport stalled");
                self.correlator.shutdown(Shutdown::Failed(reason));
                Err(McpError::timeout(method, self.request_timeout))
            }
        }
    }
}

async fn read_stdout(
    server: String,
    mut stdout: ChildStdout,
    mut decoder: FrameDecoder,
    correlator: Arc<Correlator>,
    observer: Option<LogObserver>,
) {
    let mut chunk = vec![0u8; READ_CHUNK_BYTES];
    let reason = loop {
        match stdout.read(&mut chunk).await {
            Ok(0) => break "server process exited".to_string(),
            Ok(n) => {
                let bytes = &chunk[..n];
                if let Some(observer) = &observer {
                    observer(LogStream::Stdout, &String::from_utf8_lossy(bytes));
                }
                for message in decoder.push(bytes) {
                    tracing::trace!(server = %server, json = %message, "received MCP frame");
                    correlator.dispatch(message);
                }
            }
            Err(e) => break format!("failed to read server stdout: {e}"),
        }
    };

    tracing::info!(server = %server, reason = %reason, "stdio transport ended");
    correlator.shutdown(Shutdown::Failed(reason));
}

async fn drain_stderr(server: String, stderr: ChildStderr, observer: Option<LogObserver>) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                tracing::debug!(server = %server, line = %line, "server stderr");
                if let Some(observer) = &observer {
                    observer(LogStream::Stderr, &line);
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(server = %server, error = %e, "stopped reading server stderr");
                break;
            }
        }
    }
}

#[async_trait]
impl RpcChannel for StdioChannel {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let pending = self.correlator.begin()?;
        let deadline = deadline_after(self.request_timeout);
        self.send_frame(&JsonRpcRequest::new(pending.id(), method, params), method, deadline)
            .await?;
        pending
            .wait_until(method, deadline, self.request_timeout)
            .await?
            .into_result()
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        if let Some(err) = self.correlator.shutdown_error() {
            return Err(err);
        }
        let deadline = deadline_after(self.request_timeout);
        self.send_frame(&JsonRpcNotification::new(method, params), method, deadline)
            .await
    }

    async fn close(&self) {
        self.correlator.shutdown(Shutdown::Closed);

        // Killing first breaks the pipe under any writer blocked on stdin.
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                tracing::warn!(server = %self.server, error = %e, "failed to kill MCP server");
            }
        }
        match self.stdin.try_lock() {
            Ok(mut stdin) => {
                stdin.take();
            }
            Err(_) => {
                tracing::debug!(server = %self.server, "stdin still held by a writer");
            }
        }
        tracing::info!(server = %self.server, "closed stdio transport");
    }

    fn is_closed(&self) -> bool {
        self.correlator.is_shut_down()
    }

    fn transport(&self) -> TransportKind {
        TransportKind::Stdio
    }
}
