//! JSON-RPC transport over stdin/stdout

use super::codec::{Frame, FrameCodec};
use crate::error::{AcpError, Error, Result};
use futures::StreamExt;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::{mpsc, Mutex};
use tokio_util::codec::FramedRead;
use tracing::{debug, error, trace, warn};

/// Event read off the agent's stdout
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// One complete, well-formed JSON message
    Message(serde_json::Value),
    /// stdout reached EOF or failed; nothing further will arrive
    Closed,
}

/// Transport layer for ACP communication
/// Uses channels to avoid lock contention between send and receive
pub struct Transport {
    /// Channel to send lines to the stdin writer task
    stdin_tx: mpsc::Sender<String>,
    /// Decoded messages from the stdout reader task
    events_rx: Mutex<mpsc::Receiver<TransportEvent>>,
    _stdin_task: tokio::task::JoinHandle<()>,
    _stdout_task: tokio::task::JoinHandle<()>,
    _stderr_task: Option<tokio::task::JoinHandle<()>>,
}

impl Transport {
    /// Spawn a new agent process and create transport.
    ///
    /// The child is spawned with `kill_on_drop`, so dropping it reaps the process.
    pub async fn spawn(command: &str, args: &[String], cwd: &Path) -> Result<(Self, Child)> {
        debug!("Spawning agent: {} {:?} (cwd: {:?})", command, args, cwd);

        let mut child = Command::new(command)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Acp(AcpError::ConnectionFailed(format!(
                    "Failed to spawn agent process {}: {}",
                    command, e
                )))
            })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            Error::Acp(AcpError::ConnectionFailed("Failed to capture stdin".to_string()))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            Error::Acp(AcpError::ConnectionFailed("Failed to capture stdout".to_string()))
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            Error::Acp(AcpError::ConnectionFailed("Failed to capture stderr".to_string()))
        })?;

        let mut transport = Self::from_io(stdout, stdin);
        // Drain stderr so the agent can't deadlock on a full pipe.
        transport._stderr_task = Some(tokio::spawn(Self::read_stderr_task(stderr)));

        Ok((transport, child))
    }

    /// Build a transport over arbitrary byte streams (the agent's stdout and stdin).
    pub fn from_io<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (stdin_tx, stdin_rx) = mpsc::channel::<String>(100);
        let (events_tx, events_rx) = mpsc::channel::<TransportEvent>(100);

        let stdin_task = tokio::spawn(Self::write_stdin_task(writer, stdin_rx));
        let stdout_task = tokio::spawn(Self::read_stdout_task(reader, events_tx));

        Self {
            stdin_tx,
            events_rx: Mutex::new(events_rx),
            _stdin_task: stdin_task,
            _stdout_task: stdout_task,
            _stderr_task: None,
        }
    }

    /// Background task to write to stdin
    async fn write_stdin_task<W>(mut stdin: W, mut rx: mpsc::Receiver<String>)
    where
        W: AsyncWrite + Unpin,
    {
        while let Some(data) = rx.recv().await {
            trace!("Sending to stdin: {}", data);
            if let Err(e) = stdin.write_all(data.as_bytes()).await {
                error!("Failed to write to stdin: {}", e);
                break;
            }
            if let Err(e) = stdin.write_all(b"\n").await {
                error!("Failed to write newline to stdin: {}", e);
                break;
            }
            if let Err(e) = stdin.flush().await {
                error!("Failed to flush stdin: {}", e);
                break;
            }
        }
        debug!("Stdin writer task ended");
    }

    /// Background task to frame stdout and decode each line.
    async fn read_stdout_task<R>(stdout: R, tx: mpsc::Sender<TransportEvent>)
    where
        R: AsyncRead + Unpin,
    {
        let mut frames = FramedRead::new(stdout, FrameCodec::new());

        while let Some(frame) = frames.next().await {
            let line = match frame {
                Ok(Frame::Line(line)) => line,
                Ok(Frame::Oversized) => {
                    warn!("Dropping oversized line from agent stdout");
                    continue;
                }
                Ok(Frame::Malformed) => {
                    warn!("Dropping non-UTF-8 line from agent stdout");
                    continue;
                }
                Err(e) => {
                    error!("Error reading agent stdout: {}", e);
                    break;
                }
            };

            let Some(value) = decode_line(&line) else {
                continue;
            };
            if tx.send(TransportEvent::Message(value)).await.is_err() {
                warn!("Failed to forward stdout message, channel closed");
                return;
            }
        }

        debug!("Agent stdout closed");
        let _ = tx.send(TransportEvent::Closed).await;
    }

    /// Background task to drain stderr.
    async fn read_stderr_task(stderr: ChildStderr) {
        let mut reader = BufReader::new(stderr);
        let mut line = String::new();

        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    debug!("Agent stderr closed");
                    break;
                }
                Ok(_) => {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        // Avoid treating stderr as fatal; agents often log here.
                        warn!("Agent stderr: {}", trimmed);
                    }
                }
                Err(e) => {
                    error!("Error reading agent stderr: {}", e);
                    break;
                }
            }
        }
    }

    /// Write one message as a single line.
    pub async fn write_line<T: serde::Serialize>(&self, message: &T) -> Result<()> {
        let json = serde_json::to_string(message)?;
        trace!("Sending: {}", json);
        self.stdin_tx
            .send(json)
            .await
            .map_err(|_| Error::Acp(AcpError::NotConnected))
    }

    /// Next event from the agent. Returns `Closed` forever once the stream ends.
    pub async fn recv(&self) -> TransportEvent {
        let mut rx = self.events_rx.lock().await;
        rx.recv().await.unwrap_or(TransportEvent::Closed)
    }

    /// True once the stdin writer has gone away.
    pub fn is_closed(&self) -> bool {
        self.stdin_tx.is_closed()
    }
}

/// Parse one framed line. Blank lines and malformed JSON are dropped with a log.
pub(crate) fn decode_line(line: &str) -> Option<serde_json::Value> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(value) => {
            trace!("Agent stdout: {}", trimmed);
            Some(value)
        }
        Err(e) => {
            let snippet = trimmed.chars().take(300).collect::<String>();
            let err = AcpError::ProtocolDecode(e.to_string());
            warn!("{} ({})", err, snippet);
            None
        }
    }
}
