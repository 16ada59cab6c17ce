//! Stdio transport for subprocess MCP servers.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mcplink_protocols::types::TransportKind;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::Transport;
use crate::correlator::MessageHandler;
use crate::error::TransportError;
use crate::protocol::McpResponse;

/// Newline-delimited JSON over a child's stdin/stdout.
pub struct StdioTransport {
    server_id: String,
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    closed: AtomicBool,
    shutdown_grace: Duration,
    stdout_task: JoinHandle<()>,
    stderr_task: JoinHandle<()>,
}

impl StdioTransport {
    /// Spawn the server process. `env` overlays the inherited environment.
    pub fn spawn(
        server_id: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        handler: Arc<dyn MessageHandler>,
        shutdown_grace: Duration,
    ) -> Result<Self, TransportError> {
        let mut child = Command::new(command)
            .args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransportError::Process(format!("failed to spawn '{}': {}", command, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Process("Failed to capture stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Process("Failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TransportError::Process("Failed to capture stderr".to_string()))?;

        info!(server_id, command, pid = ?child.id(), "Spawned stdio server");

        let stdout_task = {
            let server_id = server_id.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => {
                            let line = line.trim();
                            if !line.is_empty() {
                                trace!(server_id = %server_id, "stdio recv: {}", line);
                                handler.handle_message(line);
                            }
                        }
                        Ok(None) => {
                            debug!(server_id = %server_id, "stdout closed");
                            break;
                        }
                        Err(e) => {
                            warn!(server_id = %server_id, error = %e, "stdout read failed");
                            break;
                        }
                    }
                }
                handler.handle_closed();
            })
        };

        let stderr_task = {
            let server_id = server_id.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(server_id = %server_id, "stderr: {}", line);
                }
            })
        };

        Ok(Self {
            server_id: server_id.to_string(),
            child: Mutex::new(Some(child)),
            stdin: Mutex::new(Some(stdin)),
            closed: AtomicBool::new(false),
            shutdown_grace,
            stdout_task,
            stderr_task,
        })
    }

    /// Ask the child to exit, then kill it after the grace period.
    async fn terminate(&self, mut child: Child) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = child.id() {
                if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                    debug!(server_id = %self.server_id, error = %e, "SIGTERM failed");
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = child.start_kill();
        }

        match tokio::time::timeout(self.shutdown_grace, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(server_id = %self.server_id, %status, "Server process exited");
            }
            Ok(Err(e)) => {
                warn!(server_id = %self.server_id, error = %e, "Failed to wait for server process");
            }
            Err(_) => {
                warn!(server_id = %self.server_id, "Server ignored SIGTERM, killing");
                if let Err(e) = child.kill().await {
                    warn!(server_id = %self.server_id, error = %e, "Failed to kill server process");
                }
            }
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Stdio
    }

    async fn send(&self, message: &serde_json::Value) -> Result<Option<McpResponse>, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(TransportError::Closed)?;

        let mut line = serde_json::to_string(message)?;
        trace!(server_id = %self.server_id, "stdio send: {}", line);
        line.push('\n');
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;

        Ok(None)
    }

    async fn is_alive(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        let mut guard = self.child.lock().await;
        match guard.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        // EOF on stdin before the signal, unless a writer is stuck on a full pipe.
        match self.stdin.try_lock() {
            Ok(mut stdin) => {
                stdin.take();
            }
            Err(_) => debug!(server_id = %self.server_id, "stdin busy, signalling without EOF"),
        }

        let child = self.child.lock().await.take();
        if let Some(child) = child {
            self.terminate(child).await;
        }

        self.stderr_task.abort();
        self.stdout_task.abort();
        info!(server_id = %self.server_id, "Stdio transport closed");
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        self.stdout_task.abort();
        self.stderr_task.abort();
    }
}
