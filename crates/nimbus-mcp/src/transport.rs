//! Subprocess stdio transport with newline framing.
//!
//! Owns the only handle to the server OS process. Frames are complete
//! newline-terminated lines; a partial line is never surfaced to the codec
//! (`read_line` buffers across read boundaries until the delimiter).
//! The child's stderr is drained continuously into a bounded tail buffer so
//! the child cannot block on a full pipe, and the tail is available for
//! diagnostics when a call fails.

use crate::config::McpServerConfig;
use nimbus_core::{WeatherError, WeatherResult};
use parking_lot::Mutex as SyncMutex;
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// How many recent stderr lines to keep for diagnostics.
const STDERR_TAIL_LINES: usize = 64;

/// Owns one spawned MCP server process and its stdio streams.
///
/// `recv` has a single-consumer discipline: only the client's read loop calls
/// it, so frames are never interleaved between readers. `terminate` can
/// interrupt a blocked `recv` because killing the child EOFs its stdout.
#[derive(Debug)]
pub struct StdioTransport {
    child: Mutex<Child>,
    /// `None` once closed by `terminate`; closing stdin is the graceful
    /// shutdown signal for line-protocol servers.
    stdin: Mutex<Option<ChildStdin>>,
    reader: Mutex<BufReader<ChildStdout>>,
    stderr_tail: Arc<SyncMutex<VecDeque<String>>>,
    command: String,
}

impl StdioTransport {
    /// Spawn the configured server with piped stdio.
    ///
    /// Fails with [`WeatherError::Spawn`] when the executable cannot be
    /// located or the OS refuses the spawn.
    pub fn spawn(config: &McpServerConfig) -> WeatherResult<Self> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            WeatherError::Spawn(format!("failed to spawn '{}': {e}", config.command))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| WeatherError::Spawn("server stdin not available".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| WeatherError::Spawn("server stdout not available".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| WeatherError::Spawn("server stderr not available".into()))?;

        let stderr_tail = Arc::new(SyncMutex::new(VecDeque::new()));
        let tail = stderr_tail.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(stderr = %line, "server stderr");
                let mut tail = tail.lock();
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        });

        info!(command = %config.command, "weather server spawned");

        Ok(Self {
            child: Mutex::new(child),
            stdin: Mutex::new(Some(stdin)),
            reader: Mutex::new(BufReader::new(stdout)),
            stderr_tail,
            command: config.command.clone(),
        })
    }

    /// Write one complete frame (a single line, delimiter appended here).
    pub async fn send(&self, frame: &str) -> WeatherResult<()> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard
            .as_mut()
            .ok_or_else(|| WeatherError::Transport("server stdin already closed".into()))?;

        stdin
            .write_all(frame.as_bytes())
            .await
            .map_err(|e| WeatherError::Transport(format!("write to server failed: {e}")))?;
        stdin
            .write_all(b"\n")
            .await
            .map_err(|e| WeatherError::Transport(format!("write to server failed: {e}")))?;
        stdin
            .flush()
            .await
            .map_err(|e| WeatherError::Transport(format!("flush to server failed: {e}")))?;
        Ok(())
    }

    /// Block until one complete frame is available.
    ///
    /// Returns `Ok(None)` on EOF (server closed its stdout, usually because
    /// it exited). Empty lines are not frames and are skipped.
    pub async fn recv(&self) -> WeatherResult<Option<String>> {
        let mut reader = self.reader.lock().await;
        let mut line = String::new();
        loop {
            line.clear();
            let n = reader
                .read_line(&mut line)
                .await
                .map_err(|e| WeatherError::Transport(format!("read from server failed: {e}")))?;
            if n == 0 {
                return Ok(None);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            return Ok(Some(trimmed.to_string()));
        }
    }

    /// Request a graceful exit (close stdin), wait up to `grace`, then kill.
    pub async fn terminate(&self, grace: Duration) -> WeatherResult<()> {
        // Dropping stdin EOFs the server's read loop.
        self.stdin.lock().await.take();

        let mut child = self.child.lock().await;
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                info!(command = %self.command, %status, "server exited");
                Ok(())
            }
            Ok(Err(e)) => Err(WeatherError::Transport(format!(
                "waiting for server exit failed: {e}"
            ))),
            Err(_) => {
                warn!(command = %self.command, grace_ms = grace.as_millis() as u64, "server did not exit in time, killing");
                child
                    .kill()
                    .await
                    .map_err(|e| WeatherError::Transport(format!("kill failed: {e}")))?;
                Ok(())
            }
        }
    }

    /// Recent stderr output from the server, newest last.
    pub fn stderr_tail(&self) -> Vec<String> {
        self.stderr_tail.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(command: &str, args: &[&str]) -> McpServerConfig {
        McpServerConfig {
            command: command.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            env: HashMap::new(),
            call_timeout_secs: 5,
            shutdown_grace_secs: 1,
        }
    }

    #[tokio::test]
    async fn spawn_nonexistent_command_is_spawn_error() {
        let err = StdioTransport::spawn(&config("/nonexistent/weather-server", &[])).unwrap_err();
        match err {
            WeatherError::Spawn(msg) => assert!(msg.contains("/nonexistent/weather-server")),
            other => panic!("expected spawn error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn echo_round_trip_and_eof() {
        // cat echoes stdin to stdout line by line; closing stdin EOFs it.
        let transport = StdioTransport::spawn(&config("cat", &[])).unwrap();

        transport.send(r#"{"id":1}"#).await.unwrap();
        let frame = transport.recv().await.unwrap();
        assert_eq!(frame.as_deref(), Some(r#"{"id":1}"#));

        transport.terminate(Duration::from_secs(2)).await.unwrap();
    }

    #[tokio::test]
    async fn recv_returns_none_on_server_exit() {
        let transport = StdioTransport::spawn(&config("sh", &["-c", "exit 0"])).unwrap();
        assert!(transport.recv().await.unwrap().is_none());
        transport.terminate(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn stderr_is_drained_into_tail() {
        let transport =
            StdioTransport::spawn(&config("sh", &["-c", "echo oops >&2; sleep 1"])).unwrap();
        // Give the drain task a moment to pick the line up.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(transport.stderr_tail().iter().any(|l| l == "oops"));
        transport.terminate(Duration::from_millis(100)).await.unwrap();
    }

    #[tokio::test]
    async fn send_after_terminate_is_transport_error() {
        let transport = StdioTransport::spawn(&config("cat", &[])).unwrap();
        transport.terminate(Duration::from_secs(1)).await.unwrap();
        match transport.send("{}").await {
            Err(WeatherError::Transport(_)) => {}
            other => panic!("expected transport error, got {other:?}"),
        }
    }
}
