//! Newline-delimited JSON-RPC over a child process's stdin/stdout.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use toolhub_core::{LaunchSpec, TransportError};

use super::RpcChannel;
use super::protocol::{JsonRpcRequest, PendingRequests, notification, parse_message};
use crate::path;

/// How long `close` waits for the child to exit after killing it.
const EXIT_GRACE: Duration = Duration::from_secs(2);

pub struct StdioChannel {
    server_name: String,
    stdin: Mutex<Option<ChildStdin>>,
    child: Mutex<Option<Child>>,
    pending: Arc<PendingRequests>,
    reader: JoinHandle<()>,
    stderr: Option<JoinHandle<()>>,
}

impl StdioChannel {
    /// Spawn the server process and start routing its stdout.
    pub fn spawn(server_name: &str, launch: &LaunchSpec) -> Result<Self, TransportError> {
        path::validate_program(&launch.program).map_err(TransportError::SpawnFailed)?;
        if let Some(working_dir) = launch.working_dir.as_deref() {
            path::validate_working_dir(working_dir).map_err(TransportError::SpawnFailed)?;
        }

        let path_extra = launch
            .env
            .iter()
            .find(|(key, _)| key == "PATH")
            .map(|(_, value)| value.as_str());
        let effective_path = path::build_effective_path(&launch.program, path_extra);

        let mut command = Command::new(&launch.program);
        command
            .args(&launch.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .env("PATH", &effective_path);

        if let Some(working_dir) = launch.working_dir.as_deref() {
            command.current_dir(working_dir);
        }

        // PATH was already merged above
        for (key, value) in launch.env.iter().filter(|(key, _)| key != "PATH") {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|e| {
            TransportError::SpawnFailed(format!(
                "Failed to spawn '{}': {e}\nArgs: {:?}\nCwd: {:?}",
                launch.program, launch.args, launch.working_dir
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::SpawnFailed("Failed to get stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::SpawnFailed("Failed to get stdout".to_string()))?;

        let pending = Arc::new(PendingRequests::new());
        let reader = tokio::spawn(route_stdout(
            server_name.to_string(),
            BufReader::new(stdout),
            Arc::clone(&pending),
        ));

        // An undrained stderr pipe eventually blocks the child.
        let stderr = child.stderr.take().map(|stderr| {
            let server_name = server_name.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(server_name = %server_name, line = %line, "MCP server stderr");
                }
            })
        });

        debug!(
            server_name = %server_name,
            program = %launch.program,
            pid = ?child.id(),
            "Spawned MCP server process"
        );

        Ok(Self {
            server_name: server_name.to_string(),
            stdin: Mutex::new(Some(stdin)),
            child: Mutex::new(Some(child)),
            pending,
            reader,
            stderr,
        })
    }

    async fn write_line(&self, line: String) -> Result<(), TransportError> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(TransportError::Closed)?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }
}

async fn route_stdout<R>(server_name: String, reader: BufReader<R>, pending: Arc<PendingRequests>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parse_message(&line) {
                Some(message) => {
                    if !pending.complete(message) {
                        debug!(server_name = %server_name, "Ignoring unsolicited MCP message");
                    }
                }
                None if !line.trim().is_empty() => {
                    // npx and friends print banners on stdout
                    debug!(server_name = %server_name, line = line.trim(), "Skipping non-JSON-RPC output");
                }
                None => {}
            },
            Ok(None) => {
                debug!(server_name = %server_name, "MCP server closed stdout");
                break;
            }
            Err(e) => {
                warn!(server_name = %server_name, error = %e, "Failed reading MCP server stdout");
                break;
            }
        }
    }
    pending.close();
}

#[async_trait]
impl RpcChannel for StdioChannel {
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        deadline: Duration,
    ) -> Result<Value, TransportError> {
        let (id, rx) = self.pending.register()?;
        let line = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;

        let exchange = async {
            self.write_line(line).await?;
            rx.await.map_err(|_| TransportError::Closed)
        };

        match tokio::time::timeout(deadline, exchange).await {
            Ok(Ok(message)) => message.into_result(),
            Ok(Err(e)) => {
                self.pending.cancel(id);
                Err(e)
            }
            Err(_) => {
                self.pending.cancel(id);
                Err(TransportError::Timeout(deadline))
            }
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), TransportError> {
        let line = serde_json::to_string(&notification(method, params))?;
        self.write_line(line).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        // Drop stdin to signal EOF
        self.stdin.lock().await.take();
        self.pending.close();
        self.reader.abort();
        if let Some(stderr) = &self.stderr {
            stderr.abort();
        }

        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };

        if let Err(e) = child.start_kill() {
            // Already exited
            debug!(server_name = %self.server_name, error = %e, "MCP server kill skipped");
        }
        match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(server_name = %self.server_name, %status, "MCP server process exited");
                Ok(())
            }
            Ok(Err(e)) => Err(TransportError::Io(e)),
            Err(_) => Err(TransportError::Timeout(EXIT_GRACE)),
        }
    }
}

impl Drop for StdioChannel {
    fn drop(&mut self) {
        self.reader.abort();
        if let Some(stderr) = &self.stderr {
            stderr.abort();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn launch(script: &str) -> LaunchSpec {
        LaunchSpec {
            program: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            env: Vec::new(),
            working_dir: None,
        }
    }

    #[tokio::test]
    async fn test_skips_banner_and_routes_response() {
        let channel = StdioChannel::spawn(
            "echo",
            &launch(
                r#"read line; echo "starting up"; echo '{"jsonrpc":"2.0","id":1,"result":{"ok":true}}'; sleep 5"#,
            ),
        )
        .unwrap();

        let result = channel
            .request("ping", None, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result["ok"], true);
        channel.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_exited_process_reports_closed() {
        let channel = StdioChannel::spawn("gone", &launch("exit 0")).unwrap();

        let err = channel
            .request("ping", None, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::Closed | TransportError::Io(_)
        ));
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let channel = StdioChannel::spawn("mute", &launch("sleep 5")).unwrap();

        let err = channel
            .request("ping", None, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        channel.close().await.unwrap();
        // Idempotent
        channel.close().await.unwrap();
    }

    #[test]
    fn test_spawn_rejects_missing_program() {
        let spec = LaunchSpec {
            program: "/nonexistent/mcp-server".to_string(),
            args: Vec::new(),
            env: Vec::new(),
            working_dir: None,
        };
        assert!(matches!(
            StdioChannel::spawn("missing", &spec),
            Err(TransportError::SpawnFailed(_))
        ));
    }
}
