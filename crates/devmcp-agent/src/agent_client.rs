//! External-Agent Client (C8, spec.md §4.8).
//!
//! Drives a long-lived child that speaks its own newline-delimited JSON-RPC
//! dialect (no `jsonrpc: "2.0"` envelope) through the five-step handshake:
//! `initialize` -> `initialized` -> `thread/start` -> `turn/start` -> stream
//! deltas to `turn/completed`. Grounded on `transport.rs`'s `CodexTransport`
//! trait seam and its `MockTransport`/`SniffWriter` test-double pattern,
//! generalized from MCP-over-stdio to this line-delimited dialect and to the
//! direct/login-shell launch fallback spec.md calls for.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

/// Per-line cap while reading the agent's stdout (spec.md §4.8).
const MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("failed to launch agent process: {0}")]
    LaunchFailed(String),
    #[error("agent stdout closed before turn completed")]
    UnexpectedEof,
    #[error("agent line exceeded {MAX_LINE_BYTES} bytes")]
    LineTooLong,
    #[error("malformed agent message: {0}")]
    Malformed(String),
    #[error("i/o error talking to agent: {0}")]
    Io(#[from] std::io::Error),
    #[error("turn failed: {0}")]
    TurnFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxPolicy {
    ReadOnly,
    Unrestricted,
}

impl SandboxPolicy {
    fn as_str(self) -> &'static str {
        match self {
            SandboxPolicy::ReadOnly => "read-only",
            SandboxPolicy::Unrestricted => "unrestricted",
        }
    }
}

/// Raw line-oriented I/O handed back by a successful [`AgentTransport::spawn`].
pub struct AgentIo {
    pub stdin: Box<dyn tokio::io::AsyncWrite + Send + Unpin>,
    pub stdout: Box<dyn tokio::io::AsyncRead + Send + Unpin>,
    /// Retained so the caller can force-kill on drop; `None` for non-process
    /// transports such as the in-memory test double.
    pub child: Option<Arc<Mutex<Child>>>,
}

/// Abstracts how the agent child process is launched, mirroring the
/// teacher's `CodexTransport` trait seam so tests can substitute an
/// in-memory double instead of spawning a real binary.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    async fn spawn(&self) -> Result<AgentIo, AgentError>;
}

/// Production transport: spawns `agent_bin` directly with `extra_path`
/// prepended to `PATH`; if that fails, retries through a login shell
/// (`$SHELL -lc '<agent_bin> ...'`) so interactive-login PATH
/// augmentations are available (spec.md §4.8).
#[derive(Debug, Clone)]
pub struct ProcessAgentTransport {
    pub agent_bin: String,
    pub extra_path: Option<String>,
}

impl ProcessAgentTransport {
    pub fn new(agent_bin: impl Into<String>, extra_path: Option<String>) -> Self {
        let agent_bin = agent_bin.into();
        devmcp_core::event_log::emit_event_best_effort(devmcp_core::event_log::EventFields {
            level: "info",
            source: "devmcp-agent",
            action: "transport_init",
            target: Some(agent_bin.clone()),
            ..Default::default()
        });
        Self { agent_bin, extra_path }
    }

    fn augmented_path(&self) -> String {
        let current = std::env::var("PATH").unwrap_or_default();
        match &self.extra_path {
            Some(extra) if !extra.is_empty() => format!("{extra}:{current}"),
            _ => current,
        }
    }

    async fn spawn_direct(&self) -> Result<Child, std::io::Error> {
        Command::new(&self.agent_bin)
            .env("PATH", self.augmented_path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
    }

    async fn spawn_login_shell(&self) -> Result<Child, std::io::Error> {
        let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
        Command::new(shell)
            .arg("-lc")
            .arg(&self.agent_bin)
            .env("PATH", self.augmented_path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
    }
}

impl Drop for ProcessAgentTransport {
    /// Mirrors the teacher's `McpTransport::drop`: emit a `transport_shutdown`
    /// structured log event when the transport is dropped.
    fn drop(&mut self) {
        devmcp_core::event_log::emit_event_best_effort(devmcp_core::event_log::EventFields {
            level: "info",
            source: "devmcp-agent",
            action: "transport_shutdown",
            target: Some(self.agent_bin.clone()),
            ..Default::default()
        });
    }
}

#[async_trait]
impl AgentTransport for ProcessAgentTransport {
    async fn spawn(&self) -> Result<AgentIo, AgentError> {
        let mut child = match self.spawn_direct().await {
            Ok(child) => child,
            Err(direct_err) => self
                .spawn_login_shell()
                .await
                .map_err(|shell_err| {
                    AgentError::LaunchFailed(format!(
                        "direct spawn failed ({direct_err}); login-shell retry failed ({shell_err})"
                    ))
                })?,
        };

        let stdin = child.stdin.take().expect("stdin is piped");
        let stdout = child.stdout.take().expect("stdout is piped");
        Ok(AgentIo {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            child: Some(Arc::new(Mutex::new(child))),
        })
    }
}

/// Runs one agent turn end to end: handshake, single `turn/start`, stream
/// deltas until `turn/completed`. Returns the accumulated output buffer.
pub async fn run_turn(
    transport: &dyn AgentTransport,
    client_name: &str,
    cwd: &str,
    sandbox: SandboxPolicy,
    prompt: &str,
) -> Result<String, AgentError> {
    let io = transport.spawn().await?;
    let mut stdin = io.stdin;
    let mut reader = BufReader::new(io.stdout);

    write_line(
        &mut stdin,
        &json!({"method": "initialize", "id": 0, "params": {"clientInfo": {"name": client_name}}}),
    )
    .await?;
    let _ = read_line_message(&mut reader).await?;

    write_line(&mut stdin, &json!({"method": "initialized"})).await?;

    write_line(
        &mut stdin,
        &json!({
            "method": "thread/start",
            "id": 1,
            "params": {
                "approvalPolicy": "never",
                "sandboxPolicy": sandbox.as_str(),
                "cwd": cwd,
            }
        }),
    )
    .await?;
    let start_reply = read_line_message(&mut reader).await?;
    let thread_id = start_reply
        .get("result")
        .and_then(|r| r.get("thread"))
        .and_then(|t| t.get("id"))
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::Malformed("missing result.thread.id".to_string()))?
        .to_string();

    write_line(
        &mut stdin,
        &json!({
            "method": "turn/start",
            "params": {
                "threadId": thread_id,
                "input": [{"type": "text", "text": prompt}],
            }
        }),
    )
    .await?;

    let mut output = String::new();
    loop {
        let msg = read_line_message(&mut reader).await?;
        let method = msg.get("method").and_then(Value::as_str).unwrap_or("");
        match method {
            "item/agentMessage/delta" => {
                if let Some(delta) = msg.get("params").and_then(|p| p.get("delta")).and_then(Value::as_str) {
                    output.push_str(delta);
                }
            }
            "turn/completed" => {
                let status = msg
                    .get("params")
                    .and_then(|p| p.get("turn"))
                    .and_then(|t| t.get("status"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                if status == "failed" {
                    let err_msg = msg
                        .get("params")
                        .and_then(|p| p.get("turn"))
                        .and_then(|t| t.get("error"))
                        .and_then(Value::as_str)
                        .unwrap_or("turn failed with no message");
                    output.push_str(err_msg);
                }
                break;
            }
            _ => {
                // Any other notification is ignored — only delta/completed
                // matter to the output buffer (spec.md §4.8).
            }
        }
    }

    Ok(output)
}

async fn write_line(
    stdin: &mut (dyn tokio::io::AsyncWrite + Send + Unpin),
    value: &Value,
) -> Result<(), AgentError> {
    let mut line = serde_json::to_vec(value).map_err(|e| AgentError::Malformed(e.to_string()))?;
    line.push(b'\n');
    stdin.write_all(&line).await?;
    stdin.flush().await?;
    Ok(())
}

/// Read one newline-terminated line, byte at a time up to [`MAX_LINE_BYTES`],
/// and parse it as JSON.
async fn read_line_message(
    reader: &mut BufReader<Box<dyn tokio::io::AsyncRead + Send + Unpin>>,
) -> Result<Value, AgentError> {
    let mut buf = Vec::new();
    let n = reader
        .take(MAX_LINE_BYTES as u64 + 1)
        .read_until(b'\n', &mut buf)
        .await?;
    if n == 0 {
        return Err(AgentError::UnexpectedEof);
    }
    if buf.len() as u64 > MAX_LINE_BYTES as u64 {
        return Err(AgentError::LineTooLong);
    }
    while buf.last() == Some(&b'\n') || buf.last() == Some(&b'\r') {
        buf.pop();
    }
    serde_json::from_slice(&buf).map_err(|e| AgentError::Malformed(e.to_string()))
}
