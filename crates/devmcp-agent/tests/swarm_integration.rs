//! Swarm happy-path integration test (spec.md §8 scenario 7): an
//! orchestrator stub returns a two-worker plan, both workers run, and the
//! synthesis stub echoes markers for both. Grounded on
//! `atm-agent-mcp/src/transport.rs`'s `MockTransport` test-double pattern,
//! adapted to the line-delimited agent-client dialect.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use devmcp_agent::agent_client::{AgentError, AgentIo, AgentTransport, SandboxPolicy};
use devmcp_agent::swarm;
use serde_json::json;
use tokio::io::AsyncWriteExt;

/// Scripts one fixed reply sequence per call, in call order: first call is
/// the decompose turn, the next two are the workers, the last is synthesis.
struct ScriptedSwarmTransport {
    call_index: AtomicUsize,
}

fn lines_for_call(i: usize) -> Vec<String> {
    let handshake = vec![
        json!({"id": 0, "result": {}}).to_string(),
        json!({"id": 1, "result": {"thread": {"id": format!("t{i}")}}}).to_string(),
    ];
    let body = match i {
        0 => vec![json!({
            "method": "item/agentMessage/delta",
            "params": {"delta": "[{\"role\":\"x\",\"prompt\":\"p1\"},{\"role\":\"y\",\"prompt\":\"p2\"}]"}
        })
        .to_string()],
        1 => vec![json!({"method": "item/agentMessage/delta", "params": {"delta": "worker-x-done"}}).to_string()],
        2 => vec![json!({"method": "item/agentMessage/delta", "params": {"delta": "worker-y-done"}}).to_string()],
        _ => vec![json!({
            "method": "item/agentMessage/delta",
            "params": {"delta": "SYNTHESIS[worker-x-done][worker-y-done]"}
        })
        .to_string()],
    };
    let completed = json!({"method": "turn/completed", "params": {"turn": {"status": "completed"}}}).to_string();

    let mut lines = handshake;
    lines.extend(body);
    lines.push(completed);
    lines
}

#[async_trait]
impl AgentTransport for ScriptedSwarmTransport {
    async fn spawn(&self) -> Result<AgentIo, AgentError> {
        let call_i = self.call_index.fetch_add(1, Ordering::SeqCst);
        let (client_side, mut server_side) = tokio::io::duplex(8192);
        let (client_read, mut client_write) = tokio::io::split(client_side);
        let lines = lines_for_call(call_i);
        tokio::spawn(async move {
            tokio::spawn(async move {
                let mut sink = vec![0u8; 4096];
                loop {
                    use tokio::io::AsyncReadExt;
                    match server_side.read(&mut sink).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {}
                    }
                }
            });
            for line in lines {
                let _ = client_write.write_all(line.as_bytes()).await;
                let _ = client_write.write_all(b"\n").await;
            }
        });
        Ok(AgentIo {
            stdin: Box::new(tokio::io::sink()),
            stdout: Box::new(client_read),
            child: None,
        })
    }
}

#[tokio::test]
async fn swarm_happy_path_synthesizes_both_worker_outputs() {
    let transport: Arc<dyn AgentTransport> = Arc::new(ScriptedSwarmTransport {
        call_index: AtomicUsize::new(0),
    });

    let output = swarm::run_swarm(
        transport.as_ref(),
        "devmcp",
        "/repo",
        SandboxPolicy::ReadOnly,
        "build the thing",
        8,
    )
    .await
    .unwrap();

    assert!(output.contains("worker-x-done"));
    assert!(output.contains("worker-y-done"));
}
