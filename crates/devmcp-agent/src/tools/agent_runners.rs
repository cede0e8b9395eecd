//! Agent-runner tool family: delegates single turns to C8 and decomposed
//! tasks to the C9 swarm orchestrator.

use serde_json::{json, Value};

use super::err;
use crate::agent_client::{self, SandboxPolicy};
use crate::state::ServerState;
use crate::swarm;

pub fn run_agent_schema() -> Value {
    json!({
        "name": "run_agent",
        "description": "Run a single external-agent turn against the bound repository",
        "inputSchema": {
            "type": "object",
            "properties": {
                "prompt": {"type": "string"},
                "writable": {"type": "boolean", "description": "Allow the agent to modify files (default: false)"}
            },
            "required": ["prompt"]
        }
    })
}

pub fn run_swarm_schema() -> Value {
    json!({
        "name": "run_swarm",
        "description": "Decompose a task across a swarm of external-agent workers and synthesize their output",
        "inputSchema": {
            "type": "object",
            "properties": {
                "task": {"type": "string"},
                "max_agents": {"type": "integer"},
                "writable": {"type": "boolean"}
            },
            "required": ["task"]
        }
    })
}

fn sandbox_from(arguments: &Value) -> SandboxPolicy {
    if arguments.get("writable").and_then(Value::as_bool).unwrap_or(false) {
        SandboxPolicy::Unrestricted
    } else {
        SandboxPolicy::ReadOnly
    }
}

/// Name the agent client identifies itself with during `initialize`; the
/// calling thread id has no bearing on the external agent's own protocol.
const CLIENT_NAME: &str = "devmcp";

pub async fn handle_run_agent(state: &ServerState, thread_id: &str, arguments: &Value) -> Value {
    let Some(prompt) = arguments.get("prompt").and_then(Value::as_str) else {
        return err("run_agent requires a prompt argument");
    };
    let cwd = state.current_repo_path().await.unwrap_or_else(|| ".".to_string());
    let sandbox = sandbox_from(arguments);

    tracing::debug!(thread_id, "running single agent turn");
    match agent_client::run_turn(state.agent_transport.as_ref(), CLIENT_NAME, &cwd, sandbox, prompt).await {
        Ok(output) => json!({"output": output}),
        Err(e) => err(e),
    }
}

pub async fn handle_run_swarm(state: &ServerState, thread_id: &str, arguments: &Value) -> Value {
    let Some(task) = arguments.get("task").and_then(Value::as_str) else {
        return err("run_swarm requires a task argument");
    };
    let max_agents = arguments
        .get("max_agents")
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .unwrap_or(state.config.swarm_max_agents);
    let cwd = state.current_repo_path().await.unwrap_or_else(|| ".".to_string());
    let sandbox = sandbox_from(arguments);

    tracing::debug!(thread_id, max_agents, "running swarm");
    match swarm::run_swarm(state.agent_transport.as_ref(), CLIENT_NAME, &cwd, sandbox, task, max_agents).await {
        Ok(output) => json!({"output": output}),
        Err(e) => err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_agent_missing_prompt_is_an_error_object() {
        let state = ServerState::new(crate::config::ServerConfig::default());
        let result = handle_run_agent(&state, "default", &json!({})).await;
        assert!(result.get("error").is_some());
    }

    #[tokio::test]
    async fn run_swarm_missing_task_is_an_error_object() {
        let state = ServerState::new(crate::config::ServerConfig::default());
        let result = handle_run_swarm(&state, "default", &json!({})).await;
        assert!(result.get("error").is_some());
    }
}
