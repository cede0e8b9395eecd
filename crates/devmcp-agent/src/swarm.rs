//! Swarm Orchestrator (C9, spec.md §4.9).
//!
//! Decompose a task into per-agent roles with one orchestrator turn, fan the
//! roles out to parallel workers (each an independent [`agent_client::run_turn`]
//! call), join, then synthesize one final turn over all worker outputs.
//! Grounded on `agent_client`'s turn-driving primitive; the fan-out/join
//! shape follows spec.md §5's "transient threads, all joined before
//! synthesis" concurrency model rather than any single teacher file.

use serde::Deserialize;
use serde_json::Value;

use crate::agent_client::{self, AgentTransport, SandboxPolicy};

/// Hard ceiling on decomposed agents regardless of what the caller requests.
pub const HARD_CAP: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum SwarmError {
    #[error("decompose turn failed: {0}")]
    DecomposeFailed(#[source] agent_client::AgentError),
    #[error("decompose reply contained no JSON array")]
    NoArrayFound,
    #[error("decompose reply array was malformed: {0}")]
    MalformedPlan(String),
    #[error("every worker failed to spawn")]
    NoWorkersSucceeded,
    #[error("synthesis turn failed: {0}")]
    SynthesizeFailed(#[source] agent_client::AgentError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentRole {
    pub role: String,
    pub prompt: String,
}

const DECOMPOSE_PROMPT_HEADER: &str = "You are decomposing a task for a swarm of sub-agents. \
Reply with ONLY a JSON array of objects of the form {\"role\": string, \"prompt\": string}, \
at most the requested number of entries, nothing else before or after the array.\n\nTask:\n";

const SYNTHESIZE_HEADER: &str =
    "You are synthesizing the results of a swarm of sub-agents into one final answer.\n\n";
const SYNTHESIZE_CLOSING: &str =
    "\nProduce a single coherent response drawing on all agent outputs above.";

/// Scan `text` for the first `[` and last `]` and parse that slice as JSON.
fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

async fn decompose(
    transport: &dyn AgentTransport,
    client_name: &str,
    cwd: &str,
    sandbox: SandboxPolicy,
    task: &str,
    max_agents: usize,
) -> Result<Vec<AgentRole>, SwarmError> {
    let cap = max_agents.min(HARD_CAP);
    let prompt = format!("{DECOMPOSE_PROMPT_HEADER}{task}\n\nMaximum entries: {cap}");
    let reply = agent_client::run_turn(transport, client_name, cwd, sandbox, &prompt)
        .await
        .map_err(SwarmError::DecomposeFailed)?;

    let slice = extract_json_array(&reply).ok_or(SwarmError::NoArrayFound)?;
    let raw: Vec<Value> =
        serde_json::from_str(slice).map_err(|e| SwarmError::MalformedPlan(e.to_string()))?;

    let mut roles = Vec::new();
    for entry in raw.into_iter().take(cap) {
        let role: AgentRole =
            serde_json::from_value(entry).map_err(|e| SwarmError::MalformedPlan(e.to_string()))?;
        roles.push(role);
    }

    devmcp_core::event_log::emit_event_best_effort(devmcp_core::event_log::EventFields {
        level: "info",
        source: "devmcp-agent",
        action: "swarm_decompose",
        count: Some(roles.len() as u64),
        ..Default::default()
    });
    Ok(roles)
}

struct WorkerResult {
    role: String,
    output: String,
}

async fn fan_out(
    transport: &dyn AgentTransport,
    client_name: &str,
    cwd: &str,
    sandbox: SandboxPolicy,
    roles: Vec<AgentRole>,
) -> Result<Vec<WorkerResult>, SwarmError> {
    let futures = roles.into_iter().map(|role| async move {
        devmcp_core::event_log::emit_event_best_effort(devmcp_core::event_log::EventFields {
            level: "info",
            source: "devmcp-agent",
            action: "swarm_worker_spawned",
            target: Some(role.role.clone()),
            ..Default::default()
        });
        let output = agent_client::run_turn(transport, client_name, cwd, sandbox, &role.prompt).await;
        output.ok().map(|output| WorkerResult { role: role.role, output })
    });

    let results: Vec<Option<WorkerResult>> = futures::future::join_all(futures).await;
    let succeeded: Vec<WorkerResult> = results.into_iter().flatten().collect();
    if succeeded.is_empty() {
        return Err(SwarmError::NoWorkersSucceeded);
    }
    Ok(succeeded)
}

fn build_synthesis_prompt(task: &str, workers: &[WorkerResult]) -> String {
    let mut prompt = String::from(SYNTHESIZE_HEADER);
    prompt.push_str("Original task:\n");
    prompt.push_str(task);
    prompt.push_str("\n\n");
    for (i, worker) in workers.iter().enumerate() {
        prompt.push_str(&format!("## Agent {} — {}\n{}\n\n", i + 1, worker.role, worker.output));
    }
    prompt.push_str(SYNTHESIZE_CLOSING);
    prompt
}

/// Run the full decompose -> fan-out -> join -> synthesize pipeline for
/// `task`, spawning at most `min(max_agents, HARD_CAP)` workers.
pub async fn run_swarm(
    transport: &dyn AgentTransport,
    client_name: &str,
    cwd: &str,
    sandbox: SandboxPolicy,
    task: &str,
    max_agents: usize,
) -> Result<String, SwarmError> {
    let roles = decompose(transport, client_name, cwd, sandbox, task, max_agents).await?;
    let workers = fan_out(transport, client_name, cwd, sandbox, roles).await?;
    let synthesis_prompt = build_synthesis_prompt(task, &workers);
    agent_client::run_turn(transport, client_name, cwd, sandbox, &synthesis_prompt)
        .await
        .map_err(SwarmError::SynthesizeFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_array_takes_outermost_brackets() {
        let text = "Sure, here it is:\n[{\"role\":\"a\",\"prompt\":\"p\"}]\nThanks!";
        assert_eq!(
            extract_json_array(text),
            Some("[{\"role\":\"a\",\"prompt\":\"p\"}]")
        );
    }

    #[test]
    fn extract_json_array_none_without_brackets() {
        assert_eq!(extract_json_array("no brackets here"), None);
    }

    #[test]
    fn build_synthesis_prompt_includes_every_worker_block() {
        let workers = vec![
            WorkerResult { role: "researcher".into(), output: "found X".into() },
            WorkerResult { role: "writer".into(), output: "wrote Y".into() },
        ];
        let prompt = build_synthesis_prompt("do the thing", &workers);
        assert!(prompt.contains("## Agent 1 — researcher\nfound X"));
        assert!(prompt.contains("## Agent 2 — writer\nwrote Y"));
        assert!(prompt.ends_with(SYNTHESIZE_CLOSING));
    }
}
