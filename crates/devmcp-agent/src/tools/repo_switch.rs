//! Repo switch tool family (delegates to C4's process-wide repo binding).

use serde_json::{json, Value};

use super::err;
use crate::state::ServerState;

pub fn schema() -> Value {
    json!({
        "name": "repo_switch",
        "description": "Rebind the server's working repository, invalidating and re-warming the session cache",
        "inputSchema": {
            "type": "object",
            "properties": {
                "repo_path": {"type": "string", "description": "Absolute path to the repository root"}
            },
            "required": ["repo_path"]
        }
    })
}

pub async fn handle(state: &ServerState, arguments: &Value) -> Value {
    let Some(repo_path) = arguments.get("repo_path").and_then(Value::as_str) else {
        return err("repo_switch requires a repo_path argument");
    };
    if let Err(e) = state.switch_repo(repo_path.to_string()).await {
        return err(e);
    }
    let repo = state.repo.lock().await;
    json!({
        "repo_path": repo.path,
        "repo_slug": repo.identity.repo_slug,
    })
}
