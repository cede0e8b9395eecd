//! Issues & branches & PRs tool family: shells out through C1 to `gh`/`git`,
//! governed by C2's rate limiter, assembling JSON from their output.

use serde_json::{json, Value};

use super::err;
use crate::branch;
use crate::state::ServerState;
use crate::subprocess;

pub fn gh_issue_list_schema() -> Value {
    json!({
        "name": "gh_issue_list",
        "description": "List open issues in the bound repository via gh",
        "inputSchema": {
            "type": "object",
            "properties": {
                "label": {"type": "string", "description": "Filter by label name"}
            }
        }
    })
}

pub fn gh_branch_create_schema() -> Value {
    json!({
        "name": "gh_branch_create",
        "description": "Create and check out a branch named from an issue number and title",
        "inputSchema": {
            "type": "object",
            "properties": {
                "issue_number": {"type": "integer"},
                "title": {"type": "string"}
            },
            "required": ["issue_number", "title"]
        }
    })
}

pub fn gh_pr_create_schema() -> Value {
    json!({
        "name": "gh_pr_create",
        "description": "Open a pull request from the current branch via gh",
        "inputSchema": {
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "body": {"type": "string"}
            },
            "required": ["title"]
        }
    })
}

async fn acquire_or_rate_limited(state: &ServerState) -> Result<(), Value> {
    let mut limiter = state.rate_limiter.lock().await;
    if limiter.try_acquire() {
        Ok(())
    } else {
        devmcp_core::event_log::emit_event_best_effort(devmcp_core::event_log::EventFields {
            level: "warn",
            source: "devmcp-agent",
            action: "rate_limited",
            result: Some("exhausted".to_string()),
            ..Default::default()
        });
        Err(err("rate limit exhausted; retry after reset"))
    }
}

pub async fn handle_issue_list(state: &ServerState, arguments: &Value) -> Value {
    if let Err(e) = acquire_or_rate_limited(state).await {
        return e;
    }
    let cwd = state.current_repo_path().await;
    let cwd_path = cwd.as_deref().map(std::path::Path::new);

    let mut argv = vec!["gh", "issue", "list", "--json", "number,title,labels"];
    let label_owned;
    if let Some(label) = arguments.get("label").and_then(Value::as_str) {
        label_owned = label.to_string();
        argv.push("--label");
        argv.push(&label_owned);
    }

    match subprocess::run_json::<Value>(&argv, cwd_path).await {
        Ok(issues) => json!({"issues": issues}),
        Err(e) => err(e),
    }
}

pub async fn handle_branch_create(state: &ServerState, arguments: &Value) -> Value {
    let Some(issue_number) = arguments.get("issue_number").and_then(Value::as_u64) else {
        return err("gh_branch_create requires an issue_number argument");
    };
    let Some(title) = arguments.get("title").and_then(Value::as_str) else {
        return err("gh_branch_create requires a title argument");
    };
    let cwd = state.current_repo_path().await;
    let cwd_path = cwd.as_deref().map(std::path::Path::new);

    let name = branch::branch_name(issue_number, title);
    match subprocess::run(&["git", "checkout", "-b", &name], cwd_path).await {
        Ok(_) => json!({"branch": name}),
        Err(e) => err(e),
    }
}

pub async fn handle_pr_create(state: &ServerState, arguments: &Value) -> Value {
    let Some(title) = arguments.get("title").and_then(Value::as_str) else {
        return err("gh_pr_create requires a title argument");
    };
    if let Err(e) = acquire_or_rate_limited(state).await {
        return e;
    }
    let cwd = state.current_repo_path().await;
    let cwd_path = cwd.as_deref().map(std::path::Path::new);

    let body = arguments.get("body").and_then(Value::as_str).unwrap_or("");
    let argv = vec!["gh", "pr", "create", "--title", title, "--body", body];
    match subprocess::run(&argv, cwd_path).await {
        Ok(out) => json!({"url": String::from_utf8_lossy(&out.stdout).trim()}),
        Err(e) => err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pr_create_missing_title_is_an_error_object() {
        let state = ServerState::new(crate::config::ServerConfig::default());
        let result = handle_pr_create(&state, &json!({})).await;
        assert!(result.get("error").is_some());
    }

    #[tokio::test]
    async fn branch_create_missing_fields_are_error_objects() {
        let state = ServerState::new(crate::config::ServerConfig::default());
        let missing_number = handle_branch_create(&state, &json!({"title": "Fix X"})).await;
        assert!(missing_number.get("error").is_some());
        let missing_title = handle_branch_create(&state, &json!({"issue_number": 1})).await;
        assert!(missing_title.get("error").is_some());
    }

    /// spec.md §8 scenario 5: a subprocess whose stderr contains "not logged
    /// in" and exits non-zero surfaces as `{"error": "<auth message>"}` in
    /// the result envelope, and the loop stays alive (the `Value` result is
    /// returned normally, never an `Err`).
    #[tokio::test]
    #[serial_test::serial]
    async fn gh_auth_failure_surfaces_as_error_object_in_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let fake_gh = dir.path().join("gh");
        std::fs::write(&fake_gh, "#!/bin/sh\necho 'Error: not logged in' >&2\nexit 1\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&fake_gh, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let original_path = std::env::var("PATH").unwrap_or_default();
        std::env::set_var("PATH", format!("{}:{}", dir.path().display(), original_path));

        let state = ServerState::new(crate::config::ServerConfig::default());
        let result = handle_issue_list(&state, &json!({})).await;

        std::env::set_var("PATH", original_path);

        assert!(result.get("error").unwrap().as_str().unwrap().contains("not logged in"));
    }
}
