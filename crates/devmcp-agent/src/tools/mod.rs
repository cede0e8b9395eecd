//! Tool Registry (C7, spec.md §4.7).
//!
//! A static table mapping tool name to `{json schema, handler}`. Handlers
//! never raise to the dispatch loop: on failure they return a JSON
//! `{"error": <message>}` object instead of an `Err`. Grounded on
//! `atm-agent-mcp/src/tools.rs`'s schema style and `atm_tools.rs`'s
//! handler-family split (planning / issues-branches-PRs / analysis / graph /
//! agent runners / repo switch).

use serde_json::{json, Value};

use crate::state::ServerState;

mod agent_runners;
mod analysis;
mod graph_queries;
mod issues;
mod repo_switch;

/// Names of every tool in the registry, in the order `tools/list` reports
/// them.
pub const TOOL_NAMES: &[&str] = &[
    "repo_switch",
    "search_refs",
    "blast_radius",
    "graph_symbol_at",
    "graph_find_callers",
    "graph_find_callees",
    "graph_find_dependents",
    "gh_issue_list",
    "gh_branch_create",
    "gh_pr_create",
    "run_agent",
    "run_swarm",
];

/// Build the `tools/list` schema array.
pub fn schemas() -> Vec<Value> {
    vec![
        repo_switch::schema(),
        analysis::search_refs_schema(),
        analysis::blast_radius_schema(),
        graph_queries::symbol_at_schema(),
        graph_queries::find_callers_schema(),
        graph_queries::find_callees_schema(),
        graph_queries::find_dependents_schema(),
        issues::gh_issue_list_schema(),
        issues::gh_branch_create_schema(),
        issues::gh_pr_create_schema(),
        agent_runners::run_agent_schema(),
        agent_runners::run_swarm_schema(),
    ]
}

fn error_result(message: impl std::fmt::Display) -> Value {
    json!({"error": message.to_string()})
}

/// Route `name` to its handler, passing `thread_id` (already resolved by
/// [`crate::context`]) and the raw tool `arguments`. An unknown tool name
/// returns a JSON error object rather than panicking — the dispatch loop
/// maps unknown *methods* to `-32601`, but unknown *tool names* inside a
/// valid `tools/call` are a tool-level error per spec.md §4.7's contract.
pub async fn call(state: &ServerState, thread_id: &str, name: &str, arguments: &Value) -> Value {
    match name {
        "repo_switch" => repo_switch::handle(state, arguments).await,
        "search_refs" => analysis::handle_search_refs(state, arguments).await,
        "blast_radius" => analysis::handle_blast_radius(state, arguments).await,
        "graph_symbol_at" => graph_queries::handle_symbol_at(state, arguments).await,
        "graph_find_callers" => graph_queries::handle_find_callers(state, arguments).await,
        "graph_find_callees" => graph_queries::handle_find_callees(state, arguments).await,
        "graph_find_dependents" => graph_queries::handle_find_dependents(state, arguments).await,
        "gh_issue_list" => issues::handle_issue_list(state, arguments).await,
        "gh_branch_create" => issues::handle_branch_create(state, arguments).await,
        "gh_pr_create" => issues::handle_pr_create(state, arguments).await,
        "run_agent" => agent_runners::handle_run_agent(state, thread_id, arguments).await,
        "run_swarm" => agent_runners::handle_run_swarm(state, thread_id, arguments).await,
        other => error_result(format!("unknown tool: {other}")),
    }
}

pub(crate) use error_result as err;
