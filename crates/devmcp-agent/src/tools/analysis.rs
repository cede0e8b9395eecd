//! Analysis tool family: blast-radius and relevant-context lookups, built on
//! C10's search cascade and its small diff/identifier parsers.

use serde_json::{json, Value};

use super::err;
use crate::search;
use crate::state::ServerState;

pub fn search_refs_schema() -> Value {
    json!({
        "name": "search_refs",
        "description": "Search the working repository for references to a symbol",
        "inputSchema": {
            "type": "object",
            "properties": {
                "symbol": {"type": "string"},
                "exclude_path": {"type": "string", "description": "A path to omit from results"}
            },
            "required": ["symbol"]
        }
    })
}

pub fn blast_radius_schema() -> Value {
    json!({
        "name": "blast_radius",
        "description": "Given a unified diff, find symbols touched by the changed files and their callers",
        "inputSchema": {
            "type": "object",
            "properties": {
                "diff": {"type": "string", "description": "Unified diff text"}
            },
            "required": ["diff"]
        }
    })
}

pub async fn handle_search_refs(state: &ServerState, arguments: &Value) -> Value {
    let Some(symbol) = arguments.get("symbol").and_then(Value::as_str) else {
        return err("search_refs requires a symbol argument");
    };
    let exclude_path = arguments.get("exclude_path").and_then(Value::as_str);
    let cwd = state.current_repo_path().await;
    let cwd_path = cwd.as_deref().map(std::path::Path::new);

    match state.search.search_refs(symbol, exclude_path, cwd_path).await {
        Ok(paths) => json!({"paths": paths}),
        Err(e) => err(e),
    }
}

pub async fn handle_blast_radius(state: &ServerState, arguments: &Value) -> Value {
    let Some(diff) = arguments.get("diff").and_then(Value::as_str) else {
        return err("blast_radius requires a diff argument");
    };

    let paths: Vec<&str> = diff
        .lines()
        .filter_map(search::path_from_diff_header)
        .collect();
    if paths.is_empty() {
        return json!({"touched_paths": [], "symbols": []});
    }

    let cwd = state.current_repo_path().await;
    let cwd_path = cwd.as_deref().map(std::path::Path::new);

    let mut symbols = Vec::new();
    for line in diff.lines() {
        if let Some(id) = search::identifier_after_definition(line.trim_start_matches(['+', '-'])) {
            if !symbols.contains(&id.to_string()) {
                symbols.push(id.to_string());
            }
        }
    }

    let mut callers = Vec::new();
    for symbol in &symbols {
        if let Ok(refs) = state.search.search_refs(symbol, None, cwd_path).await {
            callers.extend(refs);
        }
    }
    callers.sort();
    callers.dedup();

    json!({
        "touched_paths": paths,
        "symbols": symbols,
        "callers": callers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blast_radius_without_diff_headers_returns_empty() {
        let state = ServerState::new(crate::config::ServerConfig::default());
        let result = handle_blast_radius(&state, &json!({"diff": "no headers here"})).await;
        assert_eq!(result, json!({"touched_paths": [], "symbols": []}));
    }

    #[tokio::test]
    async fn search_refs_missing_symbol_is_an_error_object() {
        let state = ServerState::new(crate::config::ServerConfig::default());
        let result = handle_search_refs(&state, &json!({})).await;
        assert!(result.get("error").is_some());
    }
}
