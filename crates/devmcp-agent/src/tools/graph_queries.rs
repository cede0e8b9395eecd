//! Graph-query tool family: thin pass-through to C11.

use serde_json::{json, Value};

use super::err;
use crate::graph;
use crate::state::ServerState;

pub fn symbol_at_schema() -> Value {
    json!({
        "name": "graph_symbol_at",
        "description": "Resolve the symbol enclosing a file:line position",
        "inputSchema": {
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "line": {"type": "integer"}
            },
            "required": ["path", "line"]
        }
    })
}

pub fn find_callers_schema() -> Value {
    json!({
        "name": "graph_find_callers",
        "description": "List symbols that call the given symbol id",
        "inputSchema": {
            "type": "object",
            "properties": {"symbol_id": {"type": "string"}},
            "required": ["symbol_id"]
        }
    })
}

pub fn find_callees_schema() -> Value {
    json!({
        "name": "graph_find_callees",
        "description": "List symbols that the given symbol id calls",
        "inputSchema": {
            "type": "object",
            "properties": {"symbol_id": {"type": "string"}},
            "required": ["symbol_id"]
        }
    })
}

pub fn find_dependents_schema() -> Value {
    json!({
        "name": "graph_find_dependents",
        "description": "List symbols transitively depending on the given symbol id, ranked by score",
        "inputSchema": {
            "type": "object",
            "properties": {
                "symbol_id": {"type": "string"},
                "limit": {"type": "integer"}
            },
            "required": ["symbol_id"]
        }
    })
}

async fn repo_root(state: &ServerState) -> Option<std::path::PathBuf> {
    state.current_repo_path().await.map(std::path::PathBuf::from)
}

pub async fn handle_symbol_at(state: &ServerState, arguments: &Value) -> Value {
    let (Some(path), Some(line)) = (
        arguments.get("path").and_then(Value::as_str),
        arguments.get("line").and_then(Value::as_u64),
    ) else {
        return err("graph_symbol_at requires path and line arguments");
    };
    let Some(root) = repo_root(state).await else {
        return err("no repository is currently bound");
    };
    match graph::symbol_at(&root, path, line as u32).await {
        Ok(sym) => json!({"symbol": sym.map(|s| json!({"id": s.id, "name": s.name, "path": s.path, "line": s.line}))}),
        Err(e) => err(e),
    }
}

pub async fn handle_find_callers(state: &ServerState, arguments: &Value) -> Value {
    let Some(symbol_id) = arguments.get("symbol_id").and_then(Value::as_str) else {
        return err("graph_find_callers requires a symbol_id argument");
    };
    let Some(root) = repo_root(state).await else {
        return err("no repository is currently bound");
    };
    match graph::find_callers(&root, symbol_id).await {
        Ok(ids) => json!({"callers": ids}),
        Err(e) => err(e),
    }
}

pub async fn handle_find_callees(state: &ServerState, arguments: &Value) -> Value {
    let Some(symbol_id) = arguments.get("symbol_id").and_then(Value::as_str) else {
        return err("graph_find_callees requires a symbol_id argument");
    };
    let Some(root) = repo_root(state).await else {
        return err("no repository is currently bound");
    };
    match graph::find_callees(&root, symbol_id).await {
        Ok(ids) => json!({"callees": ids}),
        Err(e) => err(e),
    }
}

pub async fn handle_find_dependents(state: &ServerState, arguments: &Value) -> Value {
    let Some(symbol_id) = arguments.get("symbol_id").and_then(Value::as_str) else {
        return err("graph_find_dependents requires a symbol_id argument");
    };
    let limit = arguments.get("limit").and_then(Value::as_u64).unwrap_or(20) as usize;
    let Some(root) = repo_root(state).await else {
        return err("no repository is currently bound");
    };
    match graph::find_dependents(&root, symbol_id, limit).await {
        Ok(results) => json!({
            "dependents": results.into_iter().map(|d| json!({"symbol_id": d.symbol_id, "score": d.score})).collect::<Vec<_>>()
        }),
        Err(e) => err(e),
    }
}
