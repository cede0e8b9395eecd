//! Graph Query Adapter (C11, spec.md §4.11).
//!
//! A thin, read-only interface over an externally persisted code graph at
//! `<cwd>/.codegraph/graph.bin`. The graph is never built here — only
//! opened on demand, queried, and closed. Any failure to open or read it
//! maps to a typed error rather than a panic, so a missing or corrupt graph
//! file degrades a single tool call instead of the dispatch loop.

use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("graph file not found at {0}")]
    NotFound(PathBuf),
    #[error("failed to read graph file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed graph file: {0}")]
    Malformed(String),
    #[error("symbol not found: {0}")]
    SymbolNotFound(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Symbol {
    pub id: String,
    pub name: String,
    pub path: String,
    pub line: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Edge {
    pub caller: String,
    pub callee: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct GraphFile {
    #[serde(default)]
    symbols: Vec<Symbol>,
    #[serde(default)]
    edges: Vec<Edge>,
    /// Precomputed PageRank-style importance score per symbol id.
    #[serde(default)]
    scores: std::collections::HashMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DependentResult {
    pub symbol_id: String,
    pub score: f64,
}

/// Relative location of the persisted graph under a repo root.
pub fn graph_path(repo_root: &Path) -> PathBuf {
    repo_root.join(".codegraph").join("graph.bin")
}

/// Opaque, open-on-demand handle over the parsed graph file. Nothing about
/// it is cached across calls — spec.md §3 "Graph Handle" calls for
/// open-on-demand, closed after the query.
struct GraphHandle {
    graph: GraphFile,
}

impl GraphHandle {
    async fn open(repo_root: &Path) -> Result<Self, GraphError> {
        let path = graph_path(repo_root);
        if !path.exists() {
            return Err(GraphError::NotFound(path));
        }
        let bytes = tokio::fs::read(&path).await?;
        let graph: GraphFile =
            serde_json::from_slice(&bytes).map_err(|e| GraphError::Malformed(e.to_string()))?;
        Ok(Self { graph })
    }
}

/// Find the symbol enclosing `(path, line)`, if any. When several symbols
/// in the file contain the line, the one whose start line is closest below
/// it wins (the narrowest/most-specific enclosing definition).
pub async fn symbol_at(repo_root: &Path, path: &str, line: u32) -> Result<Option<Symbol>, GraphError> {
    let handle = GraphHandle::open(repo_root).await?;
    let best = handle
        .graph
        .symbols
        .into_iter()
        .filter(|s| s.path == path && s.line <= line)
        .max_by_key(|s| s.line);
    Ok(best)
}

/// Symbols that call `symbol_id`.
pub async fn find_callers(repo_root: &Path, symbol_id: &str) -> Result<Vec<String>, GraphError> {
    let handle = GraphHandle::open(repo_root).await?;
    Ok(handle
        .graph
        .edges
        .into_iter()
        .filter(|e| e.callee == symbol_id)
        .map(|e| e.caller)
        .collect())
}

/// Symbols that `symbol_id` calls.
pub async fn find_callees(repo_root: &Path, symbol_id: &str) -> Result<Vec<String>, GraphError> {
    let handle = GraphHandle::open(repo_root).await?;
    Ok(handle
        .graph
        .edges
        .into_iter()
        .filter(|e| e.caller == symbol_id)
        .map(|e| e.callee)
        .collect())
}

/// Symbols that transitively depend on `symbol_id` (its callers' callers,
/// and so on), ranked by precomputed score and capped at `limit`.
pub async fn find_dependents(
    repo_root: &Path,
    symbol_id: &str,
    limit: usize,
) -> Result<Vec<DependentResult>, GraphError> {
    let handle = GraphHandle::open(repo_root).await?;
    if !handle.graph.symbols.iter().any(|s| s.id == symbol_id) {
        return Err(GraphError::SymbolNotFound(symbol_id.to_string()));
    }

    let mut visited = std::collections::HashSet::new();
    let mut frontier = vec![symbol_id.to_string()];
    visited.insert(symbol_id.to_string());
    let mut dependents = Vec::new();

    while let Some(current) = frontier.pop() {
        for edge in &handle.graph.edges {
            if edge.callee == current && visited.insert(edge.caller.clone()) {
                dependents.push(edge.caller.clone());
                frontier.push(edge.caller.clone());
            }
        }
    }

    let mut results: Vec<DependentResult> = dependents
        .into_iter()
        .map(|id| {
            let score = handle.graph.scores.get(&id).copied().unwrap_or(0.0);
            DependentResult { symbol_id: id, score }
        })
        .collect();
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(limit);
    Ok(results)
}
