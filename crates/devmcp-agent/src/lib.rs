//! devmcp-agent: an MCP stdio server exposing GitHub workflow tools,
//! blast-radius analysis, code-graph queries, and multi-agent swarm
//! orchestration.

pub mod agent_client;
pub mod branch;
pub mod cache;
pub mod cli;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod graph;
pub mod rate_limit;
pub mod search;
pub mod state;
pub mod subprocess;
pub mod swarm;
pub mod tools;
pub mod transport;
