//! Shared plumbing for devmcp binaries: home-directory resolution, tracing
//! initialization, and the structured JSONL event log.
//!
//! This crate carries no protocol or subprocess logic; see `devmcp-agent` for
//! the MCP transport, dispatch loop, and tool registry.

pub mod event_log;
pub mod home;
pub mod logging;
pub mod text;
