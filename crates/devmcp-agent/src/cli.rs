//! CLI argument types for devmcp.
//!
//! Defines the top-level [`Cli`] struct using clap's derive macros. The
//! `--mcp` flag is the only mode `spec.md` §6 gives functional meaning to;
//! `config` is read-only ambient convenience (see `atm-agent-mcp/src/cli.rs`).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Developer-workflow MCP server: GitHub operations, blast-radius analysis,
/// graph queries, and multi-agent swarm orchestration over stdio.
#[derive(Parser, Debug)]
#[command(name = "devmcp", version, about)]
pub struct Cli {
    /// Path to devmcp.toml (default: auto-detected in the current directory).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Start the MCP dispatch loop over stdin/stdout.
    #[arg(long)]
    pub mcp: bool,

    /// Agent binary override (takes precedence over config file and env).
    #[arg(long)]
    pub agent_bin: Option<String>,

    /// Repo path to bind at startup.
    #[arg(long)]
    pub repo_path: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the resolved configuration and exit.
    Config(ConfigArgs),
}

#[derive(clap::Args, Debug)]
pub struct ConfigArgs {
    /// Output as JSON instead of pretty-printed TOML.
    #[arg(long)]
    pub json: bool,
}
