//! devmcp — MCP server for GitHub workflow, blast-radius analysis, graph
//! queries, and multi-agent swarm orchestration.
//!
//! Presence of `--mcp` starts the dispatch loop over stdin/stdout (spec.md
//! §6); otherwise a subcommand runs and exits. Mirrors
//! `atm-agent-mcp/src/main.rs`'s `logging::init()` + `Cli::parse()` shape.

use clap::Parser;

use devmcp_agent::cli::{Cli, Commands};
use devmcp_agent::config::{self, CliOverrides};
use devmcp_agent::dispatch;
use devmcp_agent::state::ServerState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    devmcp_core::logging::init();
    let cli = Cli::parse();

    let overrides = CliOverrides {
        agent_bin: cli.agent_bin.clone(),
        repo_path: cli.repo_path.clone(),
    };
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| std::path::PathBuf::from("devmcp.toml"));
    let config = config::resolve(Some(&config_path), overrides).await?;

    match cli.command {
        Some(Commands::Config(args)) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
            Ok(())
        }
        None if cli.mcp => {
            tracing::info!("starting devmcp dispatch loop over stdio");
            let state = ServerState::new(config);
            let stdin = tokio::io::stdin();
            let stdout = tokio::io::stdout();
            dispatch::run(&state, stdin, stdout).await?;
            Ok(())
        }
        None => {
            eprintln!("devmcp: pass --mcp to start the server, or a subcommand (see --help)");
            Ok(())
        }
    }
}
