//! Configuration types for devmcp-agent.
//!
//! [`ServerConfig`] is deserialized from an optional `devmcp.toml` and
//! layered with environment variables and CLI flags in `resolve()`. Follows
//! `atm-agent-mcp/src/config/types.rs`'s `#[serde(default = "...")]`
//! per-field pattern so an absent or partial config file still produces a
//! fully usable configuration.

use serde::{Deserialize, Serialize};

fn default_agent_bin() -> String {
    "codex".to_string()
}

fn default_rate_limit_capacity() -> u32 {
    5000
}

fn default_rate_limit_refill_secs() -> u64 {
    3600
}

fn default_rate_limit_warn_threshold() -> u32 {
    100
}

fn default_backoff_base_ms() -> u64 {
    200
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_swarm_max_agents() -> usize {
    8
}

/// Resolved devmcp-agent configuration. All fields have defaults, so a
/// minimal or absent `devmcp.toml` still produces a fully functional server.
///
/// # Example `devmcp.toml`
///
/// ```toml
/// agent_bin = "/usr/local/bin/codex"
/// repo_path = "/home/me/project"
///
/// [rate_limit]
/// capacity = 5000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path (or bare name resolved via `PATH`) of the external agent binary.
    #[serde(default = "default_agent_bin")]
    pub agent_bin: String,

    /// Repo root to bind at startup. When unset, resolved at runtime via
    /// `REPO_PATH` or a `git rev-parse --show-toplevel` probe (spec.md §6).
    #[serde(default)]
    pub repo_path: Option<String>,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub backoff: BackoffConfig,

    /// Default cap on swarm worker count absent an explicit per-call value.
    #[serde(default = "default_swarm_max_agents")]
    pub swarm_max_agents: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            agent_bin: default_agent_bin(),
            repo_path: None,
            rate_limit: RateLimitConfig::default(),
            backoff: BackoffConfig::default(),
            swarm_max_agents: default_swarm_max_agents(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_capacity")]
    pub capacity: u32,
    #[serde(default = "default_rate_limit_refill_secs")]
    pub refill_interval_secs: u64,
    #[serde(default = "default_rate_limit_warn_threshold")]
    pub warn_threshold: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: default_rate_limit_capacity(),
            refill_interval_secs: default_rate_limit_refill_secs(),
            warn_threshold: default_rate_limit_warn_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_backoff_base_ms")]
    pub base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub max_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: default_backoff_base_ms(),
            max_ms: default_backoff_max_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_produces_full_defaults() {
        let cfg: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.agent_bin, "codex");
        assert_eq!(cfg.rate_limit.capacity, 5000);
        assert_eq!(cfg.backoff.max_ms, 30_000);
    }

    #[test]
    fn partial_toml_overrides_only_specified_fields() {
        let cfg: ServerConfig = toml::from_str(
            r#"
            agent_bin = "/opt/codex/bin/codex"

            [rate_limit]
            capacity = 10
            "#,
        )
        .unwrap();
        assert_eq!(cfg.agent_bin, "/opt/codex/bin/codex");
        assert_eq!(cfg.rate_limit.capacity, 10);
        assert_eq!(cfg.rate_limit.warn_threshold, 100);
    }
}
