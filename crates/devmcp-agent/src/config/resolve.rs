//! Layered config resolution: file -> environment -> CLI, in that
//! precedence order, matching `atm-agent-mcp/src/config`'s `resolve()` shape.

use std::path::Path;

use super::types::ServerConfig;

/// CLI overrides, applied last (highest precedence). Each field is `Option`
/// so an absent flag leaves the lower-precedence value untouched.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub agent_bin: Option<String>,
    pub repo_path: Option<String>,
}

/// Load `path` (if it exists) as TOML, apply environment overrides, then
/// `cli` overrides, and return the fully resolved config. A missing config
/// file is not an error — resolution proceeds from built-in defaults.
pub async fn resolve(path: Option<&Path>, cli: CliOverrides) -> anyhow::Result<ServerConfig> {
    let mut config = match path {
        Some(p) if tokio::fs::try_exists(p).await.unwrap_or(false) => {
            let text = tokio::fs::read_to_string(p).await?;
            toml::from_str(&text)?
        }
        _ => ServerConfig::default(),
    };

    apply_env(&mut config);
    apply_cli(&mut config, cli);
    Ok(config)
}

fn apply_env(config: &mut ServerConfig) {
    if let Ok(bin) = std::env::var("DEVMCP_AGENT_BIN") {
        if !bin.is_empty() {
            config.agent_bin = bin;
        }
    }
    if let Ok(repo) = std::env::var("REPO_PATH") {
        if !repo.is_empty() {
            config.repo_path = Some(repo);
        }
    }
}

fn apply_cli(config: &mut ServerConfig, cli: CliOverrides) {
    if let Some(bin) = cli.agent_bin {
        config.agent_bin = bin;
    }
    if let Some(repo) = cli.repo_path {
        config.repo_path = Some(repo);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_falls_back_to_defaults() {
        let cfg = resolve(Some(Path::new("/nonexistent/devmcp.toml")), CliOverrides::default())
            .await
            .unwrap();
        assert_eq!(cfg.agent_bin, "codex");
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn env_overrides_file_and_cli_overrides_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devmcp.toml");
        tokio::fs::write(&path, "agent_bin = \"from-file\"\n").await.unwrap();

        std::env::set_var("DEVMCP_AGENT_BIN", "from-env");
        let cfg = resolve(Some(&path), CliOverrides::default()).await.unwrap();
        assert_eq!(cfg.agent_bin, "from-env");

        let cfg = resolve(
            Some(&path),
            CliOverrides {
                agent_bin: Some("from-cli".to_string()),
                repo_path: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(cfg.agent_bin, "from-cli");
        std::env::remove_var("DEVMCP_AGENT_BIN");
    }
}
