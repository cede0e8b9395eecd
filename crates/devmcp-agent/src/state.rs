//! Shared server state: the process-wide globals §5 requires each be guarded
//! by their own mutex (repo binding, cache, rate limiter, search probe) plus
//! the bounded thread table and agent transport. Owned by the dispatch loop
//! and threaded through every tool handler.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::agent_client::{AgentTransport, ProcessAgentTransport};
use crate::cache::SessionCache;
use crate::config::ServerConfig;
use crate::context::{RepoIdentity, ThreadTable};
use crate::rate_limit::{Backoff, RateLimiter};
use crate::search::SearchProbe;

#[derive(Debug, thiserror::Error)]
pub enum RepoSwitchError {
    #[error("repo path does not exist or is not a directory: {0}")]
    InvalidPath(String),
}

pub struct ServerState {
    pub config: ServerConfig,
    pub threads: Mutex<ThreadTable>,
    pub repo: Mutex<RepoBinding>,
    pub cache: Mutex<SessionCache>,
    pub rate_limiter: Mutex<RateLimiter>,
    pub backoff: Mutex<Backoff>,
    pub search: SearchProbe,
    pub agent_transport: Arc<dyn AgentTransport>,
}

/// The process-wide current working repository (spec.md §3 "Process-wide
/// Repo Binding").
#[derive(Debug, Clone, Default)]
pub struct RepoBinding {
    pub path: Option<String>,
    pub identity: RepoIdentity,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Self {
        let agent_bin = config.agent_bin.clone();
        let rate_limit = config.rate_limit.clone();
        let backoff_cfg = config.backoff.clone();
        let repo_path = config.repo_path.clone();
        Self {
            config,
            threads: Mutex::new(ThreadTable::new()),
            repo: Mutex::new(RepoBinding {
                path: repo_path,
                identity: RepoIdentity::default(),
            }),
            cache: Mutex::new(SessionCache::new()),
            rate_limiter: Mutex::new(RateLimiter::new(
                rate_limit.capacity,
                Duration::from_secs(rate_limit.refill_interval_secs),
                rate_limit.warn_threshold,
            )),
            backoff: Mutex::new(Backoff::new(
                Duration::from_millis(backoff_cfg.base_ms),
                Duration::from_millis(backoff_cfg.max_ms),
            )),
            search: SearchProbe::new(),
            agent_transport: Arc::new(ProcessAgentTransport::new(agent_bin, None)),
        }
    }

    /// Construct state with an injected agent transport, for tests.
    pub fn with_transport(config: ServerConfig, transport: Arc<dyn AgentTransport>) -> Self {
        let mut state = Self::new(config);
        state.agent_transport = transport;
        state
    }

    /// Bind to a new repo root: update the binding, invalidate the cache,
    /// and re-warm it (spec.md §3 "Process-wide Repo Binding", §4.4).
    ///
    /// A no-op (besides the validity check) if `path` is already the bound
    /// repo — the cache is only invalidated and re-warmed when the binding
    /// actually changes. Rejected with [`RepoSwitchError::InvalidPath`] if
    /// `path` does not exist or is not a directory (spec.md §4.4: "if the
    /// chdir fails, the call is rejected with an invalid-params error").
    pub async fn switch_repo(&self, path: String) -> Result<(), RepoSwitchError> {
        let is_dir = tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(RepoSwitchError::InvalidPath(path));
        }

        let unchanged = self.repo.lock().await.path.as_deref() == Some(path.as_str());
        if unchanged {
            return Ok(());
        }

        let identity = crate::context::detect_repo_identity(&path).await;
        {
            let mut repo = self.repo.lock().await;
            repo.path = Some(path.clone());
            repo.identity = identity;
        }
        let mut cache = self.cache.lock().await;
        cache.invalidate();
        cache.warm(Some(std::path::Path::new(&path))).await;
        Ok(())
    }

    pub async fn current_repo_path(&self) -> Option<String> {
        self.repo.lock().await.path.clone()
    }
}
