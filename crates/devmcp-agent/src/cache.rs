//! Session Cache (C3, spec.md §4.3).
//!
//! A read-through cache for label/milestone metadata, populated exactly once
//! per "client ready" lifecycle event (`notifications/initialized`, §4.6).
//! Warmup failures are swallowed — the cache simply stays empty and callers
//! degrade to "no label suggestions" (§7). `invalidate` flips `ready` back to
//! `false` without freeing the previous entries (spec.md §9 open question a:
//! the basic design reclaims that memory at process exit or the next warmup
//! overwrite, not eagerly — documented here rather than silently "fixed").

use std::collections::HashMap;

use crate::subprocess::{self, SubprocessError};

/// One label or milestone entry, immutable after warmup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEntry {
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MilestoneEntry {
    pub title: String,
    pub number: u64,
}

/// The per-process label/milestone cache.
///
/// Owned by the server and guarded by a `tokio::sync::Mutex` at the call
/// site; every public method here takes `&mut self`, so the mutex itself is
/// what gives readers the "never observe a partially populated cache"
/// guarantee (spec.md §3) — there is no separate atomic flag to race.
#[derive(Debug, Default)]
pub struct SessionCache {
    ready: bool,
    labels: HashMap<String, LabelEntry>,
    milestones: HashMap<String, MilestoneEntry>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Look up a label by name. Returns `None` if not ready or not present.
    pub fn get_label(&self, name: &str) -> Option<&LabelEntry> {
        if !self.ready {
            return None;
        }
        self.labels.get(name)
    }

    /// Look up a milestone by title. Returns `None` if not ready or not present.
    pub fn get_milestone(&self, title: &str) -> Option<&MilestoneEntry> {
        if !self.ready {
            return None;
        }
        self.milestones.get(title)
    }

    /// Replace the cache wholesale and mark it ready.
    fn populate(&mut self, labels: Vec<LabelEntry>, milestones: Vec<MilestoneEntry>) {
        self.labels = labels.into_iter().map(|l| (l.name.clone(), l)).collect();
        self.milestones = milestones
            .into_iter()
            .map(|m| (m.title.clone(), m))
            .collect();
        self.ready = true;
    }

    /// Flip `ready` back to `false`. Entries are left in place (see module
    /// docs); the next `warm` call overwrites them wholesale.
    pub fn invalidate(&mut self) {
        self.ready = false;
    }

    /// Issue the upstream metadata queries and populate the cache on
    /// success. On any failure the cache is left empty/not-ready — this
    /// function never returns an error to its caller (spec.md §4.3).
    pub async fn warm(&mut self, cwd: Option<&std::path::Path>) {
        match fetch_labels_and_milestones(cwd).await {
            Ok((labels, milestones)) => self.populate(labels, milestones),
            Err(_) => {
                // Swallowed: cache stays empty/not-ready, callers degrade.
            }
        }
    }
}

#[derive(serde::Deserialize)]
struct GhLabel {
    name: String,
    color: String,
}

#[derive(serde::Deserialize)]
struct GhMilestone {
    title: String,
    number: u64,
}

async fn fetch_labels_and_milestones(
    cwd: Option<&std::path::Path>,
) -> Result<(Vec<LabelEntry>, Vec<MilestoneEntry>), SubprocessError> {
    let gh_labels: Vec<GhLabel> =
        subprocess::run_json(&["gh", "label", "list", "--json", "name,color"], cwd).await?;
    let gh_milestones: Vec<GhMilestone> = subprocess::run_json(
        &["gh", "api", "repos/{owner}/{repo}/milestones"],
        cwd,
    )
    .await?;

    Ok((
        gh_labels
            .into_iter()
            .map(|l| LabelEntry {
                name: l.name,
                color: l.color,
            })
            .collect(),
        gh_milestones
            .into_iter()
            .map(|m| MilestoneEntry {
                title: m.title,
                number: m.number,
            })
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_ready_returns_none_even_with_entries() {
        let mut cache = SessionCache::new();
        cache.populate(
            vec![LabelEntry {
                name: "bug".into(),
                color: "red".into(),
            }],
            vec![],
        );
        cache.invalidate();
        assert!(cache.get_label("bug").is_none());
    }

    #[test]
    fn ready_after_populate_returns_entries() {
        let mut cache = SessionCache::new();
        cache.populate(
            vec![LabelEntry {
                name: "bug".into(),
                color: "red".into(),
            }],
            vec![MilestoneEntry {
                title: "v1".into(),
                number: 1,
            }],
        );
        assert!(cache.is_ready());
        assert_eq!(cache.get_label("bug").unwrap().color, "red");
        assert_eq!(cache.get_milestone("v1").unwrap().number, 1);
        assert!(cache.get_label("missing").is_none());
    }

    #[test]
    fn invalidate_does_not_clear_entries_only_readiness() {
        let mut cache = SessionCache::new();
        cache.populate(
            vec![LabelEntry {
                name: "bug".into(),
                color: "red".into(),
            }],
            vec![],
        );
        cache.invalidate();
        assert!(!cache.is_ready());
        // Entry map is untouched in memory even though reads see None.
        assert!(cache.labels.contains_key("bug"));
    }

    #[tokio::test]
    async fn warm_failure_leaves_cache_not_ready() {
        let mut cache = SessionCache::new();
        // No `gh` binary reachable with a bogus PATH would be flaky to set
        // up portably; instead exercise the failure path through an invalid
        // cwd, which makes the subprocess call fail deterministically.
        cache
            .warm(Some(std::path::Path::new("/nonexistent/devmcp/test/dir")))
            .await;
        assert!(!cache.is_ready());
    }
}
