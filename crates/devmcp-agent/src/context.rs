//! Repo Context & Thread Table (C4, spec.md §4.4).
//!
//! A bounded table of per-session ("thread") repo bindings, plus helpers for
//! resolving the `thread_id`/`repo_path` fields a `tools/call` may carry and
//! for detecting a repo's remote-derived slug. Grounded on
//! `atm-agent-mcp/src/context.rs`'s git-probing helpers, generalized from
//! "turn context" to the thread-keyed repo binding spec.md describes.

use serde_json::Value;
use tokio::process::Command;

/// Caller-supplied thread ids longer than this normalize to the default slot.
pub const MAX_THREAD_ID_BYTES: usize = 96;
/// At most this many distinct thread contexts are tracked; overflow maps to
/// the default slot.
pub const MAX_THREADS: usize = 32;
pub const DEFAULT_THREAD_ID: &str = "default";

/// A single thread's bound repo path.
#[derive(Debug, Clone, Default)]
pub struct ThreadContext {
    pub id: String,
    pub repo_path: Option<String>,
}

/// Bounded slot array of [`ThreadContext`]s (spec.md §3 "Thread Context").
#[derive(Debug, Default)]
pub struct ThreadTable {
    slots: Vec<ThreadContext>,
}

impl ThreadTable {
    /// The default slot is reserved up front so overflow always has an
    /// existing slot to map onto instead of growing the table past
    /// `MAX_THREADS`.
    pub fn new() -> Self {
        Self {
            slots: vec![ThreadContext {
                id: DEFAULT_THREAD_ID.to_string(),
                repo_path: None,
            }],
        }
    }

    /// Normalize a caller-supplied thread id: empty or over the length cap
    /// maps to the default id.
    pub fn normalize_id(id: &str) -> &str {
        if id.is_empty() || id.len() > MAX_THREAD_ID_BYTES {
            DEFAULT_THREAD_ID
        } else {
            id
        }
    }

    /// Number of live contexts currently tracked.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.slots.iter().position(|c| c.id == id)
    }

    /// Get (allocating on first reference) the context for `id`.
    ///
    /// Once `MAX_THREADS` distinct contexts exist, any further unseen id
    /// deterministically maps to the default context instead of growing the
    /// table (spec.md "Thread-table bound" invariant).
    pub fn get_or_create(&mut self, id: &str) -> &mut ThreadContext {
        let id = Self::normalize_id(id).to_string();
        if let Some(pos) = self.position(&id) {
            return &mut self.slots[pos];
        }

        let target_id = if self.slots.len() >= MAX_THREADS {
            DEFAULT_THREAD_ID.to_string()
        } else {
            id
        };

        if let Some(pos) = self.position(&target_id) {
            return &mut self.slots[pos];
        }

        self.slots.push(ThreadContext {
            id: target_id,
            repo_path: None,
        });
        self.slots.last_mut().expect("just pushed")
    }

    pub fn get(&self, id: &str) -> Option<&ThreadContext> {
        let id = Self::normalize_id(id);
        self.slots.iter().find(|c| c.id == id)
    }
}

/// Look up `key`/`camelKey` (in that order) on a JSON object, returning a
/// borrowed `&str` on a hit. Absent, non-object, or non-string values yield
/// `None` without panicking — the "JSON path with defaults" helper spec.md
/// §9 calls for.
fn str_field<'a>(value: &'a Value, key: &str, camel_key: &str) -> Option<&'a str> {
    value
        .get(key)
        .or_else(|| value.get(camel_key))
        .and_then(Value::as_str)
}

/// Resolve the effective thread id for a `tools/call`, in the order
/// `params.thread_id -> params.threadId -> arguments.thread_id ->
/// arguments.threadId -> "default"` (spec.md §4.4).
pub fn resolve_thread_id(params: &Value, arguments: &Value) -> String {
    str_field(params, "thread_id", "threadId")
        .or_else(|| str_field(arguments, "thread_id", "threadId"))
        .map(ThreadTable::normalize_id)
        .unwrap_or(DEFAULT_THREAD_ID)
        .to_string()
}

/// Resolve an explicit repo-switch target from `repo_path` / `repo` /
/// `working_directory`, checking `params` before `arguments` for each name
/// in turn (spec.md §4.4).
pub fn resolve_repo_target(params: &Value, arguments: &Value) -> Option<String> {
    for key in ["repo_path", "repo", "working_directory"] {
        if let Some(v) = params.get(key).and_then(Value::as_str) {
            return Some(v.to_string());
        }
    }
    for key in ["repo_path", "repo", "working_directory"] {
        if let Some(v) = arguments.get(key).and_then(Value::as_str) {
            return Some(v.to_string());
        }
    }
    None
}

/// Repository identity detected from the current working directory: the
/// git toplevel path and a human-readable slug derived from its remote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoIdentity {
    pub repo_root: Option<String>,
    pub repo_slug: Option<String>,
}

/// Detect [`RepoIdentity`] for `cwd`. Never errors: any git failure just
/// means the fields are `None` (not inside a repo, or no remote configured).
pub async fn detect_repo_identity(cwd: &str) -> RepoIdentity {
    let Some(repo_root) = git_toplevel(cwd).await else {
        return RepoIdentity::default();
    };
    let repo_slug = repo_slug_from_remote(cwd)
        .await
        .or_else(|| {
            std::path::Path::new(&repo_root)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
        });
    RepoIdentity {
        repo_root: Some(repo_root),
        repo_slug,
    }
}

async fn git_toplevel(cwd: &str) -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .current_dir(cwd)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let s = String::from_utf8(output.stdout).ok()?;
    let trimmed = s.trim().to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

async fn repo_slug_from_remote(cwd: &str) -> Option<String> {
    let output = Command::new("git")
        .args(["remote", "get-url", "origin"])
        .current_dir(cwd)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let url = String::from_utf8(output.stdout).ok()?;
    slug_from_remote_url(url.trim())
}

/// Extract `owner/repo`-style slug's last path component from a remote URL,
/// stripping a trailing `.git` suffix.
fn slug_from_remote_url(url: &str) -> Option<String> {
    let url = url.trim_end_matches('/');
    let last = url.rsplit('/').next()?;
    let name = last.strip_suffix(".git").unwrap_or(last);
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn thread_table_allocates_on_first_reference() {
        let mut table = ThreadTable::new();
        assert!(!table.is_empty(), "default slot is reserved up front");
        assert_eq!(table.len(), 1);
        table.get_or_create("alpha");
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn thread_table_overflow_maps_to_default() {
        let mut table = ThreadTable::new();
        assert_eq!(table.len(), 1, "default slot is reserved up front");

        // The default slot already counts toward the cap, so only
        // MAX_THREADS - 1 more distinct ids fit before overflow kicks in.
        for i in 0..(MAX_THREADS - 1) {
            table.get_or_create(&format!("t{i}"));
        }
        assert_eq!(table.len(), MAX_THREADS);

        table.get_or_create("overflow").repo_path = Some("/overflow".to_string());
        assert_eq!(table.len(), MAX_THREADS, "overflow must not grow the table");
        assert_eq!(
            table.get(DEFAULT_THREAD_ID).unwrap().repo_path.as_deref(),
            Some("/overflow")
        );
    }

    #[test]
    fn empty_or_oversized_id_normalizes_to_default() {
        assert_eq!(ThreadTable::normalize_id(""), DEFAULT_THREAD_ID);
        let long = "x".repeat(MAX_THREAD_ID_BYTES + 1);
        assert_eq!(ThreadTable::normalize_id(&long), DEFAULT_THREAD_ID);
        assert_eq!(ThreadTable::normalize_id("ok"), "ok");
    }

    #[test]
    fn resolve_thread_id_prefers_params_over_arguments() {
        let params = json!({"thread_id": "p1"});
        let arguments = json!({"thread_id": "a1"});
        assert_eq!(resolve_thread_id(&params, &arguments), "p1");
    }

    #[test]
    fn resolve_thread_id_falls_back_through_camel_case_and_arguments() {
        let params = json!({});
        let arguments = json!({"threadId": "camel"});
        assert_eq!(resolve_thread_id(&params, &arguments), "camel");

        let empty = json!({});
        assert_eq!(resolve_thread_id(&empty, &empty), DEFAULT_THREAD_ID);
    }

    #[test]
    fn resolve_repo_target_checks_params_before_arguments() {
        let params = json!({"repo": "/p"});
        let arguments = json!({"repo_path": "/a"});
        assert_eq!(resolve_repo_target(&params, &arguments), Some("/p".to_string()));

        let none = json!({});
        assert_eq!(resolve_repo_target(&none, &none), None);
    }

    #[test]
    fn slug_from_remote_url_strips_git_suffix_and_trailing_slash() {
        assert_eq!(
            slug_from_remote_url("https://github.com/acme/widgets.git/"),
            Some("widgets".to_string())
        );
        assert_eq!(
            slug_from_remote_url("git@github.com:acme/widgets.git"),
            Some("widgets".to_string())
        );
    }
}
