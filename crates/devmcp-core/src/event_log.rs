//! Shared structured JSONL event logging for devmcp binaries.
//!
//! A compact, best-effort sink used by the dispatch loop, subprocess
//! executor, agent client, and swarm orchestrator to record lifecycle events
//! (`transport_init`, `rate_limited`, `swarm_decompose`, …) without ever
//! failing the caller: any I/O error while writing is swallowed.

use crate::home::get_home_dir;
use crate::text::truncate_chars;
use chrono::Utc;
use serde_json::{Map, Value, json};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const DEFAULT_MAX_BYTES: u64 = 50 * 1024 * 1024;
const DEFAULT_MAX_FILES: u32 = 5;
/// Free-text fields (`target`, `result`, `error`) are bounded to this many
/// chars so a runaway value (a long stderr capture, a long prompt) can't
/// blow up a single JSONL line.
const MAX_FIELD_CHARS: usize = 512;

#[derive(Clone, Debug)]
pub struct EventLogConfig {
    pub path: PathBuf,
    pub max_bytes: u64,
    pub max_files: u32,
}

impl EventLogConfig {
    pub fn from_env() -> Self {
        let default_path = get_home_dir()
            .ok()
            .map(|h| h.join(".config/devmcp/events.jsonl"))
            .unwrap_or_else(|| PathBuf::from("events.jsonl"));

        let path = std::env::var("DEVMCP_LOG_FILE")
            .map(PathBuf::from)
            .unwrap_or(default_path);
        let max_bytes = std::env::var("DEVMCP_LOG_MAX_BYTES")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_MAX_BYTES);
        let max_files = std::env::var("DEVMCP_LOG_MAX_FILES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_MAX_FILES);

        Self {
            path,
            max_bytes,
            max_files,
        }
    }
}

/// Fields for a single structured event. `level`/`source`/`action` are
/// required (empty values make [`emit_event_best_effort`] a no-op).
#[derive(Clone, Debug, Default)]
pub struct EventFields {
    pub level: &'static str,
    pub source: &'static str,
    pub action: &'static str,
    pub thread_id: Option<String>,
    pub target: Option<String>,
    pub result: Option<String>,
    pub request_id: Option<String>,
    pub error: Option<String>,
    pub count: Option<u64>,
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn rotated_path(path: &Path, idx: u32) -> PathBuf {
    PathBuf::from(format!("{}.{}", path.display(), idx))
}

fn rotate_if_needed(path: &Path, max_bytes: u64, max_files: u32) -> std::io::Result<()> {
    if !path.exists() || fs::metadata(path)?.len() < max_bytes {
        return Ok(());
    }
    for idx in (1..max_files).rev() {
        let src = rotated_path(path, idx);
        let dst = rotated_path(path, idx + 1);
        if src.exists() {
            let _ = fs::rename(&src, &dst);
        }
    }
    let _ = fs::rename(path, rotated_path(path, 1));
    Ok(())
}

/// Emit a single structured event to the shared sink. Fail-open: any I/O
/// error is swallowed so a logging failure never surfaces to the caller.
pub fn emit_event_best_effort(fields: EventFields) {
    if fields.level.is_empty() || fields.source.is_empty() || fields.action.is_empty() {
        return;
    }

    let cfg = EventLogConfig::from_env();

    let _ = (|| -> std::io::Result<()> {
        ensure_parent(&cfg.path)?;
        rotate_if_needed(&cfg.path, cfg.max_bytes, cfg.max_files)?;

        let mut obj = Map::new();
        obj.insert("v".to_string(), json!(1));
        obj.insert("ts".to_string(), json!(Utc::now().to_rfc3339()));
        obj.insert("level".to_string(), json!(fields.level));
        obj.insert("source".to_string(), json!(fields.source));
        obj.insert("action".to_string(), json!(fields.action));
        if let Some(v) = fields.thread_id {
            obj.insert("thread_id".to_string(), json!(v));
        }
        if let Some(v) = fields.target {
            obj.insert("target".to_string(), json!(truncate_chars(&v, MAX_FIELD_CHARS)));
        }
        if let Some(v) = fields.result {
            obj.insert("result".to_string(), json!(truncate_chars(&v, MAX_FIELD_CHARS)));
        }
        if let Some(v) = fields.request_id {
            obj.insert("request_id".to_string(), json!(v));
        }
        if let Some(v) = fields.count {
            obj.insert("count".to_string(), json!(v));
        }
        if let Some(v) = fields.error {
            obj.insert("error".to_string(), json!(truncate_chars(&v, MAX_FIELD_CHARS)));
        }

        let line = Value::Object(obj).to_string();
        let mut file = OpenOptions::new().create(true).append(true).open(&cfg.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        Ok(())
    })();
}
