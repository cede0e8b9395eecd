//! Subprocess Executor (C1, spec.md §4.1).
//!
//! Runs a child process to completion without deadlocking on pipe buffers:
//! stdout and stderr are drained by two dedicated concurrent reader tasks
//! started *before* the parent waits for the child to exit, each reader
//! joined before the wait call so the child's own exit (closing its pipe
//! write ends) is what lets the readers reach end-of-stream — no racing the
//! handle's close, no double-close.
//!
//! Grounded on `atm-daemon/src/plugins/issues/github.rs`'s `run_gh` (spawn +
//! classify stderr substrings), generalized to any argv and to the
//! concurrent-reader requirement spec.md calls out explicitly.

use std::process::Stdio;

use serde::de::DeserializeOwned;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// Size of each heap-allocated read chunk. Heap, not stack, because readers
/// may run on small worker-thread stacks (spec.md §4.1).
const READ_CHUNK_BYTES: usize = 64 * 1024;

/// Typed subprocess failure classification (spec.md §4.1 / §7).
#[derive(Debug, thiserror::Error)]
pub enum SubprocessError {
    #[error("authentication required: {0}")]
    AuthRequired(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("malformed output: {0}")]
    MalformedOutput(String),
    #[error("failed to spawn process: {0}")]
    SpawnFailed(String),
    #[error("out of memory reading subprocess output")]
    OutOfMemory,
    #[error("command failed (exit {code}): {stderr}")]
    Unexpected { code: i32, stderr: String },
}

/// Successful result of [`run`].
#[derive(Debug)]
pub struct RunOutput {
    pub stdout: Vec<u8>,
    pub exit_code: i32,
}

/// Run `argv[0]` with the remaining elements as arguments, in `cwd` if given.
///
/// The child's stdin is always closed (spec.md §4.1: "the parent's stdio
/// pipe must never leak to children"). On non-zero exit, `stderr` is scanned
/// for fixed substring families and mapped to a typed error variant.
pub async fn run(argv: &[&str], cwd: Option<&std::path::Path>) -> Result<RunOutput, SubprocessError> {
    let Some((program, args)) = argv.split_first() else {
        return Err(SubprocessError::SpawnFailed("empty argv".to_string()));
    };

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| SubprocessError::SpawnFailed(e.to_string()))?;

    let mut stdout = child.stdout.take().expect("stdout is piped");
    let mut stderr = child.stderr.take().expect("stderr is piped");

    // Two dedicated readers, started before we wait on the child.
    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let mut chunk = vec![0u8; READ_CHUNK_BYTES];
        loop {
            match stdout.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                Err(_) => return Err(()),
            }
        }
        Ok(buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let mut chunk = vec![0u8; READ_CHUNK_BYTES];
        loop {
            match stderr.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                Err(_) => return Err(()),
            }
        }
        Ok(buf)
    });

    // Join readers before waiting on the child: the child's own exit closes
    // the pipe write ends, which is what lets the readers see EOF.
    let stdout_bytes = stdout_task
        .await
        .map_err(|_| SubprocessError::OutOfMemory)?
        .map_err(|_| SubprocessError::OutOfMemory)?;
    let stderr_bytes = stderr_task
        .await
        .map_err(|_| SubprocessError::OutOfMemory)?
        .map_err(|_| SubprocessError::OutOfMemory)?;

    let status = child
        .wait()
        .await
        .map_err(|e| SubprocessError::Unexpected {
            code: -1,
            stderr: e.to_string(),
        })?;

    let exit_code = status.code().unwrap_or(-1);
    if !status.success() {
        let stderr_text = String::from_utf8_lossy(&stderr_bytes).to_string();
        return Err(classify_stderr(exit_code, &stderr_text));
    }

    Ok(RunOutput {
        stdout: stdout_bytes,
        exit_code,
    })
}

/// Like [`run`], but parses stdout as JSON. Parse failure maps to
/// [`SubprocessError::MalformedOutput`].
pub async fn run_json<T: DeserializeOwned>(
    argv: &[&str],
    cwd: Option<&std::path::Path>,
) -> Result<T, SubprocessError> {
    let out = run(argv, cwd).await?;
    serde_json::from_slice(&out.stdout).map_err(|e| SubprocessError::MalformedOutput(e.to_string()))
}

/// Classify a non-zero exit by scanning `stderr` for fixed substring
/// families (spec.md §4.1 / §7). Order matters: auth-required substrings are
/// checked first since "not found" can appear inside an auth error message
/// (e.g. "gh: command not found" is a spawn concern, handled separately).
fn classify_stderr(exit_code: i32, stderr: &str) -> SubprocessError {
    let lower = stderr.to_lowercase();

    const AUTH: &[&str] = &["not logged in", "authentication", "unauthorized", "no credentials"];
    const RATE_LIMIT: &[&str] = &["rate limit", "too many requests", "secondary rate limit"];
    const PERMISSION: &[&str] = &["permission denied", "forbidden", "access denied"];
    const NOT_FOUND: &[&str] = &["not found", "no such", "could not resolve", "does not exist"];

    if AUTH.iter().any(|s| lower.contains(s)) {
        return SubprocessError::AuthRequired(stderr.trim().to_string());
    }
    if RATE_LIMIT.iter().any(|s| lower.contains(s)) {
        return SubprocessError::RateLimited(stderr.trim().to_string());
    }
    if PERMISSION.iter().any(|s| lower.contains(s)) {
        return SubprocessError::PermissionDenied(stderr.trim().to_string());
    }
    if NOT_FOUND.iter().any(|s| lower.contains(s)) {
        return SubprocessError::NotFound(stderr.trim().to_string());
    }

    SubprocessError::Unexpected {
        code: exit_code,
        stderr: stderr.trim().to_string(),
    }
}
