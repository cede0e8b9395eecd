//! Search Cascade (C10, spec.md §4.10).
//!
//! Probes a fixed list of candidate text-search tools once per process,
//! memoizes whichever responds first, then runs de-duplicated symbol
//! searches through it. Grounded on `subprocess::run`'s exit-code handling
//! (exit 1 from a search tool means "no matches", not failure) and on
//! `atm_tools.rs`'s style of small, pure string-parsing helpers.

use tokio::sync::Mutex;

use crate::subprocess;

/// Candidates probed in order; the first whose `--version` succeeds wins.
const CANDIDATES: &[SearchTool] = &[SearchTool::Preferred, SearchTool::Secondary, SearchTool::Fallback];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchTool {
    Preferred,
    Secondary,
    Fallback,
}

impl SearchTool {
    fn binary(self) -> &'static str {
        match self {
            SearchTool::Preferred => "rg",
            SearchTool::Secondary => "ag",
            SearchTool::Fallback => "grep",
        }
    }

    fn version_argv(self) -> &'static [&'static str] {
        match self {
            SearchTool::Preferred => &["rg", "--version"],
            SearchTool::Secondary => &["ag", "--version"],
            SearchTool::Fallback => &["grep", "--version"],
        }
    }

    /// Build the `argv` for a literal-text, filenames-only, whole-word
    /// search for `symbol` rooted at `.`.
    fn search_argv(self, symbol: &str) -> Vec<String> {
        match self {
            SearchTool::Preferred => {
                vec!["rg".into(), "-l".into(), "-w".into(), symbol.into(), ".".into()]
            }
            SearchTool::Secondary => {
                vec!["ag".into(), "-l".into(), "-w".into(), symbol.into(), ".".into()]
            }
            SearchTool::Fallback => vec![
                "grep".into(),
                "-rl".into(),
                "-w".into(),
                symbol.into(),
                ".".into(),
            ],
        }
    }
}

/// Process-wide memoized probe result. `None` once probed-and-failed means
/// "no candidate available"; the outer `Option` distinguishes "not probed
/// yet" from that outcome.
#[derive(Debug, Default)]
pub struct SearchProbe {
    chosen: Mutex<Option<Option<SearchTool>>>,
}

impl SearchProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the memoized chosen tool, probing on first call.
    pub async fn chosen_tool(&self, cwd: Option<&std::path::Path>) -> Option<SearchTool> {
        let mut guard = self.chosen.lock().await;
        if let Some(result) = *guard {
            return result;
        }
        let result = probe_candidates(cwd).await;
        *guard = Some(result);
        result
    }

    /// Run a symbol search, returning a de-duplicated, sorted list of
    /// relative file paths (leading `./` stripped, `exclude_path` skipped).
    /// `None` chosen tool or exit-code-1 "no matches" both yield `Ok(vec![])`.
    pub async fn search_refs(
        &self,
        symbol: &str,
        exclude_path: Option<&str>,
        cwd: Option<&std::path::Path>,
    ) -> Result<Vec<String>, subprocess::SubprocessError> {
        let Some(tool) = self.chosen_tool(cwd).await else {
            return Ok(Vec::new());
        };

        let argv = tool.search_argv(symbol);
        let argv_refs: Vec<&str> = argv.iter().map(String::as_str).collect();
        let output = match subprocess::run(&argv_refs, cwd).await {
            Ok(out) => out,
            Err(subprocess::SubprocessError::Unexpected { code: 1, .. }) => {
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let text = String::from_utf8_lossy(&output.stdout);
        let mut seen = std::collections::HashSet::new();
        let mut paths = Vec::new();
        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let stripped = trimmed.strip_prefix("./").unwrap_or(trimmed);
            if Some(stripped) == exclude_path {
                continue;
            }
            if seen.insert(stripped.to_string()) {
                paths.push(stripped.to_string());
            }
        }
        paths.sort();
        Ok(paths)
    }
}

async fn probe_candidates(cwd: Option<&std::path::Path>) -> Option<SearchTool> {
    for candidate in CANDIDATES {
        if subprocess::run(candidate.version_argv(), cwd).await.is_ok() {
            return Some(*candidate);
        }
    }
    None
}

/// Extract the right-hand (`b/...`) path from a unified-diff header line
/// like `diff --git a/old/path b/new/path`. The rightmost ` b/` wins so a
/// path that itself contains the literal substring ` b/` doesn't confuse
/// the split.
pub fn path_from_diff_header(line: &str) -> Option<&str> {
    let idx = line.rfind(" b/")?;
    let rest = &line[idx + 3..];
    if rest.is_empty() {
        None
    } else {
        Some(rest)
    }
}

const DEFINITION_KEYWORDS: &[&str] = &["pub fn", "fn", "function", "def", "class", "pub const", "const"];

/// Extract the identifier immediately following a definition keyword at the
/// start of `line` (after leading whitespace), e.g. `pub fn foo(` -> `foo`.
pub fn identifier_after_definition(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    for kw in DEFINITION_KEYWORDS {
        if let Some(rest) = trimmed.strip_prefix(kw) {
            if !rest.starts_with(char::is_whitespace) {
                continue;
            }
            let rest = rest.trim_start();
            let end = rest
                .find(|c: char| !(c.is_alphanumeric() || c == '_'))
                .unwrap_or(rest.len());
            if end == 0 {
                return None;
            }
            return Some(&rest[..end]);
        }
    }
    None
}

/// Extract up to `cap` distinct ASCII-identifier-like tokens from `content`,
/// in first-seen order.
pub fn extract_identifiers(content: &str, cap: usize) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    let mut current = String::new();
    let mut flush = |current: &mut String, out: &mut Vec<String>, seen: &mut std::collections::HashSet<String>| {
        if !current.is_empty() {
            if seen.insert(current.clone()) {
                out.push(current.clone());
            }
            current.clear();
        }
    };
    for c in content.chars() {
        if out.len() >= cap {
            break;
        }
        if c.is_alphanumeric() || c == '_' {
            current.push(c);
        } else {
            flush(&mut current, &mut out, &mut seen);
        }
    }
    if out.len() < cap {
        flush(&mut current, &mut out, &mut seen);
    }
    out.truncate(cap);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_from_diff_header_takes_rightmost_b_marker() {
        assert_eq!(
            path_from_diff_header("diff --git a/src/lib.rs b/src/lib.rs"),
            Some("src/lib.rs")
        );
        assert_eq!(path_from_diff_header("not a diff line"), None);
    }

    #[test]
    fn identifier_after_definition_handles_each_keyword() {
        assert_eq!(identifier_after_definition("pub fn search_refs(sym: &str) {"), Some("search_refs"));
        assert_eq!(identifier_after_definition("fn helper() {}"), Some("helper"));
        assert_eq!(identifier_after_definition("def run_swarm(task):"), Some("run_swarm"));
        assert_eq!(identifier_after_definition("class Widget:"), Some("Widget"));
        assert_eq!(identifier_after_definition("pub const MAX: usize = 3;"), Some("MAX"));
        assert_eq!(identifier_after_definition("// not a definition"), None);
    }

    #[test]
    fn extract_identifiers_dedupes_and_caps() {
        let ids = extract_identifiers("foo bar foo baz qux", 3);
        assert_eq!(ids, vec!["foo", "bar", "baz"]);
    }

    #[tokio::test]
    async fn search_refs_with_no_chosen_tool_returns_empty() {
        // No candidate in CANDIDATES is a bogus binary, so to exercise the
        // "no tool chosen" branch without depending on host tooling we
        // bypass the probe directly.
        let probe = SearchProbe::new();
        *probe.chosen.lock().await = Some(None);
        let refs = probe.search_refs("anything", None, None).await.unwrap();
        assert!(refs.is_empty());
    }

    #[test]
    fn search_argv_for_preferred_tool_uses_whole_word_flag() {
        let argv = SearchTool::Preferred.search_argv("Widget");
        assert_eq!(argv, vec!["rg", "-l", "-w", "Widget", "."]);
    }
}
