//! Dispatch Loop (C6, spec.md §4.6).
//!
//! Single-threaded: read one framed message, process it to completion,
//! write one reply, read the next. Grounded on `proxy.rs`'s `tokio::select!`
//! main-loop shape, but routing `tools/call` through the local Tool
//! Registry (C7) instead of forwarding to a child process, since this
//! server has no downstream MCP child of its own.

use serde_json::{json, Value};

use crate::context;
use crate::state::ServerState;
use crate::tools;
use crate::transport::framing::{write_message, Framing, FramingError, MessageFramer};

const PROTOCOL_VERSION: &str = "2025-03-26";
const SERVER_NAME: &str = "devmcp";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

const ERR_PARSE: i64 = -32700;
const ERR_INVALID_REQUEST: i64 = -32600;
const ERR_METHOD_NOT_FOUND: i64 = -32601;
const ERR_INVALID_PARAMS: i64 = -32602;
const ERR_INTERNAL: i64 = -32603;

/// Run the dispatch loop over `reader`/`writer` until end-of-stream.
///
/// Never returns an `Err` for protocol-level or handler-level failures —
/// those become JSON-RPC error replies. It only returns `Err` for an I/O
/// failure on the underlying streams themselves (spec.md §7: "only
/// dispatch-loop I/O errors... terminate the server").
pub async fn run<R, W>(state: &ServerState, reader: R, mut writer: W) -> std::io::Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut framer = MessageFramer::new(reader);

    loop {
        let raw = match framer.next_message().await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(()),
            Err(FramingError::Io(e)) => return Err(e),
            Err(parse_err) => {
                tracing::warn!(error = %parse_err, "framing error, replying with parse error");
                let reply = error_reply(Value::Null, ERR_PARSE, &parse_err.to_string());
                write_reply(&mut framer, &mut writer, &reply).await?;
                continue;
            }
        };

        let reply = handle_message(state, &raw).await;
        if let Some(reply) = reply {
            write_reply(&mut framer, &mut writer, &reply).await?;
        }
    }
}

async fn write_reply<R, W>(framer: &mut MessageFramer<R>, writer: &mut W, reply: &Value) -> std::io::Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let mode = framer.mode().unwrap_or(Framing::LineDelimited);
    let text = serde_json::to_string(reply).unwrap_or_else(|_| {
        tracing::error!("failed to serialize reply, falling back to static OOM reply");
        crate::transport::framing::OOM_FALLBACK_REPLY.to_string()
    });
    write_message(writer, mode, &text).await
}

fn error_reply(id: Value, code: i64, message: &str) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
}

fn result_reply(id: Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

/// Parse and route one message. Returns `None` for a well-formed
/// notification (no reply), `Some(reply)` otherwise.
async fn handle_message(state: &ServerState, raw: &str) -> Option<Value> {
    let parsed: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => return Some(error_reply(Value::Null, ERR_PARSE, &e.to_string())),
    };

    if !parsed.is_object() {
        return Some(error_reply(Value::Null, ERR_INVALID_REQUEST, "request must be a JSON object"));
    }

    let id = parsed.get("id").cloned();
    let method = match parsed.get("method").and_then(Value::as_str) {
        Some(m) => m,
        None => {
            return id.map(|id| error_reply(id, ERR_INVALID_REQUEST, "missing method"));
        }
    };
    let params = parsed.get("params").cloned().unwrap_or(json!({}));

    let result = route(state, method, &params).await;

    match (id, result) {
        (Some(id), Ok(value)) => Some(result_reply(id, value)),
        (Some(id), Err((code, message))) => Some(error_reply(id, code, &message)),
        (None, _) => None,
    }
}

type RouteResult = Result<Value, (i64, String)>;

async fn route(state: &ServerState, method: &str, params: &Value) -> RouteResult {
    match method {
        "initialize" => Ok(handle_initialize(state).await),
        "notifications/initialized" => {
            warm_cache(state).await;
            Ok(Value::Null)
        }
        "tools/list" => Ok(json!({"tools": tools::schemas()})),
        "tools/call" => handle_tools_call(state, params).await,
        "ping" => Ok(json!({})),
        other => Err((ERR_METHOD_NOT_FOUND, format!("unknown method: {other}"))),
    }
}

async fn handle_initialize(state: &ServerState) -> Value {
    let configured = state.config.repo_path.clone();
    let candidate = match configured {
        Some(path) => Some(path),
        None => discover_repo_path().await,
    };
    if let Some(path) = candidate {
        if let Err(e) = state.switch_repo(path).await {
            tracing::warn!(error = %e, "initial repo binding failed, starting unbound");
        }
    }

    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {"tools": {"listChanged": false}},
        "serverInfo": {"name": SERVER_NAME, "version": SERVER_VERSION},
    })
}

async fn discover_repo_path() -> Option<String> {
    if let Ok(path) = std::env::var("REPO_PATH") {
        if !path.is_empty() {
            return Some(path);
        }
    }
    let out = crate::subprocess::run(&["git", "rev-parse", "--show-toplevel"], None)
        .await
        .ok()?;
    let path = String::from_utf8_lossy(&out.stdout).trim().to_string();
    if path.is_empty() {
        None
    } else {
        Some(path)
    }
}

async fn warm_cache(state: &ServerState) {
    let cwd = state.current_repo_path().await;
    let mut cache = state.cache.lock().await;
    cache.warm(cwd.as_deref().map(std::path::Path::new)).await;
}

async fn handle_tools_call(state: &ServerState, params: &Value) -> RouteResult {
    if !params.is_object() {
        return Err((ERR_INVALID_PARAMS, "tools/call params must be an object".to_string()));
    }
    let Some(name) = params.get("name").and_then(Value::as_str) else {
        return Err((ERR_INVALID_PARAMS, "tools/call requires a string name".to_string()));
    };
    let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
    if !arguments.is_object() {
        return Err((ERR_INVALID_PARAMS, "tools/call arguments must be an object".to_string()));
    }

    let thread_id = context::resolve_thread_id(params, &arguments);
    {
        let mut threads = state.threads.lock().await;
        threads.get_or_create(&thread_id);
    }

    if let Some(repo_target) = context::resolve_repo_target(params, &arguments) {
        // Explicit target: rebind now, before recording it on the thread, so
        // an invalid path never lands in the thread table (spec.md §4.4:
        // "if the chdir fails, the call is rejected with an invalid-params
        // error").
        state
            .switch_repo(repo_target.clone())
            .await
            .map_err(|e| (ERR_INVALID_PARAMS, e.to_string()))?;
        let mut threads = state.threads.lock().await;
        threads.get_or_create(&thread_id).repo_path = Some(repo_target);
    } else {
        // No explicit target: implicitly switch to the thread's remembered
        // repo if it differs from whatever is currently bound, so a handler
        // reading the process-wide binding sees *this* thread's repo rather
        // than whichever thread switched last (spec.md §4.4, §8 scenario 6).
        let remembered = {
            let threads = state.threads.lock().await;
            threads.get(&thread_id).and_then(|c| c.repo_path.clone())
        };
        if let Some(remembered) = remembered {
            let current = state.current_repo_path().await;
            if current.as_deref() != Some(remembered.as_str()) {
                // Best-effort: a call that didn't ask to switch repos
                // shouldn't fail just because the remembered path has since
                // become unreachable.
                if let Err(e) = state.switch_repo(remembered).await {
                    tracing::warn!(error = %e, thread_id, "implicit repo rebind failed");
                }
            }
        }
    }

    let result = tools::call(state, &thread_id, name, &arguments).await;
    let is_error = result.get("error").is_some();
    Ok(json!({
        "content": [{"type": "text", "text": result.to_string()}],
        "isError": is_error,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use std::io::Cursor;
    use std::sync::Arc;

    fn test_state() -> ServerState {
        ServerState::new(ServerConfig::default())
    }

    async fn run_exchange(input: &str) -> Vec<Value> {
        let state = test_state();
        let mut output = Vec::new();
        run(&state, Cursor::new(input.as_bytes().to_vec()), &mut output)
            .await
            .unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn handshake_yields_one_reply_with_expected_fields() {
        let input = "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"initialize\",\"params\":{}}\n\
                      {\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n";
        let replies = run_exchange(input).await;
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0]["id"], json!(1));
        assert_eq!(replies[0]["result"]["serverInfo"]["name"], json!("devmcp"));
        assert_eq!(replies[0]["result"]["capabilities"]["tools"]["listChanged"], json!(false));
    }

    #[tokio::test]
    async fn tools_list_reply_has_nonempty_well_formed_tools() {
        let input = "{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"tools/list\"}\n";
        let replies = run_exchange(input).await;
        let tools = replies[0]["result"]["tools"].as_array().unwrap();
        assert!(!tools.is_empty());
        for tool in tools {
            assert!(tool.get("name").is_some());
            assert!(tool.get("description").is_some());
            assert!(tool.get("inputSchema").is_some());
        }
    }

    #[tokio::test]
    async fn ping_replies_with_empty_object() {
        let input = "{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"ping\"}\n";
        let replies = run_exchange(input).await;
        assert_eq!(replies[0]["result"], json!({}));
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let input = "{\"jsonrpc\":\"2.0\",\"id\":4,\"method\":\"nope\"}\n";
        let replies = run_exchange(input).await;
        assert_eq!(replies[0]["error"]["code"], json!(-32601));
    }

    #[tokio::test]
    async fn notification_produces_no_reply() {
        let input = "{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n\
                      {\"jsonrpc\":\"2.0\",\"id\":5,\"method\":\"ping\"}\n";
        let replies = run_exchange(input).await;
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0]["id"], json!(5));
    }

    #[tokio::test]
    async fn tools_call_with_non_object_arguments_is_invalid_params_then_loop_continues() {
        let input = "{\"jsonrpc\":\"2.0\",\"id\":6,\"method\":\"tools/call\",\"params\":{\"name\":\"ping\",\"arguments\":5}}\n\
                      {\"jsonrpc\":\"2.0\",\"id\":7,\"method\":\"ping\"}\n";
        let replies = run_exchange(input).await;
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0]["error"]["code"], json!(-32602));
        assert_eq!(replies[1]["result"], json!({}));
    }

    #[tokio::test]
    async fn unknown_tool_name_is_an_error_object_not_a_crash() {
        let input = "{\"jsonrpc\":\"2.0\",\"id\":8,\"method\":\"tools/call\",\"params\":{\"name\":\"nope\",\"arguments\":{}}}\n";
        let replies = run_exchange(input).await;
        assert_eq!(replies[0]["result"]["isError"], json!(true));
    }

    #[tokio::test]
    async fn framing_auto_detect_makes_replies_header_framed() {
        let body = r#"{"jsonrpc":"2.0","id":9,"method":"ping"}"#;
        let input = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);
        let state = test_state();
        let mut output = Vec::new();
        run(&state, Cursor::new(input.into_bytes()), &mut output).await.unwrap();
        let out_text = String::from_utf8(output).unwrap();
        assert!(out_text.starts_with("Content-Length:"));
    }

    #[tokio::test]
    async fn thread_isolation_across_two_thread_ids() {
        let state = test_state();
        let arc_state = Arc::new(state);

        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let path_a = dir_a.path().to_string_lossy().to_string();
        let path_b = dir_b.path().to_string_lossy().to_string();

        let input_a = json!({
            "jsonrpc": "2.0", "id": 1, "method": "tools/call",
            "params": {"name": "repo_switch", "arguments": {"repo_path": path_a}, "thread_id": "a"}
        });
        let _ = handle_message(&arc_state, &input_a.to_string()).await;

        let input_b = json!({
            "jsonrpc": "2.0", "id": 2, "method": "tools/call",
            "params": {"name": "repo_switch", "arguments": {"repo_path": path_b}, "thread_id": "b"}
        });
        let _ = handle_message(&arc_state, &input_b.to_string()).await;

        {
            let threads = arc_state.threads.lock().await;
            assert_eq!(threads.get("a").unwrap().repo_path.as_deref(), Some(path_a.as_str()));
            assert_eq!(threads.get("b").unwrap().repo_path.as_deref(), Some(path_b.as_str()));
        }
        assert_eq!(arc_state.current_repo_path().await.as_deref(), Some(path_b.as_str()));

        // spec.md §8 scenario 6: a third call with thread_id="a" and no repo
        // argument must run against a's bound path, not whatever is bound
        // globally from b's prior call — the dispatch loop implicitly
        // re-switches to the thread's remembered repo before the handler runs.
        let input_a_again = json!({
            "jsonrpc": "2.0", "id": 3, "method": "tools/call",
            "params": {"name": "gh_issue_list", "arguments": {}, "thread_id": "a"}
        });
        let _ = handle_message(&arc_state, &input_a_again.to_string()).await;
        assert_eq!(arc_state.current_repo_path().await.as_deref(), Some(path_a.as_str()));
    }

    #[tokio::test]
    async fn tools_call_with_nonexistent_repo_path_is_rejected_as_invalid_params() {
        let input = "{\"jsonrpc\":\"2.0\",\"id\":11,\"method\":\"tools/call\",\
                      \"params\":{\"name\":\"gh_issue_list\",\"arguments\":{\"repo_path\":\"/nonexistent/devmcp/test/path\"}}}\n";
        let replies = run_exchange(input).await;
        assert_eq!(replies[0]["error"]["code"], json!(-32602));
    }
}
