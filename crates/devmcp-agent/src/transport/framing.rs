//! MCP stdio message framing (spec.md §4.5 / §6).
//!
//! Supports two framing modes, auto-detected from the first non-blank line
//! of the stream:
//!
//! - **Line-delimited**: one JSON object per `\n`-terminated line. Detected
//!   when the first non-blank character is `{` or `[`.
//! - **Header-framed**: zero or more `Name: Value` header lines, a blank
//!   line, then exactly `Content-Length` bytes of body.
//!
//! The detected mode is *sticky* for the lifetime of one [`MessageFramer`]:
//! once a message has been read, all subsequent writes on the same
//! connection use that framing, carried as state on the framer itself (not
//! a process-wide global — see spec.md §9's design note on this point).

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use devmcp_core::text::strip_newlines;

/// Hard ceiling on a header-framed message body (spec.md §4.5 / §6).
pub const MAX_FRAMED_BODY: usize = 1024 * 1024;

/// The framing mode observed (or chosen) for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    LineDelimited,
    HeaderFramed,
}

/// Errors surfaced while reading a framed message.
///
/// These map to JSON-RPC `-32700` (parse error) in the dispatch loop; they
/// never propagate past one message read — the loop continues.
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("message body exceeds the {MAX_FRAMED_BODY} byte ceiling")]
    MessageTooLarge,
    #[error("malformed Content-Length header: {0}")]
    InvalidContentLength(String),
    #[error("unexpected EOF while reading framed headers")]
    UnexpectedEofInHeaders,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Reads MCP messages from an async reader, auto-detecting framing on the
/// first non-blank line and remembering the choice for subsequent writes.
pub struct MessageFramer<R> {
    reader: BufReader<R>,
    line_buf: String,
    mode: Option<Framing>,
}

impl<R: AsyncRead + Unpin> MessageFramer<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            line_buf: String::new(),
            mode: None,
        }
    }

    /// The framing mode observed so far, if any message has been read yet.
    pub fn mode(&self) -> Option<Framing> {
        self.mode
    }

    /// Read the next JSON-RPC message body, returning `None` on EOF.
    pub async fn next_message(&mut self) -> Result<Option<String>, FramingError> {
        loop {
            self.line_buf.clear();
            let n = self.reader.read_line(&mut self.line_buf).await?;
            if n == 0 {
                return Ok(None);
            }

            let trimmed = self.line_buf.trim();
            if trimmed.is_empty() {
                continue;
            }

            if trimmed.starts_with('{') || trimmed.starts_with('[') {
                self.mode.get_or_insert(Framing::LineDelimited);
                return Ok(Some(trimmed.to_string()));
            }

            // Not JSON on the first non-blank line: header-framed.
            self.mode.get_or_insert(Framing::HeaderFramed);
            return self.read_header_framed_body(trimmed).await.map(Some);
        }
    }

    async fn read_header_framed_body(&mut self, first_line: &str) -> Result<String, FramingError> {
        let mut content_length: Option<usize> = None;
        let mut line = first_line.to_string();

        loop {
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.trim().eq_ignore_ascii_case("content-length") {
                    let len: usize = value
                        .trim()
                        .parse()
                        .map_err(|_| FramingError::InvalidContentLength(value.trim().to_string()))?;
                    content_length = Some(len);
                }
            }

            self.line_buf.clear();
            let n = self.reader.read_line(&mut self.line_buf).await?;
            if n == 0 {
                return Err(FramingError::UnexpectedEofInHeaders);
            }
            line = self.line_buf.trim().to_string();
        }

        let len = content_length
            .ok_or_else(|| FramingError::InvalidContentLength("missing Content-Length".to_string()))?;
        if len > MAX_FRAMED_BODY {
            return Err(FramingError::MessageTooLarge);
        }

        let mut body = vec![0u8; len];
        self.reader.read_exact(&mut body).await?;
        String::from_utf8(body)
            .map_err(|e| FramingError::InvalidContentLength(format!("body not utf-8: {e}")))
    }
}

/// Write `json` to `writer` using `mode`, stripping embedded newlines on the
/// line-delimited path (an embedded `\n` would otherwise break framing).
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    mode: Framing,
    json: &str,
) -> io::Result<()> {
    match mode {
        Framing::LineDelimited => {
            let safe = strip_newlines(json);
            writer.write_all(safe.as_bytes()).await?;
            writer.write_all(b"\n").await?;
        }
        Framing::HeaderFramed => {
            let header = format!("Content-Length: {}\r\n\r\n", json.len());
            writer.write_all(header.as_bytes()).await?;
            writer.write_all(json.as_bytes()).await?;
            writer.write_all(b"\r\n").await?;
        }
    }
    writer.flush().await?;
    Ok(())
}

/// A static, pre-encoded `-32603` internal-error reply used when reply
/// construction itself fails under memory pressure (spec.md §4.5 / §7).
///
/// Always newline-delimited: if we cannot afford to build a reply we cannot
/// afford to format one for the header-framed path either, and a bare JSON
/// line is still a parseable message under line-delimited framing.
pub const OOM_FALLBACK_REPLY: &str =
    r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"internal error"}}"#;
