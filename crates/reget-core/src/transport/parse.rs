//! Assemble curl's raw header lines into status + `HeaderMap` blocks.

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};

/// Accumulates one response header block at a time. curl reports every block
/// it sees (interim 1xx responses included), each ending with a blank line.
#[derive(Debug, Default)]
pub(crate) struct HeaderBlock {
    status: Option<StatusCode>,
    headers: HeaderMap,
}

impl HeaderBlock {
    /// Feed one raw header line. Returns the finished block on its blank
    /// terminator line; interim responses other than 101 are dropped.
    pub(crate) fn push_line(&mut self, raw: &[u8]) -> Option<(StatusCode, HeaderMap)> {
        let line = trim_crlf(raw);

        if line.is_empty() {
            let status = self.status.take()?;
            let headers = std::mem::take(&mut self.headers);
            if status.is_informational() && status != StatusCode::SWITCHING_PROTOCOLS {
                return None;
            }
            return Some((status, headers));
        }

        if line.starts_with(b"HTTP/") {
            self.status = parse_status_line(line);
            self.headers.clear();
            return None;
        }

        if let Some(colon) = line.iter().position(|b| *b == b':') {
            let name = trim(&line[..colon]);
            let value = trim(&line[colon + 1..]);
            match (HeaderName::from_bytes(name), HeaderValue::from_bytes(value)) {
                (Ok(n), Ok(v)) => {
                    self.headers.append(n, v);
                }
                _ => tracing::debug!(
                    "skipping malformed header line {:?}",
                    String::from_utf8_lossy(line)
                ),
            }
        }
        None
    }
}

/// `HTTP/1.1 206 Partial Content` or `HTTP/2 200`.
fn parse_status_line(line: &[u8]) -> Option<StatusCode> {
    let text = std::str::from_utf8(line).ok()?;
    let code = text.split_whitespace().nth(1)?;
    StatusCode::from_bytes(code.as_bytes()).ok()
}

fn trim_crlf(raw: &[u8]) -> &[u8] {
    let mut end = raw.len();
    while end > 0 && (raw[end - 1] == b'\n' || raw[end - 1] == b'\r') {
        end -= 1;
    }
    &raw[..end]
}

fn trim(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}
