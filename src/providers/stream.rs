//! Streaming response parsing.
//!
//! Backends emit newline-delimited JSON, optionally as SSE `data:` lines,
//! terminated by a literal `[DONE]`. Chunk shapes differ between backends, so
//! content is pulled out by an ordered table of extractors; adding a backend
//! shape means adding a row. Lines that are not JSON, or match no extractor,
//! are skipped.

use super::BackendError;
use futures_util::StreamExt;
use serde_json::Value;

/// End-of-stream sentinel.
pub const DONE_SENTINEL: &str = "[DONE]";

type Extractor = fn(&Value) -> Option<&str>;

/// Tried in order; the first non-empty string wins.
pub const EXTRACTORS: &[(&str, Extractor)] = &[
    ("message", |v| v.get("message")?.as_str()),
    ("message.content", |v| v.get("message")?.get("content")?.as_str()),
    ("choices[0].delta.content", |v| {
        v.get("choices")?.get(0)?.get("delta")?.get("content")?.as_str()
    }),
    ("choices[0].text", |v| v.get("choices")?.get(0)?.get("text")?.as_str()),
    ("response", |v| v.get("response")?.as_str()),
    ("token", |v| {
        if v.get("type")?.as_str()? == "token" {
            v.get("content")?.as_str()
        } else {
            None
        }
    }),
];

/// Content carried by one parsed chunk, if any.
pub fn extract_content(chunk: &Value) -> Option<&str> {
    EXTRACTORS
        .iter()
        .find_map(|(_, extract)| extract(chunk).filter(|s| !s.is_empty()))
}

/// Whether the stream should keep going after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Done,
}

/// Folds stream lines into the full answer text.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    done: bool,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line (without its trailing newline).
    pub fn push_line(&mut self, line: &str) -> Flow {
        if self.done {
            return Flow::Done;
        }
        let line = line.trim();
        if line.is_empty() {
            return Flow::Continue;
        }
        let payload = line
            .strip_prefix("data:")
            .map(str::trim_start)
            .unwrap_or(line);
        if payload.trim() == DONE_SENTINEL {
            self.done = true;
            return Flow::Done;
        }

        if let Ok(chunk) = serde_json::from_str::<Value>(payload) {
            if let Some(content) = extract_content(&chunk) {
                self.text.push_str(content);
            }
        }
        Flow::Continue
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// Splits a byte stream into lines, holding partial lines between chunks.
/// Splitting happens on raw bytes so multi-byte characters that straddle a
/// chunk boundary are decoded intact.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line[..line.len() - 1]).into_owned());
        }
        lines
    }

    /// Whatever is left after the stream ends (a final line with no newline).
    pub fn finish(self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.pending).into_owned())
        }
    }
}

/// Read a streaming response to completion and return the accumulated text.
/// The caller has already checked the status code.
pub async fn read_event_stream(response: reqwest::Response) -> Result<String, BackendError> {
    let mut stream = response.bytes_stream();
    let mut lines = LineBuffer::default();
    let mut acc = StreamAccumulator::new();

    while let Some(chunk) = stream.next().await {
        let bytes = chunk?;
        for line in lines.push(&bytes) {
            if acc.push_line(&line) == Flow::Done {
                return Ok(acc.into_text());
            }
        }
    }
    if let Some(tail) = lines.finish() {
        acc.push_line(&tail);
    }
    Ok(acc.into_text())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fold(lines: &[&str]) -> String {
        let mut acc = StreamAccumulator::new();
        for line in lines {
            if acc.push_line(line) == Flow::Done {
                break;
            }
        }
        acc.into_text()
    }

    #[test]
    fn extracts_every_known_shape() {
        assert_eq!(extract_content(&json!({"message": "a"})), Some("a"));
        assert_eq!(extract_content(&json!({"message": {"role": "assistant", "content": "b"}})), Some("b"));
        assert_eq!(extract_content(&json!({"choices": [{"delta": {"content": "c"}}]})), Some("c"));
        assert_eq!(extract_content(&json!({"choices": [{"text": "d"}]})), Some("d"));
        assert_eq!(extract_content(&json!({"response": "e"})), Some("e"));
        assert_eq!(extract_content(&json!({"type": "token", "content": "f"})), Some("f"));
    }

    #[test]
    fn empty_delta_falls_through_to_text() {
        let chunk = json!({"choices": [{"delta": {"content": ""}, "text": "g"}]});
        assert_eq!(extract_content(&chunk), Some("g"));
    }

    #[test]
    fn unknown_shapes_yield_nothing() {
        assert_eq!(extract_content(&json!({"type": "start", "content": "x"})), None);
        assert_eq!(extract_content(&json!({"choices": []})), None);
        assert_eq!(extract_content(&json!([1, 2])), None);
    }

    #[test]
    fn folds_sse_stream_until_done() {
        let text = fold(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"Olá\"}}]}",
            "",
            "event: ping",
            "data: {\"choices\":[{\"delta\":{\"content\":\", mundo\"}}]}",
            "data: [DONE]",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}",
        ]);
        assert_eq!(text, "Olá, mundo");
    }

    #[test]
    fn folds_plain_ndjson_and_skips_garbage() {
        let text = fold(&[
            "{\"type\":\"start\"}",
            "{\"type\":\"token\",\"content\":\"Rein\"}",
            "not json at all",
            "{\"type\":\"token\",\"content\":\"icie\"}",
            "{\"response\":\" o router\"}",
        ]);
        assert_eq!(text, "Reinicie o router");
    }

    #[test]
    fn done_sentinel_without_data_prefix_terminates() {
        let mut acc = StreamAccumulator::new();
        assert_eq!(acc.push_line("{\"response\":\"a\"}"), Flow::Continue);
        assert_eq!(acc.push_line("  [DONE]  "), Flow::Done);
        assert!(acc.is_done());
        assert_eq!(acc.push_line("{\"response\":\"b\"}"), Flow::Done);
        assert_eq!(acc.text(), "a");
    }

    #[test]
    fn line_buffer_reassembles_split_utf8() {
        let mut buf = LineBuffer::default();
        let line = "{\"message\":\"manutenção\"}\n".as_bytes();
        let split = line.iter().position(|b| *b == 0xc3).unwrap() + 1;
        assert!(buf.push(&line[..split]).is_empty());
        let lines = buf.push(&line[split..]);
        assert_eq!(lines, vec!["{\"message\":\"manutenção\"}".to_string()]);
        assert_eq!(buf.finish(), None);
    }

    #[test]
    fn line_buffer_returns_unterminated_tail() {
        let mut buf = LineBuffer::default();
        assert_eq!(buf.push(b"a\nb\nc"), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(buf.finish().as_deref(), Some("c"));
    }
}
