//! Incremental Server-Sent Events parsing for the engine's chat stream.
//!
//! Events are separated by a blank line, each carrying optional
//! `event:` and one or more `data:` lines. Chunks can split an event
//! block or a UTF-8 sequence anywhere, so raw bytes run through
//! [`Utf8StreamDecoder`] before line handling.

use serde::Deserialize;

use crate::decode::Utf8StreamDecoder;

/// A single parsed SSE event.
#[derive(Debug, Clone)]
pub struct SseEvent {
    /// The `event:` field, if present.
    pub event: Option<String>,
    /// The `data:` content; multiple data lines are joined with newlines.
    pub data: String,
}

/// One JSON message carried in a chat-stream `data:` payload.
#[derive(Debug, Deserialize)]
pub struct ChatStreamMessage {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub content: String,
    /// Rendering hint from the server; the client displays plain text
    /// regardless.
    #[serde(default)]
    pub format: String,
}

impl ChatStreamMessage {
    pub fn is_content(&self) -> bool {
        self.kind == "content"
    }

    pub fn is_complete(&self) -> bool {
        self.kind == "complete"
    }
}

/// Incremental SSE parser that buffers incomplete blocks across chunk
/// boundaries.
#[derive(Default)]
pub struct SseParser {
    decoder: Utf8StreamDecoder,
    buffer: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes from the HTTP response. Returns any complete SSE
    /// events found. An event left unterminated when the stream closes
    /// is discarded, matching what browsers do.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.push_str(&self.decoder.feed(chunk));

        let mut events = Vec::new();
        while let Some(boundary) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..boundary + 2).collect();

            let mut event_type: Option<String> = None;
            let mut data_lines: Vec<String> = Vec::new();
            for line in block.lines() {
                if let Some(value) = line.strip_prefix("event:") {
                    event_type = Some(value.trim().to_string());
                } else if let Some(value) = line.strip_prefix("data:") {
                    data_lines.push(value.strip_prefix(' ').unwrap_or(value).to_string());
                }
                // id:, retry:, and comment lines are ignored.
            }

            if !data_lines.is_empty() {
                events.push(SseEvent {
                    event: event_type,
                    data: data_lines.join("\n"),
                });
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_events() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: hello\n\ndata: world\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "hello");
        assert_eq!(events[1].data, "world");
    }

    #[test]
    fn test_event_type_field() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"event: update\ndata: {\"type\":\"content\"}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("update"));
        assert_eq!(events[0].data, "{\"type\":\"content\"}");
    }

    #[test]
    fn test_block_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: hel").is_empty());
        let events = parser.feed(b"lo\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hello");
    }

    #[test]
    fn test_multibyte_split_across_chunks() {
        let mut parser = SseParser::new();
        // "café" with the é split between chunks.
        assert!(parser.feed(b"data: caf\xC3").is_empty());
        let events = parser.feed(b"\xA9\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "café");
    }

    #[test]
    fn test_multiple_data_lines_joined() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: one\ndata: two\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "one\ntwo");
    }

    #[test]
    fn test_chat_message_decoding() {
        let content: ChatStreamMessage =
            serde_json::from_str(r#"{"type":"content","content":"hi","format":"markdown"}"#)
                .unwrap();
        assert!(content.is_content());
        assert_eq!(content.content, "hi");

        let complete: ChatStreamMessage = serde_json::from_str(r#"{"type":"complete"}"#).unwrap();
        assert!(complete.is_complete());
        assert_eq!(complete.content, "");
    }
}
