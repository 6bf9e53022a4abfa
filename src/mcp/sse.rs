//! Incremental Server-Sent-Events frame reader
//!
//! [`SseReader`] owns one byte stream together with its line buffer and the
//! partially accumulated event. It is created once per connection and passed
//! by `&mut` into every wait, so events are observed strictly in stream order
//! and no bytes are lost between the endpoint-discovery wait and the
//! response wait on a legacy SSE connection.
//!
//! SSE field processing:
//!
//! - `event:`, `data:` and `id:` are recognized with or without a space
//!   after the colon. Multiple `data:` lines are joined with `\n`.
//! - Lines starting with `:` are comments. `retry:` and unknown fields are
//!   ignored.
//! - A blank line completes the event. `\r\n` line endings are accepted.
//! - Data that parses as a JSON object or array is exposed as
//!   [`SseData::Json`]; anything else stays [`SseData::Text`].
//!
//! Two hard bounds turn hostile or malformed streams into predictable
//! failures: at most [`MAX_BUFFER_BYTES`] of unconsumed input (including the
//! event being accumulated), and at most [`MAX_DISCARDED_EVENTS`] events
//! rejected by a single wait's predicate.

use std::fmt;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::Value;

use crate::error::{ProbeError, ProbeResult};

/// Upper bound on buffered, not yet consumed bytes.
pub const MAX_BUFFER_BYTES: usize = 1024 * 1024;

/// Upper bound on events discarded while waiting for a match.
pub const MAX_DISCARDED_EVENTS: usize = 1000;

/// Payload of an SSE `data` field.
#[derive(Debug, Clone, PartialEq)]
pub enum SseData {
    /// Data that parsed as JSON
    Json(Value),
    /// Anything else, verbatim
    Text(String),
}

impl SseData {
    fn parse(raw: String) -> Self {
        let trimmed = raw.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(value) = serde_json::from_str(trimmed) {
                return SseData::Json(value);
            }
        }
        SseData::Text(raw)
    }

    /// The JSON value, if the data parsed as JSON.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            SseData::Json(v) => Some(v),
            SseData::Text(_) => None,
        }
    }

    /// The raw text, if the data did not parse as JSON.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SseData::Text(s) => Some(s),
            SseData::Json(_) => None,
        }
    }
}

/// One completed SSE event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SseEvent {
    /// `event:` field
    pub event: Option<String>,
    /// `data:` field(s)
    pub data: Option<SseData>,
    /// `id:` field
    pub id: Option<String>,
}

impl SseEvent {
    /// Returns true if the event type equals `name`.
    pub fn is(&self, name: &str) -> bool {
        self.event.as_deref() == Some(name)
    }

    /// The JSON payload, if any.
    pub fn json(&self) -> Option<&Value> {
        self.data.as_ref().and_then(SseData::as_json)
    }
}

#[derive(Debug, Default)]
struct PendingEvent {
    event: Option<String>,
    data: Option<String>,
    id: Option<String>,
}

impl PendingEvent {
    fn is_empty(&self) -> bool {
        self.event.is_none() && self.data.is_none() && self.id.is_none()
    }

    fn len(&self) -> usize {
        self.event.as_ref().map_or(0, String::len)
            + self.data.as_ref().map_or(0, String::len)
            + self.id.as_ref().map_or(0, String::len)
    }

    fn finish(self) -> SseEvent {
        SseEvent {
            event: self.event,
            data: self.data.map(SseData::parse),
            id: self.id,
        }
    }
}

/// Stateful SSE parser over a byte stream.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use mcp_probe::mcp::sse::SseReader;
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let chunks = vec![
///     Ok::<_, std::io::Error>(Bytes::from_static(b"event: endpoint\nda")),
///     Ok(Bytes::from_static(b"ta: /messages\n\n")),
/// ];
/// let mut reader = SseReader::new(futures::stream::iter(chunks));
/// let event = reader.wait_for_event(|e| e.is("endpoint")).await?;
/// assert_eq!(event.data.unwrap().as_text(), Some("/messages"));
/// # Ok(())
/// # }
/// ```
pub struct SseReader<S> {
    source: S,
    buffer: Vec<u8>,
    cursor: usize,
    pending: PendingEvent,
    exhausted: bool,
}

impl<S> fmt::Debug for SseReader<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SseReader")
            .field("buffered", &self.buffered_len())
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

impl<S, E> SseReader<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: fmt::Display,
{
    /// Wait for the next event matching `predicate`.
    ///
    /// Events that do not match are discarded.
    ///
    /// # Errors
    ///
    /// - [`ProbeError::StreamIntegrity`] if the buffer bound is exceeded or
    ///   more than [`MAX_DISCARDED_EVENTS`] events are discarded.
    /// - [`ProbeError::StreamClosed`] if the stream ends first.
    /// - [`ProbeError::Transport`] if reading the stream fails.
    pub async fn wait_for_event<P>(&mut self, mut predicate: P) -> ProbeResult<SseEvent>
    where
        P: FnMut(&SseEvent) -> bool,
    {
        let mut discarded = 0usize;
        loop {
            let Some(event) = self.next_event().await? else {
                return Err(ProbeError::StreamClosed(
                    "event stream ended before the expected event".to_string(),
                ));
            };
            if predicate(&event) {
                return Ok(event);
            }
            discarded += 1;
            tracing::debug!(event = ?event.event, discarded, "Discarding SSE event");
            if discarded > MAX_DISCARDED_EVENTS {
                return Err(ProbeError::StreamIntegrity(format!(
                    "discarded more than {} events without a match",
                    MAX_DISCARDED_EVENTS
                )));
            }
        }
    }

    /// Read the next complete event, or `None` once the stream has ended.
    ///
    /// An unterminated trailing event is delivered at end of stream.
    pub async fn next_event(&mut self) -> ProbeResult<Option<SseEvent>> {
        loop {
            while let Some(line) = self.take_line() {
                if let Some(event) = self.feed_line(&line) {
                    return Ok(Some(event));
                }
            }

            if self.exhausted {
                if self.cursor < self.buffer.len() {
                    let rest = String::from_utf8_lossy(&self.buffer[self.cursor..]).into_owned();
                    self.cursor = self.buffer.len();
                    if let Some(event) = self.feed_line(rest.trim_end_matches('\r')) {
                        return Ok(Some(event));
                    }
                }
                if self.pending.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(std::mem::take(&mut self.pending).finish()));
            }

            match self.source.next().await {
                Some(Ok(chunk)) => self.push_chunk(&chunk)?,
                Some(Err(e)) => {
                    return Err(ProbeError::Transport(format!(
                        "event stream read failed: {}",
                        e
                    )))
                }
                None => self.exhausted = true,
            }
        }
    }

}

impl<S> SseReader<S> {
    /// Wrap a byte stream.
    pub fn new(source: S) -> Self {
        Self {
            source,
            buffer: Vec::new(),
            cursor: 0,
            pending: PendingEvent::default(),
            exhausted: false,
        }
    }

    /// Number of unconsumed bytes, including the event being accumulated.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len() - self.cursor + self.pending.len()
    }

    fn push_chunk(&mut self, chunk: &[u8]) -> ProbeResult<()> {
        if self.cursor > 0 {
            self.buffer.drain(..self.cursor);
            self.cursor = 0;
        }
        self.buffer.extend_from_slice(chunk);
        if self.buffered_len() > MAX_BUFFER_BYTES {
            return Err(ProbeError::StreamIntegrity(format!(
                "event stream buffer exceeded {} bytes",
                MAX_BUFFER_BYTES
            )));
        }
        Ok(())
    }

    fn take_line(&mut self) -> Option<String> {
        let rest = &self.buffer[self.cursor..];
        let newline = rest.iter().position(|b| *b == b'\n')?;
        let mut line = &rest[..newline];
        if let [head @ .., b'\r'] = line {
            line = head;
        }
        let text = String::from_utf8_lossy(line).into_owned();
        self.cursor += newline + 1;
        Some(text)
    }

    fn feed_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            if self.pending.is_empty() {
                return None;
            }
            return Some(std::mem::take(&mut self.pending).finish());
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.pending.event = Some(value.to_string()),
            "data" => match self.pending.data.as_mut() {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.pending.data = Some(value.to_string()),
            },
            "id" => self.pending.id = Some(value.to_string()),
            _ => {}
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    type Chunk = Result<Bytes, std::io::Error>;

    fn reader_from(chunks: Vec<Vec<u8>>) -> SseReader<futures::stream::Iter<std::vec::IntoIter<Chunk>>> {
        let items: Vec<Chunk> = chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect();
        SseReader::new(futures::stream::iter(items))
    }

    #[tokio::test]
    async fn test_single_event_single_chunk() {
        let mut reader = reader_from(vec![b"event: endpoint\ndata: /x\n\n".to_vec()]);
        let event = reader.wait_for_event(|_| true).await.unwrap();
        assert_eq!(event.event.as_deref(), Some("endpoint"));
        assert_eq!(event.data, Some(SseData::Text("/x".into())));
    }

    #[tokio::test]
    async fn test_event_reassembled_across_every_split() {
        let bytes = b"event: endpoint\ndata: /x\n\n";
        for i in 1..bytes.len() {
            for j in i..bytes.len() {
                let chunks = vec![bytes[..i].to_vec(), bytes[i..j].to_vec(), bytes[j..].to_vec()];
                let mut reader = reader_from(chunks);
                let event = reader.wait_for_event(|e| e.is("endpoint")).await.unwrap();
                assert_eq!(
                    event,
                    SseEvent {
                        event: Some("endpoint".into()),
                        data: Some(SseData::Text("/x".into())),
                        id: None,
                    },
                    "split at {i}/{j}"
                );
                assert!(reader.next_event().await.unwrap().is_none());
            }
        }
    }

    #[tokio::test]
    async fn test_field_without_space_and_crlf() {
        let mut reader = reader_from(vec![b"event:message\r\nid:7\r\ndata:{\"a\":1}\r\n\r\n".to_vec()]);
        let event = reader.wait_for_event(|_| true).await.unwrap();
        assert!(event.is("message"));
        assert_eq!(event.id.as_deref(), Some("7"));
        assert_eq!(event.json(), Some(&json!({"a": 1})));
    }

    #[tokio::test]
    async fn test_non_json_looking_braces_kept_as_text() {
        let mut reader = reader_from(vec![b"data: {not json\n\n".to_vec()]);
        let event = reader.next_event().await.unwrap().unwrap();
        assert_eq!(event.data, Some(SseData::Text("{not json".into())));
    }

    #[tokio::test]
    async fn test_multiline_data_joined() {
        let mut reader = reader_from(vec![b"data: {\"a\":\ndata: 2}\n\n".to_vec()]);
        let event = reader.next_event().await.unwrap().unwrap();
        assert_eq!(event.json(), Some(&json!({"a": 2})));
    }

    #[tokio::test]
    async fn test_comments_ignored() {
        let mut reader = reader_from(vec![b": keepalive\n\nevent: ping\n\n".to_vec()]);
        let event = reader.next_event().await.unwrap().unwrap();
        assert!(event.is("ping"));
    }

    #[tokio::test]
    async fn test_non_matching_events_discarded_and_reader_reused() {
        let mut reader = reader_from(vec![
            b"event: endpoint\ndata: /m\n\nevent: message\ndata: {\"id\":9}\n\n".to_vec(),
            b"event: message\ndata: {\"id\":1,\"result\":{}}\n\n".to_vec(),
        ]);
        let endpoint = reader.wait_for_event(|e| e.is("endpoint")).await.unwrap();
        assert_eq!(endpoint.data.unwrap().as_text(), Some("/m"));

        let response = reader
            .wait_for_event(|e| e.json().and_then(|v| v.get("id")) == Some(&json!(1)))
            .await
            .unwrap();
        assert_eq!(response.json().unwrap()["result"], json!({}));
    }

    #[tokio::test]
    async fn test_unterminated_trailing_event_delivered_at_eof() {
        let mut reader = reader_from(vec![b"data: tail".to_vec()]);
        let event = reader.next_event().await.unwrap().unwrap();
        assert_eq!(event.data, Some(SseData::Text("tail".into())));
        assert!(reader.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stream_end_before_match_is_closed_error() {
        let mut reader = reader_from(vec![b"event: other\n\n".to_vec()]);
        let err = reader.wait_for_event(|e| e.is("endpoint")).await.unwrap_err();
        assert!(matches!(err, ProbeError::StreamClosed(_)));
    }

    #[tokio::test]
    async fn test_buffer_bound_without_newline() {
        let chunk = vec![b'a'; 64 * 1024];
        let chunks = vec![chunk; 17];
        let mut reader = reader_from(chunks);
        let err = reader.wait_for_event(|_| true).await.unwrap_err();
        assert!(matches!(err, ProbeError::StreamIntegrity(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_buffer_bound_with_lines_but_no_blank_line() {
        let chunk = b"data: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\n".repeat(1024);
        let chunks = vec![chunk; 20];
        let mut reader = reader_from(chunks);
        let err = reader.wait_for_event(|_| true).await.unwrap_err();
        assert!(matches!(err, ProbeError::StreamIntegrity(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_discard_bound() {
        let chunk = b"event: noise\ndata: x\n\n".repeat(MAX_DISCARDED_EVENTS + 10);
        let mut reader = reader_from(vec![chunk, b"event: endpoint\ndata: /x\n\n".to_vec()]);
        let err = reader.wait_for_event(|e| e.is("endpoint")).await.unwrap_err();
        assert!(matches!(err, ProbeError::StreamIntegrity(_)));
    }

    #[tokio::test]
    async fn test_read_error_surfaces_as_transport_error() {
        let items: Vec<Chunk> = vec![
            Ok(Bytes::from_static(b"data: partial")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];
        let mut reader = SseReader::new(futures::stream::iter(items));
        let err = reader.next_event().await.unwrap_err();
        assert!(err.to_string().contains("reset"));
    }

    #[tokio::test]
    async fn test_debug_reports_buffered_bytes() {
        let mut reader = reader_from(vec![b"event: a
data: 1

event: b
".to_vec()]);
        let first = reader.next_event().await.unwrap().unwrap();
        assert!(first.is("a"));
        let rendered = format!("{:?}", reader);
        assert!(rendered.contains("SseReader"));
        assert!(rendered.contains("buffered: 9"), "unexpected: {rendered}");
    }
}
