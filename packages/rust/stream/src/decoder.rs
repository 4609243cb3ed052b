//! Line-oriented frame decoder for the chat event stream.
//!
//! The transport delivers arbitrary byte chunks; frames are newline-delimited
//! `data: <json>` lines. The decoder owns a single carry-over buffer holding
//! the bytes of the line that is still incomplete, so a frame split across any
//! number of chunks (including mid UTF-8 sequence) is only classified once its
//! terminating newline has arrived.

use serde_json::{Map, Value};
use tracing::{debug, trace};

use citeflow_shared::SourceRecord;

/// Literal prefix of every event line.
const DATA_PREFIX: &[u8] = b"data: ";

// ---------------------------------------------------------------------------
// ProtocolEvent
// ---------------------------------------------------------------------------

/// One classified, complete protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// Incremental answer text, possibly empty.
    ContentDelta(String),
    /// Terminal event carrying the sources the answer may cite.
    Completion(Vec<SourceRecord>),
    /// Terminal event reported by the upstream generator.
    StreamError(String),
}

impl ProtocolEvent {
    /// Returns true if this event terminates the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completion(_) | Self::StreamError(_))
    }
}

// ---------------------------------------------------------------------------
// FrameDecoder
// ---------------------------------------------------------------------------

/// Incremental decoder turning raw chunks into [`ProtocolEvent`]s.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    terminated: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every event completed by it, in order.
    ///
    /// Once a terminal event has been returned, further chunks are ignored.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<ProtocolEvent> {
        let mut events = Vec::new();
        if self.terminated {
            return events;
        }

        self.buf.extend_from_slice(chunk);

        let mut consumed = 0;
        while let Some(pos) = self.buf[consumed..].iter().position(|&b| b == b'\n') {
            let end = consumed + pos;
            let event = classify_line(&self.buf[consumed..end]);
            consumed = end + 1;

            if let Some(event) = event {
                let terminal = event.is_terminal();
                events.push(event);
                if terminal {
                    debug!("terminal event decoded");
                    self.terminated = true;
                    self.buf.clear();
                    return events;
                }
            }
        }

        self.buf.drain(..consumed);
        events
    }

    /// Signal end of input.
    ///
    /// A final line without a trailing newline is classified here; it cannot
    /// grow any further, so it is complete.
    pub fn finish(&mut self) -> Option<ProtocolEvent> {
        if self.terminated {
            return None;
        }
        self.terminated = true;
        let line = std::mem::take(&mut self.buf);
        classify_line(&line)
    }

    /// Whether a terminal event has been decoded (or input was finished).
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Bytes currently held for an incomplete line.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }
}

/// Decode a complete sequence of chunks eagerly.
pub fn decode_all<I, C>(chunks: I) -> Vec<ProtocolEvent>
where
    I: IntoIterator<Item = C>,
    C: AsRef<[u8]>,
{
    let mut decoder = FrameDecoder::new();
    let mut events = Vec::new();
    for chunk in chunks {
        events.extend(decoder.push_chunk(chunk.as_ref()));
    }
    events.extend(decoder.finish());
    events
}

// ---------------------------------------------------------------------------
// Line classification
// ---------------------------------------------------------------------------

/// Classify one complete line. Anything that is not a recognizable event is noise.
fn classify_line(line: &[u8]) -> Option<ProtocolEvent> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        if !line.is_empty() {
            trace!(len = line.len(), "discarding line without data prefix");
        }
        return None;
    };

    let value: Value = match serde_json::from_slice(payload) {
        Ok(value) => value,
        Err(e) => {
            trace!(error = %e, len = payload.len(), "discarding undecodable data line");
            return None;
        }
    };

    classify_payload(&value)
}

fn classify_payload(value: &Value) -> Option<ProtocolEvent> {
    let obj = value.as_object()?;

    if let Some(content) = obj.get("content").and_then(Value::as_str) {
        return Some(ProtocolEvent::ContentDelta(content.to_string()));
    }

    if let Some(sources) = obj.get("sources").and_then(Value::as_array) {
        return Some(ProtocolEvent::Completion(source_records(sources)));
    }

    match obj.get("error") {
        Some(Value::Null) | None => {
            trace!("discarding data line with no recognized field");
            None
        }
        Some(error) => Some(ProtocolEvent::StreamError(error_message(error))),
    }
}

/// Convert the wire source list into records, one per element.
///
/// Ordinals follow list position even for malformed elements, so numbering
/// always matches what the generator was shown.
fn source_records(sources: &[Value]) -> Vec<SourceRecord> {
    sources
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let ordinal = u32::try_from(i + 1).unwrap_or(u32::MAX);
            match entry {
                Value::Object(obj) => record_from_object(ordinal, obj),
                Value::String(title) if !title.trim().is_empty() => SourceRecord {
                    ordinal,
                    title: title.trim().to_string(),
                    doc_id: String::new(),
                    source_url: None,
                },
                _ => SourceRecord {
                    ordinal,
                    title: format!("Source {ordinal}"),
                    doc_id: String::new(),
                    source_url: None,
                },
            }
        })
        .collect()
}

fn record_from_object(ordinal: u32, obj: &Map<String, Value>) -> SourceRecord {
    // Display titles only; raw doc/chunk ids are never promoted to titles.
    let title = first_field(obj, &["title", "name", "filename", "file_name"])
        .unwrap_or_else(|| format!("Source {ordinal}"));

    SourceRecord {
        ordinal,
        title,
        doc_id: first_field(obj, &["doc_id", "document_id"]).unwrap_or_default(),
        source_url: first_field(obj, &["source_url", "url"]),
    }
}

/// First non-empty string (or number) among `keys`.
fn first_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| obj.get(*key))
        .filter_map(|value| match value {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .find(|s| !s.is_empty())
}

fn error_message(error: &Value) -> String {
    match error {
        Value::String(message) => message.clone(),
        Value::Object(obj) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
