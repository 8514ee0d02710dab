//! Decoder for the event-stream framing of streaming reads.
//!
//! Records are separated by a blank line. Inside a record an `event:` line
//! names the kind and a `data:` line carries the JSON payload:
//!
//! ```text
//! event: put
//! data: {"path":"/","data":{"foo":"bar"}}
//!
//! event: keep-alive
//! data: null
//!
//! ```

use crate::error::{FireError, Result};
use crate::protocol::constants::{events, fields};
use crate::types::{Change, StreamEvent};
use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    Reading,
    /// A terminal control record or end of input was seen.
    Finished,
    Failed,
}

#[derive(Debug, Default)]
struct PendingRecord {
    event: Option<String>,
    data: Option<String>,
}

impl PendingRecord {
    fn is_empty(&self) -> bool {
        self.event.is_none() && self.data.is_none()
    }

    fn push_line(&mut self, line: &str) {
        if line.starts_with(':') {
            return;
        }
        let (name, value) = match line.split_once(':') {
            Some((name, value)) => (name, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match name {
            fields::EVENT => self.event = Some(value.to_string()),
            fields::DATA => match &mut self.data {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            },
            _ => {}
        }
    }
}

/// Incremental decoder turning raw bytes into [`StreamEvent`]s.
///
/// Bytes may arrive split at any position; incomplete lines and records stay
/// buffered until the rest arrives. After a decode error or a terminal
/// control record the decoder ignores further input.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    /// Bytes of `buffer` already known to hold no newline.
    scanned: usize,
    record: PendingRecord,
    ready: VecDeque<Result<StreamEvent>>,
    state: DecodeState,
}

impl FrameDecoder {
    pub fn new() -> Self {
        FrameDecoder {
            buffer: BytesMut::with_capacity(4096),
            scanned: 0,
            record: PendingRecord::default(),
            ready: VecDeque::new(),
            state: DecodeState::Reading,
        }
    }

    pub fn state(&self) -> DecodeState {
        self.state
    }

    pub fn push(&mut self, chunk: &[u8]) {
        if self.state != DecodeState::Reading {
            return;
        }
        self.buffer.extend_from_slice(chunk);

        while self.state == DecodeState::Reading {
            let Some(offset) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n')
            else {
                self.scanned = self.buffer.len();
                break;
            };
            let raw = self.buffer.split_to(self.scanned + offset + 1);
            self.scanned = 0;
            let line = match std::str::from_utf8(&raw) {
                Ok(line) => line.trim_end_matches(&['\n', '\r'][..]),
                Err(e) => {
                    self.fail(FireError::Decode(format!(
                        "invalid UTF-8 in event stream: {}",
                        e
                    )));
                    break;
                }
            };
            if line.is_empty() {
                self.complete_record();
            } else {
                self.record.push_line(line);
            }
        }
    }

    /// Pop the next decoded event or error, in wire order.
    pub fn next_event(&mut self) -> Option<Result<StreamEvent>> {
        self.ready.pop_front()
    }

    /// Mark end of input. A trailing record without its blank line is dropped.
    pub fn finish(&mut self) {
        if self.state != DecodeState::Reading {
            return;
        }
        if !self.buffer.is_empty() || !self.record.is_empty() {
            tracing::debug!(
                "[event-stream] discarding incomplete record ({} buffered bytes)",
                self.buffer.len()
            );
        }
        self.clear_buffer();
        self.record = PendingRecord::default();
        self.state = DecodeState::Finished;
    }

    fn complete_record(&mut self) {
        let record = std::mem::take(&mut self.record);
        if record.is_empty() {
            return;
        }
        match decode_record(record) {
            Ok(event) => {
                tracing::trace!("[event-stream] decoded {:?}", event);
                let terminal = event.is_terminal();
                self.ready.push_back(Ok(event));
                if terminal {
                    self.state = DecodeState::Finished;
                    self.clear_buffer();
                }
            }
            Err(e) => self.fail(e),
        }
    }

    fn clear_buffer(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
    }

    fn fail(&mut self, err: FireError) {
        self.ready.push_back(Err(err));
        self.state = DecodeState::Failed;
        self.clear_buffer();
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_record(record: PendingRecord) -> Result<StreamEvent> {
    let Some(name) = record.event else {
        return Err(FireError::Decode("record without an event name".to_string()));
    };
    match name.as_str() {
        events::PUT => Ok(StreamEvent::Put(decode_change(&name, record.data)?)),
        events::PATCH => Ok(StreamEvent::Patch(decode_change(&name, record.data)?)),
        events::KEEP_ALIVE => Ok(StreamEvent::KeepAlive),
        events::CANCEL => Ok(StreamEvent::Cancel(decode_reason(record.data))),
        events::AUTH_REVOKED | events::AUTH_REVOKED_ALT => {
            Ok(StreamEvent::AuthRevoked(decode_reason(record.data)))
        }
        other => Err(FireError::Decode(format!("unknown event kind {:?}", other))),
    }
}

fn decode_change(kind: &str, data: Option<String>) -> Result<Change> {
    let data = data.ok_or_else(|| FireError::Decode(format!("{} record without data", kind)))?;
    serde_json::from_str(&data)
        .map_err(|e| FireError::Decode(format!("invalid {} payload: {}", kind, e)))
}

/// Control records carry an optional reason, usually a JSON string.
fn decode_reason(data: Option<String>) -> Option<String> {
    let raw = data?;
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Null) => None,
        Ok(Value::String(reason)) => Some(reason),
        Ok(other) => Some(other.to_string()),
        Err(_) => {
            let trimmed = raw.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
    }
}

/// Lazy sequence of events read from one streaming response.
///
/// Ends when the connection closes, after a `cancel` or `auth_revoked`
/// record, or after the first decode or network error. Not restartable:
/// reconnecting means opening a new response and a new `EventStream`.
pub struct EventStream {
    body: BoxStream<'static, Result<Bytes>>,
    decoder: FrameDecoder,
    done: bool,
}

impl EventStream {
    pub fn new(response: reqwest::Response) -> Self {
        Self::from_stream(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(FireError::from)),
        )
    }

    /// Build from any byte stream, such as a scripted test body.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        EventStream {
            body: stream.boxed(),
            decoder: FrameDecoder::new(),
            done: false,
        }
    }
}

impl Stream for EventStream {
    type Item = Result<StreamEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            if let Some(item) = this.decoder.next_event() {
                return Poll::Ready(Some(item));
            }
            if this.done || this.decoder.state() != DecodeState::Reading {
                return Poll::Ready(None);
            }
            match ready!(this.body.poll_next_unpin(cx)) {
                Some(Ok(chunk)) => this.decoder.push(&chunk),
                Some(Err(e)) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                None => {
                    this.done = true;
                    this.decoder.finish();
                }
            }
        }
    }
}
