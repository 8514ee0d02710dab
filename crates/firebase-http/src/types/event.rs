//! Events decoded from a watch stream.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload of a `put` or `patch` record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Change {
    /// Location of the change, relative to the watched location.
    pub path: String,
    pub data: Value,
}

/// One decoded record of the event stream.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    Put(Change),
    Patch(Change),
    KeepAlive,
    /// Server-side cancellation, with the reason text when one was sent.
    Cancel(Option<String>),
    AuthRevoked(Option<String>),
}

impl StreamEvent {
    /// Whether the stream ends after this record.
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Cancel(_) | StreamEvent::AuthRevoked(_))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Put,
    Patch,
}

/// A data change forwarded to a watcher.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub path: String,
    pub data: Value,
    /// Full value of the watched location after this change, when the watch
    /// was started with mirroring enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Value>,
}

impl Event {
    #[must_use]
    pub fn put(change: Change) -> Self {
        Event {
            kind: EventKind::Put,
            path: change.path,
            data: change.data,
            snapshot: None,
        }
    }

    #[must_use]
    pub fn patch(change: Change) -> Self {
        Event {
            kind: EventKind::Patch,
            path: change.path,
            data: change.data,
            snapshot: None,
        }
    }

    /// Deserialize the event payload into `T`.
    pub fn data_as<T: serde::de::DeserializeOwned>(&self) -> crate::Result<T> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}
