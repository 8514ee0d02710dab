//! Async client for the Firebase Realtime Database REST API.
//!
//! A [`Firebase`] handle points at one location in the database tree. Reads
//! and writes map to a single HTTP request each; [`Firebase::watch`] opens a
//! long-lived event stream and forwards decoded changes to a channel.

pub mod client;
pub mod error;
pub mod protocol;
pub mod types;

pub use client::{
    ClientConfig, Firebase, HeaderTimeout, LockingTransport, QueryParams, TimeoutBudget,
    TimeoutCoordinator, WatchOptions, WatchPhase, WatchSender,
};
pub use error::{FireError, Result};
pub use protocol::{EventStream, FrameDecoder};
pub use types::{Change, Event, EventKind, Mirror, StreamEvent};
