//! Wire-level pieces of the REST API: constants and the event-stream framing.

pub mod constants;
pub mod event_stream;

pub use constants::*;
pub use event_stream::{EventStream, FrameDecoder};
