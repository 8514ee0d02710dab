pub mod event;
pub mod mirror;

pub use event::{Change, Event, EventKind, StreamEvent};
pub use mirror::Mirror;
