//! In-process pub/sub that mirrors the execution engine's state transitions
//! to subscribers without blocking it (spec component C4).

mod event;
mod hub;
mod subscriber;

pub use event::{StreamEvent, OUTPUT_PREVIEW_MAX_BYTES};
pub use hub::StreamHub;
pub use subscriber::{Subscription, DEFAULT_BUFFER_SIZE};
