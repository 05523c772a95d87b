//! Durable outbound message queue (spec §4.8): enqueue, retry with
//! exponential-jittered backoff, dead-lettering, and operator inspection.

pub mod dispatch;
pub mod error;
pub mod store;

pub use dispatch::{PeerSender, Queue};
pub use error::QueueError;
pub use store::QueueStore;
