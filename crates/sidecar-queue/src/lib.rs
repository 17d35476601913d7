//! Ordered parallel queue.
//!
//! A bounded pool of workers applies an async transform to submitted items
//! concurrently, and a sequencing task re-serializes the results so the
//! consumer sees them in exactly the order they were submitted, whatever
//! order they completed in.
//!
//! ```text
//! producer ──add──▶ [input] ──▶ worker × N ──▶ [results] ──▶ sequencer ──▶ [output] ──next──▶ consumer
//! ```
//!
//! All bulk sidecar operations (status, push, pull) run through this queue
//! so that hashing and network latency overlap while the printed report
//! stays deterministic.

pub mod queue;

pub use queue::{OrderedQueue, QueueClosed, QueueReceiver, QueueSender};
