//! The only component that touches persistent storage.
//!
//! `MessageStore` traps its own storage errors: every method logs and
//! degrades to an empty/no-op result rather than propagating a `Result` to
//! its caller, matching the specification's "the loop never aborts because
//! of a transient DB failure" contract. `LatencyStats` is unrelated to
//! storage but shares this crate because both are per-service,
//! process-lifetime accumulators owned alongside the same pool.

pub mod latency;
pub mod postgres;
pub mod repository;

pub use latency::LatencyStats;
pub use repository::{MessageStore, StoreError};
