//! eno-status
//!
//! Coalesces per-resource status updates into per-slice JSON-Patch
//! batches. Enqueues are cheap and concurrent; each slice is drained by
//! at most one worker at a time, writes are guarded by `test` ops against
//! interference from other field managers, and failures retry under a
//! rate limiter.

pub mod buffer;

pub use crate::buffer::{PatchFn, WriteBuffer, MAX_UPDATES_PER_PATCH};
