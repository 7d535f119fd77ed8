//! Log output for the diagnostic binary and embedding applications.
//!
//! The library itself only emits `tracing` events; installing a subscriber
//! is left to whoever owns the process.

mod tracing_init;

pub use tracing_init::*;
