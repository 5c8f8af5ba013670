//! Swaps `std::sync` atomics for `loom`'s model-checked equivalents when
//! built with `--cfg loom` (the `loom` feature's dev-only model-checking
//! configuration; see `Cargo.toml`).
//!
//! Only the primitives actually exercised under `loom` import through
//! here — this is not a crate-wide loom port, just the shim the
//! lock-free manual-reset-event waiter stack needs to be model-checked.

#[cfg(loom)]
pub(crate) use loom::sync::atomic::{AtomicUsize, Ordering};
#[cfg(loom)]
pub(crate) use loom::thread;

#[cfg(not(loom))]
pub(crate) use std::sync::atomic::{AtomicUsize, Ordering};
#[cfg(not(loom))]
pub(crate) use std::thread;
