//! Lazy single-shot and shared suspendable computations (§4.1, §4.2).
//!
//! Rust's `Future` is already lazy — nothing runs until first polled — so
//! both types here are thin state machines layered over a boxed future:
//! they add single/multi consumption bookkeeping, broken-promise and
//! logic-error reporting, and (for [`SharedTask`]) a refcounted multi-waiter
//! completion signal, the way `ringbahn::Ring` layers a request/response
//! state machine over a raw io-uring submission.

pub(crate) mod detached;
mod shared_task;
mod task;

pub use shared_task::{SharedTask, Start};
pub use task::{Task, WhenReady};
