//! Coroutine-aware synchronization primitives (§4.3–§4.5).
//!
//! These mirror a thread's wait primitives but suspend the calling task
//! instead of blocking a thread, so thousands of them can be outstanding on
//! a handful of worker threads.

mod auto_reset_event;
mod latch;
mod manual_reset_event;
mod mutex;
mod single_consumer_auto_reset_event;

pub use auto_reset_event::AutoResetEvent;
pub use latch::Latch;
pub use manual_reset_event::ManualResetEvent;
pub use mutex::{Guard as MutexGuard, Lock as MutexLock, Mutex};
pub use single_consumer_auto_reset_event::SingleConsumerEvent;
