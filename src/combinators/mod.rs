//! Structured composition combinators built on ordinary `Future`s (§4.10),
//! plus `async_scope` (cppcoro's structured-concurrency supplement: spawn
//! detached work, join waits for all of it).

mod async_scope;
mod fmap;
mod scheduler;
mod scope_exit;
mod sync_wait;
mod when_all;
mod when_all_ready;

pub use async_scope::AsyncScope;
pub use fmap::{fmap, Map};
pub use scheduler::{resume_on, schedule_on, Scheduler};
pub use scope_exit::{scope_exit, ScopeExit};
pub use sync_wait::sync_wait;
pub use when_all::when_all;
pub use when_all_ready::when_all_ready;
