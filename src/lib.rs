//! Composable suspension, cancellation, and IO primitives for single-threaded
//! and thread-pool-scheduled coroutines, built on Rust's native `Future`
//! rather than C++ coroutine handles: every suspension point in this crate
//! is an ordinary `Future` that some executor polls, and "symmetric
//! transfer" becomes "return `Poll::Ready` and let the waker re-poll".
//!
//! See `DESIGN.md` at the repository root for how each module here is
//! grounded in `ringbahn`, the io-uring runtime this crate grew out of.

#![cfg_attr(feature = "nightly", feature(read_initializer))]

mod loom;

pub mod drive;
pub mod event;

mod buf;
mod completion;
mod ring;
mod submission;

pub use drive::Drive;
pub use event::Event;
pub use ring::Ring;
pub use submission::Submission;

pub mod error;
pub use error::{Error, Result};

pub mod cancellation;
pub use cancellation::{CancellationRegistration, CancellationSource, CancellationToken};

pub mod sync;

pub mod fs;
pub mod net;

pub mod task;
pub use task::{SharedTask, Task};

pub mod generator;
pub use generator::Generator;

pub mod async_generator;
pub use async_generator::AsyncGenerator;

pub mod combinators;

pub mod sequencer;

pub mod threadpool;
pub use threadpool::StaticThreadPool;

pub mod reactor;
pub use reactor::{IoService, IoServiceBuilder};
