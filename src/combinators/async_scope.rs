//! Structured-concurrency join point (`cppcoro::async_scope`, supplemented
//! from `examples/original_source/include/cppcoro/async_scope.hpp`; dropped
//! by the distilled spec but present in the original).
//!
//! The source represents "no work outstanding" with a sentinel count that
//! starts at 1 (so `join()`'s own decrement can't race a concurrent
//! `spawn()` down to zero before the scope itself has asked to join) and
//! resumes a single stored continuation once the count reaches zero. That
//! shape is exactly a latch counting down to zero, so this is built
//! directly on [`ManualResetEvent`] rather than reimplementing the
//! sentinel-counter/raw-continuation pair by hand.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::sync::manual_reset_event::{ManualResetEvent, Wait};
use crate::task::detached;

struct Inner {
    count: AtomicUsize,
    event: ManualResetEvent,
    joined: AtomicBool,
}

/// Spawns detached futures and lets a caller wait for all of them to
/// finish. Every future given to [`spawn`](AsyncScope::spawn) is driven
/// eagerly on the calling thread until its first suspension point, then
/// resumes wherever whatever it awaited decides to wake it — the same
/// trampoline [`StaticThreadPool`](crate::threadpool::StaticThreadPool) and
/// [`IoService`](crate::reactor::IoService) use for their own `schedule()`.
pub struct AsyncScope {
    inner: Arc<Inner>,
}

impl Default for AsyncScope {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncScope {
    pub fn new() -> AsyncScope {
        AsyncScope {
            inner: Arc::new(Inner {
                count: AtomicUsize::new(1),
                event: ManualResetEvent::new(false),
                joined: AtomicBool::new(false),
            }),
        }
    }

    /// Spawn `future` onto the scope. It runs to completion independently
    /// of the caller; [`join`](AsyncScope::join) waits for it (and every
    /// other spawned future) to finish.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.count.fetch_add(1, Ordering::Relaxed);
        let inner = self.inner.clone();
        let wrapped = async move {
            future.await;
            if inner.count.fetch_sub(1, Ordering::AcqRel) == 1 {
                inner.event.set();
            }
        };
        detached::spawn(wrapped, |task| task.poll_once());
    }

    /// An awaitable that completes once every future spawned on this scope
    /// has finished. May only be called once per scope.
    pub fn join(&self) -> Wait<'_> {
        let was_joined = self.inner.joined.swap(true, Ordering::AcqRel);
        debug_assert!(!was_joined, "AsyncScope::join called more than once");
        if self.inner.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.event.set();
        }
        self.inner.event.wait()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[test]
    fn join_with_no_spawns_completes_immediately() {
        let scope = AsyncScope::new();
        futures::executor::block_on(scope.join());
    }

    #[test]
    fn join_waits_for_every_spawned_future() {
        let scope = AsyncScope::new();
        let done = Arc::new(AtomicU32::new(0));

        for _ in 0..8 {
            let d = done.clone();
            scope.spawn(async move {
                std::thread::sleep(Duration::from_millis(10));
                d.fetch_add(1, Ordering::SeqCst);
            });
        }

        futures::executor::block_on(scope.join());
        assert_eq!(done.load(Ordering::SeqCst), 8);
    }
}
