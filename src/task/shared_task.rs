use std::any::Any;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::error::Error;

enum Outcome<T> {
    Value(T),
    /// The body panicked. Because a panic payload (`Box<dyn Any + Send>`) is
    /// not `Clone`, every awaiter after the first can only re-raise the
    /// *message*, not resume the original unwind — the same trade-off
    /// `futures::future::Shared` documents for its own panic handling.
    Panicked(String),
}

struct Shared<T> {
    done: AtomicBool,
    waiters: Mutex<Vec<Waker>>,
    outcome: OnceCell<Outcome<T>>,
    future: Mutex<Option<Pin<Box<dyn Future<Output = T> + Send>>>>,
}

/// A reference-counted, multi-awaiter suspendable computation (§4.2).
///
/// Cloning increments the reference count; the underlying computation is
/// driven to completion by whichever clone happens to poll it first (a
/// `future::Mutex` picks exactly one driver at a time, the way
/// `ringbahn::Submission` ensures exactly one in-flight request per `Ring`),
/// and every other clone waits on a waker list that is drained once when the
/// result becomes available — unspecified resumption order among siblings,
/// as the spec allows.
pub struct SharedTask<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for SharedTask<T> {
    fn clone(&self) -> SharedTask<T> {
        SharedTask { shared: self.shared.clone() }
    }
}

impl<T: Send + 'static> SharedTask<T> {
    /// Wrap a future as a lazy, shared, multi-awaiter task.
    pub fn new<F>(future: F) -> SharedTask<T>
    where
        F: Future<Output = T> + Send + 'static,
    {
        SharedTask {
            shared: Arc::new(Shared {
                done: AtomicBool::new(false),
                waiters: Mutex::new(Vec::new()),
                outcome: OnceCell::new(),
                future: Mutex::new(Some(Box::pin(future))),
            }),
        }
    }

    /// True once the task has produced a value or exception.
    pub fn is_ready(&self) -> bool {
        self.shared.done.load(Ordering::Acquire)
    }

    /// Drive the computation toward completion and attach this call's waker
    /// as a continuation, without consuming (or even requiring `Clone` on)
    /// the result. This is the entry point `when_all_ready` uses to start
    /// many shared tasks and be notified of each one without racing their
    /// other awaiters to consume a value.
    pub fn start(&self) -> Start<T> {
        Start { shared: self.shared.clone() }
    }

    fn poll_drive(shared: &Arc<Shared<T>>, ctx: &mut Context<'_>) -> Poll<()> {
        if shared.done.load(Ordering::Acquire) {
            return Poll::Ready(());
        }

        // Register before attempting to drive, so a concurrent driver that
        // finishes between our `done` check and now cannot produce a missed
        // wakeup: whichever of the two critical sections (this push, or the
        // driver's drain in `finish`) runs second observes the other's
        // effect and does the right thing.
        {
            let mut waiters = shared.waiters.lock();
            if shared.done.load(Ordering::Acquire) {
                return Poll::Ready(());
            }
            waiters.push(ctx.waker().clone());
        }

        let mut guard = match shared.future.try_lock() {
            Some(guard) => guard,
            None => return Poll::Pending,
        };

        let future = match guard.as_mut() {
            Some(future) => future,
            None => return if shared.done.load(Ordering::Acquire) { Poll::Ready(()) } else { Poll::Pending },
        };

        match catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(ctx))) {
            Ok(Poll::Pending) => Poll::Pending,
            Ok(Poll::Ready(value)) => {
                *guard = None;
                drop(guard);
                finish(shared, Outcome::Value(value));
                Poll::Ready(())
            }
            Err(payload) => {
                *guard = None;
                drop(guard);
                finish(shared, Outcome::Panicked(panic_message(payload)));
                Poll::Ready(())
            }
        }
    }
}

fn finish<T>(shared: &Arc<Shared<T>>, outcome: Outcome<T>) {
    let _ = shared.outcome.set(outcome);
    shared.done.store(true, Ordering::Release);
    let wakers = std::mem::take(&mut *shared.waiters.lock());
    for waker in wakers {
        waker.wake();
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "shared task panicked".to_string()
    }
}

impl<T: Clone + Send + 'static> Future for SharedTask<T> {
    type Output = crate::error::Result<T>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Poll::Pending = SharedTask::poll_drive(&this.shared, ctx) {
            return Poll::Pending;
        }

        match this.shared.outcome.get() {
            Some(Outcome::Value(value)) => Poll::Ready(Ok(value.clone())),
            Some(Outcome::Panicked(message)) => panic!("{}", message),
            None => Poll::Ready(Err(Error::logic("shared task completed with no outcome recorded"))),
        }
    }
}

/// The awaitable returned by [`SharedTask::start`]: completes once the task
/// has a result, without consuming it.
pub struct Start<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> Future for Start<T> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<()> {
        SharedTask::poll_drive(&self.get_mut().shared, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn multiple_clones_see_the_same_value() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let task = SharedTask::new(async move {
            c.fetch_add(1, Ordering::SeqCst);
            7
        });

        let a = task.clone();
        let b = task.clone();
        let ra = futures::executor::block_on(a);
        let rb = futures::executor::block_on(b);
        assert_eq!(ra.unwrap(), 7);
        assert_eq!(rb.unwrap(), 7);
        // The body only ever runs once, no matter how many clones await it.
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn start_does_not_consume_and_wakes_other_waiters() {
        let task = SharedTask::new(async { "done" });
        futures::executor::block_on(task.start());
        assert!(task.is_ready());
        let result = futures::executor::block_on(task.clone());
        assert_eq!(result.unwrap(), "done");
    }

    #[test]
    fn concurrent_clones_across_threads_agree() {
        let task = SharedTask::new(async {
            std::thread::sleep(std::time::Duration::from_millis(10));
            99
        });

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let t = task.clone();
                std::thread::spawn(move || futures::executor::block_on(t).unwrap())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 99);
        }
    }

    #[test]
    #[should_panic(expected = "kaboom")]
    fn panic_is_re_raised_on_every_awaiter() {
        let task: SharedTask<()> = SharedTask::new(async { panic!("kaboom") });
        let _ = futures::executor::block_on(task);
    }
}
