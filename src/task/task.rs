use std::future::Future;
use std::mem;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::Error;

enum Inner<T> {
    Pending(Pin<Box<dyn Future<Output = T> + Send>>),
    Ready(std::thread::Result<T>),
    Consumed,
}

/// A lazy, single-shot, exclusively-owned suspendable computation.
///
/// The wrapped future does not run until `Task` is first polled (the same
/// laziness every `Future` already has); dropping a `Task` that was never
/// polled simply drops the unstarted future without running any of it,
/// satisfying the "destroying an unstarted task destroys the contained
/// computation" contract for free.
pub struct Task<T> {
    inner: Inner<T>,
}

impl<T> Task<T> {
    /// Wrap a future as a lazy task.
    pub fn new<F>(future: F) -> Task<T>
    where
        F: Future<Output = T> + Send + 'static,
    {
        Task { inner: Inner::Pending(Box::pin(future)) }
    }

    /// An awaitable that completes once the task has produced a result, but
    /// does not consume it — the task can still be awaited afterwards to
    /// retrieve the value. Used by combinators like `when_all_ready` that
    /// need to know a task is done without racing its single consumer.
    pub fn when_ready(&mut self) -> WhenReady<'_, T> {
        WhenReady { task: self }
    }

    /// True once the task has a value or exception ready to be consumed.
    pub fn is_ready(&self) -> bool {
        !matches!(self.inner, Inner::Pending(_))
    }

    fn poll_to_ready(&mut self, ctx: &mut Context<'_>) -> Poll<()> {
        match &mut self.inner {
            Inner::Pending(future) => match catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(ctx))) {
                Ok(Poll::Ready(value)) => {
                    self.inner = Inner::Ready(Ok(value));
                    Poll::Ready(())
                }
                Ok(Poll::Pending) => Poll::Pending,
                Err(payload) => {
                    self.inner = Inner::Ready(Err(payload));
                    Poll::Ready(())
                }
            },
            Inner::Ready(_) | Inner::Consumed => Poll::Ready(()),
        }
    }
}

impl<T> Future for Task<T> {
    type Output = crate::error::Result<T>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        // Task is Unpin: the only self-referential state lives inside the
        // already-pinned `Box` in `Inner::Pending`, not in `Task` itself.
        let this = self.get_mut();

        if let Poll::Pending = this.poll_to_ready(ctx) {
            return Poll::Pending;
        }

        match mem::replace(&mut this.inner, Inner::Consumed) {
            Inner::Ready(Ok(value)) => Poll::Ready(Ok(value)),
            Inner::Ready(Err(payload)) => resume_unwind(payload),
            Inner::Consumed => Poll::Ready(Err(Error::logic("task already consumed"))),
            Inner::Pending(_) => unreachable!("poll_to_ready guarantees a non-Pending state"),
        }
    }
}

/// The awaitable returned by [`Task::when_ready`].
pub struct WhenReady<'a, T> {
    task: &'a mut Task<T>,
}

impl<'a, T> Future for WhenReady<'a, T> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<()> {
        self.get_mut().task.poll_to_ready(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_iff_awaited() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let task = Task::new(async move {
            flag.store(true, Ordering::SeqCst);
        });
        drop(task);
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn delivers_value_on_first_await() {
        let task = Task::new(async { 42 });
        let result = futures::executor::block_on(task);
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn when_ready_does_not_consume() {
        let mut task = Task::new(async { "hello" });
        futures::executor::block_on(task.when_ready());
        assert!(task.is_ready());
        let result = futures::executor::block_on(task);
        assert_eq!(result.unwrap(), "hello");
    }

    #[test]
    fn awaiting_a_consumed_task_is_a_logic_error() {
        let mut task = Task::new(async { () });
        futures::executor::block_on(Pin::new(&mut task));
        let result = futures::executor::block_on(Pin::new(&mut task));
        assert!(matches!(result, Err(Error::Logic(_))));
    }

    #[test]
    #[should_panic(expected = "kaboom")]
    fn panics_propagate_through_await() {
        let task: Task<()> = Task::new(async { panic!("kaboom") });
        let _ = futures::executor::block_on(task);
    }
}
