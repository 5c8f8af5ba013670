//! A fire-and-forget future that re-polls itself through a caller-supplied
//! `requeue` callback every time it is woken (§9, "symmetric continuation
//! transfer": "either tail-call the continuation from completion callbacks,
//! or trampoline through a run queue").
//!
//! Rust's `Future`/`Waker` split has no notion of "resume this coroutine on
//! thread X" the way the source's `coroutine_handle::resume()` does —
//! waking a task only ever asks *some* executor to re-poll it, and which
//! thread actually performs that poll is up to whichever executor owns the
//! task. [`StaticThreadPool`](crate::threadpool::StaticThreadPool),
//! [`IoService`](crate::reactor::IoService), and
//! [`AsyncScope`](crate::combinators::AsyncScope) all need the same shape
//! of "own the poll loop for a detached future" trampoline, so it lives
//! here once: a scheduler hands this a closure that, given the woken task,
//! decides where the next `poll_once` call happens — push onto a worker's
//! deque, push onto a ready queue, or just call it inline.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Wake, Waker};

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A detached task, type-erased so schedulers can hold `Arc<dyn Schedulable>`
/// without naming the `requeue` closure's concrete type.
pub(crate) trait Schedulable: Send + Sync + 'static {
    fn poll_once(self: Arc<Self>);
}

struct Detached {
    future: Mutex<Option<BoxFuture>>,
    requeue: Box<dyn Fn(Arc<dyn Schedulable>) + Send + Sync>,
}

impl Schedulable for Detached {
    fn poll_once(self: Arc<Self>) {
        let mut slot = self.future.lock().unwrap();
        let Some(mut future) = slot.take() else { return };
        let waker = Waker::from(self.clone());
        let mut cx = Context::from_waker(&waker);
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(()) => {}
            Poll::Pending => *slot = Some(future),
        }
    }
}

impl Wake for Detached {
    fn wake(self: Arc<Self>) {
        (self.requeue)(self.clone());
    }

    fn wake_by_ref(self: &Arc<Self>) {
        (self.requeue)(self.clone());
    }
}

/// Box `future`, wrap it as a [`Schedulable`] that requeues through
/// `requeue` on every wakeup, and drive it through its first poll
/// immediately (on the calling thread, matching the source's
/// `initial_suspend: suspend_never` — a spawned task always starts
/// eagerly, before `spawn` returns).
pub(crate) fn spawn<F>(future: F, requeue: impl Fn(Arc<dyn Schedulable>) + Send + Sync + 'static)
where
    F: Future<Output = ()> + Send + 'static,
{
    let task: Arc<Detached> = Arc::new(Detached {
        future: Mutex::new(Some(Box::pin(future))),
        requeue: Box::new(requeue),
    });
    task.poll_once();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn runs_synchronously_until_first_pending() {
        let reached = Arc::new(AtomicUsize::new(0));
        let r = reached.clone();
        spawn(
            async move {
                r.fetch_add(1, Ordering::SeqCst);
            },
            |_task| panic!("requeue should not be called for a task that never suspends"),
        );
        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn requeue_drives_it_to_completion() {
        use std::sync::atomic::AtomicBool;

        struct YieldOnce(bool);
        impl Future for YieldOnce {
            type Output = ();
            fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
                if self.0 {
                    Poll::Ready(())
                } else {
                    self.0 = true;
                    cx.waker().wake_by_ref();
                    Poll::Pending
                }
            }
        }

        let done = Arc::new(AtomicBool::new(false));
        let d = done.clone();
        spawn(
            async move {
                YieldOnce(false).await;
                d.store(true, Ordering::SeqCst);
            },
            |task| task.poll_once(),
        );
        assert!(done.load(Ordering::SeqCst));
    }
}
