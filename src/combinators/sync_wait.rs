use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use parking_lot::{Condvar, Mutex};

/// The "lightweight manual-reset event" the design calls out as the
/// blocking primitive behind `sync_wait` (§6): unlike
/// [`crate::sync::ManualResetEvent`], which suspends a *task*, this parks
/// the calling *OS thread* and clears itself after each wakeup, since
/// `sync_wait` drives one future through a poll/block loop rather than
/// resuming a single continuation once.
struct BlockingEvent {
    signalled: Mutex<bool>,
    condvar: Condvar,
}

impl BlockingEvent {
    fn new() -> BlockingEvent {
        BlockingEvent { signalled: Mutex::new(false), condvar: Condvar::new() }
    }

    fn park(&self) {
        let mut signalled = self.signalled.lock();
        while !*signalled {
            self.condvar.wait(&mut signalled);
        }
        *signalled = false;
    }

    fn unpark(&self) {
        *self.signalled.lock() = true;
        self.condvar.notify_one();
    }
}

fn waker_for(event: Arc<BlockingEvent>) -> Waker {
    fn clone(ptr: *const ()) -> RawWaker {
        let arc = unsafe { Arc::from_raw(ptr as *const BlockingEvent) };
        let cloned = arc.clone();
        std::mem::forget(arc);
        RawWaker::new(Arc::into_raw(cloned) as *const (), &VTABLE)
    }
    fn wake(ptr: *const ()) {
        let arc = unsafe { Arc::from_raw(ptr as *const BlockingEvent) };
        arc.unpark();
    }
    fn wake_by_ref(ptr: *const ()) {
        let arc = unsafe { Arc::from_raw(ptr as *const BlockingEvent) };
        arc.unpark();
        std::mem::forget(arc);
    }
    fn drop_raw(ptr: *const ()) {
        unsafe { drop(Arc::from_raw(ptr as *const BlockingEvent)) };
    }
    static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, wake, wake_by_ref, drop_raw);

    let raw = RawWaker::new(Arc::into_raw(event) as *const (), &VTABLE);
    unsafe { Waker::from_raw(raw) }
}

/// Run `future` to completion on the calling thread, blocking it between
/// polls, and return its value (§4.10). Used by tests and `main`, where no
/// executor is already driving the current thread.
pub fn sync_wait<F: Future>(future: F) -> F::Output {
    let mut future = Box::pin(future);
    let event = Arc::new(BlockingEvent::new());
    let waker = waker_for(event.clone());
    let mut ctx = Context::from_waker(&waker);

    loop {
        match Pin::as_mut(&mut future).poll(&mut ctx) {
            Poll::Ready(value) => return value,
            Poll::Pending => event.park(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn runs_a_ready_future_without_blocking() {
        assert_eq!(sync_wait(async { 42 }), 42);
    }

    #[test]
    fn blocks_until_woken_from_another_thread() {
        let polls = Arc::new(AtomicUsize::new(0));
        let counted = polls.clone();

        struct WakeAfterOnePoll {
            polls: Arc<AtomicUsize>,
            woken: bool,
        }

        impl Future for WakeAfterOnePoll {
            type Output = &'static str;

            fn poll(mut self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<&'static str> {
                self.polls.fetch_add(1, Ordering::SeqCst);
                if self.woken {
                    return Poll::Ready("done");
                }
                self.woken = true;
                let waker = ctx.waker().clone();
                std::thread::spawn(move || {
                    std::thread::sleep(std::time::Duration::from_millis(10));
                    waker.wake();
                });
                Poll::Pending
            }
        }

        let result = sync_wait(WakeAfterOnePoll { polls: counted, woken: false });
        assert_eq!(result, "done");
        assert_eq!(polls.load(Ordering::SeqCst), 2);
    }
}
