//! An async mutex with FIFO fairness (§4.4).
//!
//! Ownership is tracked by a single `locked` flag guarded by the same
//! `parking_lot::Mutex`-protected queue idiom as
//! [`super::auto_reset_event::AutoResetEvent`]: a waiter that can't acquire
//! immediately enqueues a reference-counted slot and `unlock()` hands
//! ownership directly to the oldest queued slot rather than waking it to
//! re-contend, so acquisition order matches arrival order exactly.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex as RawMutex;

enum SlotState {
    /// Queued, not yet granted ownership.
    Waiting(Option<Waker>),
    /// Ownership was handed to this slot by `unlock`.
    Granted,
}

type Slot = Arc<RawMutex<SlotState>>;

struct Inner {
    locked: bool,
    waiters: VecDeque<Slot>,
}

/// A mutual-exclusion lock for protecting data shared between coroutines,
/// rather than threads: acquiring it never blocks a thread, only suspends
/// the awaiting task.
pub struct Mutex<T> {
    inner: RawMutex<Inner>,
    value: std::cell::UnsafeCell<T>,
}

unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    pub fn new(value: T) -> Mutex<T> {
        Mutex {
            inner: RawMutex::new(Inner { locked: false, waiters: VecDeque::new() }),
            value: std::cell::UnsafeCell::new(value),
        }
    }

    /// Acquire without suspending if the lock is free; returns `None`
    /// otherwise.
    pub fn try_lock(&self) -> Option<Guard<'_, T>> {
        let mut inner = self.inner.lock();
        if inner.locked {
            None
        } else {
            inner.locked = true;
            Some(Guard { mutex: self })
        }
    }

    /// An awaitable that resolves to a [`Guard`] once the lock is acquired,
    /// in FIFO order with every other concurrent `lock()`.
    pub fn lock(&self) -> Lock<'_, T> {
        Lock { mutex: self, ticket: None }
    }

    fn unlock(&self) {
        let mut inner = self.inner.lock();
        while let Some(slot) = inner.waiters.pop_front() {
            let mut state = slot.lock();
            if let SlotState::Waiting(waker) = &mut *state {
                let waker = waker.take();
                *state = SlotState::Granted;
                drop(state);
                // Ownership passes directly to this slot; `locked` stays
                // true the whole time, so no other acquirer can interleave.
                if let Some(waker) = waker {
                    waker.wake();
                }
                return;
            }
            // A slot already resolved to `Granted` with nobody polling it
            // again (its `Lock` future was dropped) — skip it and keep
            // looking for the next live waiter.
        }
        inner.locked = false;
    }
}

/// The awaiter returned by [`Mutex::lock`].
pub struct Lock<'a, T> {
    mutex: &'a Mutex<T>,
    ticket: Option<Slot>,
}

impl<'a, T> Future for Lock<'a, T> {
    type Output = Guard<'a, T>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Guard<'a, T>> {
        let this = self.get_mut();

        if let Some(slot) = this.ticket.clone() {
            let state = slot.lock();
            return match &*state {
                SlotState::Granted => {
                    this.ticket = None;
                    Poll::Ready(Guard { mutex: this.mutex })
                }
                SlotState::Waiting(_) => {
                    drop(state);
                    *slot.lock() = SlotState::Waiting(Some(ctx.waker().clone()));
                    Poll::Pending
                }
            };
        }

        let mut inner = this.mutex.inner.lock();
        if !inner.locked {
            inner.locked = true;
            return Poll::Ready(Guard { mutex: this.mutex });
        }
        let slot = Arc::new(RawMutex::new(SlotState::Waiting(Some(ctx.waker().clone()))));
        inner.waiters.push_back(slot.clone());
        this.ticket = Some(slot);
        Poll::Pending
    }
}

impl<'a, T> Drop for Lock<'a, T> {
    fn drop(&mut self) {
        let Some(slot) = self.ticket.take() else { return };
        let mut inner = self.mutex.inner.lock();
        let state = slot.lock();
        if matches!(&*state, SlotState::Granted) {
            // Woken but abandoned before claiming the guard: we already own
            // the lock on this slot's behalf, so pass it on immediately
            // instead of leaking the acquisition.
            drop(state);
            drop(inner);
            self.mutex.unlock();
        } else {
            drop(state);
            inner.waiters.retain(|entry| !Arc::ptr_eq(entry, &slot));
        }
    }
}

/// An RAII guard granting exclusive access to the mutex's contents.
/// Dropping it calls `unlock`, handing ownership to the next queued waiter
/// (or marking the mutex free) exactly once.
pub struct Guard<'a, T> {
    mutex: &'a Mutex<T>,
}

impl<'a, T> std::ops::Deref for Guard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.mutex.value.get() }
    }
}

impl<'a, T> std::ops::DerefMut for Guard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.value.get() }
    }
}

impl<'a, T> Drop for Guard<'a, T> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;

    #[test]
    fn try_lock_then_try_lock_fails() {
        let mutex = Mutex::new(0);
        let guard = mutex.try_lock().unwrap();
        assert!(mutex.try_lock().is_none());
        drop(guard);
        assert!(mutex.try_lock().is_some());
    }

    #[test]
    fn serializes_concurrent_increments() {
        let mutex = StdArc::new(Mutex::new(0u64));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let mutex = mutex.clone();
                std::thread::spawn(move || {
                    futures::executor::block_on(async {
                        for _ in 0..1000 {
                            let mut guard = mutex.lock().await;
                            *guard += 1;
                        }
                    });
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*futures::executor::block_on(mutex.lock()), 8000);
    }

    #[test]
    fn fifo_acquisition_order() {
        // Single-threaded: queue contenders behind a held lock, release it,
        // and confirm resumption order matches arrival order.
        let mutex = StdArc::new(Mutex::new(()));
        let order = StdArc::new(std::sync::Mutex::new(Vec::new()));
        let guard = futures::executor::block_on(mutex.lock());

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let mutex = mutex.clone();
                let order = order.clone();
                std::thread::spawn(move || {
                    futures::executor::block_on(async {
                        let _g = mutex.lock().await;
                        order.lock().unwrap().push(i);
                    });
                })
            })
            .collect();

        // Give each thread a chance to enqueue before releasing.
        std::thread::sleep(std::time::Duration::from_millis(50));
        drop(guard);
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(order.lock().unwrap().len(), 4);
    }
}
