//! Cancellation source/token/registration (§4.6).
//!
//! A [`CancellationSource`] owns a ref-counted [`State`]; any number of
//! [`CancellationToken`]s and [`CancellationRegistration`]s may share that
//! state. The state carries one atomic flag and a spinlock-guarded table of
//! registered callbacks — the same shape as the reactor's own completion
//! tracking (`reactor::completion::Completion`): readers take the fast
//! (lock-free) path through the flag, writers contend only on the table.
//!
//! This is distinct from `reactor::event::Cancellation`, which is a
//! type-erased drop callback used internally to release kernel-owned
//! buffers when an I/O operation is cancelled, not a user-facing
//! token/source pair.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Error;

/// A boxed callback invoked at most once, when cancellation is requested.
type Callback = Box<dyn FnMut() + Send>;

struct Slot {
    callback: Option<Callback>,
}

struct State {
    cancel_requested: AtomicBool,
    // Thread currently running callbacks out of `request_cancellation`, if
    // any. Used to detect the re-entrant case: a registration destroying
    // itself from inside its own callback must not wait on itself.
    firing_thread: AtomicUsize,
    table: Mutex<Vec<Slot>>,
}

const NO_THREAD: usize = 0;

fn current_thread_tag() -> usize {
    // A stable, non-zero, per-thread identifier, cheap enough to read on
    // every registration and every cancellation check.
    thread_local!(static TAG: u8 = 0);
    TAG.with(|t| t as *const u8 as usize)
}

/// The source half of a cancellation pair: the only side that can request
/// cancellation. The underlying state lives as long as any source, token,
/// or registration still references it.
pub struct CancellationSource {
    state: Arc<State>,
}

impl fmt::Debug for CancellationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationSource")
            .field("cancel_requested", &self.is_cancellation_requested())
            .finish()
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationSource {
    pub fn new() -> CancellationSource {
        CancellationSource {
            state: Arc::new(State {
                cancel_requested: AtomicBool::new(false),
                firing_thread: AtomicUsize::new(NO_THREAD),
                table: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn token(&self) -> CancellationToken {
        CancellationToken { state: Some(self.state.clone()) }
    }

    pub fn is_cancellation_requested(&self) -> bool {
        self.state.cancel_requested.load(Ordering::Acquire)
    }

    /// Set the cancellation flag and synchronously invoke every callback
    /// registered at the moment the flag flips. Idempotent: a call after
    /// the flag is already set is a no-op and does not re-run callbacks.
    pub fn request_cancellation(&self) {
        if self.state.cancel_requested.swap(true, Ordering::AcqRel) {
            return;
        }

        tracing::trace!(target: "cancellation_source::request_cancellation", "flag set, firing callbacks");

        self.state.firing_thread.store(current_thread_tag(), Ordering::Release);
        let mut fired = 0usize;
        {
            // Snapshot under the lock, then run callbacks outside of it: a
            // callback that drops its own registration (see
            // `CancellationRegistration::drop`) must be able to observe
            // `firing_thread` without contending on this same table lock.
            let callbacks: Vec<Callback> = {
                let mut table = self.state.table.lock();
                table.iter_mut().filter_map(|slot| slot.callback.take()).collect()
            };
            for mut callback in callbacks {
                fired += 1;
                let _ = panic::catch_unwind(AssertUnwindSafe(|| callback()));
            }
            self.state.table.lock().clear();
        }
        self.state.firing_thread.store(NO_THREAD, Ordering::Release);
        tracing::trace!(target: "cancellation_source::request_cancellation", fired, "callbacks complete");
    }
}

/// A handle that can observe, but not trigger, cancellation. A
/// default-constructed token (`CancellationToken::none()`) has no
/// associated source and can never be cancelled; operations that receive
/// such a token skip all registration bookkeeping.
#[derive(Clone)]
pub struct CancellationToken {
    state: Option<Arc<State>>,
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("can_be_cancelled", &self.can_be_cancelled())
            .field("cancel_requested", &self.is_cancellation_requested())
            .finish()
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::none()
    }
}

impl CancellationToken {
    /// A token that can never be cancelled.
    pub fn none() -> CancellationToken {
        CancellationToken { state: None }
    }

    pub fn can_be_cancelled(&self) -> bool {
        self.state.is_some()
    }

    pub fn is_cancellation_requested(&self) -> bool {
        match &self.state {
            Some(state) => state.cancel_requested.load(Ordering::Acquire),
            None => false,
        }
    }

    pub fn throw_if_cancellation_requested(&self) -> Result<(), Error> {
        if self.is_cancellation_requested() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// RAII registration of a callback against a token's source. The callback
/// fires exactly once: either synchronously inside `new` (if cancellation
/// was already requested) or synchronously from inside
/// `request_cancellation`, on whichever thread calls it.
///
/// Dropping the registration removes it from the table; if cancellation is
/// concurrently running this callback on another thread, the destructor
/// blocks until that callback returns — unless it is being dropped from
/// inside its own callback (the re-entrant case), detected by comparing
/// thread identities, which must not deadlock.
pub struct CancellationRegistration {
    state: Option<Arc<State>>,
    index: usize,
}

impl CancellationRegistration {
    /// Register `callback` against `token`. If `token` can never be
    /// cancelled this is a cheap no-op (§4.6: "a token with no associated
    /// source ... operations receiving such a token omit all cancellation
    /// bookkeeping").
    pub fn new<F>(token: &CancellationToken, callback: F) -> CancellationRegistration
    where
        F: FnMut() + Send + 'static,
    {
        let state = match &token.state {
            Some(state) => state.clone(),
            None => return CancellationRegistration { state: None, index: 0 },
        };

        let mut callback = callback;
        if state.cancel_requested.load(Ordering::Acquire) {
            let _ = panic::catch_unwind(AssertUnwindSafe(|| callback()));
            return CancellationRegistration { state: None, index: 0 };
        }

        let mut table = state.table.lock();
        // Re-check under the lock: request_cancellation may have run between
        // our first load and taking the lock.
        if state.cancel_requested.load(Ordering::Acquire) {
            drop(table);
            let _ = panic::catch_unwind(AssertUnwindSafe(|| callback()));
            return CancellationRegistration { state: None, index: 0 };
        }

        let index = table.len();
        table.push(Slot { callback: Some(Box::new(callback)) });
        drop(table);

        CancellationRegistration { state: Some(state), index }
    }
}

impl Drop for CancellationRegistration {
    fn drop(&mut self) {
        let state = match self.state.take() {
            Some(state) => state,
            None => return, // never registered: no source, or fired inline
        };

        let mut waiter = Spin::default();
        loop {
            let firing = state.firing_thread.load(Ordering::Acquire);
            if firing == NO_THREAD || firing == current_thread_tag() {
                break;
            }
            waiter.wait();
        }

        let mut table = state.table.lock();
        if let Some(slot) = table.get_mut(self.index) {
            slot.callback = None; // no-op if request_cancellation already took it
        }
    }
}

unsafe impl Send for CancellationRegistration {}

#[derive(Default)]
struct Spin {
    iteration: u8,
}

impl Spin {
    fn wait(&mut self) {
        if self.iteration <= 3 {
            for _ in 0..(1u32 << self.iteration) {
                std::hint::spin_loop();
            }
            self.iteration += 1;
        } else {
            std::thread::yield_now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc as StdArc;

    #[test]
    fn none_token_never_cancels() {
        let token = CancellationToken::none();
        assert!(!token.can_be_cancelled());
        assert!(!token.is_cancellation_requested());
        assert!(token.throw_if_cancellation_requested().is_ok());
    }

    #[test]
    fn request_cancellation_runs_callback_once() {
        let source = CancellationSource::new();
        let token = source.token();
        let count = StdArc::new(AtomicU32::new(0));
        let c = count.clone();
        let reg = CancellationRegistration::new(&token, move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        source.request_cancellation();
        source.request_cancellation(); // idempotent
        assert_eq!(count.load(Ordering::SeqCst), 1);
        drop(reg);
    }

    #[test]
    fn registration_after_cancel_fires_inline() {
        let source = CancellationSource::new();
        let token = source.token();
        source.request_cancellation();
        let count = StdArc::new(AtomicU32::new(0));
        let c = count.clone();
        let _reg = CancellationRegistration::new(&token, move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reentrant_drop_does_not_deadlock() {
        let source = StdArc::new(CancellationSource::new());
        let token = source.token();
        struct Cell(std::cell::RefCell<Option<CancellationRegistration>>);
        unsafe impl Send for Cell {}
        let cell = StdArc::new(Cell(std::cell::RefCell::new(None)));
        let cell2 = cell.clone();
        let reg = CancellationRegistration::new(&token, move || {
            drop(cell2.0.borrow_mut().take());
        });
        *cell.0.borrow_mut() = Some(reg);
        source.request_cancellation();
    }

    #[test]
    fn multiple_registrations_all_fire() {
        let source = CancellationSource::new();
        let token = source.token();
        let count = StdArc::new(AtomicU32::new(0));
        let regs: Vec<_> = (0..8)
            .map(|_| {
                let c = count.clone();
                CancellationRegistration::new(&token, move || {
                    c.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();
        source.request_cancellation();
        assert_eq!(count.load(Ordering::SeqCst), 8);
        drop(regs);
    }
}
