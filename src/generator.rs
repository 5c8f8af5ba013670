//! Lazy synchronous sequence production, driven by external iteration (§4.11).
//!
//! Rust has no stable stackful coroutines, so the suspension a `co_yield` in
//! the original gets here from running the generator body as an ordinary
//! `Future` and polling it with a no-op waker: a `yield_value().await`
//! deposits its value and returns `Pending` exactly once, which this module
//! treats as "the next value is ready" rather than genuine suspension. A
//! well-behaved generator body never awaits anything else — if it did, this
//! type would busy-poll waiting for a wakeup that never comes, which is the
//! honest cost of emulating suspension without real coroutines or a thread
//! per generator.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

/// The handle a generator body uses to produce values.
pub struct Yielder<T> {
    slot: Rc<RefCell<Option<T>>>,
}

impl<T> Yielder<T> {
    /// Suspend the generator body, making `value` available to the next
    /// `Generator::next` call.
    pub fn yield_value(&self, value: T) -> YieldValue<T> {
        YieldValue { slot: self.slot.clone(), value: Some(value) }
    }
}

/// The awaitable returned by [`Yielder::yield_value`].
pub struct YieldValue<T> {
    slot: Rc<RefCell<Option<T>>>,
    value: Option<T>,
}

impl<T> Future for YieldValue<T> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _ctx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        match this.value.take() {
            Some(value) => {
                *this.slot.borrow_mut() = Some(value);
                Poll::Pending
            }
            None => Poll::Ready(()),
        }
    }
}

/// A lazy, externally-iterated sequence: the body does not run at all until
/// the first call to [`next`](Generator::next), and each call resumes it
/// until the next yield or until the body returns.
pub struct Generator<T> {
    slot: Rc<RefCell<Option<T>>>,
    body: Pin<Box<dyn Future<Output = ()>>>,
    done: bool,
}

impl<T: 'static> Generator<T> {
    /// Build a generator from a body that receives a [`Yielder`] and
    /// produces values by calling `yielder.yield_value(v).await` any number
    /// of times before returning.
    pub fn new<F, Fut>(body: F) -> Generator<T>
    where
        F: FnOnce(Yielder<T>) -> Fut,
        Fut: Future<Output = ()> + 'static,
    {
        let slot = Rc::new(RefCell::new(None));
        let yielder = Yielder { slot: slot.clone() };
        Generator { slot, body: Box::pin(body(yielder)), done: false }
    }

    /// Resume the body until its next yielded value, or `None` once it has
    /// returned. Idempotent after the body has finished.
    pub fn next(&mut self) -> Option<T> {
        if self.done {
            return None;
        }

        let waker = noop_waker();
        let mut ctx = Context::from_waker(&waker);
        loop {
            match self.body.as_mut().poll(&mut ctx) {
                Poll::Ready(()) => {
                    self.done = true;
                    return None;
                }
                Poll::Pending => {
                    if let Some(value) = self.slot.borrow_mut().take() {
                        return Some(value);
                    }
                    // The body suspended on something other than a yield; a synchronous
                    // generator's contract forbids this, so keep spinning rather than
                    // silently dropping a value that never arrives.
                }
            }
        }
    }
}

impl<T: 'static> Iterator for Generator<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        Generator::next(self)
    }
}

fn noop_waker() -> Waker {
    fn clone(_: *const ()) -> RawWaker {
        raw_waker()
    }
    fn no_op(_: *const ()) {}
    fn raw_waker() -> RawWaker {
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
        RawWaker::new(std::ptr::null(), &VTABLE)
    }
    unsafe { Waker::from_raw(raw_waker()) }
}
