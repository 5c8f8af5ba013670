//! Lazy asynchronous sequence production, where `advance` itself suspends
//! (§4.11).
//!
//! Unlike [`crate::generator::Generator`], a body here is free to `.await`
//! real suspension points (timers, IO, other tasks) between yields: the
//! `yield_value().await` deposits a value and returns `Pending` exactly once,
//! which `advance` recognizes and resolves immediately without waiting for a
//! wakeup; any *other* `Pending` is genuine and is propagated to the caller's
//! executor the ordinary way, so a real waker correctly redrives it later.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

/// The handle an async generator body uses to produce values.
pub struct Yielder<T> {
    slot: Rc<RefCell<Option<T>>>,
}

impl<T> Yielder<T> {
    /// Suspend the generator body, making `value` available to the caller
    /// currently awaiting [`AsyncGenerator::advance`].
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

/// A lazy sequence whose body may suspend on real `Future`s between yields;
/// advancing it is itself an awaitable operation.
pub struct AsyncGenerator<T> {
    slot: Rc<RefCell<Option<T>>>,
    body: Pin<Box<dyn Future<Output = ()>>>,
    done: bool,
}

impl<T: 'static> AsyncGenerator<T> {
    /// Build an async generator from a body that receives a [`Yielder`] and
    /// produces values by calling `yielder.yield_value(v).await`, freely
    /// interleaved with awaits on other futures, before returning.
    pub fn new<F, Fut>(body: F) -> AsyncGenerator<T>
    where
        F: FnOnce(Yielder<T>) -> Fut,
        Fut: Future<Output = ()> + 'static,
    {
        let slot = Rc::new(RefCell::new(None));
        let yielder = Yielder { slot: slot.clone() };
        AsyncGenerator { slot, body: Box::pin(body(yielder)), done: false }
    }

    /// Resume the body until its next yielded value, awaiting through
    /// whatever real suspension points it hits along the way. Resolves to
    /// `None` once the body has returned, and stays `None` on every call
    /// after that.
    pub fn advance(&mut self) -> Advance<'_, T> {
        Advance { generator: self }
    }

    fn poll_advance(&mut self, ctx: &mut Context<'_>) -> Poll<Option<T>> {
        if self.done {
            return Poll::Ready(None);
        }

        match self.body.as_mut().poll(ctx) {
            Poll::Ready(()) => {
                self.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => match self.slot.borrow_mut().take() {
                Some(value) => Poll::Ready(Some(value)),
                // Genuine suspension on something other than a yield: the waker the
                // caller's executor registered with the inner future will fire when
                // that future is ready, and re-polling then resumes the body from
                // exactly where it left off.
                None => Poll::Pending,
            },
        }
    }
}

/// The awaitable returned by [`AsyncGenerator::advance`].
pub struct Advance<'a, T> {
    generator: &'a mut AsyncGenerator<T>,
}

impl<'a, T: 'static> Future for Advance<'a, T> {
    type Output = Option<T>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().generator.poll_advance(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn does_not_run_until_first_advance() {
        let ran = Rc::new(RefCell::new(false));
        let flag = ran.clone();
        let mut generator: AsyncGenerator<i32> = AsyncGenerator::new(move |_yielder| async move {
            *flag.borrow_mut() = true;
        });
        assert!(!*ran.borrow());
        futures::executor::block_on(generator.advance());
        assert!(*ran.borrow());
    }

    #[test]
    fn yields_values_then_ends() {
        let mut generator = AsyncGenerator::new(|yielder| async move {
            yielder.yield_value(1).await;
            yielder.yield_value(2).await;
            yielder.yield_value(3).await;
        });

        assert_eq!(futures::executor::block_on(generator.advance()), Some(1));
        assert_eq!(futures::executor::block_on(generator.advance()), Some(2));
        assert_eq!(futures::executor::block_on(generator.advance()), Some(3));
        assert_eq!(futures::executor::block_on(generator.advance()), None);
        assert_eq!(futures::executor::block_on(generator.advance()), None);
    }

    #[test]
    fn suspends_on_real_futures_between_yields() {
        let polls = Arc::new(AtomicUsize::new(0));
        let counted = polls.clone();

        let mut generator = AsyncGenerator::new(move |yielder| async move {
            yielder.yield_value("a").await;
            CountedYield { polls: counted.clone(), remaining: 2 }.await;
            yielder.yield_value("b").await;
        });

        assert_eq!(futures::executor::block_on(generator.advance()), Some("a"));
        assert_eq!(futures::executor::block_on(generator.advance()), Some("b"));
        // `remaining` starts at 2: two `Pending` polls (2 -> 1, 1 -> 0) plus
        // the final poll that observes `remaining == 0` and returns `Ready`.
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    struct CountedYield {
        polls: Arc<AtomicUsize>,
        remaining: usize,
    }

    impl Future for CountedYield {
        type Output = ();

        fn poll(mut self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<()> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            if self.remaining == 0 {
                Poll::Ready(())
            } else {
                self.remaining -= 1;
                ctx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }

    #[test]
    fn empty_body_yields_nothing() {
        let mut generator: AsyncGenerator<()> = AsyncGenerator::new(|_yielder| async {});
        assert_eq!(futures::executor::block_on(generator.advance()), None);
    }
}
