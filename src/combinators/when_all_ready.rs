use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};

enum Slot<T> {
    Pending(Pin<Box<dyn Future<Output = T> + Send>>),
    Done(std::thread::Result<T>),
    Taken,
}

/// Starts every future in `futures` concurrently and resolves once each has
/// reached a completed state, success or panic (§4.10). Never itself fails;
/// the caller inspects each [`std::thread::Result`] to see which succeeded.
pub struct WhenAllReady<T> {
    slots: Vec<Slot<T>>,
}

/// Build a [`WhenAllReady`] over a homogeneous collection of futures. The
/// spec allows either a fixed-arity tuple or a vector of ready wrappers;
/// this crate exposes the vector form.
pub fn when_all_ready<T, F>(futures: Vec<F>) -> WhenAllReady<T>
where
    F: Future<Output = T> + Send + 'static,
{
    WhenAllReady { slots: futures.into_iter().map(|f| Slot::Pending(Box::pin(f))).collect() }
}

impl<T> Future for WhenAllReady<T> {
    type Output = Vec<std::thread::Result<T>>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut all_done = true;

        // Every slot is polled with the same outer waker. A wakeup from any
        // one of them re-polls the whole batch rather than just the slot
        // that fired; simple and correct, at the cost of redundant polls
        // under heavy fan-out.
        for slot in this.slots.iter_mut() {
            if let Slot::Pending(future) = slot {
                match catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(ctx))) {
                    Ok(Poll::Ready(value)) => *slot = Slot::Done(Ok(value)),
                    Ok(Poll::Pending) => all_done = false,
                    Err(payload) => *slot = Slot::Done(Err(payload)),
                }
            }
        }

        if !all_done {
            return Poll::Pending;
        }

        let results = this
            .slots
            .iter_mut()
            .map(|slot| match std::mem::replace(slot, Slot::Taken) {
                Slot::Done(result) => result,
                Slot::Pending(_) | Slot::Taken => unreachable!("all slots are Done once all_done is true"),
            })
            .collect();

        Poll::Ready(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waits_for_every_future_before_resolving() {
        let futures: Vec<_> = vec![async { 1 }, async { 2 }, async { 3 }];
        let results = futures::executor::block_on(when_all_ready(futures));
        let values: Vec<i32> = results.into_iter().map(Result::unwrap).collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn captures_panics_without_failing_the_whole_batch() {
        let futures: Vec<Pin<Box<dyn Future<Output = i32> + Send>>> = vec![
            Box::pin(async { 1 }),
            Box::pin(async {
                panic!("boom");
                #[allow(unreachable_code)]
                2
            }),
            Box::pin(async { 3 }),
        ];
        let results = futures::executor::block_on(when_all_ready(futures));
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }

    #[test]
    fn empty_batch_resolves_immediately() {
        let futures: Vec<std::future::Ready<i32>> = Vec::new();
        let results = futures::executor::block_on(when_all_ready(futures));
        assert!(results.is_empty());
    }
}
