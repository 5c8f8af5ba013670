use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// The future returned by [`fmap`].
pub struct Map<F, M> {
    future: Pin<Box<F>>,
    map: Option<M>,
}

/// Adapt `awaitable<T>` into `awaitable<f(T)>` (§4.10): `f` runs once, on
/// the thread that observes `future` become ready.
pub fn fmap<F, M, T, U>(future: F, map: M) -> Map<F, M>
where
    F: Future<Output = T>,
    M: FnOnce(T) -> U,
{
    Map { future: Box::pin(future), map: Some(map) }
}

impl<F, M, T, U> Future for Map<F, M>
where
    F: Future<Output = T>,
    M: FnOnce(T) -> U,
{
    type Output = U;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<U> {
        let this = self.get_mut();
        match this.future.as_mut().poll(ctx) {
            Poll::Ready(value) => {
                let map = this.map.take().expect("Map polled after completion");
                Poll::Ready(map(value))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_the_resolved_value() {
        let mapped = fmap(async { 21 }, |n: i32| n * 2);
        let result = futures::executor::block_on(mapped);
        assert_eq!(result, 42);
    }

    #[test]
    fn can_change_the_output_type() {
        let mapped = fmap(async { 7 }, |n: i32| n.to_string());
        let result = futures::executor::block_on(mapped);
        assert_eq!(result, "7");
    }
}
