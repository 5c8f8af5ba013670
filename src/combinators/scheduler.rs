use std::future::Future;

/// A place a continuation can be resumed on: a thread pool worker, an
/// `io_service` event-loop thread, or any other executor that exposes a
/// `schedule()` awaitable. [`StaticThreadPool`](crate::threadpool::StaticThreadPool)
/// and [`IoService`](crate::reactor::IoService) both implement this.
pub trait Scheduler {
    type Schedule: Future<Output = ()>;

    /// An awaitable that suspends the caller and resumes it on this
    /// scheduler.
    fn schedule(&self) -> Self::Schedule;
}

/// Run `future` to completion, then transfer execution to `scheduler`
/// before returning its value (§4.10: "transfer execution ... after A
/// completes").
pub async fn resume_on<S, F>(scheduler: &S, future: F) -> F::Output
where
    S: Scheduler,
    F: Future,
{
    let value = future.await;
    scheduler.schedule().await;
    value
}

/// Transfer execution to `scheduler`, then run `future` to completion
/// (§4.10: "transfer execution before starting A").
pub async fn schedule_on<S, F>(scheduler: &S, future: F) -> F::Output
where
    S: Scheduler,
    F: Future,
{
    scheduler.schedule().await;
    future.await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Immediate;

    impl Scheduler for Immediate {
        type Schedule = std::future::Ready<()>;

        fn schedule(&self) -> Self::Schedule {
            std::future::ready(())
        }
    }

    #[test]
    fn schedule_on_transfers_before_running() {
        let order = Rc::new(Cell::new(Vec::new()));
        let o = order.clone();
        let future = async move {
            o.set({
                let mut v = o.take();
                v.push("body");
                v
            });
            5
        };

        let result = futures::executor::block_on(schedule_on(&Immediate, future));
        assert_eq!(result, 5);
        assert_eq!(order.take(), vec!["body"]);
    }

    #[test]
    fn resume_on_transfers_after_running() {
        let result = futures::executor::block_on(resume_on(&Immediate, async { 10 }));
        assert_eq!(result, 10);
    }
}
