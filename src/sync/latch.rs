//! An async countdown latch (§4.5), built directly atop
//! [`ManualResetEvent`], the way `cppcoro::async_latch` layers on
//! `async_manual_reset_event`.

use std::sync::atomic::{AtomicIsize, Ordering};

use super::manual_reset_event::{ManualResetEvent, Wait};

pub struct Latch {
    count: AtomicIsize,
    event: ManualResetEvent,
}

impl Latch {
    /// Construct a latch counting down from `count`. A non-positive count
    /// is immediately ready.
    pub fn new(count: isize) -> Latch {
        Latch {
            count: AtomicIsize::new(count),
            event: ManualResetEvent::new(count <= 0),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.event.is_set()
    }

    pub fn remaining(&self) -> isize {
        self.count.load(Ordering::Acquire).max(0)
    }

    /// Decrement the count by `n`. If the result crosses zero, sets the
    /// event and wakes every waiter.
    pub fn count_down(&self, n: isize) {
        let prev = self.count.fetch_sub(n, Ordering::AcqRel);
        if prev > 0 && prev - n <= 0 {
            self.event.set();
        }
    }

    /// An awaitable that completes once the count reaches zero or below.
    pub fn wait(&self) -> Wait<'_> {
        self.event.wait()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn countdown_releases_all_waiters() {
        // Scenario from §8: latch(2); 3 waiters; count_down(); none ready;
        // count_down(); all three resumed.
        let latch = Arc::new(Latch::new(2));
        let resumed = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let latch = latch.clone();
                let resumed = resumed.clone();
                std::thread::spawn(move || {
                    futures::executor::block_on(latch.wait());
                    resumed.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        std::thread::sleep(std::time::Duration::from_millis(20));
        latch.count_down(1);
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(resumed.load(Ordering::SeqCst), 0);
        assert!(!latch.is_ready());

        latch.count_down(1);
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(resumed.load(Ordering::SeqCst), 3);
        assert!(latch.is_ready());
    }

    #[test]
    fn non_positive_count_is_immediately_ready() {
        let latch = Latch::new(0);
        assert!(latch.is_ready());
        futures::executor::block_on(latch.wait());
    }
}
