//! Single-producer sequence barrier and ring-buffer sequencer (§4.12),
//! grounded on the same raw power-of-two ring buffer idiom as
//! `ringbahn::ring::Buffer`, but tracking *logical* monotonic sequence
//! numbers rather than raw bytes.
//!
//! A [`SequenceBarrier`] is a single `i64` cursor plus a set of parked
//! waiters; a [`SingleProducerSequencer`] pairs one barrier (the producer's
//! own cursor) with a set of consumer barriers it must not lap. Sequence
//! numbers are compared with wraparound-aware arithmetic (`precedes`)
//! rather than plain `<`, since a long-running sequencer's counter is
//! expected to eventually wrap `i64::MAX`.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;

/// Wraparound-aware "does `a` come before `b`" comparison (§9): true
/// exactly when advancing from `b` to `a` the short way round crosses zero
/// fewer times than the long way, i.e. `a - b` as a signed 64-bit
/// wraparound subtraction is negative.
fn precedes(a: i64, b: i64) -> bool {
    a.wrapping_sub(b) < 0
}

struct Waiter {
    threshold: i64,
    waker: Waker,
}

struct BarrierState {
    published: AtomicI64,
    waiters: Mutex<Vec<Waiter>>,
}

/// Tracks the highest sequence number published so far and lets other
/// parties wait until a given sequence has been published.
pub struct SequenceBarrier {
    state: Arc<BarrierState>,
}

impl Default for SequenceBarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceBarrier {
    /// A barrier with nothing published yet (cursor at -1, so sequence 0
    /// is the first valid wait target).
    pub fn new() -> SequenceBarrier {
        SequenceBarrier {
            state: Arc::new(BarrierState {
                published: AtomicI64::new(-1),
                waiters: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn last_published(&self) -> i64 {
        self.state.published.load(Ordering::Acquire)
    }

    /// Publish `seq` as the new high-water mark and wake every waiter whose
    /// threshold it satisfies. Must be called in non-decreasing `seq`
    /// order by a single producer — concurrent publishers would race on
    /// the store below.
    pub fn publish(&self, seq: i64) {
        self.state.published.store(seq, Ordering::Release);
        let mut waiters = self.state.waiters.lock();
        let mut ready = Vec::new();
        waiters.retain(|w| {
            if !precedes(seq, w.threshold) {
                ready.push(w.waker.clone());
                false
            } else {
                true
            }
        });
        drop(waiters);
        for waker in ready {
            waker.wake();
        }
    }

    /// An awaitable that resolves to the published sequence number once it
    /// is `>= seq` (§4.12: "returns the actual available sequence, which
    /// may be greater than requested").
    pub fn wait_until_published(&self, seq: i64) -> WaitUntilPublished<'_> {
        WaitUntilPublished { barrier: self, target: seq }
    }
}

impl Clone for SequenceBarrier {
    fn clone(&self) -> Self {
        SequenceBarrier { state: self.state.clone() }
    }
}

pub struct WaitUntilPublished<'a> {
    barrier: &'a SequenceBarrier,
    target: i64,
}

impl<'a> Future for WaitUntilPublished<'a> {
    type Output = i64;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<i64> {
        let this = self.get_mut();
        let published = this.barrier.last_published();
        if !precedes(published, this.target) {
            return Poll::Ready(published);
        }

        {
            let mut waiters = this.barrier.state.waiters.lock();
            waiters.push(Waiter { threshold: this.target, waker: ctx.waker().clone() });
        }

        // Re-check: `publish` may have run, and swept the waiters list,
        // between our first read and taking the lock above.
        let published = this.barrier.last_published();
        if !precedes(published, this.target) {
            return Poll::Ready(published);
        }

        Poll::Pending
    }
}

/// A single producer claiming slots in a fixed power-of-two ring buffer,
/// gated by the slowest registered consumer so it never overwrites a slot
/// a consumer has not yet read.
pub struct SingleProducerSequencer {
    buffer_size: i64,
    next_to_claim: AtomicI64,
    cursor: SequenceBarrier,
    consumer_barriers: Mutex<Vec<SequenceBarrier>>,
}

impl SingleProducerSequencer {
    /// `buffer_size` must be a power of two, matching the ring buffer it
    /// gates access to.
    pub fn new(buffer_size: usize) -> SingleProducerSequencer {
        assert!(buffer_size.is_power_of_two(), "buffer_size must be a power of two");
        SingleProducerSequencer {
            buffer_size: buffer_size as i64,
            next_to_claim: AtomicI64::new(0),
            cursor: SequenceBarrier::new(),
            consumer_barriers: Mutex::new(Vec::new()),
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size as usize
    }

    /// The ring-buffer slot a published sequence number maps to.
    pub fn index_of(&self, seq: i64) -> usize {
        (seq & (self.buffer_size - 1)) as usize
    }

    /// Register a consumer's barrier so the producer will not claim more
    /// than `buffer_size` slots ahead of it.
    pub fn add_consumer_barrier(&self, barrier: SequenceBarrier) {
        self.consumer_barriers.lock().push(barrier);
    }

    /// Claim up to `max_batch` sequence numbers, suspending until enough
    /// ring buffer slots have been freed by the slowest consumer. Returns
    /// the claimed range `[start, end)`; the caller writes `buffer[index_of(i)]`
    /// for each `i` in the range, then calls [`publish`](Self::publish).
    pub async fn claim_up_to(&self, max_batch: usize) -> std::ops::Range<i64> {
        assert!(max_batch > 0);
        let start = self.next_to_claim.load(Ordering::Relaxed);
        let desired_end = start + max_batch as i64;

        loop {
            let slowest = self.slowest_consumer_published();
            let available_until = slowest + self.buffer_size + 1;
            if precedes(start, available_until) {
                let end = desired_end.min(available_until);
                self.next_to_claim.store(end, Ordering::Relaxed);
                return start..end;
            }
            let wait_for = start - self.buffer_size;
            self.slowest_consumer_barrier().wait_until_published(wait_for).await;
        }
    }

    pub fn publish(&self, seq: i64) {
        self.cursor.publish(seq);
    }

    /// Wait for the producer's cursor to reach at least `seq`; returns the
    /// actual published sequence, which may be further along.
    pub fn wait_until_published(&self, seq: i64) -> WaitUntilPublished<'_> {
        self.cursor.wait_until_published(seq)
    }

    fn slowest_consumer_published(&self) -> i64 {
        let consumers = self.consumer_barriers.lock();
        if consumers.is_empty() {
            // No registered consumers: nothing gates the producer.
            return i64::MAX / 2;
        }
        consumers.iter().map(|b| b.last_published()).min_by(|a, b| {
            if precedes(*a, *b) {
                std::cmp::Ordering::Less
            } else if precedes(*b, *a) {
                std::cmp::Ordering::Greater
            } else {
                std::cmp::Ordering::Equal
            }
        }).expect("checked non-empty above")
    }

    fn slowest_consumer_barrier(&self) -> SequenceBarrier {
        let consumers = self.consumer_barriers.lock();
        consumers
            .iter()
            .min_by(|a, b| {
                let (a, b) = (a.last_published(), b.last_published());
                if precedes(a, b) {
                    std::cmp::Ordering::Less
                } else if precedes(b, a) {
                    std::cmp::Ordering::Greater
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .cloned()
            .expect("claim_up_to only waits when at least one consumer is registered")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::thread;

    #[test]
    fn precedes_handles_wraparound() {
        assert!(precedes(1, 2));
        assert!(!precedes(2, 1));
        assert!(precedes(i64::MAX, i64::MIN)); // wraps: MAX + 1 == MIN
        assert!(!precedes(i64::MIN, i64::MAX));
    }

    #[test]
    fn wait_until_published_resolves_once_published() {
        let barrier = SequenceBarrier::new();
        assert_eq!(barrier.last_published(), -1);
        barrier.publish(5);
        let resolved = futures::executor::block_on(barrier.wait_until_published(3));
        assert_eq!(resolved, 5);
    }

    #[test]
    fn wait_until_published_suspends_until_publish() {
        let barrier = Arc::new(SequenceBarrier::new());
        let b = barrier.clone();
        let woke = Arc::new(AtomicBool::new(false));
        let w = woke.clone();

        let handle = thread::spawn(move || {
            futures::executor::block_on(b.wait_until_published(10));
            w.store(true, Ordering::SeqCst);
        });

        thread::sleep(std::time::Duration::from_millis(20));
        assert!(!woke.load(Ordering::SeqCst));
        barrier.publish(10);
        handle.join().unwrap();
        assert!(woke.load(Ordering::SeqCst));
    }

    #[test]
    fn single_producer_single_consumer_throughput() {
        // §8.5: buffer size 256, producer publishes 1..=1_000_000 then a
        // zero sentinel; consumer sums until it reads the sentinel.
        const BUFFER_SIZE: usize = 256;
        const COUNT: i64 = 1_000_000;

        let sequencer = Arc::new(SingleProducerSequencer::new(BUFFER_SIZE));
        let consumer_barrier = SequenceBarrier::new();
        sequencer.add_consumer_barrier(consumer_barrier.clone());

        let buffer: Arc<Vec<std::sync::atomic::AtomicI64>> =
            Arc::new((0..BUFFER_SIZE).map(|_| std::sync::atomic::AtomicI64::new(0)).collect());

        let producer_sequencer = sequencer.clone();
        let producer_buffer = buffer.clone();
        let producer = thread::spawn(move || {
            futures::executor::block_on(async {
                let mut seq = 0i64;
                while seq <= COUNT {
                    let value = if seq == COUNT { 0 } else { seq + 1 };
                    let range = producer_sequencer.claim_up_to(1).await;
                    for i in range.clone() {
                        producer_buffer[producer_sequencer.index_of(i)]
                            .store(value, Ordering::Release);
                    }
                    producer_sequencer.publish(range.end - 1);
                    seq += 1;
                }
            });
        });

        let consumer_sequencer = sequencer.clone();
        let consumer_buffer = buffer.clone();
        let consumer = thread::spawn(move || {
            futures::executor::block_on(async {
                let mut sum: i64 = 0;
                let mut next = 0i64;
                loop {
                    let available = consumer_sequencer.wait_until_published(next).await;
                    for i in next..=available {
                        let value = consumer_buffer[consumer_sequencer.index_of(i)]
                            .load(Ordering::Acquire);
                        if value == 0 {
                            return sum;
                        }
                        sum += value;
                    }
                    consumer_barrier.publish(available);
                    next = available + 1;
                }
            })
        });

        producer.join().unwrap();
        let sum = consumer.join().unwrap();
        assert_eq!(sum, COUNT * (COUNT + 1) / 2);
    }
}
