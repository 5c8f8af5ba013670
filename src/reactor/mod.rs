//! The single-threaded (but multi-thread-drivable) I/O reactor (§4.7).
//!
//! spec.md's event loop dispatches two kinds of readiness: kernel I/O
//! completions and elapsed timers. `process_events()` services both from
//! one loop: each iteration first non-blockingly drains whatever kernel
//! completions are already queued (`drive::demo::try_drain_completions`,
//! resuming `Ring`/`Submission` futures the same way the driver's own
//! lazily-started background thread does — see `DESIGN.md`), then falls
//! through to scheduled jobs and elapsed timers. What `IoService` adds on
//! top of that existing completion plumbing is the part of §4.7 that is
//! reactor API rather than kernel-queue internals: `schedule()`,
//! `schedule_after()`, `stop()`, and the `process_events()` loop itself,
//! plus the timer heap backing `schedule_after`.
//!
//! `process_events()` can be called from multiple threads at once (§4.7:
//! "Users call `process_events()` from one or more threads"); any of them
//! may dispatch any given ready job or IO completion, matching the "no
//! ordering guaranteed across threads" rule in §5.

mod timer;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use crossbeam_deque::{Injector, Steal};
use parking_lot::{Condvar, Mutex};

use crate::cancellation::{CancellationRegistration, CancellationToken};
use crate::combinators::Scheduler;
use crate::error::{Error, Result};
use crate::task::detached::Schedulable;

use timer::TimerHeap;

struct Shared {
    stopped: AtomicBool,
    ready: Injector<Arc<dyn Schedulable>>,
    timers: Mutex<TimerHeap>,
    parked: Mutex<()>,
    condvar: Condvar,
    active_loops: AtomicUsize,
}

/// A single event-loop object. Cloning shares the same underlying loop —
/// every clone's `process_events()` cooperates on the same ready queue and
/// timer heap.
#[derive(Clone)]
pub struct IoService {
    inner: Arc<Shared>,
}

/// Builder for [`IoService`]. `submission_queue_depth` is accepted for
/// parity with the tunable spec.md names by name (§6 mentions "io_service
/// submission queue depth" among the externally configurable knobs); this
/// reactor's ready queue is an unbounded `crossbeam_deque::Injector`, so
/// the value is recorded but does not bound anything today.
pub struct IoServiceBuilder {
    submission_queue_depth: usize,
}

impl IoServiceBuilder {
    fn new() -> IoServiceBuilder {
        IoServiceBuilder { submission_queue_depth: 256 }
    }

    pub fn submission_queue_depth(mut self, depth: usize) -> IoServiceBuilder {
        self.submission_queue_depth = depth.max(1);
        self
    }

    pub fn build(self) -> IoService {
        let _ = self.submission_queue_depth;
        IoService {
            inner: Arc::new(Shared {
                stopped: AtomicBool::new(false),
                ready: Injector::new(),
                timers: Mutex::new(TimerHeap::new()),
                parked: Mutex::new(()),
                condvar: Condvar::new(),
                active_loops: AtomicUsize::new(0),
            }),
        }
    }
}

impl Default for IoService {
    fn default() -> Self {
        Self::new()
    }
}

impl IoService {
    pub fn new() -> IoService {
        IoServiceBuilder::new().build()
    }

    pub fn builder() -> IoServiceBuilder {
        IoServiceBuilder::new()
    }

    /// An awaitable that resumes the caller on an event-loop thread.
    pub fn schedule(&self) -> Schedule {
        Schedule { inner: self.inner.clone(), queued: false }
    }

    /// An awaitable that resumes after `duration` elapses, or fails with
    /// [`Error::Cancelled`] if `token` is cancelled first. Cancelling after
    /// the duration has already elapsed is a no-op — the successful result
    /// is still returned (§5: "Cancellation of an operation that has
    /// already completed successfully is a no-op").
    pub fn schedule_after(&self, duration: Duration, token: CancellationToken) -> ScheduleAfter {
        let state = Arc::new(TimerState::default());
        self.inner.timers.lock().insert(Instant::now() + duration, state.clone());
        self.inner.condvar.notify_all(); // the new deadline may be earlier than any we're parked on
        ScheduleAfter { state, token, registration: None }
    }

    /// Drive the event loop on the calling thread until [`stop`](IoService::stop)
    /// has been called and no ready work or pending timers remain. Safe to
    /// call from multiple threads concurrently.
    pub fn process_events(&self) {
        self.inner.active_loops.fetch_add(1, Ordering::AcqRel);
        loop {
            // §4.7 step 3: dispatch kernel IO completions before looking at
            // scheduled jobs or timers. Non-blocking — see
            // `drive::demo::try_drain_completions` — so this loop remains
            // the single place that services both IO and timers without
            // ever stalling on the completion queue's lock.
            if crate::drive::demo::try_drain_completions() > 0 {
                continue;
            }

            if let Some(job) = self.inner.pop_ready() {
                job.poll_once();
                continue;
            }

            let fired = self.inner.timers.lock().pop_elapsed(Instant::now());
            if !fired.is_empty() {
                for state in fired {
                    state.fire(false);
                }
                continue;
            }

            if self.inner.stopped.load(Ordering::Acquire) {
                break;
            }

            let timeout = self.inner.timers.lock().earliest_deadline().map(|deadline| {
                deadline.saturating_duration_since(Instant::now()).min(Duration::from_millis(50))
            });

            let mut guard = self.inner.parked.lock();
            match timeout {
                Some(timeout) => {
                    self.inner.condvar.wait_for(&mut guard, timeout);
                }
                None => {
                    self.inner.condvar.wait_for(&mut guard, Duration::from_millis(50));
                }
            }
        }
        self.inner.active_loops.fetch_sub(1, Ordering::AcqRel);
    }

    /// Instruct every thread currently in [`process_events`](IoService::process_events)
    /// to drain and return. Idempotent.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::Release);
        self.inner.condvar.notify_all();
    }
}

impl Shared {
    fn pop_ready(&self) -> Option<Arc<dyn Schedulable>> {
        loop {
            match self.ready.steal() {
                Steal::Success(job) => return Some(job),
                Steal::Retry => continue,
                Steal::Empty => return None,
            }
        }
    }

    fn enqueue(self: &Arc<Self>, job: Arc<dyn Schedulable>) {
        self.ready.push(job);
        self.condvar.notify_one();
    }
}

impl Scheduler for IoService {
    type Schedule = Schedule;

    fn schedule(&self) -> Schedule {
        IoService::schedule(self)
    }
}

struct WakeJob(Mutex<Option<Waker>>);

impl Schedulable for WakeJob {
    fn poll_once(self: Arc<Self>) {
        if let Some(waker) = self.0.lock().take() {
            waker.wake();
        }
    }
}

/// The awaitable returned by [`IoService::schedule`].
pub struct Schedule {
    inner: Arc<Shared>,
    queued: bool,
}

impl Future for Schedule {
    type Output = ();

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        if this.queued {
            return Poll::Ready(());
        }
        this.queued = true;
        let job: Arc<dyn Schedulable> = Arc::new(WakeJob(Mutex::new(Some(ctx.waker().clone()))));
        this.inner.enqueue(job);
        Poll::Pending
    }
}

/// Shared between a pending timer's heap entry and its [`ScheduleAfter`]
/// awaiter: whichever side reaches it first (elapsed-timer dispatch, or a
/// cancellation callback) decides the outcome, and the heap lazily drops
/// the entry once popped (§4.7: "Cancelling a pending timer marks it
/// tombstoned; the heap lazily drops tombstones at pop").
#[derive(Default)]
struct TimerState {
    done: AtomicBool,
    cancelled: AtomicBool,
    waker: Mutex<Option<Waker>>,
}

impl TimerState {
    /// Resolve the timer. `cancelled` distinguishes a cancellation racing
    /// ahead of the deadline from a normal elapse; the first caller to
    /// flip `done` wins, so a timer that has already fired cannot be
    /// cancelled out from under its result (§5).
    fn fire(&self, cancelled: bool) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        if cancelled {
            self.cancelled.store(true, Ordering::Release);
        }
        if let Some(waker) = self.waker.lock().take() {
            waker.wake();
        }
    }
}

/// The awaitable returned by [`IoService::schedule_after`].
pub struct ScheduleAfter {
    state: Arc<TimerState>,
    token: CancellationToken,
    registration: Option<CancellationRegistration>,
}

impl Future for ScheduleAfter {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Result<()>> {
        let this = self.get_mut();

        if this.state.done.load(Ordering::Acquire) {
            return Poll::Ready(if this.state.cancelled.load(Ordering::Acquire) {
                Err(Error::Cancelled)
            } else {
                Ok(())
            });
        }

        *this.state.waker.lock() = Some(ctx.waker().clone());

        if this.registration.is_none() && this.token.can_be_cancelled() {
            let state = this.state.clone();
            this.registration = Some(CancellationRegistration::new(&this.token, move || {
                state.fire(true);
            }));
        }

        // Re-check: a registration whose callback ran inline (cancellation
        // already requested) or a concurrent `fire` may have resolved the
        // timer between the first check and now.
        if this.state.done.load(Ordering::Acquire) {
            return Poll::Ready(if this.state.cancelled.load(Ordering::Acquire) {
                Err(Error::Cancelled)
            } else {
                Ok(())
            });
        }

        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::thread;

    fn run_loop_in_background(service: IoService) -> thread::JoinHandle<()> {
        thread::spawn(move || service.process_events())
    }

    #[test]
    fn schedule_resumes_the_continuation() {
        let service = IoService::new();
        let handle = run_loop_in_background(service.clone());
        let (tx, rx) = mpsc::channel();
        futures::executor::block_on(async {
            service.schedule().await;
            tx.send(()).unwrap();
        });
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        service.stop();
        handle.join().unwrap();
    }

    #[test]
    fn schedule_after_completes_once_duration_elapses() {
        let service = IoService::new();
        let handle = run_loop_in_background(service.clone());
        let result = futures::executor::block_on(
            service.schedule_after(Duration::from_millis(10), CancellationToken::none()),
        );
        assert!(result.is_ok());
        service.stop();
        handle.join().unwrap();
    }

    #[test]
    fn cancelled_timer_resumes_quickly_with_cancelled_error() {
        // Scenario from §8.2: schedule_after(1s), cancel concurrently, must
        // resume with `operation_cancelled` well under 1s.
        use crate::cancellation::CancellationSource;

        let service = IoService::new();
        let handle = run_loop_in_background(service.clone());
        let source = CancellationSource::new();
        let token = source.token();

        let start = Instant::now();
        let cancel_thread = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            source.request_cancellation();
        });

        let result =
            futures::executor::block_on(service.schedule_after(Duration::from_secs(1), token));
        let elapsed = start.elapsed();

        cancel_thread.join().unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(elapsed < Duration::from_millis(500), "took {:?}", elapsed);

        service.stop();
        handle.join().unwrap();
    }

    #[test]
    fn cancelling_after_completion_is_a_no_op() {
        use crate::cancellation::CancellationSource;

        let service = IoService::new();
        let handle = run_loop_in_background(service.clone());
        let source = CancellationSource::new();
        let token = source.token();

        let result =
            futures::executor::block_on(service.schedule_after(Duration::from_millis(5), token));
        assert!(result.is_ok());
        source.request_cancellation(); // no-op: already completed successfully

        service.stop();
        handle.join().unwrap();
    }

    #[test]
    fn multiple_threads_can_drive_the_same_loop() {
        let service = IoService::new();
        let handles: Vec<_> = (0..4).map(|_| run_loop_in_background(service.clone())).collect();

        let completed = Arc::new(AtomicUsize::new(0));
        let waiters: Vec<_> = (0..50)
            .map(|_| {
                let service = service.clone();
                let completed = completed.clone();
                thread::spawn(move || {
                    futures::executor::block_on(async {
                        service.schedule().await;
                        completed.fetch_add(1, Ordering::SeqCst);
                    });
                })
            })
            .collect();

        for w in waiters {
            w.join().unwrap();
        }
        assert_eq!(completed.load(Ordering::SeqCst), 50);

        service.stop();
        for h in handles {
            h.join().unwrap();
        }
    }
}
