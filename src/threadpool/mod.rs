//! A work-stealing scheduler for CPU-bound continuations (§4.9).
//!
//! Each worker owns a Chase-Lev deque (`crossbeam_deque::Worker`, already
//! the crate this library's own `Cargo.toml` lists for exactly this
//! shape); `schedule()`/`spawn()` push onto the calling worker's own deque
//! (LIFO pop — cache-hot continuations run next) when called from inside
//! the pool, or onto a lock-free injector queue otherwise. Idle workers
//! steal FIFO from a peer's deque before falling back to the injector, then
//! park on a condition variable.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_deque::{Injector, Steal, Stealer, Worker};
use parking_lot::{Condvar, Mutex};

use crate::combinators::Scheduler;
use crate::task::detached::{self, Schedulable};

struct Shared {
    injector: Injector<Arc<dyn Schedulable>>,
    stealers: Vec<Stealer<Arc<dyn Schedulable>>>,
    stop: AtomicBool,
    parked: Mutex<()>,
    condvar: Condvar,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

thread_local! {
    // `(pool identity, this thread's own deque)`. Only ever populated for
    // threads spawned by `StaticThreadPool::build`; the identity check lets
    // `enqueue` tell "the caller is a worker of *this* pool" from "the
    // caller happens to be some other pool's worker thread".
    static LOCAL: RefCell<Option<(*const (), Worker<Arc<dyn Schedulable>>)>> = RefCell::new(None);
}

/// N worker threads scheduling boxed continuations by work-stealing.
pub struct StaticThreadPool {
    inner: Arc<Shared>,
}

/// Builder for [`StaticThreadPool`], exposing the one tunable spec.md names
/// by name: worker count.
pub struct StaticThreadPoolBuilder {
    thread_count: usize,
}

impl StaticThreadPoolBuilder {
    fn new() -> StaticThreadPoolBuilder {
        StaticThreadPoolBuilder { thread_count: default_thread_count() }
    }

    /// Set the number of worker threads. Clamped to at least 1.
    pub fn thread_count(mut self, thread_count: usize) -> StaticThreadPoolBuilder {
        self.thread_count = thread_count.max(1);
        self
    }

    pub fn build(self) -> StaticThreadPool {
        let workers: Vec<Worker<Arc<dyn Schedulable>>> =
            (0..self.thread_count).map(|_| Worker::new_lifo()).collect();
        let stealers = workers.iter().map(Worker::stealer).collect();

        let shared = Arc::new(Shared {
            injector: Injector::new(),
            stealers,
            stop: AtomicBool::new(false),
            parked: Mutex::new(()),
            condvar: Condvar::new(),
            handles: Mutex::new(Vec::new()),
        });

        let handles = workers
            .into_iter()
            .enumerate()
            .map(|(index, worker)| {
                let shared = shared.clone();
                thread::Builder::new()
                    .name(format!("static-thread-pool-{}", index))
                    .spawn(move || run_worker(shared, worker))
                    .expect("failed to spawn static thread pool worker")
            })
            .collect();
        *shared.handles.lock() = handles;

        StaticThreadPool { inner: shared }
    }
}

fn default_thread_count() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

impl StaticThreadPool {
    /// A pool sized to the machine's available parallelism.
    pub fn new() -> StaticThreadPool {
        StaticThreadPoolBuilder::new().build()
    }

    pub fn builder() -> StaticThreadPoolBuilder {
        StaticThreadPoolBuilder::new()
    }

    /// An awaitable that suspends the caller and resumes it on this pool
    /// (§4.9: "Public operation: `schedule()` awaitable that enqueues the
    /// continuation and suspends").
    pub fn schedule(&self) -> Schedule {
        Schedule { shared: self.inner.clone(), queued: false }
    }

    /// Run `future` to completion on this pool, independent of the caller.
    /// Not named directly by spec.md, but needed to get any work *onto*
    /// the pool in the first place — the Rust analogue of a coroutine
    /// whose `initial_suspend` starts it eagerly on whichever thread calls
    /// this, same as [`AsyncScope::spawn`](crate::combinators::AsyncScope::spawn).
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let shared = self.inner.clone();
        detached::spawn(future, move |task| enqueue(&shared, task));
    }

    /// Signal every worker to stop once its deque drains, and block until
    /// all of them have exited. Idempotent.
    pub fn shutdown(&self) {
        self.inner.stop.store(true, Ordering::Release);
        self.inner.condvar.notify_all();
        let handles: Vec<_> = self.inner.handles.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
    }
}

impl Default for StaticThreadPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StaticThreadPool {
    fn drop(&mut self) {
        // Only signal here, never join: dropping the pool's last handle
        // from inside one of its own worker threads (a spawned future that
        // drops its `StaticThreadPool` handle) must not block that thread
        // on its own exit.
        self.inner.stop.store(true, Ordering::Release);
        self.inner.condvar.notify_all();
    }
}

impl Scheduler for StaticThreadPool {
    type Schedule = Schedule;

    fn schedule(&self) -> Schedule {
        StaticThreadPool::schedule(self)
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

/// The awaitable returned by [`StaticThreadPool::schedule`].
pub struct Schedule {
    shared: Arc<Shared>,
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
        enqueue(&this.shared, job);
        Poll::Pending
    }
}

fn enqueue(shared: &Arc<Shared>, task: Arc<dyn Schedulable>) {
    let identity = Arc::as_ptr(shared) as *const ();
    let pushed_locally = LOCAL.with(|local| {
        if let Some((owner, worker)) = &*local.borrow() {
            if *owner == identity {
                worker.push(task.clone());
                return true;
            }
        }
        false
    });
    if !pushed_locally {
        shared.injector.push(task);
    }
    shared.condvar.notify_one();
}

fn find_task(
    local: &Worker<Arc<dyn Schedulable>>,
    global: &Injector<Arc<dyn Schedulable>>,
    stealers: &[Stealer<Arc<dyn Schedulable>>],
) -> Option<Arc<dyn Schedulable>> {
    if let Some(task) = local.pop() {
        return Some(task);
    }
    loop {
        match global.steal_batch_and_pop(local) {
            Steal::Success(task) => return Some(task),
            Steal::Retry => continue,
            Steal::Empty => break,
        }
    }
    for stealer in stealers {
        loop {
            match stealer.steal() {
                Steal::Success(task) => return Some(task),
                Steal::Retry => continue,
                Steal::Empty => break,
            }
        }
    }
    None
}

fn run_worker(shared: Arc<Shared>, worker: Worker<Arc<dyn Schedulable>>) {
    let identity = Arc::as_ptr(&shared) as *const ();
    LOCAL.with(|local| *local.borrow_mut() = Some((identity, worker)));

    loop {
        let task = LOCAL.with(|local| {
            let borrowed = local.borrow();
            let (_, worker) = borrowed.as_ref().expect("worker-local deque missing");
            find_task(worker, &shared.injector, &shared.stealers)
        });

        match task {
            Some(task) => task.poll_once(),
            None => {
                if shared.stop.load(Ordering::Acquire) {
                    break;
                }
                let mut guard = shared.parked.lock();
                shared.condvar.wait_for(&mut guard, Duration::from_millis(50));
            }
        }
    }

    // Shutdown: drain whatever is left in our own deque before exiting.
    LOCAL.with(|local| {
        let mut borrowed = local.borrow_mut();
        if let Some((_, worker)) = borrowed.as_mut() {
            while let Some(task) = worker.pop() {
                task.poll_once();
            }
        }
        *borrowed = None;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    #[test]
    fn schedule_runs_continuation_on_a_pool_thread() {
        // A future that awaits `schedule()` before doing anything else
        // must have its continuation actually resumed by a worker thread,
        // not whichever thread happened to call `spawn`.
        let pool = Arc::new(StaticThreadPool::builder().thread_count(2).build());
        let (tx, rx) = mpsc::channel();
        let p = pool.clone();
        pool.spawn(async move {
            p.schedule().await;
            tx.send(thread::current().name().map(str::to_owned)).unwrap();
        });
        let name = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(name.unwrap().starts_with("static-thread-pool-"));
        pool.shutdown();
    }

    #[test]
    fn many_spawned_continuations_all_run_exactly_once() {
        let pool = StaticThreadPool::builder().thread_count(4).build();
        let count = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();
        for _ in 0..500 {
            let count = count.clone();
            let tx = tx.clone();
            pool.spawn(async move {
                count.fetch_add(1, Ordering::SeqCst);
                let _ = tx.send(());
            });
        }
        drop(tx);
        for _ in 0..500 {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        assert_eq!(count.load(Ordering::SeqCst), 500);
        pool.shutdown();
    }

    #[test]
    fn schedule_on_pool_resumes_the_awaiting_continuation() {
        let pool = Arc::new(StaticThreadPool::builder().thread_count(2).build());
        let (tx, rx) = mpsc::channel();
        let p = pool.clone();
        pool.spawn(async move {
            p.schedule().await;
            tx.send(42).unwrap();
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 42);
        pool.shutdown();
    }

    #[test]
    fn shutdown_drains_pending_work() {
        let pool = StaticThreadPool::builder().thread_count(1).build();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..16 {
            let count = count.clone();
            pool.spawn(async move {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.shutdown();
        assert_eq!(count.load(Ordering::SeqCst), 16);
    }
}
