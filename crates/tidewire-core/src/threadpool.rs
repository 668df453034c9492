//! Runtime-resizable worker thread pool.
//!
//! The pool owns a set of named worker threads that compete for tasks on a
//! shared FIFO queue. Workers can be added and removed while the pool is in
//! use; a removed worker finishes the task it is currently running before it
//! exits. Dropping the pool (or calling [`ThreadPool::shutdown`]) drains the
//! queue and joins every worker.
//!
//! # Example
//!
//! ```
//! use tidewire_core::threadpool::ThreadPool;
//!
//! let pool = ThreadPool::new(2).unwrap();
//!
//! let handle = pool.enqueue(|| 6 * 7).unwrap();
//! assert_eq!(handle.wait(), Some(42));
//!
//! pool.add_threads(2).unwrap();
//! assert_eq!(pool.thread_count(), 4);
//!
//! pool.remove_threads(3).unwrap();
//! assert_eq!(pool.thread_count(), 1);
//! ```
//!
//! # Worker Lifecycle
//!
//! Each worker moves `Waiting -> Running -> Waiting` while it is live. Any
//! state may move to `Stopped`, which is terminal. Wake-ups are broadcast to
//! every worker whenever a stop flag changes; each worker re-checks its own
//! flag, so there is no need to target the worker being removed.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, TryRecvError, bounded};
use parking_lot::{Condvar, Mutex};

use crate::error::ThreadPoolError;
use crate::logging::targets;

/// Counter for unique task IDs.
static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Lifecycle state of a single worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WorkerState {
    /// Idle, blocked on the task queue.
    Waiting = 0,
    /// Executing a task.
    Running = 1,
    /// Flagged to exit. Terminal.
    Stopped = 2,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Waiting,
            1 => Self::Running,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "Waiting"),
            Self::Running => write!(f, "Running"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

#[derive(Debug)]
struct WorkerStatus(AtomicU8);

impl WorkerStatus {
    fn new() -> Self {
        Self(AtomicU8::new(WorkerState::Waiting as u8))
    }

    fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Compare-and-swap so that `Stopped` is never overwritten.
    fn transition(&self, from: WorkerState, to: WorkerState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn stop(&self) {
        self.0.store(WorkerState::Stopped as u8, Ordering::Release);
    }
}

/// State shared between the pool handle and its workers.
struct Shared {
    queue: Mutex<VecDeque<Job>>,
    available: Condvar,
    shutdown: AtomicBool,
}

impl Shared {
    /// Wake every worker so it re-checks its exit condition.
    ///
    /// The queue lock is taken before notifying so a worker between its
    /// predicate check and its wait cannot miss the wake-up.
    fn wake_all(&self) {
        let _guard = self.queue.lock();
        self.available.notify_all();
    }

    fn next_job(&self, status: &WorkerStatus) -> Option<Job> {
        let mut queue = self.queue.lock();
        loop {
            if status.get() == WorkerState::Stopped {
                return None;
            }
            if let Some(job) = queue.pop_front() {
                return Some(job);
            }
            if self.shutdown.load(Ordering::Acquire) {
                return None;
            }
            self.available.wait(&mut queue);
        }
    }
}

struct Worker {
    id: u64,
    status: Arc<WorkerStatus>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn join(mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        if thread.thread().id() == thread::current().id() {
            // Removed from inside one of its own tasks; it exits once the task returns.
            tracing::debug!(
                target: targets::POOL,
                worker_id = self.id,
                "detaching self-removed worker"
            );
            return;
        }
        if thread.join().is_err() {
            tracing::error!(target: targets::POOL, worker_id = self.id, "worker thread panicked");
        }
    }
}

fn run_worker(shared: Arc<Shared>, status: Arc<WorkerStatus>, worker_id: u64) {
    tracing::trace!(target: targets::POOL, worker_id, "worker started");

    while let Some(job) = shared.next_job(&status) {
        status.transition(WorkerState::Waiting, WorkerState::Running);
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            tracing::error!(target: targets::POOL, worker_id, "task panicked");
        }
        status.transition(WorkerState::Running, WorkerState::Waiting);
    }

    tracing::trace!(target: targets::POOL, worker_id, "worker exiting");
}

/// Marks its task finished when dropped, whether the task returned,
/// panicked or was discarded unrun.
struct Completion(Arc<AtomicBool>);

impl Drop for Completion {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

/// A handle to an enqueued task that allows waiting for its result.
#[derive(Debug)]
pub struct TaskHandle<T> {
    id: u64,
    receiver: Receiver<T>,
    finished: Arc<AtomicBool>,
}

impl<T> TaskHandle<T> {
    /// Get the unique task ID.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Check if the task has completed, including by panicking.
    ///
    /// Once true, it stays true.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Try to get the result without blocking.
    ///
    /// Returns `Some(result)` if the task has completed, `None` otherwise.
    pub fn try_get(&self) -> Option<T> {
        match self.receiver.try_recv() {
            Ok(value) => Some(value),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Wait for the task to complete and return its result.
    ///
    /// Returns `None` if the task panicked or was discarded.
    pub fn wait(self) -> Option<T> {
        self.receiver.recv().ok()
    }

    /// Wait for the task with a timeout.
    ///
    /// Returns `None` if the timeout elapsed or the task panicked.
    pub fn wait_timeout(self, timeout: Duration) -> Option<T> {
        self.receiver.recv_timeout(timeout).ok()
    }
}

/// Configuration for creating a thread pool.
#[derive(Debug, Clone)]
pub struct ThreadPoolConfig {
    /// Initial number of workers. `None` means use the number of CPU cores.
    pub num_threads: Option<usize>,
    /// Name prefix for worker threads.
    pub thread_name: String,
    /// Stack size for worker threads in bytes.
    pub stack_size: Option<usize>,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            num_threads: None,
            thread_name: "tidewire-worker".to_string(),
            stack_size: None,
        }
    }
}

impl ThreadPoolConfig {
    /// Create a new configuration with custom thread count.
    pub fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads: Some(num_threads),
            ..Default::default()
        }
    }

    /// Set the worker thread name prefix.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Set the worker stack size in bytes.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }
}

/// A pool of worker threads whose population can change at runtime.
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Mutex<BTreeMap<u64, Worker>>,
    next_worker_id: AtomicU64,
    config: ThreadPoolConfig,
}

impl ThreadPool {
    /// Create a pool with `num_threads` workers and default settings.
    pub fn new(num_threads: usize) -> Result<Self, ThreadPoolError> {
        Self::with_config(ThreadPoolConfig::with_threads(num_threads))
    }

    /// Create a pool with the given configuration.
    pub fn with_config(config: ThreadPoolConfig) -> Result<Self, ThreadPoolError> {
        let initial = config.num_threads.unwrap_or_else(|| {
            thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });

        let pool = Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::new()),
                available: Condvar::new(),
                shutdown: AtomicBool::new(false),
            }),
            workers: Mutex::new(BTreeMap::new()),
            next_worker_id: AtomicU64::new(1),
            config,
        };
        pool.add_threads(initial)?;
        Ok(pool)
    }

    /// Submit a task for execution.
    ///
    /// Fails with [`ThreadPoolError::ShutDown`] once the pool has been shut
    /// down, so work is never silently dropped.
    pub fn enqueue<F, T>(&self, task: F) -> Result<TaskHandle<T>, ThreadPoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let id = NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = bounded(1);
        let finished = Arc::new(AtomicBool::new(false));
        let completion = Completion(finished.clone());
        let job: Job = Box::new(move || {
            let _completion = completion;
            let _ = sender.send(task());
        });

        {
            let mut queue = self.shared.queue.lock();
            if self.shared.shutdown.load(Ordering::Acquire) {
                return Err(ThreadPoolError::ShutDown);
            }
            queue.push_back(job);
        }
        self.shared.available.notify_one();

        Ok(TaskHandle {
            id,
            receiver,
            finished,
        })
    }

    /// Spawn `n` additional workers.
    pub fn add_threads(&self, n: usize) -> Result<(), ThreadPoolError> {
        if self.is_shut_down() {
            return Err(ThreadPoolError::ShutDown);
        }

        let mut workers = self.workers.lock();
        // Shutdown may have emptied the map since the check above.
        if self.is_shut_down() {
            return Err(ThreadPoolError::ShutDown);
        }
        for _ in 0..n {
            let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
            let status = Arc::new(WorkerStatus::new());

            let mut builder =
                thread::Builder::new().name(format!("{}-{}", self.config.thread_name, id));
            if let Some(stack_size) = self.config.stack_size {
                builder = builder.stack_size(stack_size);
            }

            let shared = self.shared.clone();
            let worker_status = status.clone();
            let thread = builder
                .spawn(move || run_worker(shared, worker_status, id))
                .map_err(ThreadPoolError::Spawn)?;

            workers.insert(
                id,
                Worker {
                    id,
                    status,
                    thread: Some(thread),
                },
            );
        }

        tracing::debug!(target: targets::POOL, added = n, total = workers.len(), "workers added");
        Ok(())
    }

    /// Stop and join `n` workers.
    ///
    /// Workers are taken in bookkeeping order. Each finishes the task it is
    /// running, if any, before exiting. Fails without touching any worker if
    /// `n` exceeds [`thread_count`](Self::thread_count).
    pub fn remove_threads(&self, n: usize) -> Result<(), ThreadPoolError> {
        let removed: Vec<Worker> = {
            let mut workers = self.workers.lock();
            let available = workers.len();
            if n > available {
                return Err(ThreadPoolError::RemoveTooMany {
                    requested: n,
                    available,
                });
            }
            let ids: Vec<u64> = workers.keys().take(n).copied().collect();
            ids.iter().filter_map(|id| workers.remove(id)).collect()
        };

        for worker in &removed {
            worker.status.stop();
        }
        self.shared.wake_all();

        for worker in removed {
            worker.join();
        }

        tracing::debug!(target: targets::POOL, removed = n, "workers removed");
        Ok(())
    }

    /// Current number of workers.
    pub fn thread_count(&self) -> usize {
        self.workers.lock().len()
    }

    /// Number of workers currently executing a task.
    pub fn active_workers(&self) -> usize {
        self.workers
            .lock()
            .values()
            .filter(|w| w.status.get() == WorkerState::Running)
            .count()
    }

    /// Number of tasks waiting for a worker.
    pub fn pending_tasks(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }

    /// Reject further tasks, let the workers drain the queue, and join them.
    ///
    /// Called automatically on drop. Calling it more than once is harmless.
    pub fn shutdown(&self) {
        {
            let _queue = self.shared.queue.lock();
            self.shared.shutdown.store(true, Ordering::Release);
            self.shared.available.notify_all();
        }

        let workers = std::mem::take(&mut *self.workers.lock());
        if !workers.is_empty() {
            tracing::debug!(target: targets::POOL, workers = workers.len(), "shutting down pool");
        }
        for worker in workers.into_values() {
            worker.join();
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("thread_count", &self.thread_count())
            .field("pending_tasks", &self.pending_tasks())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

static_assertions::assert_impl_all!(ThreadPool: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn test_enqueue_and_wait() {
        let pool = ThreadPool::new(2).unwrap();
        let handle = pool.enqueue(|| 42).unwrap();
        assert_eq!(handle.wait(), Some(42));
    }

    #[test]
    fn test_task_ids_increase() {
        let pool = ThreadPool::new(1).unwrap();
        let a = pool.enqueue(|| ()).unwrap();
        let b = pool.enqueue(|| ()).unwrap();
        assert!(b.id() > a.id());
    }

    #[test]
    fn test_multiple_tasks() {
        let pool = ThreadPool::new(4).unwrap();
        let counter = Arc::new(AtomicI32::new(0));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let counter = counter.clone();
                pool.enqueue(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap()
            })
            .collect();

        for handle in handles {
            handle.wait();
        }

        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_single_worker_runs_in_submission_order() {
        let pool = ThreadPool::new(1).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..5)
            .map(|i| {
                let order = order.clone();
                pool.enqueue(move || order.lock().push(i)).unwrap()
            })
            .collect();
        for handle in handles {
            handle.wait();
        }

        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_add_threads() {
        let pool = ThreadPool::new(1).unwrap();
        pool.add_threads(3).unwrap();
        assert_eq!(pool.thread_count(), 4);
    }

    #[test]
    fn test_remove_threads() {
        let pool = ThreadPool::new(4).unwrap();
        pool.remove_threads(3).unwrap();
        assert_eq!(pool.thread_count(), 1);

        // The survivor still runs work.
        assert_eq!(pool.enqueue(|| "ok").unwrap().wait(), Some("ok"));
    }

    #[test]
    fn test_remove_too_many_leaves_pool_unchanged() {
        let pool = ThreadPool::new(2).unwrap();

        let err = pool.remove_threads(3).unwrap_err();
        assert!(matches!(
            err,
            ThreadPoolError::RemoveTooMany {
                requested: 3,
                available: 2
            }
        ));
        assert_eq!(pool.thread_count(), 2);

        let handles: Vec<_> = (0..4).map(|i| pool.enqueue(move || i).unwrap()).collect();
        let results: Vec<_> = handles.into_iter().filter_map(TaskHandle::wait).collect();
        assert_eq!(results, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_remove_waits_for_running_task() {
        let pool = ThreadPool::new(1).unwrap();
        let (started_tx, started_rx) = crossbeam_channel::bounded(1);

        let handle = pool
            .enqueue(move || {
                started_tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(50));
                7
            })
            .unwrap();

        started_rx.recv().unwrap();
        pool.remove_threads(1).unwrap();

        assert_eq!(pool.thread_count(), 0);
        assert_eq!(handle.try_get(), Some(7));
    }

    #[test]
    fn test_zero_workers_queue_until_added() {
        let pool = ThreadPool::new(0).unwrap();
        let handle = pool.enqueue(|| 5).unwrap();
        assert_eq!(pool.pending_tasks(), 1);

        pool.add_threads(1).unwrap();
        assert_eq!(handle.wait(), Some(5));
        assert_eq!(pool.pending_tasks(), 0);
    }

    #[test]
    fn test_enqueue_after_shutdown_fails() {
        let pool = ThreadPool::new(2).unwrap();
        pool.shutdown();

        assert!(pool.is_shut_down());
        assert_eq!(pool.thread_count(), 0);
        assert!(matches!(pool.enqueue(|| ()), Err(ThreadPoolError::ShutDown)));
        assert!(matches!(pool.add_threads(1), Err(ThreadPoolError::ShutDown)));
    }

    #[test]
    fn test_drop_drains_queue() {
        let counter = Arc::new(AtomicI32::new(0));
        {
            let pool = ThreadPool::new(1).unwrap();
            for _ in 0..10 {
                let counter = counter.clone();
                pool.enqueue(move || {
                    thread::sleep(Duration::from_millis(2));
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_panicking_task_does_not_kill_worker() {
        let pool = ThreadPool::new(1).unwrap();

        let bad = pool.enqueue(|| -> i32 { panic!("boom") }).unwrap();
        assert_eq!(bad.wait(), None);

        let good = pool.enqueue(|| 1).unwrap();
        assert_eq!(good.wait(), Some(1));
        assert_eq!(pool.thread_count(), 1);
    }

    #[test]
    fn test_panicked_task_reports_finished() {
        let pool = ThreadPool::new(1).unwrap();
        let bad = pool.enqueue(|| -> i32 { panic!("boom") }).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !bad.is_finished() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(bad.is_finished());
        assert_eq!(bad.try_get(), None);
        assert_eq!(bad.wait(), None);
    }

    #[test]
    fn test_is_finished_survives_try_get() {
        let pool = ThreadPool::new(1).unwrap();
        let handle = pool.enqueue(|| 3).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !handle.is_finished() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(handle.is_finished());
        assert_eq!(handle.try_get(), Some(3));
        assert!(handle.is_finished());
        assert_eq!(handle.try_get(), None);
    }

    #[test]
    fn test_add_threads_racing_shutdown_leaves_no_workers() {
        for _ in 0..20 {
            let pool = Arc::new(ThreadPool::new(0).unwrap());
            let adder = {
                let pool = pool.clone();
                thread::spawn(move || while pool.add_threads(1).is_ok() {})
            };

            thread::sleep(Duration::from_millis(1));
            pool.shutdown();
            adder.join().unwrap();

            assert_eq!(pool.thread_count(), 0);
        }
    }

    #[test]
    fn test_worker_thread_names() {
        let config = ThreadPoolConfig::with_threads(1).thread_name("pool-test");
        let pool = ThreadPool::with_config(config).unwrap();

        let name = pool
            .enqueue(|| thread::current().name().map(str::to_owned))
            .unwrap()
            .wait()
            .flatten()
            .unwrap();
        assert!(name.starts_with("pool-test-"));
    }

    #[test]
    fn test_active_workers() {
        let pool = ThreadPool::new(2).unwrap();
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
        let (started_tx, started_rx) = crossbeam_channel::bounded(1);

        let handle = pool
            .enqueue(move || {
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
            })
            .unwrap();

        started_rx.recv().unwrap();
        assert_eq!(pool.active_workers(), 1);

        release_tx.send(()).unwrap();
        handle.wait();
    }

    #[test]
    fn test_self_removal_from_task() {
        let pool = Arc::new(ThreadPool::new(1).unwrap());
        let inner = pool.clone();

        let handle = pool.enqueue(move || inner.remove_threads(1).is_ok()).unwrap();
        assert_eq!(handle.wait(), Some(true));
        assert_eq!(pool.thread_count(), 0);
    }

    #[test]
    fn test_stopped_is_terminal() {
        let status = WorkerStatus::new();
        assert!(status.transition(WorkerState::Waiting, WorkerState::Running));
        status.stop();

        assert!(!status.transition(WorkerState::Running, WorkerState::Waiting));
        assert!(!status.transition(WorkerState::Waiting, WorkerState::Running));
        assert_eq!(status.get(), WorkerState::Stopped);
        assert_eq!(status.get().to_string(), "Stopped");
    }
}
