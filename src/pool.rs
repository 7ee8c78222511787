// =============================================================================
// Worker pool: fixed workers, unbounded job queue
// =============================================================================

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::error::{PrimerError, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Running,
    ShuttingDown,
    Terminated,
}

impl PoolState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => PoolState::Running,
            1 => PoolState::ShuttingDown,
            _ => PoolState::Terminated,
        }
    }
}

pub struct WorkerPool {
    name: String,
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_ids: Vec<ThreadId>,
    liveness: Arc<Liveness>,
    state: AtomicU8,
    completed: Arc<AtomicUsize>,
}

/// Number of worker threads still running their loop.
struct Liveness {
    live: Mutex<usize>,
    exited: Condvar,
}

/// Dropped as a worker thread leaves its loop, panicking or not.
struct WorkerExit(Arc<Liveness>);

impl Drop for WorkerExit {
    fn drop(&mut self) {
        let mut live = lock(&self.0.live);
        *live -= 1;
        if *live == 0 {
            self.0.exited.notify_all();
        }
    }
}

// A panicking job never holds these locks, so poisoning carries no torn state.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl WorkerPool {
    pub fn new(name: impl Into<String>, size: usize) -> Result<Self> {
        let name = name.into();
        if size == 0 {
            return Err(PrimerError::EmptyPool(name));
        }

        let (sender, receiver) = channel::unbounded::<Job>();
        let completed = Arc::new(AtomicUsize::new(0));
        let liveness = Arc::new(Liveness {
            live: Mutex::new(0),
            exited: Condvar::new(),
        });

        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            // counted before spawning so a fast exit cannot underflow
            *lock(&liveness.live) += 1;
            let spawned = spawn_worker(
                &name,
                id,
                receiver.clone(),
                Arc::clone(&completed),
                WorkerExit(Arc::clone(&liveness)),
            );
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    *lock(&liveness.live) -= 1;
                    return Err(err.into());
                }
            }
        }
        let worker_ids = workers.iter().map(|handle| handle.thread().id()).collect();

        info!(pool = %name, workers = size, "pool started");

        Ok(Self {
            name,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            worker_ids,
            liveness,
            state: AtomicU8::new(PoolState::Running as u8),
            completed,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queues `job`; the returned handle yields its result.
    pub fn submit<T, F>(&self, job: F) -> Result<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let sender = lock(&self.sender);
        let sender = sender
            .as_ref()
            .ok_or_else(|| PrimerError::PoolShutdown(self.name.clone()))?;

        let (result_tx, result_rx) = channel::bounded(1);
        let wrapped: Job = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(job)).map_err(panic_message);
            // Nobody waiting is fine.
            let _ = result_tx.send(outcome);
        });

        sender
            .send(wrapped)
            .map_err(|_| PrimerError::PoolShutdown(self.name.clone()))?;
        Ok(TaskHandle { receiver: result_rx })
    }

    /// Stops accepting jobs. Already queued jobs still run.
    pub fn shutdown(&self) {
        if lock(&self.sender).take().is_some() {
            let _ = self.state.compare_exchange(
                PoolState::Running as u8,
                PoolState::ShuttingDown as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            info!(pool = %self.name, "pool shutting down");
        }
    }

    /// Waits until every worker has drained the queue and exited. Returns
    /// whether the pool is terminated.
    ///
    /// Returns `false` right away if the pool was never shut down, or if
    /// called from one of the pool's own workers.
    pub fn await_termination(&self) -> bool {
        if !self.may_wait() {
            return false;
        }
        let live = lock(&self.liveness.live);
        let live = self
            .liveness
            .exited
            .wait_while(live, |live| *live > 0)
            .unwrap_or_else(PoisonError::into_inner);
        drop(live);
        self.finish();
        true
    }

    /// As [`await_termination`](Self::await_termination), giving up after
    /// `timeout`.
    pub fn await_termination_timeout(&self, timeout: Duration) -> bool {
        if !self.may_wait() {
            return false;
        }
        let live = lock(&self.liveness.live);
        let (live, _) = self
            .liveness
            .exited
            .wait_timeout_while(live, timeout, |live| *live > 0)
            .unwrap_or_else(PoisonError::into_inner);
        if *live > 0 {
            return false;
        }
        drop(live);
        self.finish();
        true
    }

    pub fn shutdown_and_wait(&self) -> bool {
        self.shutdown();
        self.await_termination()
    }

    fn may_wait(&self) -> bool {
        if lock(&self.sender).is_some() {
            warn!(pool = %self.name, "awaiting termination of a pool that was not shut down");
            return false;
        }
        if self.worker_ids.contains(&thread::current().id()) {
            debug!(pool = %self.name, "not waiting for the pool from its own worker");
            return false;
        }
        true
    }

    // Every worker has left its loop; joining only reaps the threads.
    fn finish(&self) {
        let workers: Vec<_> = lock(&self.workers).drain(..).collect();
        for worker in workers {
            let name = worker.thread().name().unwrap_or("worker").to_string();
            if worker.join().is_err() {
                warn!(pool = %self.name, worker = %name, "worker exited by panic");
            }
        }
        let previous = self.state.swap(PoolState::Terminated as u8, Ordering::AcqRel);
        if previous != PoolState::Terminated as u8 {
            info!(pool = %self.name, completed = self.completed_jobs(), "pool terminated");
        }
    }

    pub fn state(&self) -> PoolState {
        PoolState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_terminated(&self) -> bool {
        self.state() == PoolState::Terminated
    }

    pub fn completed_jobs(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }
}

impl Drop for WorkerPool {
    // On one of its own workers the remaining threads are detached and exit
    // once the queue is empty.
    fn drop(&mut self) {
        if !self.is_terminated() {
            self.shutdown_and_wait();
        }
    }
}

fn spawn_worker(
    pool: &str,
    id: usize,
    receiver: Receiver<Job>,
    completed: Arc<AtomicUsize>,
    exit: WorkerExit,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("{pool}-worker-{id}"))
        .spawn(move || {
            let _exit = exit;
            // recv fails once the sender is gone and the queue is empty
            while let Ok(job) = receiver.recv() {
                job();
                completed.fetch_add(1, Ordering::AcqRel);
            }
            debug!(worker = id, "worker shutting down");
        })
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "job panicked".to_string()
    }
}

/// Pending result of a submitted job.
pub struct TaskHandle<T> {
    receiver: Receiver<std::result::Result<T, String>>,
}

impl<T> TaskHandle<T> {
    pub fn join(self) -> Result<T> {
        match self.receiver.recv() {
            Ok(outcome) => outcome.map_err(PrimerError::TaskFailed),
            Err(_) => Err(PrimerError::TaskDropped),
        }
    }

    pub fn join_timeout(self, timeout: Duration) -> Result<T> {
        match self.receiver.recv_timeout(timeout) {
            Ok(outcome) => outcome.map_err(PrimerError::TaskFailed),
            Err(RecvTimeoutError::Timeout) => Err(PrimerError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(PrimerError::TaskDropped),
        }
    }

    fn wait(self, timeout: Option<Duration>) -> Result<T> {
        match timeout {
            Some(timeout) => self.join_timeout(timeout),
            None => self.join(),
        }
    }
}

/// Result of the nested submission demo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedGreeting {
    pub inner: String,
    pub outer: String,
    pub pools_terminated: bool,
}

/// An outer job on one pool submits an inner job to a second, separately
/// sized pool and waits for it. Both pools are shut down before returning.
pub fn nested_greeting(config: &PoolConfig) -> Result<NestedGreeting> {
    let timeout = config.join_timeout_ms.map(Duration::from_millis);
    let outer_pool = WorkerPool::new("outer", config.outer_workers)?;
    let inner_pool = Arc::new(WorkerPool::new("inner", config.inner_workers)?);

    let inner = Arc::clone(&inner_pool);
    let outcome = outer_pool
        .submit(move || -> Result<(String, String)> {
            let inner_result = inner.submit(|| "hello".to_string())?.wait(timeout)?;
            debug!(result = %inner_result, "inner job finished");
            let outer_result = format!("{inner_result} master thesis");
            Ok((inner_result, outer_result))
        })?
        .wait(timeout);

    outer_pool.shutdown_and_wait();
    inner_pool.shutdown_and_wait();

    let (inner, outer) = outcome??;
    Ok(NestedGreeting {
        inner,
        outer,
        pools_terminated: outer_pool.is_terminated() && inner_pool.is_terminated(),
    })
}
