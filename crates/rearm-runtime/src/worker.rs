//! Worker threads
//!
//! Workers are OS threads that run due jobs handed over by the timer
//! thread. Each worker knows its index and, while a job runs, that job's
//! cancellation token, so callbacks can cooperate with
//! `cancel(may_interrupt_if_running = true)`.

use std::cell::{Cell, RefCell};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rearm_core::{CancellationToken, SchedError, SchedResult};
use tracing::warn;

thread_local! {
    static CURRENT_WORKER_ID: Cell<usize> = const { Cell::new(usize::MAX) };
    static CURRENT_JOB_TOKEN: RefCell<Option<CancellationToken>> = const { RefCell::new(None) };
}

/// Index of the pool worker running on this thread
#[inline]
pub fn current_worker_id() -> Option<usize> {
    let id = CURRENT_WORKER_ID.with(|c| c.get());
    (id != usize::MAX).then_some(id)
}

/// Cancellation token of the job running on this thread
pub fn current_job_token() -> Option<CancellationToken> {
    CURRENT_JOB_TOKEN.with(|t| t.borrow().clone())
}

/// True if the job running on this thread was cancelled with interruption
///
/// Long-running callbacks can poll this and return early.
pub fn is_current_job_cancelled() -> bool {
    CURRENT_JOB_TOKEN.with(|t| t.borrow().as_ref().is_some_and(|t| t.is_cancelled()))
}

/// Installs a job token for the duration of one run
pub(crate) struct JobScope {
    previous: Option<CancellationToken>,
}

impl JobScope {
    pub(crate) fn enter(token: &CancellationToken) -> Self {
        let previous = CURRENT_JOB_TOKEN.with(|t| t.borrow_mut().replace(token.clone()));
        Self { previous }
    }
}

impl Drop for JobScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_JOB_TOKEN.with(|t| *t.borrow_mut() = previous);
    }
}

/// Counts live pool threads so `await_termination` can wait on them
#[derive(Debug, Default)]
pub(crate) struct Termination {
    live: Mutex<usize>,
    all_exited: Condvar,
}

impl Termination {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Count one thread as live; the guard un-counts it when dropped
    ///
    /// Take the guard before spawning and move it into the thread.
    pub(crate) fn register(self: &Arc<Self>) -> LiveGuard {
        *self.live.lock() += 1;
        LiveGuard(Arc::clone(self))
    }

    pub(crate) fn is_terminated(&self) -> bool {
        *self.live.lock() == 0
    }

    /// Block until every registered thread exited or `timeout` passed
    pub(crate) fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut live = self.live.lock();
        while *live > 0 {
            match deadline {
                Some(deadline) => {
                    if self.all_exited.wait_until(&mut live, deadline).timed_out() {
                        return *live == 0;
                    }
                }
                None => self.all_exited.wait(&mut live),
            }
        }
        true
    }
}

pub(crate) struct LiveGuard(Arc<Termination>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        let mut live = self.0.live.lock();
        *live -= 1;
        if *live == 0 {
            self.0.all_exited.notify_all();
        }
    }
}

/// Pool of worker threads
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    num_workers: usize,
    name_prefix: String,
    stack_size: Option<usize>,
}

impl WorkerPool {
    pub fn new(num_workers: usize, name_prefix: impl Into<String>, stack_size: Option<usize>) -> Self {
        Self {
            handles: Vec::with_capacity(num_workers),
            num_workers,
            name_prefix: name_prefix.into(),
            stack_size,
        }
    }

    /// Start all worker threads
    ///
    /// Workers are named `{prefix}{n}` with `n` counting from 1. On a spawn
    /// failure the threads already started keep running; the caller must
    /// stop and `join` them.
    pub(crate) fn start<F>(&mut self, termination: &Arc<Termination>, worker_fn: F) -> SchedResult<()>
    where
        F: Fn(usize) + Send + Sync + Clone + 'static,
    {
        for i in 0..self.num_workers {
            let worker_fn = worker_fn.clone();
            let live = termination.register();

            let mut builder = thread::Builder::new().name(format!("{}{}", self.name_prefix, i + 1));
            if let Some(stack_size) = self.stack_size {
                builder = builder.stack_size(stack_size);
            }

            let handle = builder
                .spawn(move || {
                    let _live = live;
                    CURRENT_WORKER_ID.with(|c| c.set(i));
                    worker_fn(i);
                })
                .map_err(|e| SchedError::SpawnFailed(e.to_string()))?;

            self.handles.push(handle);
        }
        Ok(())
    }

    /// Wait for all workers to finish; returns how many panicked
    ///
    /// A handle belonging to the calling thread is skipped.
    pub fn join(self) -> usize {
        let me = thread::current().id();
        let mut panicked = 0;
        for handle in self.handles {
            if handle.thread().id() == me {
                continue;
            }
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                warn!(worker = %name, "worker thread panicked");
                panicked += 1;
            }
        }
        panicked
    }

    /// Threads actually started
    #[inline]
    pub fn started(&self) -> usize {
        self.handles.len()
    }
}
