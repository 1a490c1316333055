//! # rearm - lazy re-arming deadline scheduler
//!
//! Many pending callbacks, one outstanding timer pair. Callbacks sit in a
//! concurrent min-heap keyed by deadline; only the earliest is handed to
//! the executor, together with a trigger that arms the next one when it
//! fires.
//!
//! ## Quick Start
//!
//! ```ignore
//! use rearm::{DeadlineService, PoolConfig, TaskBinding};
//! use std::time::{Duration, Instant};
//!
//! rearm::init_logging();
//! let service = DeadlineService::start(PoolConfig::new().pool_size(2))?;
//!
//! let expire = TaskBinding::with_args("session::expire", 42u64, |id| {
//!     tracing::info!(id, "session expired");
//!     Ok(())
//! })?;
//! service
//!     .scheduler()
//!     .add_task(Instant::now() + Duration::from_secs(30), expire)?;
//!
//! service.shutdown();
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      User Code                              │
//! │           add_task(), add_if_absent(), add_descriptor()     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Scheduler                              │
//! │     DeadlineHeap + arm lock + one (callback, trigger) pair  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  ScheduledThreadPool                        │
//! │       timer thread -> ready queue -> worker threads         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// Re-export core types
pub use rearm_core::{
    AdvisoryFlag,
    CallbackDescriptor,
    CancellationToken,
    DeadlineHeap,
    HeadTask,
    Recurrence,
    SchedError,
    SchedResult,
    TaskBinding,
    TimeUnit,
    DEFAULT_INITIAL_CAPACITY,
    MAX_CAPACITY,
};

// Re-export env utilities
pub use rearm_core::{env_get, env_get_bool, env_get_opt, env_get_str};

// Re-export runtime types
pub use rearm_runtime::{
    current_job_token,
    current_worker_id,
    is_current_job_cancelled,
    CancellableHandle,
    ExecutorSubstrate,
    FnJob,
    InitialTask,
    JobStatus,
    PoolConfig,
    PoolStats,
    RearmTrigger,
    Runnable,
    ScheduledHandle,
    ScheduledThreadPool,
    Scheduler,
};

/// Install a fmt subscriber for `tracing` output
///
/// The filter comes from `RUST_LOG`, then `REARM_LOG`, then defaults to
/// `info`. Calling it again once a subscriber is installed does nothing.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_from_env("REARM_LOG"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init();
}

/// Scheduler wired to its own thread pool for the life of the process
///
/// Dropping a running service shuts it down.
pub struct DeadlineService {
    pool: Arc<ScheduledThreadPool>,
    scheduler: Arc<Scheduler<ScheduledThreadPool>>,
    config: PoolConfig,
    stopped: AtomicBool,
}

impl DeadlineService {
    /// Start the pool and build a scheduler over it
    pub fn start(config: PoolConfig) -> SchedResult<Self> {
        config.log();
        let pool = Arc::new(ScheduledThreadPool::start(&config)?);
        let scheduler = Scheduler::new(Arc::clone(&pool), config.heap_capacity)?;
        info!(workers = pool.pool_size(), "deadline service started");
        Ok(Self {
            pool,
            scheduler,
            config,
            stopped: AtomicBool::new(false),
        })
    }

    #[inline]
    pub fn scheduler(&self) -> &Arc<Scheduler<ScheduledThreadPool>> {
        &self.scheduler
    }

    #[inline]
    pub fn pool(&self) -> &Arc<ScheduledThreadPool> {
        &self.pool
    }

    #[inline]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn is_shutdown(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Cancel scheduler handles, then stop the pool
    ///
    /// The pool drains already-due one-shot jobs when
    /// `wait_for_tasks_on_shutdown` is set and cancels everything otherwise.
    /// Returns whether the pool terminated within `await_termination`
    /// (always `true` when no wait is configured).
    pub fn shutdown(&self) -> bool {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return true;
        }

        self.scheduler.shutdown();
        if self.config.wait_for_tasks_on_shutdown {
            self.pool.shutdown();
        } else {
            let cancelled = self.pool.shutdown_now();
            info!(cancelled, "pending jobs cancelled");
        }

        let wait = self.config.await_termination;
        if wait.is_zero() {
            return true;
        }
        let terminated = self.pool.await_termination(wait);
        if !terminated {
            warn!(timeout = ?wait, "pool did not terminate in time");
        }
        terminated
    }
}

impl Drop for DeadlineService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    fn config() -> PoolConfig {
        PoolConfig::new()
            .pool_size(2)
            .thread_name_prefix("rearm-test-")
            .await_termination(Duration::from_secs(5))
    }

    fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        done()
    }

    #[test]
    fn test_callbacks_fire_in_deadline_order() {
        let service = DeadlineService::start(config()).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        let now = Instant::now();

        for (name, ms) in [("third", 90u64), ("first", 30), ("second", 60)] {
            let order = Arc::clone(&order);
            let binding = TaskBinding::with_args("test::record", name, move |n| {
                order.lock().unwrap().push(*n);
                Ok(())
            })
            .unwrap();
            service
                .scheduler()
                .add_task(now + Duration::from_millis(ms), binding)
                .unwrap();
        }

        assert!(wait_until(Duration::from_secs(5), || order.lock().unwrap().len() == 3));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
        assert!(wait_until(Duration::from_secs(2), || service.scheduler().size() == 0));
        assert!(service.shutdown());
    }

    #[test]
    fn test_upsert_runs_once_at_new_deadline() {
        let service = DeadlineService::start(config()).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let now = Instant::now();

        let make = || {
            let hits = Arc::clone(&hits);
            TaskBinding::from_fn("test::upsert", move || {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap()
        };
        service.scheduler().add_task(now + Duration::from_secs(30), make()).unwrap();
        service.scheduler().add_task(now + Duration::from_millis(20), make()).unwrap();

        assert!(wait_until(Duration::from_secs(5), || hits.load(Ordering::SeqCst) == 1));
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(service.scheduler().size(), 0);
    }

    #[test]
    fn test_failing_callback_does_not_stop_chain() {
        let service = DeadlineService::start(config()).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        let now = Instant::now();

        let failing = TaskBinding::from_fn("test::fails", || anyhow::bail!("broken")).unwrap();
        service.scheduler().add_task(now + Duration::from_millis(10), failing).unwrap();

        let r = Arc::clone(&ran);
        let after = TaskBinding::from_fn("test::after", move || {
            r.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        service.scheduler().add_task(now + Duration::from_millis(40), after).unwrap();

        assert!(wait_until(Duration::from_secs(5), || ran.load(Ordering::SeqCst) == 1));
        assert!(wait_until(Duration::from_secs(2), || service.pool().stats().failed == 1));
    }

    #[test]
    fn test_huge_period_keeps_chain_alive() {
        let service = DeadlineService::start(config().pool_size(1)).unwrap();
        let beats = Arc::new(AtomicUsize::new(0));
        let later_hits = Arc::new(AtomicUsize::new(0));
        let now = Instant::now();

        let b = Arc::clone(&beats);
        let beat = TaskBinding::from_fn("test::beat", move || {
            b.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        service
            .scheduler()
            .add_descriptor(CallbackDescriptor::fixed_rate(
                now + Duration::from_millis(10),
                beat,
                i64::MAX,
                TimeUnit::Seconds,
            ))
            .unwrap();

        let l = Arc::clone(&later_hits);
        let later = TaskBinding::from_fn("test::later", move || {
            l.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        service.scheduler().add_task(now + Duration::from_millis(100), later).unwrap();

        assert!(wait_until(Duration::from_secs(5), || later_hits.load(Ordering::SeqCst) == 1));
        assert!(wait_until(Duration::from_secs(2), || service.scheduler().size() == 0));
        assert_eq!(beats.load(Ordering::SeqCst), 1);
        assert_eq!(service.pool().stats().failed, 0);
        assert!(service.shutdown());
    }

    #[test]
    fn test_shutdown_cancels_pending_and_is_idempotent() {
        let service = DeadlineService::start(config()).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let late = TaskBinding::from_fn("test::late", move || {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        service
            .scheduler()
            .add_task(Instant::now() + Duration::from_secs(60), late)
            .unwrap();

        assert!(service.shutdown());
        assert!(service.shutdown());
        assert!(service.is_shutdown());
        assert!(service.pool().is_terminated());
        assert_eq!(service.scheduler().outstanding(), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        let rejected = TaskBinding::from_fn("test::rejected", || Ok(())).unwrap();
        let err = service
            .scheduler()
            .add_task(Instant::now(), rejected)
            .unwrap_err();
        assert!(matches!(err, SchedError::Rejected(_)));
    }

    #[test]
    fn test_init_logging_twice() {
        init_logging();
        init_logging();
    }
}
