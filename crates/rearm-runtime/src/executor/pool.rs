//! Threaded executor substrate
//!
//! One timer thread orders every pending job by deadline; a fixed set of
//! worker threads runs the jobs the timer thread hands over through a
//! lock-free queue. Idle workers park until a job is queued for them.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crossbeam_queue::SegQueue;
use parking_lot::Mutex;
use rearm_core::{CallbackDescriptor, CancellationToken, SchedError, SchedResult};
use tracing::{debug, error, info, warn};

use crate::config::PoolConfig;
use crate::executor::job::CancelOutcome;
use crate::executor::{check_period, CancellableHandle, ExecutorSubstrate, JobStatus, Runnable, ScheduledJob};
use crate::parking::{new_parking, WorkerParking};
use crate::timer::{
    create_backend, deadline_after, spawn_timer_thread, TimerBackend, TimerBackendType,
    TimerControl, TimerEntry, TimerMode, TimerThreadHandle, TimerType, TimerWakeCallback,
};
use crate::worker::{LiveGuard, Termination, WorkerPool};

/// Counter snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Jobs accepted
    pub scheduled: u64,
    /// Runs completed, including failed ones
    pub executed: u64,
    /// Runs that returned an error or panicked
    pub failed: u64,
    /// Jobs cancelled before or during a run
    pub cancelled: u64,
}

#[derive(Default)]
struct Counters {
    scheduled: AtomicU64,
    executed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> PoolStats {
        PoolStats {
            scheduled: self.scheduled.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

/// State shared by the pool, its threads and its handles
struct PoolShared {
    backend: Arc<dyn TimerBackend>,
    ready: SegQueue<TimerEntry>,
    parking: Box<dyn WorkerParking>,
    control: Arc<TimerControl>,
    /// Parent of every job token; tripped by `shutdown_now`
    root_token: CancellationToken,
    timer_done: AtomicBool,
    timer_live: Mutex<Option<LiveGuard>>,
    counters: Counters,
    park_timeout: Option<Duration>,
}

impl TimerWakeCallback for PoolShared {
    fn on_timer_expired(&self, entry: TimerEntry) {
        self.ready.push(entry);
        self.parking.wake_one();
    }

    fn on_timer_stopped(&self) {
        self.timer_done.store(true, Ordering::Release);
        self.parking.wake_all();
        self.timer_live.lock().take();
    }
}

impl PoolShared {
    fn worker_loop(&self) {
        loop {
            let epoch = self.parking.prepare();
            if let Some(entry) = self.ready.pop() {
                self.run_entry(entry);
                continue;
            }
            if self.timer_done.load(Ordering::Acquire) {
                break;
            }
            self.parking.park(epoch, self.park_timeout);
        }
    }

    fn run_entry(&self, entry: TimerEntry) {
        if self.control.mode() == TimerMode::Stop {
            self.discard(&entry.job);
            return;
        }
        if !entry.job.begin_run() {
            return;
        }

        let result = entry.job.run();
        self.counters.executed.fetch_add(1, Ordering::Relaxed);

        match result {
            Ok(()) => self.after_success(entry),
            Err(err) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    job = entry.job.name(),
                    periodic = entry.job.is_periodic(),
                    error = %err,
                    "job failed"
                );
                entry.job.finish_failed(err);
            }
        }
    }

    fn after_success(&self, entry: TimerEntry) {
        let job = Arc::clone(&entry.job);
        if !job.is_periodic() {
            job.finish_done();
            return;
        }
        if self.control.mode() != TimerMode::Running {
            if job.finish_cancelled() {
                self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
            }
            return;
        }
        let Some(next) = entry.reschedule(Instant::now()) else {
            job.finish_done();
            return;
        };
        if !job.finish_rescheduled() {
            // cancelled while running
            return;
        }
        self.schedule_entry(next);
        if self.control.mode() != TimerMode::Running {
            self.cancel_pending(&job);
        }
    }

    fn schedule_entry(&self, entry: TimerEntry) {
        if self.backend.insert(entry) {
            self.control.wake();
        }
    }

    /// Cancel a job that may still sit in the backend
    fn cancel_pending(&self, job: &ScheduledJob) -> bool {
        if job.try_cancel(false) != CancelOutcome::Pending {
            return false;
        }
        self.backend.cancel(job.handle());
        self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Cancel a job already taken out of the backend
    fn discard(&self, job: &ScheduledJob) -> bool {
        if job.try_cancel(false) != CancelOutcome::Pending {
            return false;
        }
        self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
        true
    }
}

/// Handle to a job submitted to a `ScheduledThreadPool`
#[derive(Clone)]
pub struct ScheduledHandle {
    job: Arc<ScheduledJob>,
    pool: Weak<PoolShared>,
}

impl ScheduledHandle {
    #[inline]
    pub fn status(&self) -> JobStatus {
        self.job.status()
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.job.name()
    }

    /// Completed runs so far
    #[inline]
    pub fn runs(&self) -> u64 {
        self.job.runs()
    }

    /// The error that ended the job, if it failed
    pub fn failure(&self) -> Option<SchedError> {
        self.job.failure()
    }
}

impl CancellableHandle for ScheduledHandle {
    fn cancel(&self, may_interrupt_if_running: bool) -> bool {
        let outcome = self.job.try_cancel(may_interrupt_if_running);
        if outcome == CancelOutcome::Finished {
            return false;
        }
        if let Some(pool) = self.pool.upgrade() {
            if outcome == CancelOutcome::Pending {
                pool.backend.cancel(self.job.handle());
                if pool.control.mode() == TimerMode::Drain {
                    // may have been the last thing the timer thread waits for
                    pool.control.wake();
                }
            }
            pool.counters.cancelled.fetch_add(1, Ordering::Relaxed);
        }
        true
    }

    fn is_cancelled(&self) -> bool {
        self.job.status() == JobStatus::Cancelled
    }

    fn is_done(&self) -> bool {
        self.job.status().is_terminal()
    }
}

impl std::fmt::Debug for ScheduledHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ScheduledHandle").field(&self.job).finish()
    }
}

/// Job registered while the pool starts
pub struct InitialTask {
    pub job: Arc<dyn Runnable>,
    pub delay: Duration,
    pub timer_type: TimerType,
}

impl InitialTask {
    pub fn once(job: Arc<dyn Runnable>, delay: Duration) -> Self {
        Self {
            job,
            delay,
            timer_type: TimerType::Once,
        }
    }

    pub fn at_fixed_rate(job: Arc<dyn Runnable>, initial_delay: Duration, period: Duration) -> Self {
        Self {
            job,
            delay: initial_delay,
            timer_type: TimerType::FixedRate { period },
        }
    }

    pub fn with_fixed_delay(job: Arc<dyn Runnable>, initial_delay: Duration, period: Duration) -> Self {
        Self {
            job,
            delay: initial_delay,
            timer_type: TimerType::FixedDelay { period },
        }
    }

    /// Task for a descriptor; the first run is at its deadline
    pub fn from_descriptor(descriptor: &CallbackDescriptor) -> Self {
        Self {
            job: Arc::new(descriptor.binding().clone()),
            delay: descriptor.delay_from(Instant::now()),
            timer_type: TimerType::from_recurrence(descriptor.recurrence(), descriptor.period()),
        }
    }
}

/// Timer thread plus worker threads running delayed and periodic jobs
///
/// # Example
///
/// ```ignore
/// let pool = ScheduledThreadPool::start(&PoolConfig::new().pool_size(2))?;
/// let job: Arc<dyn Runnable> = Arc::new(FnJob::new("tick", || Ok(())));
/// let handle = pool.schedule_at_fixed_rate(job, Duration::ZERO, Duration::from_secs(1))?;
/// // ...
/// handle.cancel(false);
/// pool.shutdown();
/// pool.await_termination(Duration::from_secs(5));
/// ```
pub struct ScheduledThreadPool {
    shared: Arc<PoolShared>,
    timer: Mutex<Option<TimerThreadHandle>>,
    workers: Mutex<Option<WorkerPool>>,
    termination: Arc<Termination>,
    pool_size: usize,
}

impl ScheduledThreadPool {
    /// Spawn the timer thread and `config.pool_size` workers
    pub fn start(config: &PoolConfig) -> SchedResult<Self> {
        Self::start_with(config, Vec::new()).map(|(pool, _)| pool)
    }

    /// Start and register `initial` tasks before returning
    pub fn start_with<I>(config: &PoolConfig, initial: I) -> SchedResult<(Self, Vec<ScheduledHandle>)>
    where
        I: IntoIterator<Item = InitialTask>,
    {
        config.validate()?;

        let termination = Termination::new();
        let control = Arc::new(TimerControl::new());
        let backend = create_backend(TimerBackendType::default());
        let shared = Arc::new(PoolShared {
            backend: Arc::clone(&backend),
            ready: SegQueue::new(),
            parking: new_parking(),
            control: Arc::clone(&control),
            root_token: CancellationToken::new(),
            timer_done: AtomicBool::new(false),
            timer_live: Mutex::new(Some(termination.register())),
            counters: Counters::default(),
            park_timeout: config.park_timeout,
        });

        let timer = match spawn_timer_thread(
            backend,
            Arc::clone(&shared),
            control,
            config.timer_thread_config(),
        ) {
            Ok(timer) => timer,
            Err(err) => {
                shared.timer_live.lock().take();
                return Err(err);
            }
        };

        let mut workers = WorkerPool::new(
            config.pool_size,
            config.thread_name_prefix.clone(),
            config.thread_stack_size,
        );
        let worker_shared = Arc::clone(&shared);
        if let Err(err) = workers.start(&termination, move |_| worker_shared.worker_loop()) {
            error!(error = %err, started = workers.started(), "worker spawn failed, stopping pool");
            shared.control.request_stop();
            shared.parking.wake_all();
            if timer.join().is_err() {
                warn!("timer thread panicked");
            }
            workers.join();
            return Err(err);
        }

        let pool = Self {
            shared,
            timer: Mutex::new(Some(timer)),
            workers: Mutex::new(Some(workers)),
            termination,
            pool_size: config.pool_size,
        };
        info!(
            pool_size = config.pool_size,
            prefix = %config.thread_name_prefix,
            "scheduled thread pool started"
        );

        let handles = initial
            .into_iter()
            .map(|task| pool.submit(task.job, task.delay, task.timer_type))
            .collect::<SchedResult<Vec<_>>>()?;
        if !handles.is_empty() {
            debug!(count = handles.len(), "initial tasks registered");
        }

        Ok((pool, handles))
    }

    fn submit(
        &self,
        job: Arc<dyn Runnable>,
        delay: Duration,
        timer_type: TimerType,
    ) -> SchedResult<ScheduledHandle> {
        if self.is_shutdown() {
            return Err(SchedError::Rejected("executor has been shut down"));
        }
        if let Some(period) = timer_type.period() {
            check_period(period)?;
        }

        let deadline = deadline_after(Instant::now(), delay);
        let scheduled = ScheduledJob::with_token(
            job,
            timer_type.is_periodic(),
            self.shared.root_token.child(),
        );
        self.shared
            .schedule_entry(TimerEntry::at(Arc::clone(&scheduled), deadline, timer_type));

        // Lost a race with shutdown: the timer thread may never see it
        let rejected = match self.shared.control.mode() {
            TimerMode::Running => false,
            TimerMode::Drain => scheduled.is_periodic(),
            TimerMode::Stop => true,
        };
        if rejected {
            self.shared.cancel_pending(&scheduled);
            return Err(SchedError::Rejected("executor has been shut down"));
        }

        self.shared.counters.scheduled.fetch_add(1, Ordering::Relaxed);
        Ok(ScheduledHandle {
            job: scheduled,
            pool: Arc::downgrade(&self.shared),
        })
    }

    /// Stop accepting work
    ///
    /// One-shot jobs already submitted still run at their deadlines;
    /// periodic jobs are cancelled. Threads exit once nothing is left.
    pub fn shutdown(&self) {
        let shared = &self.shared;
        let mut cancelled = 0;
        let switched = shared.control.drain_with(|| {
            for entry in shared.backend.drain() {
                if entry.job.is_periodic() {
                    if shared.discard(&entry.job) {
                        cancelled += 1;
                    }
                } else {
                    shared.backend.insert(entry);
                }
            }
        });
        if !switched {
            return;
        }
        info!(cancelled_periodic = cancelled, "pool shutting down");
        self.shared.parking.wake_all();
    }

    /// Stop accepting work and cancel everything not yet running
    ///
    /// Returns the number of jobs cancelled. Running jobs finish their
    /// current run and are not rescheduled.
    pub fn shutdown_now(&self) -> usize {
        self.shared.control.request_stop();
        self.shared.root_token.cancel();
        let mut cancelled = 0;
        for entry in self.shared.backend.drain() {
            if self.shared.discard(&entry.job) {
                cancelled += 1;
            }
        }
        while let Some(entry) = self.shared.ready.pop() {
            if self.shared.discard(&entry.job) {
                cancelled += 1;
            }
        }
        self.shared.parking.wake_all();
        info!(cancelled, "pool stopped");
        cancelled
    }

    /// Wait until every pool thread exited; false on timeout
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let terminated = self.termination.wait(timeout);
        if terminated {
            self.reap();
        }
        terminated
    }

    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.shared.control.mode() != TimerMode::Running
    }

    #[inline]
    pub fn is_terminated(&self) -> bool {
        self.termination.is_terminated()
    }

    pub fn stats(&self) -> PoolStats {
        self.shared.counters.snapshot()
    }

    /// Jobs waiting for their deadline or for a worker
    pub fn pending(&self) -> usize {
        self.shared.backend.len() + self.shared.ready.len()
    }

    #[inline]
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Join finished threads and log how they ended
    fn reap(&self) {
        if let Some(timer) = self.timer.lock().take() {
            if timer.thread_id() == std::thread::current().id() {
                return;
            }
            match timer.join() {
                Ok(stats) => debug!(
                    polls = stats.poll_count,
                    fired = stats.timers_fired,
                    poll_time = ?stats.poll_time,
                    "timer thread joined"
                ),
                Err(err) => warn!(error = %err, "timer thread ended abnormally"),
            }
        }
        if let Some(workers) = self.workers.lock().take() {
            let panicked = workers.join();
            if panicked > 0 {
                warn!(panicked, "worker threads panicked");
            }
        }
    }
}

impl ExecutorSubstrate for ScheduledThreadPool {
    type Handle = ScheduledHandle;

    fn schedule_once(&self, job: Arc<dyn Runnable>, delay: Duration) -> SchedResult<ScheduledHandle> {
        self.submit(job, delay, TimerType::Once)
    }

    fn schedule_at_fixed_rate(
        &self,
        job: Arc<dyn Runnable>,
        initial_delay: Duration,
        period: Duration,
    ) -> SchedResult<ScheduledHandle> {
        self.submit(job, initial_delay, TimerType::FixedRate { period })
    }

    fn schedule_with_fixed_delay(
        &self,
        job: Arc<dyn Runnable>,
        initial_delay: Duration,
        period: Duration,
    ) -> SchedResult<ScheduledHandle> {
        self.submit(job, initial_delay, TimerType::FixedDelay { period })
    }
}

impl Drop for ScheduledThreadPool {
    fn drop(&mut self) {
        if !self.is_terminated() {
            self.shutdown_now();
        }
        self.reap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::FnJob;
    use crate::worker::is_current_job_cancelled;
    use std::sync::atomic::AtomicUsize;

    fn pool(workers: usize) -> ScheduledThreadPool {
        let config = PoolConfig::new()
            .pool_size(workers)
            .thread_name_prefix("pool-test-");
        ScheduledThreadPool::start(&config).unwrap()
    }

    fn counting(name: &'static str, hits: &Arc<AtomicUsize>) -> Arc<dyn Runnable> {
        let hits = Arc::clone(hits);
        Arc::new(FnJob::new(name, move || {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
    }

    fn wait_until(cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        cond()
    }

    #[test]
    fn test_one_shot_runs_once() {
        let pool = pool(2);
        let hits = Arc::new(AtomicUsize::new(0));
        let start = Instant::now();
        let handle = pool
            .schedule_once(counting("once", &hits), Duration::from_millis(20))
            .unwrap();

        assert!(wait_until(|| handle.is_done()));
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(handle.status(), JobStatus::Done);
        assert!(!handle.cancel(false));

        let stats = pool.stats();
        assert_eq!(stats.scheduled, 1);
        assert_eq!(stats.executed, 1);
    }

    #[test]
    fn test_cancel_before_deadline() {
        let pool = pool(1);
        let hits = Arc::new(AtomicUsize::new(0));
        let handle = pool
            .schedule_once(counting("never", &hits), Duration::from_millis(50))
            .unwrap();

        assert!(handle.cancel(false));
        assert!(handle.is_cancelled());
        assert!(handle.is_done());
        assert!(!handle.cancel(false));

        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(pool.stats().cancelled, 1);
        assert_eq!(pool.pending(), 0);
    }

    #[test]
    fn test_fixed_rate_repeats_until_cancelled() {
        let pool = pool(1);
        let hits = Arc::new(AtomicUsize::new(0));
        let handle = pool
            .schedule_at_fixed_rate(counting("tick", &hits), Duration::ZERO, Duration::from_millis(5))
            .unwrap();

        assert!(wait_until(|| hits.load(Ordering::SeqCst) >= 3));
        assert!(handle.cancel(false));
        let seen = hits.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(50));

        // at most the run in flight when cancelled
        assert!(hits.load(Ordering::SeqCst) <= seen + 1);
        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_fixed_delay_spacing() {
        let pool = pool(1);
        let stamps = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&stamps);
        let period = Duration::from_millis(10);
        let job: Arc<dyn Runnable> = Arc::new(FnJob::new("spaced", move || {
            recorder.lock().push(Instant::now());
            std::thread::sleep(Duration::from_millis(5));
            Ok(())
        }));

        let handle = pool
            .schedule_with_fixed_delay(job, Duration::ZERO, period)
            .unwrap();
        assert!(wait_until(|| stamps.lock().len() >= 3));
        handle.cancel(false);

        let stamps = stamps.lock();
        for pair in stamps.windows(2) {
            // 5ms run + 10ms delay between starts
            assert!(pair[1] - pair[0] >= Duration::from_millis(15));
        }
    }

    #[test]
    fn test_periodic_never_overlaps() {
        let pool = pool(4);
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));
        let runs = Arc::new(AtomicUsize::new(0));
        let (a, m, r) = (Arc::clone(&active), Arc::clone(&max_active), Arc::clone(&runs));

        let job: Arc<dyn Runnable> = Arc::new(FnJob::new("slow", move || {
            let now = a.fetch_add(1, Ordering::SeqCst) + 1;
            m.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(5));
            a.fetch_sub(1, Ordering::SeqCst);
            r.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        let handle = pool
            .schedule_at_fixed_rate(job, Duration::ZERO, Duration::from_millis(1))
            .unwrap();
        assert!(wait_until(|| runs.load(Ordering::SeqCst) >= 5));
        handle.cancel(false);

        assert_eq!(max_active.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_periodic_not_rescheduled() {
        let pool = pool(1);
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let job: Arc<dyn Runnable> = Arc::new(FnJob::new("flaky", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("downstream unavailable")
        }));

        let handle = pool
            .schedule_at_fixed_rate(job, Duration::ZERO, Duration::from_millis(2))
            .unwrap();
        assert!(wait_until(|| handle.is_done()));
        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(handle.status(), JobStatus::Failed);
        assert!(matches!(
            handle.failure(),
            Some(SchedError::CallbackFailed { ref function, .. }) if function == "flaky"
        ));
        assert_eq!(pool.stats().failed, 1);
    }

    #[test]
    fn test_panicking_job_does_not_kill_worker() {
        let pool = pool(1);
        let hits = Arc::new(AtomicUsize::new(0));
        let bad: Arc<dyn Runnable> = Arc::new(FnJob::new("panics", || panic!("callback bug")));

        let bad_handle = pool.schedule_once(bad, Duration::ZERO).unwrap();
        let good_handle = pool
            .schedule_once(counting("after", &hits), Duration::from_millis(5))
            .unwrap();

        assert!(wait_until(|| good_handle.is_done()));
        assert_eq!(bad_handle.status(), JobStatus::Failed);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_interrupt_is_cooperative() {
        let pool = pool(1);
        let started = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&started);
        let job: Arc<dyn Runnable> = Arc::new(FnJob::new("long", move || {
            flag.store(true, Ordering::SeqCst);
            while !is_current_job_cancelled() {
                std::thread::sleep(Duration::from_millis(1));
            }
            Ok(())
        }));

        let handle = pool.schedule_once(job, Duration::ZERO).unwrap();
        assert!(wait_until(|| started.load(Ordering::SeqCst)));
        assert!(handle.cancel(true));

        pool.shutdown();
        assert!(pool.await_termination(Duration::from_secs(5)));
        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_huge_period_does_not_kill_worker() {
        let pool = pool(1);
        let beats = Arc::new(AtomicUsize::new(0));
        let hits = Arc::new(AtomicUsize::new(0));
        let beat = pool
            .schedule_at_fixed_rate(counting("beat", &beats), Duration::ZERO, Duration::MAX)
            .unwrap();
        let later = pool
            .schedule_once(counting("later", &hits), Duration::from_millis(20))
            .unwrap();

        assert!(wait_until(|| later.is_done()));
        assert_eq!(beats.load(Ordering::SeqCst), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(beat.status(), JobStatus::Scheduled);
        assert!(beat.cancel(false));
    }

    #[test]
    fn test_idle_pool_wakes_for_new_work() {
        let pool = pool(2);
        let hits = Arc::new(AtomicUsize::new(0));
        let far = pool
            .schedule_once(counting("far", &hits), Duration::from_secs(60))
            .unwrap();
        // let every thread settle into an untimed park
        std::thread::sleep(Duration::from_millis(50));

        let start = Instant::now();
        let soon = pool
            .schedule_once(counting("soon", &hits), Duration::from_millis(5))
            .unwrap();
        assert!(wait_until(|| soon.is_done()));
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(far.status(), JobStatus::Scheduled);
    }

    #[test]
    fn test_cancel_last_job_ends_drain() {
        let pool = pool(1);
        let hits = Arc::new(AtomicUsize::new(0));
        let far = pool
            .schedule_once(counting("far", &hits), Duration::from_secs(60))
            .unwrap();

        pool.shutdown();
        assert!(!pool.await_termination(Duration::from_millis(20)));
        assert!(far.cancel(false));
        assert!(pool.await_termination(Duration::from_secs(5)));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_zero_period_rejected() {
        let pool = pool(1);
        let hits = Arc::new(AtomicUsize::new(0));
        let err = pool
            .schedule_at_fixed_rate(counting("bad", &hits), Duration::ZERO, Duration::ZERO)
            .unwrap_err();
        assert!(matches!(err, SchedError::InvalidArgument(_)));
    }

    #[test]
    fn test_graceful_shutdown() {
        let pool = pool(2);
        let once_hits = Arc::new(AtomicUsize::new(0));
        let tick_hits = Arc::new(AtomicUsize::new(0));

        let once = pool
            .schedule_once(counting("last-call", &once_hits), Duration::from_millis(20))
            .unwrap();
        let tick = pool
            .schedule_at_fixed_rate(counting("tick", &tick_hits), Duration::from_millis(10), Duration::from_millis(10))
            .unwrap();

        pool.shutdown();
        assert!(pool.is_shutdown());
        assert!(matches!(
            pool.schedule_once(counting("late", &once_hits), Duration::ZERO),
            Err(SchedError::Rejected(_))
        ));

        assert!(pool.await_termination(Duration::from_secs(5)));
        assert!(pool.is_terminated());
        assert_eq!(once_hits.load(Ordering::SeqCst), 1);
        assert_eq!(once.status(), JobStatus::Done);
        assert!(tick.is_cancelled());
    }

    #[test]
    fn test_shutdown_now_cancels_pending() {
        let pool = pool(1);
        let hits = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..3)
            .map(|_| {
                pool.schedule_once(counting("pending", &hits), Duration::from_secs(60))
                    .unwrap()
            })
            .collect();

        assert_eq!(pool.shutdown_now(), 3);
        assert!(pool.await_termination(Duration::from_secs(5)));
        assert!(handles.iter().all(|h| h.is_cancelled()));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(pool.stats().cancelled, 3);
    }

    #[test]
    fn test_shutdown_now_signals_running_job() {
        let pool = pool(1);
        let started = Arc::new(AtomicBool::new(false));
        let observed = Arc::new(AtomicBool::new(false));
        let (s, o) = (Arc::clone(&started), Arc::clone(&observed));
        let job: Arc<dyn Runnable> = Arc::new(FnJob::new("cooperative", move || {
            s.store(true, Ordering::SeqCst);
            let start = Instant::now();
            while start.elapsed() < Duration::from_secs(5) {
                if is_current_job_cancelled() {
                    o.store(true, Ordering::SeqCst);
                    break;
                }
                std::thread::sleep(Duration::from_millis(1));
            }
            Ok(())
        }));
        let handle = pool.schedule_once(job, Duration::ZERO).unwrap();

        assert!(wait_until(|| started.load(Ordering::SeqCst)));
        pool.shutdown_now();
        assert!(pool.await_termination(Duration::from_secs(5)));
        assert!(observed.load(Ordering::SeqCst));
        assert_eq!(handle.status(), JobStatus::Done);
    }

    #[test]
    fn test_initial_tasks_registered_at_start() {
        let hits = Arc::new(AtomicUsize::new(0));
        let config = PoolConfig::new().pool_size(1);
        let (pool, handles) = ScheduledThreadPool::start_with(
            &config,
            vec![
                InitialTask::once(counting("boot", &hits), Duration::ZERO),
                InitialTask::with_fixed_delay(counting("poll", &hits), Duration::ZERO, Duration::from_millis(5)),
            ],
        )
        .unwrap();

        assert_eq!(handles.len(), 2);
        assert!(wait_until(|| hits.load(Ordering::SeqCst) >= 3));
        assert_eq!(handles[0].status(), JobStatus::Done);
        handles[1].cancel(false);
        drop(pool);
    }

    #[test]
    fn test_await_termination_times_out_while_running() {
        let pool = pool(1);
        let hits = Arc::new(AtomicUsize::new(0));
        pool.schedule_once(counting("far", &hits), Duration::from_secs(60))
            .unwrap();

        pool.shutdown();
        assert!(!pool.await_termination(Duration::from_millis(20)));
        pool.shutdown_now();
        assert!(pool.await_termination(Duration::from_secs(5)));
    }
}
