//! Executor substrate
//!
//! The scheduler never runs callbacks itself. It hands them to an
//! `ExecutorSubstrate` as one-shot or periodic jobs and keeps the
//! returned `CancellableHandle`s. `ScheduledThreadPool` is the threaded
//! implementation; tests plug in an in-memory one.

mod job;
mod pool;

pub use job::{JobStatus, ScheduledJob};
pub use pool::{InitialTask, PoolStats, ScheduledHandle, ScheduledThreadPool};

use std::sync::Arc;
use std::time::Duration;

use rearm_core::{CallbackDescriptor, Recurrence, SchedError, SchedResult, TaskBinding};

/// Unit of work accepted by an executor
pub trait Runnable: Send + Sync + 'static {
    /// Run once on the calling thread
    fn run(&self) -> anyhow::Result<()>;

    /// Name for logs and failure reports
    fn name(&self) -> &str;
}

impl Runnable for TaskBinding {
    fn run(&self) -> anyhow::Result<()> {
        self.invoke()
    }

    fn name(&self) -> &str {
        self.function()
    }
}

/// Named closure job
pub struct FnJob<F> {
    name: &'static str,
    f: F,
}

impl<F> FnJob<F>
where
    F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
{
    pub fn new(name: &'static str, f: F) -> Self {
        Self { name, f }
    }
}

impl<F> Runnable for FnJob<F>
where
    F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn run(&self) -> anyhow::Result<()> {
        (self.f)()
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Handle to a submitted job
pub trait CancellableHandle: Send + Sync {
    /// Cancel the job; returns false if it already completed or was cancelled
    ///
    /// A job that has not started never runs. A running job is not
    /// stopped: with `may_interrupt_if_running` its cancellation token is
    /// tripped so a cooperative callback can notice. Either way a
    /// cancelled periodic job is not scheduled again.
    fn cancel(&self, may_interrupt_if_running: bool) -> bool;

    fn is_cancelled(&self) -> bool;

    /// Completed, failed or cancelled
    fn is_done(&self) -> bool;
}

/// Delayed and periodic job execution
pub trait ExecutorSubstrate: Send + Sync + 'static {
    type Handle: CancellableHandle + Clone + 'static;

    /// Run `job` once after `delay`
    fn schedule_once(&self, job: Arc<dyn Runnable>, delay: Duration) -> SchedResult<Self::Handle>;

    /// Run `job` after `initial_delay`, then every `period` measured
    /// between scheduled start times
    fn schedule_at_fixed_rate(
        &self,
        job: Arc<dyn Runnable>,
        initial_delay: Duration,
        period: Duration,
    ) -> SchedResult<Self::Handle>;

    /// Run `job` after `initial_delay`, then `period` after each completion
    fn schedule_with_fixed_delay(
        &self,
        job: Arc<dyn Runnable>,
        initial_delay: Duration,
        period: Duration,
    ) -> SchedResult<Self::Handle>;

    /// Submit a descriptor's callback per its recurrence, first run after `delay`
    fn schedule_descriptor(
        &self,
        descriptor: &CallbackDescriptor,
        delay: Duration,
    ) -> SchedResult<Self::Handle> {
        let job: Arc<dyn Runnable> = Arc::new(descriptor.binding().clone());
        match (descriptor.recurrence(), descriptor.period()) {
            (Recurrence::FixedRate, Some(period)) => self.schedule_at_fixed_rate(job, delay, period),
            (Recurrence::FixedDelay, Some(period)) => {
                self.schedule_with_fixed_delay(job, delay, period)
            }
            _ => self.schedule_once(job, delay),
        }
    }
}

/// Periods must be positive
#[inline]
pub(crate) fn check_period(period: Duration) -> SchedResult<()> {
    if period.is_zero() {
        return Err(SchedError::InvalidArgument("period must be > 0"));
    }
    Ok(())
}
