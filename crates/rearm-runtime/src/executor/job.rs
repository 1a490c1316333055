//! Per-job state shared by the pool, its workers and the handles

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rearm_core::{CancellationToken, SchedError};

use crate::executor::Runnable;
use crate::timer::TimerHandle;
use crate::worker::JobScope;

/// Lifecycle of a submitted job
///
/// ```text
/// Scheduled ──► Running ──► Done
///    │  ▲          │  └───► Failed
///    │  └─periodic─┘
///    └──────────────┴─────► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum JobStatus {
    Scheduled = 0,
    Running = 1,
    Done = 2,
    Cancelled = 3,
    Failed = 4,
}

impl JobStatus {
    #[inline]
    fn from_u8(v: u8) -> Self {
        match v {
            0 => JobStatus::Scheduled,
            1 => JobStatus::Running,
            2 => JobStatus::Done,
            3 => JobStatus::Cancelled,
            _ => JobStatus::Failed,
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Cancelled | JobStatus::Failed)
    }
}

/// What `try_cancel` found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CancelOutcome {
    /// Was waiting for its deadline; will never run
    Pending,
    /// Was running; will not run again
    Running,
    /// Already finished or cancelled
    Finished,
}

/// Submitted job with its lifecycle state
pub struct ScheduledJob {
    handle: TimerHandle,
    runnable: Arc<dyn Runnable>,
    periodic: bool,
    state: AtomicU8,
    token: CancellationToken,
    failure: Mutex<Option<SchedError>>,
    runs: AtomicU64,
}

impl ScheduledJob {
    pub fn new(runnable: Arc<dyn Runnable>, periodic: bool) -> Arc<Self> {
        Self::with_token(runnable, periodic, CancellationToken::new())
    }

    /// Job observing `token`, usually a child of its pool's root token
    pub fn with_token(runnable: Arc<dyn Runnable>, periodic: bool, token: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            handle: TimerHandle::new(),
            runnable,
            periodic,
            state: AtomicU8::new(JobStatus::Scheduled as u8),
            token,
            failure: Mutex::new(None),
            runs: AtomicU64::new(0),
        })
    }

    #[inline]
    pub fn handle(&self) -> TimerHandle {
        self.handle
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.runnable.name()
    }

    #[inline]
    pub fn is_periodic(&self) -> bool {
        self.periodic
    }

    #[inline]
    pub fn status(&self) -> JobStatus {
        JobStatus::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Waiting for its next deadline
    #[inline]
    pub fn is_pending(&self) -> bool {
        self.status() == JobStatus::Scheduled
    }

    /// Completed runs, successful or not
    #[inline]
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    /// Token tripped by `cancel(true)`
    #[inline]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Error of the run that failed, if any
    pub fn failure(&self) -> Option<SchedError> {
        self.failure.lock().clone()
    }

    #[inline]
    fn transition(&self, from: JobStatus, to: JobStatus) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn try_cancel(&self, may_interrupt_if_running: bool) -> CancelOutcome {
        loop {
            match self.status() {
                JobStatus::Scheduled => {
                    if self.transition(JobStatus::Scheduled, JobStatus::Cancelled) {
                        self.token.cancel();
                        return CancelOutcome::Pending;
                    }
                }
                JobStatus::Running => {
                    if self.transition(JobStatus::Running, JobStatus::Cancelled) {
                        if may_interrupt_if_running {
                            self.token.cancel();
                        }
                        return CancelOutcome::Running;
                    }
                }
                _ => return CancelOutcome::Finished,
            }
        }
    }

    /// Claim the job for a run; false if it was cancelled meanwhile
    #[inline]
    pub(crate) fn begin_run(&self) -> bool {
        self.transition(JobStatus::Scheduled, JobStatus::Running)
    }

    /// Run the callback, turning a panic into a `CallbackFailed`
    pub(crate) fn run(&self) -> Result<(), SchedError> {
        let _scope = JobScope::enter(&self.token);
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.runnable.run()));
        self.runs.fetch_add(1, Ordering::Relaxed);
        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(SchedError::callback_failed(self.name(), &err)),
            Err(payload) => Err(SchedError::CallbackFailed {
                function: self.name().to_string(),
                message: format!("panicked: {}", panic_message(payload.as_ref())),
            }),
        }
    }

    /// Back to `Scheduled` for the next period; false if cancelled mid-run
    #[inline]
    pub(crate) fn finish_rescheduled(&self) -> bool {
        self.transition(JobStatus::Running, JobStatus::Scheduled)
    }

    #[inline]
    pub(crate) fn finish_done(&self) -> bool {
        self.transition(JobStatus::Running, JobStatus::Done)
    }

    /// Running -> Cancelled after a run whose reschedule was suppressed
    #[inline]
    pub(crate) fn finish_cancelled(&self) -> bool {
        self.transition(JobStatus::Running, JobStatus::Cancelled)
    }

    /// Record a failed run; the state stays `Cancelled` if it was cancelled mid-run
    pub(crate) fn finish_failed(&self, err: SchedError) {
        *self.failure.lock() = Some(err);
        self.transition(JobStatus::Running, JobStatus::Failed);
    }
}

impl std::fmt::Debug for ScheduledJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledJob")
            .field("handle", &self.handle)
            .field("name", &self.name())
            .field("periodic", &self.periodic)
            .field("status", &self.status())
            .field("runs", &self.runs())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
