//! Timer entry and handle types

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rearm_core::Recurrence;

use crate::executor::ScheduledJob;

/// Offset used when `base + delay` is not representable as an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// `base + delay`, or a far-future deadline when that overflows
pub(crate) fn deadline_after(base: Instant, delay: Duration) -> Instant {
    base.checked_add(delay)
        .or_else(|| base.checked_add(FAR_FUTURE))
        .unwrap_or(base)
}

/// Globally unique timer handle for cancellation
///
/// A periodic job keeps its handle across reschedules, so cancelling the
/// handle cancels every future run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(pub u64);

impl TimerHandle {
    /// Generate a new unique timer handle
    #[inline]
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        TimerHandle(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for TimerHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// How an entry is rescheduled after it runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerType {
    /// Runs once
    Once,

    /// Next deadline = previous deadline + period
    FixedRate { period: Duration },

    /// Next deadline = completion + period
    FixedDelay { period: Duration },
}

impl TimerType {
    /// Timer type for a recurrence and period
    ///
    /// A periodic recurrence without a usable period runs once.
    pub fn from_recurrence(recurrence: Recurrence, period: Option<Duration>) -> Self {
        match (recurrence, period) {
            (Recurrence::FixedRate, Some(period)) if !period.is_zero() => {
                TimerType::FixedRate { period }
            }
            (Recurrence::FixedDelay, Some(period)) if !period.is_zero() => {
                TimerType::FixedDelay { period }
            }
            _ => TimerType::Once,
        }
    }

    #[inline]
    pub fn is_periodic(&self) -> bool {
        !matches!(self, TimerType::Once)
    }

    #[inline]
    pub fn period(&self) -> Option<Duration> {
        match self {
            TimerType::Once => None,
            TimerType::FixedRate { period } | TimerType::FixedDelay { period } => Some(*period),
        }
    }
}

/// Timer entry - stored in the timer backend
///
/// Carries the deadline, the reschedule policy and the job to hand to a
/// worker when the deadline passes.
#[derive(Clone)]
pub struct TimerEntry {
    pub handle: TimerHandle,
    pub deadline: Instant,
    pub timer_type: TimerType,
    pub job: Arc<ScheduledJob>,
}

impl TimerEntry {
    /// Entry firing at an absolute deadline; uses the job's handle
    pub fn at(job: Arc<ScheduledJob>, deadline: Instant, timer_type: TimerType) -> Self {
        Self {
            handle: job.handle(),
            deadline,
            timer_type,
            job,
        }
    }

    /// Entry firing `delay` from now
    #[inline]
    pub fn after(job: Arc<ScheduledJob>, delay: Duration, timer_type: TimerType) -> Self {
        Self::at(job, deadline_after(Instant::now(), delay), timer_type)
    }

    /// Next entry for a periodic job that finished at `completed_at`
    ///
    /// Returns None for one-shot entries. The handle is kept.
    pub fn reschedule(&self, completed_at: Instant) -> Option<Self> {
        let deadline = match self.timer_type {
            TimerType::Once => return None,
            TimerType::FixedRate { period } => deadline_after(self.deadline, period),
            TimerType::FixedDelay { period } => deadline_after(completed_at, period),
        };
        Some(Self {
            handle: self.handle,
            deadline,
            timer_type: self.timer_type,
            job: Arc::clone(&self.job),
        })
    }
}

impl std::fmt::Debug for TimerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerEntry")
            .field("handle", &self.handle)
            .field("deadline", &self.deadline)
            .field("timer_type", &self.timer_type)
            .field("job", &self.job.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::FnJob;

    fn job(name: &'static str) -> Arc<ScheduledJob> {
        ScheduledJob::new(Arc::new(FnJob::new(name, || Ok(()))), false)
    }

    #[test]
    fn test_handle_uniqueness() {
        let handles: Vec<_> = (0..1000).map(|_| TimerHandle::new()).collect();
        let unique: std::collections::HashSet<_> = handles.iter().collect();
        assert_eq!(handles.len(), unique.len());
    }

    #[test]
    fn test_entry_uses_job_handle() {
        let job = job("a");
        let entry = TimerEntry::after(Arc::clone(&job), Duration::from_millis(10), TimerType::Once);
        assert_eq!(entry.handle, job.handle());
        assert!(entry.deadline > Instant::now());
    }

    #[test]
    fn test_fixed_rate_keeps_cadence() {
        let start = Instant::now();
        let period = Duration::from_millis(100);
        let entry = TimerEntry::at(job("rate"), start, TimerType::FixedRate { period });

        // Completion time is irrelevant for fixed-rate
        let next = entry.reschedule(start + Duration::from_millis(70)).unwrap();
        assert_eq!(next.deadline, start + period);
        assert_eq!(next.handle, entry.handle);
    }

    #[test]
    fn test_reschedule_huge_period_saturates() {
        let start = Instant::now();
        let period = Duration::MAX;
        let rate = TimerEntry::at(job("rate"), start, TimerType::FixedRate { period });
        let delay = TimerEntry::at(job("delay"), start, TimerType::FixedDelay { period });

        let next = rate.reschedule(start).unwrap();
        assert!(next.deadline >= start + Duration::from_secs(60 * 60 * 24 * 365));
        let next = delay.reschedule(start).unwrap();
        assert!(next.deadline > start);

        let far = TimerEntry::after(job("far"), Duration::MAX, TimerType::Once);
        assert!(far.deadline > start);
    }

    #[test]
    fn test_deadline_after_exact_when_representable() {
        let base = Instant::now();
        let d = Duration::from_millis(250);
        assert_eq!(deadline_after(base, d), base + d);
        assert_eq!(deadline_after(base, Duration::ZERO), base);
    }

    #[test]
    fn test_fixed_delay_counts_from_completion() {
        let start = Instant::now();
        let period = Duration::from_millis(100);
        let entry = TimerEntry::at(job("delay"), start, TimerType::FixedDelay { period });

        let done = start + Duration::from_millis(70);
        let next = entry.reschedule(done).unwrap();
        assert_eq!(next.deadline, done + period);
    }

    #[test]
    fn test_once_no_reschedule() {
        let entry = TimerEntry::after(job("once"), Duration::ZERO, TimerType::Once);
        assert!(entry.reschedule(Instant::now()).is_none());
    }

    #[test]
    fn test_from_recurrence() {
        let p = Some(Duration::from_secs(1));
        assert_eq!(
            TimerType::from_recurrence(Recurrence::FixedRate, p),
            TimerType::FixedRate { period: Duration::from_secs(1) }
        );
        assert!(TimerType::from_recurrence(Recurrence::FixedDelay, p).is_periodic());
        assert_eq!(TimerType::from_recurrence(Recurrence::OneShot, p), TimerType::Once);
        assert_eq!(
            TimerType::from_recurrence(Recurrence::FixedRate, Some(Duration::ZERO)),
            TimerType::Once
        );
    }
}
