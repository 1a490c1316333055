//! Callback descriptors - the value stored per heap entry

use std::time::{Duration, Instant};

use crate::binding::TaskBinding;
use crate::time_unit::TimeUnit;

/// How the executor drives a callback after its first fire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurrence {
    /// Run once at the deadline
    OneShot,
    /// Next start = previous scheduled start + period
    FixedRate,
    /// Next start = previous completion + period
    FixedDelay,
}

impl Recurrence {
    #[inline]
    pub fn is_periodic(&self) -> bool {
        !matches!(self, Recurrence::OneShot)
    }
}

/// Deadline-bound callback
///
/// For recurring descriptors the deadline only fixes the first fire;
/// the executor's periodic primitive drives the rest.
#[derive(Debug, Clone)]
pub struct CallbackDescriptor {
    deadline: Instant,
    binding: TaskBinding,
    period: i64,
    unit: TimeUnit,
    fixed_rate: bool,
}

impl CallbackDescriptor {
    /// One-shot descriptor
    pub fn once(deadline: Instant, binding: TaskBinding) -> Self {
        Self {
            deadline,
            binding,
            period: -1,
            unit: TimeUnit::default(),
            fixed_rate: false,
        }
    }

    /// Fixed-rate descriptor; `period <= 0` degrades to one-shot
    pub fn fixed_rate(deadline: Instant, binding: TaskBinding, period: i64, unit: TimeUnit) -> Self {
        Self {
            deadline,
            binding,
            period,
            unit,
            fixed_rate: true,
        }
    }

    /// Fixed-delay descriptor; `period <= 0` degrades to one-shot
    pub fn fixed_delay(deadline: Instant, binding: TaskBinding, period: i64, unit: TimeUnit) -> Self {
        Self {
            deadline,
            binding,
            period,
            unit,
            fixed_rate: false,
        }
    }

    #[inline]
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    #[inline]
    pub fn binding(&self) -> &TaskBinding {
        &self.binding
    }

    #[inline]
    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    /// Raw period amount in `unit()`
    #[inline]
    pub fn period_amount(&self) -> i64 {
        self.period
    }

    pub fn recurrence(&self) -> Recurrence {
        if self.period <= 0 {
            Recurrence::OneShot
        } else if self.fixed_rate {
            Recurrence::FixedRate
        } else {
            Recurrence::FixedDelay
        }
    }

    /// Period as a duration, `None` for one-shot
    pub fn period(&self) -> Option<Duration> {
        if self.period <= 0 {
            return None;
        }
        Some(self.unit.to_duration(self.period as u64))
    }

    /// Time left until the deadline as seen from `now`, zero if passed
    #[inline]
    pub fn delay_from(&self, now: Instant) -> Duration {
        self.deadline.saturating_duration_since(now)
    }
}

/// Snapshot of the heap head with its delay computed at read time
#[derive(Debug, Clone)]
pub struct HeadTask {
    pub descriptor: CallbackDescriptor,
    pub delay: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(name: &'static str) -> TaskBinding {
        TaskBinding::from_fn(name, || Ok(())).unwrap()
    }

    #[test]
    fn test_recurrence_from_period() {
        let now = Instant::now();
        let once = CallbackDescriptor::once(now, noop("a"));
        let rate = CallbackDescriptor::fixed_rate(now, noop("b"), 5, TimeUnit::Seconds);
        let delay = CallbackDescriptor::fixed_delay(now, noop("c"), 5, TimeUnit::Seconds);
        let zero = CallbackDescriptor::fixed_rate(now, noop("d"), 0, TimeUnit::Seconds);
        let negative = CallbackDescriptor::fixed_delay(now, noop("e"), -3, TimeUnit::Seconds);

        assert_eq!(once.recurrence(), Recurrence::OneShot);
        assert_eq!(rate.recurrence(), Recurrence::FixedRate);
        assert_eq!(delay.recurrence(), Recurrence::FixedDelay);
        assert_eq!(zero.recurrence(), Recurrence::OneShot);
        assert_eq!(negative.recurrence(), Recurrence::OneShot);

        assert_eq!(rate.period(), Some(Duration::from_secs(5)));
        assert!(zero.period().is_none());
    }

    #[test]
    fn test_delay_never_negative() {
        let now = Instant::now();
        let past = CallbackDescriptor::once(now, noop("past"));
        let future = CallbackDescriptor::once(now + Duration::from_secs(3), noop("future"));

        assert_eq!(past.delay_from(now + Duration::from_secs(1)), Duration::ZERO);
        assert_eq!(future.delay_from(now), Duration::from_secs(3));
    }

    #[test]
    fn test_identity_ignores_deadline() {
        let now = Instant::now();
        let a = CallbackDescriptor::once(now, noop("job"));
        let b = CallbackDescriptor::once(now + Duration::from_secs(60), noop("job"));
        let c = CallbackDescriptor::once(now, noop("other"));

        assert!(a.binding().same_identity(b.binding()));
        assert!(!a.binding().same_identity(c.binding()));
    }
}
