//! Time units for recurrence periods

use std::time::Duration;

/// Granularity of a period amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    #[default]
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Convert `amount` of this unit into a `Duration`
    ///
    /// Saturates at `Duration::MAX` instead of overflowing.
    pub fn to_duration(self, amount: u64) -> Duration {
        match self {
            TimeUnit::Nanoseconds => Duration::from_nanos(amount),
            TimeUnit::Microseconds => Duration::from_micros(amount),
            TimeUnit::Milliseconds => Duration::from_millis(amount),
            TimeUnit::Seconds => Duration::from_secs(amount),
            TimeUnit::Minutes => secs_saturating(amount, 60),
            TimeUnit::Hours => secs_saturating(amount, 60 * 60),
            TimeUnit::Days => secs_saturating(amount, 24 * 60 * 60),
        }
    }

    /// Short suffix used in log output
    pub fn suffix(self) -> &'static str {
        match self {
            TimeUnit::Nanoseconds => "ns",
            TimeUnit::Microseconds => "us",
            TimeUnit::Milliseconds => "ms",
            TimeUnit::Seconds => "s",
            TimeUnit::Minutes => "min",
            TimeUnit::Hours => "h",
            TimeUnit::Days => "d",
        }
    }
}

#[inline]
fn secs_saturating(amount: u64, factor: u64) -> Duration {
    amount
        .checked_mul(factor)
        .map(Duration::from_secs)
        .unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(TimeUnit::Nanoseconds.to_duration(5), Duration::from_nanos(5));
        assert_eq!(TimeUnit::Milliseconds.to_duration(250), Duration::from_millis(250));
        assert_eq!(TimeUnit::Minutes.to_duration(2), Duration::from_secs(120));
        assert_eq!(TimeUnit::Days.to_duration(1), Duration::from_secs(86_400));
    }

    #[test]
    fn test_saturates() {
        assert_eq!(TimeUnit::Days.to_duration(u64::MAX), Duration::MAX);
    }

    #[test]
    fn test_suffixes() {
        assert_eq!(TimeUnit::Microseconds.suffix(), "us");
        assert_eq!(TimeUnit::Minutes.suffix(), "min");
        assert_eq!(TimeUnit::Days.suffix(), "d");
    }

    #[test]
    fn test_default_is_millis() {
        assert_eq!(TimeUnit::default(), TimeUnit::Milliseconds);
    }
}
