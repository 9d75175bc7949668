use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Mutex;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Fixed-length usage periods.
///
/// Periods are counted in UTC from Monday 1970-01-05T00:00:00Z, so a
/// 7-day policy yields Monday-to-Monday weeks that never shift with
/// local time zones or DST.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodPolicy {
    length: Duration,
}

impl PeriodPolicy {
    pub fn weekly() -> Self {
        Self::days(7)
    }

    pub fn days(days: u32) -> Self {
        Self {
            length: Duration::days(i64::from(days.max(1))),
        }
    }

    pub fn length(&self) -> Duration {
        self.length
    }

    fn anchor() -> DateTime<Utc> {
        // 1970-01-05T00:00:00Z, the first Monday after the epoch
        Utc.timestamp_opt(4 * 86_400, 0).single().unwrap_or_default()
    }

    /// Start of the period containing `at`
    pub fn period_start(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let anchor = Self::anchor();
        let len_secs = self.length.num_seconds();
        let offset = (at - anchor).num_seconds();
        let index = offset.div_euclid(len_secs);
        anchor + Duration::seconds(index * len_secs)
    }

    pub fn period_end(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        self.period_start(at) + self.length
    }
}

impl Default for PeriodPolicy {
    fn default() -> Self {
        Self::weekly()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike, Weekday};

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_weekly_period_starts_monday_midnight() {
        let policy = PeriodPolicy::weekly();
        // Thursday
        let start = policy.period_start(at(2024, 3, 14, 15));
        assert_eq!(start.weekday(), Weekday::Mon);
        assert_eq!(start.hour(), 0);
        assert_eq!(start, at(2024, 3, 11, 0));
        assert_eq!(policy.period_end(at(2024, 3, 14, 15)), at(2024, 3, 18, 0));
    }

    #[test]
    fn test_boundary_belongs_to_new_period() {
        let policy = PeriodPolicy::weekly();
        let monday = at(2024, 3, 18, 0);
        assert_eq!(policy.period_start(monday), monday);
        assert_eq!(policy.period_start(monday - Duration::seconds(1)), at(2024, 3, 11, 0));
    }

    #[test]
    fn test_periods_are_monotonic() {
        let policy = PeriodPolicy::days(3);
        let mut t = at(2023, 12, 30, 0);
        let mut last = policy.period_start(t);
        for _ in 0..200 {
            t += Duration::hours(7);
            let start = policy.period_start(t);
            assert!(start >= last);
            assert!(start <= t && t < start + policy.length());
            last = start;
        }
    }

    #[test]
    fn test_before_anchor() {
        let policy = PeriodPolicy::weekly();
        let t = at(1970, 1, 1, 12);
        let start = policy.period_start(t);
        assert!(start <= t);
        assert_eq!(start, at(1969, 12, 29, 0));
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(at(2024, 1, 1, 0));
        clock.advance(Duration::days(2));
        assert_eq!(clock.now(), at(2024, 1, 3, 0));
    }
}
