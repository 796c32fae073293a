//! The demo countdown.
//!
//! Only the start instant is stored.  Time left is always recomputed as
//! `max(0, duration - (now - start))`, so the figure stays correct after
//! a restart, a suspended host or a missed tick.  It is never decremented.

use super::state::DemoStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Persisted form, stored under `demo_countdown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCountdown {
    /// Unix milliseconds.
    pub start_time: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemoCountdown {
    start_time: DateTime<Utc>,
    duration: Duration,
}

impl DemoCountdown {
    pub fn start(now: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            start_time: now,
            duration,
        }
    }

    /// Rebuilds a countdown from storage.  An out-of-range timestamp
    /// yields `None` and is treated like no record at all.
    pub fn from_stored(stored: StoredCountdown, duration: Duration) -> Option<Self> {
        DateTime::<Utc>::from_timestamp_millis(stored.start_time).map(|start_time| Self {
            start_time,
            duration,
        })
    }

    pub fn to_stored(&self) -> StoredCountdown {
        StoredCountdown {
            start_time: self.start_time.timestamp_millis(),
        }
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn with_duration(self, duration: Duration) -> Self {
        Self { duration, ..self }
    }

    /// Elapsed time, clamped to zero if the clock went backwards.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        let ms = now.signed_duration_since(self.start_time).num_milliseconds();
        Duration::from_millis(u64::try_from(ms).unwrap_or(0))
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.duration.saturating_sub(self.elapsed(now))
    }

    /// Whole seconds left, rounded up so a countdown only reads zero once
    /// it has actually run out.
    pub fn time_left_secs(&self, now: DateTime<Utc>) -> u64 {
        let ms = self.remaining(now).as_millis();
        u64::try_from(ms.div_ceil(1000)).unwrap_or(u64::MAX)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.remaining(now).is_zero()
    }

    pub fn status(&self, now: DateTime<Utc>) -> DemoStatus {
        DemoStatus {
            start_time: self.start_time,
            duration_seconds: self.duration.as_secs(),
            time_left_seconds: self.time_left_secs(now),
        }
    }
}

/// Renders seconds as `H:MM:SS`, or `M:SS` below an hour.
pub fn format_time_left(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + TimeDelta::seconds(secs)
    }

    #[test]
    fn time_left_is_derived_from_start() {
        let c = DemoCountdown::start(t(0), Duration::from_secs(3600));
        assert_eq!(c.time_left_secs(t(0)), 3600);
        assert_eq!(c.time_left_secs(t(1800)), 1800);
        assert!(!c.is_expired(t(3599)));
        assert_eq!(c.time_left_secs(t(3600)), 0);
        assert!(c.is_expired(t(3600)));
        assert_eq!(c.time_left_secs(t(99_999)), 0);
    }

    #[test]
    fn partial_seconds_round_up() {
        let c = DemoCountdown::start(t(0), Duration::from_secs(10));
        let almost = t(9) + TimeDelta::milliseconds(500);
        assert_eq!(c.time_left_secs(almost), 1);
        assert!(!c.is_expired(almost));
    }

    #[test]
    fn clock_going_backwards_counts_as_no_time_elapsed() {
        let c = DemoCountdown::start(t(100), Duration::from_secs(60));
        assert_eq!(c.time_left_secs(t(50)), 60);
    }

    #[test]
    fn stored_form_keeps_millis() {
        let start = t(42) + TimeDelta::milliseconds(7);
        let c = DemoCountdown::start(start, Duration::from_secs(5));
        assert_eq!(c.to_stored().start_time, 42_007);
        let json = serde_json::to_string(&c.to_stored()).unwrap();
        assert_eq!(json, r#"{"startTime":42007}"#);
        let back = DemoCountdown::from_stored(c.to_stored(), Duration::from_secs(5)).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn formatting() {
        assert_eq!(format_time_left(3600), "1:00:00");
        assert_eq!(format_time_left(3599), "59:59");
        assert_eq!(format_time_left(5), "0:05");
    }
}
