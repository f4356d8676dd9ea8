use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

/// Single source of "now" for every state-changing operation.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-driven clock for tests and replay tooling.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.current.lock().unwrap_or_else(|p| p.into_inner());
        *guard += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        let mut guard = self.current.lock().unwrap_or_else(|p| p.into_inner());
        *guard = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock().unwrap_or_else(|p| p.into_inner())
    }
}

pub fn human_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M UTC").to_string()
}

pub fn from_rfc3339(s: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn manual_clock_advances() {
        let start = Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        clock.advance(Duration::hours(49));
        assert_eq!(clock.now() - start, Duration::hours(49));
    }

    #[test]
    fn human_format_is_readable() {
        let dt = Utc.with_ymd_and_hms(2026, 10, 20, 14, 30, 0).unwrap();
        assert_eq!(human_datetime(dt), "Tue, 20 Oct 2026 14:30 UTC");
    }

    #[test]
    fn parses_offsets_into_utc() {
        let dt = from_rfc3339("2026-10-20T16:30:00+02:00").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2026, 10, 20, 14, 30, 0).unwrap());
    }
}
