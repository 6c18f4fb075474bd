//! Wall-clock sources for rate windows.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::time::Instant;

/// Source of the current UTC time
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A wall clock pinned to `anchor` that advances with tokio's clock
///
/// Under a paused runtime the wall time moves only when tokio time does, so
/// window boundaries line up with `tokio::time::sleep` deadlines.
#[derive(Debug, Clone)]
pub struct AnchoredClock {
    anchor: DateTime<Utc>,
    started: Instant,
}

impl AnchoredClock {
    pub fn new(anchor: DateTime<Utc>) -> Self {
        Self {
            anchor,
            started: Instant::now(),
        }
    }
}

impl Clock for AnchoredClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = ChronoDuration::from_std(self.started.elapsed())
            .unwrap_or_else(|_| ChronoDuration::zero());
        self.anchor + elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_anchored_clock_follows_tokio_time() {
        let anchor = Utc.with_ymd_and_hms(2024, 3, 1, 10, 59, 0).unwrap();
        let clock = AnchoredClock::new(anchor);
        assert_eq!(clock.now(), anchor);

        tokio::time::sleep(Duration::from_secs(90)).await;
        assert_eq!(
            clock.now(),
            Utc.with_ymd_and_hms(2024, 3, 1, 11, 0, 30).unwrap()
        );
    }
}
