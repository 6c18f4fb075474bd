//! Fixed request quota per wall-clock window.
//!
//! Windows are aligned to the Unix epoch in UTC: a 3600 s window starts at
//! the top of every UTC hour regardless of when the dispatcher started.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RateWindow {
    quota: u32,
    period: Duration,
    count: u32,
    window_start: DateTime<Utc>,
}

impl RateWindow {
    pub fn new(quota: u32, period: Duration, now: DateTime<Utc>) -> Self {
        Self {
            quota,
            period,
            count: 0,
            window_start: align(now, period),
        }
    }

    /// Addresses that may still be sent in the current window
    pub fn remaining(&mut self, now: DateTime<Utc>) -> u32 {
        self.roll(now);
        self.quota.saturating_sub(self.count)
    }

    pub fn record(&mut self, now: DateTime<Utc>, addresses: u32) {
        self.roll(now);
        self.count = self.count.saturating_add(addresses);
    }

    /// Treat the current window as used up
    pub fn exhaust(&mut self, now: DateTime<Utc>) {
        self.roll(now);
        self.count = self.quota;
    }

    pub fn next_reset(&self) -> DateTime<Utc> {
        self.window_start + period_delta(self.period)
    }

    pub fn until_reset(&self, now: DateTime<Utc>) -> Duration {
        (self.next_reset() - now).to_std().unwrap_or(Duration::ZERO)
    }

    fn roll(&mut self, now: DateTime<Utc>) {
        let start = align(now, self.period);
        if start > self.window_start {
            self.window_start = start;
            self.count = 0;
        }
    }
}

fn align(now: DateTime<Utc>, period: Duration) -> DateTime<Utc> {
    let period = period.as_secs().max(1) as i64;
    let seconds = now.timestamp();
    let start = seconds - seconds.rem_euclid(period);
    DateTime::from_timestamp(start, 0).unwrap_or(now)
}

fn period_delta(period: Duration) -> ChronoDuration {
    ChronoDuration::seconds(period.as_secs().max(1) as i64)
}
