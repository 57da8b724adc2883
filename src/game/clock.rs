//! Clock abstraction for the round timer.
//!
//! The round loop sleeps until explicit deadlines instead of chaining
//! relative delays, so a test clock can drive a whole round instantly.

use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;

#[async_trait]
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;

    /// Sleep until the given epoch-millisecond deadline. Returns
    /// immediately if the deadline already passed.
    async fn sleep_until(&self, deadline_millis: u64);
}

/// Wall-clock implementation backed by tokio's timer.
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        Utc::now().timestamp_millis().max(0) as u64
    }

    async fn sleep_until(&self, deadline_millis: u64) {
        let now = self.now_millis();
        if deadline_millis > now {
            tokio::time::sleep(Duration::from_millis(deadline_millis - now)).await;
        }
    }
}
