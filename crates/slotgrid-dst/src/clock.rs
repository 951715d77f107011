//! Deterministic clock for simulation

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Manually advanced clock
///
/// Time only moves when a test (or [`SimTime::sleep_ms`](crate::SimTime))
/// advances it. Clones share the same time.
#[derive(Debug, Clone)]
pub struct SimClock {
    current_time_ms: Arc<AtomicU64>,
    notify: Arc<Notify>,
}

impl SimClock {
    /// Create a clock starting at the given instant
    pub fn new(start_time: DateTime<Utc>) -> Self {
        Self::from_millis(start_time.timestamp_millis().max(0) as u64)
    }

    /// Create a clock starting at a millisecond timestamp
    pub fn from_millis(ms: u64) -> Self {
        Self {
            current_time_ms: Arc::new(AtomicU64::new(ms)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Current time
    pub fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.now_ms() as i64).unwrap_or(DateTime::UNIX_EPOCH)
    }

    /// Current time in milliseconds since epoch
    pub fn now_ms(&self) -> u64 {
        self.current_time_ms.load(Ordering::SeqCst)
    }

    /// Advance time and wake anything waiting on it
    pub fn advance_ms(&self, ms: u64) {
        self.current_time_ms.fetch_add(ms, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Wait until someone else advances the clock past `ms` from now
    pub async fn wait_ms(&self, ms: u64) {
        let target_ms = self.now_ms().saturating_add(ms);
        while self.now_ms() < target_ms {
            let notified = self.notify.notified();
            if self.now_ms() >= target_ms {
                break;
            }
            notified.await;
        }
    }

    /// Check if a deadline (in ms) has passed
    pub fn is_past_ms(&self, deadline_ms: u64) -> bool {
        self.now_ms() >= deadline_ms
    }
}

impl Default for SimClock {
    /// 2024-01-01T00:00:00Z
    fn default() -> Self {
        Self::from_millis(1_704_067_200_000)
    }
}
