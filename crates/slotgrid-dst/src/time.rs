//! Simulated time provider
//!
//! Replaces the wall clock behind [`TimeProvider`] so the registry and the
//! reaper run against [`SimClock`].

use crate::clock::SimClock;
use async_trait::async_trait;
use slotgrid_core::io::TimeProvider;
use std::sync::Arc;

/// Time provider backed by a [`SimClock`]
///
/// `sleep_ms` advances the clock by the requested amount and yields, so a
/// loop that sleeps between iterations drives simulated time forward by
/// itself.
#[derive(Clone, Debug)]
pub struct SimTime {
    clock: Arc<SimClock>,
}

impl SimTime {
    /// Create a provider over `clock`
    pub fn new(clock: Arc<SimClock>) -> Self {
        Self { clock }
    }

    /// The underlying clock
    pub fn clock(&self) -> &SimClock {
        &self.clock
    }
}

#[async_trait]
impl TimeProvider for SimTime {
    fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    async fn sleep_ms(&self, ms: u64) {
        self.clock.advance_ms(ms);
        tokio::task::yield_now().await;
    }
}
