//! ---
//! rsim_section: "01-core-functionality"
//! rsim_subsection: "module"
//! rsim_type: "source"
//! rsim_scope: "code"
//! rsim_description: "Runtime helpers supporting the tick driver."
//! rsim_version: "v0.1.0"
//! rsim_owner: "tbd"
//! ---
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Fixed-period tick source, optionally bounded to a number of ticks.
///
/// Missed ticks are delayed rather than bursted, so a slow consumer stretches
/// the schedule instead of catching up.
#[derive(Debug)]
pub struct RateLimiter {
    interval: tokio::time::Interval,
    ticks: u64,
    limit: Option<u64>,
}

impl RateLimiter {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval,
            ticks: 0,
            limit: None,
        }
    }

    /// Stop yielding after `limit` ticks; `None` runs unbounded.
    pub fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    /// Ticks yielded so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn exhausted(&self) -> bool {
        self.limit.is_some_and(|limit| self.ticks >= limit)
    }

    /// Wait for the next tick, or return `None` once the limit is reached.
    pub async fn tick(&mut self) -> Option<Instant> {
        if self.exhausted() {
            debug!(ticks = self.ticks, "tick limit reached");
            return None;
        }
        let instant = self.interval.tick().await;
        self.ticks += 1;
        Some(instant)
    }
}
