//! ---
//! rsim_section: "01-core-functionality"
//! rsim_subsection: "module"
//! rsim_type: "source"
//! rsim_scope: "code"
//! rsim_description: "Driver tick timing and jitter accounting."
//! rsim_version: "v0.1.0"
//! rsim_owner: "tbd"
//! ---
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

const WINDOW: usize = 1024;

/// Signed difference between an observed and expected period, in microseconds.
pub fn jitter_us(actual: Duration, expected: Duration) -> i64 {
    let actual_us = actual.as_secs_f64() * 1_000_000.0;
    let expected_us = expected.as_secs_f64() * 1_000_000.0;
    (actual_us - expected_us).round() as i64
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct JitterSummary {
    pub samples: u64,
    pub mean_us: f64,
    pub max_abs_us: i64,
}

/// Measures driver tick periods against the configured interval over a
/// sliding window.
#[derive(Debug)]
pub struct TickTimer {
    target_interval: Duration,
    inner: Mutex<TimerState>,
}

#[derive(Debug, Default)]
struct TimerState {
    last_tick: Option<Instant>,
    window: VecDeque<i64>,
}

impl TickTimer {
    pub fn new(target_interval: Duration) -> Self {
        Self {
            target_interval,
            inner: Mutex::new(TimerState::default()),
        }
    }

    pub fn target_interval(&self) -> Duration {
        self.target_interval
    }

    /// Record a tick and return its jitter; the first tick has nothing to compare against.
    pub fn record_tick(&self) -> Option<i64> {
        self.record_at(Instant::now())
    }

    pub fn record_at(&self, now: Instant) -> Option<i64> {
        let mut state = self.inner.lock();
        let jitter = state
            .last_tick
            .map(|previous| jitter_us(now.saturating_duration_since(previous), self.target_interval));
        state.last_tick = Some(now);
        if let Some(value) = jitter {
            if state.window.len() == WINDOW {
                state.window.pop_front();
            }
            state.window.push_back(value);
        }
        jitter
    }

    pub fn summary(&self) -> Option<JitterSummary> {
        let state = self.inner.lock();
        if state.window.is_empty() {
            return None;
        }
        let count = state.window.len();
        let mean_us = state.window.iter().map(|v| *v as f64).sum::<f64>() / count as f64;
        let max_abs_us = state.window.iter().map(|v| v.abs()).max().unwrap_or_default();
        Some(JitterSummary {
            samples: count as u64,
            mean_us,
            max_abs_us,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_is_signed() {
        assert_eq!(
            jitter_us(Duration::from_millis(260), Duration::from_millis(250)),
            10_000
        );
        assert_eq!(
            jitter_us(Duration::from_millis(245), Duration::from_millis(250)),
            -5_000
        );
    }

    #[test]
    fn timer_summarises_recorded_ticks() {
        let timer = TickTimer::new(Duration::from_millis(100));
        let start = Instant::now();
        assert_eq!(timer.record_at(start), None);
        assert_eq!(
            timer.record_at(start + Duration::from_millis(110)),
            Some(10_000)
        );
        assert_eq!(
            timer.record_at(start + Duration::from_millis(200)),
            Some(-10_000)
        );
        let summary = timer.summary().unwrap();
        assert_eq!(summary.samples, 2);
        assert_eq!(summary.mean_us, 0.0);
        assert_eq!(summary.max_abs_us, 10_000);
    }
}
