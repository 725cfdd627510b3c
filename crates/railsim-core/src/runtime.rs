//! ---
//! rsim_section: "01-core-functionality"
//! rsim_subsection: "module"
//! rsim_type: "source"
//! rsim_scope: "code"
//! rsim_description: "Async tick loop publishing driver output."
//! rsim_version: "v0.1.0"
//! rsim_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use railsim_common::timing::{JitterSummary, TickTimer};
use railsim_metrics::SimulatorMetrics;
use railsim_msg::MessagingSupervisor;
use railsim_rt::RateLimiter;
use railsim_sim::TelemetryEvent;
use rand::rngs::StdRng;
use rand::Rng;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Totals reported when the loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub ticks: u64,
    pub events: u64,
    pub publish_failures: u64,
    pub jitter: Option<JitterSummary>,
}

/// Paces a [`TickDriver`](crate::TickDriver) at a fixed interval and
/// publishes every event it produces.
pub struct SimulatorRuntime<R = StdRng> {
    driver: crate::TickDriver<R>,
    supervisor: Arc<MessagingSupervisor>,
    metrics: Option<SimulatorMetrics>,
    interval: Duration,
    tick_limit: Option<u64>,
}

impl<R: Rng> SimulatorRuntime<R> {
    pub fn new(
        driver: crate::TickDriver<R>,
        supervisor: Arc<MessagingSupervisor>,
        interval: Duration,
    ) -> Self {
        Self {
            driver,
            supervisor,
            metrics: None,
            interval,
            tick_limit: None,
        }
    }

    pub fn with_metrics(mut self, metrics: SimulatorMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Stop after `limit` driver ticks; `None` runs until shutdown.
    pub fn with_tick_limit(mut self, limit: Option<u64>) -> Self {
        self.tick_limit = limit;
        self
    }

    /// Publish announcements, then tick until the limit or a shutdown signal.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<RunSummary> {
        let timer = TickTimer::new(self.interval);
        let mut limiter = RateLimiter::new(self.interval).with_limit(self.tick_limit);
        let mut summary = RunSummary::default();

        if let Some(metrics) = &self.metrics {
            metrics.set_fleet_size(self.driver.fleet().len());
        }
        info!(
            interval_ms = self.interval.as_millis() as u64,
            tick_limit = ?self.tick_limit,
            vehicles = self.driver.fleet().len(),
            transports = ?self.supervisor.transport_names(),
            "simulator loop starting"
        );

        for event in self.driver.announcements() {
            self.publish(event, &mut summary);
        }

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!(ticks = summary.ticks, "shutdown signal received");
                    break;
                }
                scheduled = limiter.tick() => {
                    if scheduled.is_none() {
                        info!(ticks = summary.ticks, "tick limit reached");
                        break;
                    }
                    summary.ticks += 1;
                    let jitter = timer.record_tick();

                    let events = self.driver.step(Utc::now());
                    debug!(tick = summary.ticks, events = events.len(), jitter_us = ?jitter, "driver tick");
                    for event in events {
                        self.publish(event, &mut summary);
                    }

                    if let Some(metrics) = &self.metrics {
                        metrics.inc_tick();
                        if let Some(jitter) = jitter {
                            metrics.observe_jitter_us(jitter);
                        }
                        for (status, count) in self.driver.status_counts() {
                            metrics.set_status_count(&status.to_string(), count);
                        }
                    }
                }
            }
        }

        summary.jitter = timer.summary();
        if let Some(jitter) = &summary.jitter {
            debug!(
                samples = jitter.samples,
                mean_us = jitter.mean_us,
                max_abs_us = jitter.max_abs_us,
                "tick jitter summary"
            );
        }
        info!(
            ticks = summary.ticks,
            events = summary.events,
            publish_failures = summary.publish_failures,
            "simulator loop stopped"
        );
        Ok(summary)
    }

    fn publish(&self, event: TelemetryEvent, summary: &mut RunSummary) {
        summary.events += 1;
        if let Some(metrics) = &self.metrics {
            metrics.record_event(event.kind());
            for alert in event.alerts() {
                metrics.record_alert(&alert.severity.to_string());
            }
        }
        let kind = event.kind();
        let entity = event.entity_id().to_owned();
        let outcome = self.supervisor.publish_event(event);
        if outcome.has_failures() {
            summary.publish_failures += 1;
            if let Some(metrics) = &self.metrics {
                metrics.record_publish_failure();
            }
            warn!(
                kind,
                entity_id = %entity,
                delivered = outcome.delivered,
                failed = outcome.failed,
                "event not accepted by every transport"
            );
        }
    }
}

impl<R: Rng + Send + 'static> SimulatorRuntime<R> {
    /// Run on the tokio runtime and return a handle for lifecycle control.
    pub fn spawn(self) -> RuntimeHandle {
        let (shutdown, rx) = broadcast::channel(4);
        let task = tokio::spawn(self.run(rx));
        RuntimeHandle { shutdown, task }
    }
}

/// Handle to a spawned [`SimulatorRuntime`].
#[derive(Debug)]
pub struct RuntimeHandle {
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<Result<RunSummary>>,
}

impl RuntimeHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Sender that stops the loop when signalled, for use from other tasks.
    pub fn shutdown_trigger(&self) -> broadcast::Sender<()> {
        self.shutdown.clone()
    }

    /// Signal shutdown and wait for the loop to stop.
    pub async fn shutdown(self) -> Result<RunSummary> {
        let _ = self.shutdown.send(());
        self.join().await
    }

    /// Wait for the loop to stop on its own (tick limit reached).
    pub async fn join(self) -> Result<RunSummary> {
        let RuntimeHandle { shutdown, task } = self;
        let result = match task.await {
            Ok(result) => result,
            Err(join_err) => Err(anyhow::Error::new(join_err)),
        };
        drop(shutdown);
        result
    }
}
