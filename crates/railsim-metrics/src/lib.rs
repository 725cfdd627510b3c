//! ---
//! rsim_section: "03-observability"
//! rsim_subsection: "module"
//! rsim_type: "source"
//! rsim_scope: "code"
//! rsim_description: "Metrics collection and export utilities."
//! rsim_version: "v0.1.0"
//! rsim_owner: "tbd"
//! ---
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, StatusCode};
use axum::routing::get;
use axum::{response::IntoResponse, Router};
use prometheus::{
    GaugeVec, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Shared registry type used across components.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Spawn an HTTP server that exposes the registry at `/metrics`.
///
/// Binding to port 0 picks a free port; [`MetricsServer::addr`] reports the
/// address actually bound.
pub fn spawn_http_server(registry: SharedRegistry, addr: SocketAddr) -> Result<MetricsServer> {
    let app = Router::new().route(
        "/metrics",
        get({
            let registry = registry.clone();
            move || metrics_handler(registry.clone())
        }),
    );

    let std_listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind metrics listener {}", addr))?;
    std_listener
        .set_nonblocking(true)
        .with_context(|| "failed to configure metrics listener as non-blocking")?;
    let bound = std_listener
        .local_addr()
        .with_context(|| "failed to read metrics listener address")?;
    let listener = TcpListener::from_std(std_listener)
        .with_context(|| "failed to convert std listener into tokio listener")?;

    info!(address = %bound, "metrics server starting");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let service = app.into_make_service();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        axum::serve(listener, service)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .context("metrics server encountered an error")?;
        Ok(())
    });

    Ok(MetricsServer {
        addr: bound,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

/// Prometheus scrape endpoint.
async fn metrics_handler(registry: SharedRegistry) -> impl IntoResponse {
    let families = registry.gather();
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&families) {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static(prometheus::TEXT_FORMAT),
            )],
            body,
        ),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; charset=utf-8"),
                )],
                String::from("metrics encoding error"),
            )
        }
    }
}

/// Handle to the running HTTP exporter.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl MetricsServer {
    /// Return the bound address for convenience.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal shutdown and await task completion.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err),
            Err(join_err) => Err(anyhow::Error::new(join_err)),
        }
    }
}

/// Metrics recorded by the daemon process itself.
#[derive(Clone)]
pub struct DaemonMetrics {
    registry: SharedRegistry,
    starts_total: IntCounter,
    config_load_seconds: Histogram,
    build_info: GaugeVec,
}

impl DaemonMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let starts_total = IntCounter::with_opts(Opts::new(
            "railsimd_starts_total",
            "Total number of times the railsim daemon has initialised",
        ))?;
        registry.register(Box::new(starts_total.clone()))?;

        let buckets = prometheus::exponential_buckets(0.001, 2.0, 16)
            .context("failed to construct histogram buckets")?;
        let config_load_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "railsimd_config_load_seconds",
                "Time spent loading and validating configuration",
            )
            .buckets(buckets),
        )?;
        registry.register(Box::new(config_load_seconds.clone()))?;

        let build_info = GaugeVec::new(
            Opts::new(
                "railsimd_build_info",
                "Build metadata for the running daemon binary",
            ),
            &["version", "profile"],
        )?;
        registry.register(Box::new(build_info.clone()))?;

        Ok(Self {
            registry,
            starts_total,
            config_load_seconds,
            build_info,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn inc_start(&self) {
        self.starts_total.inc();
    }

    pub fn observe_config_load(&self, seconds: f64) {
        self.config_load_seconds.observe(seconds);
    }

    pub fn set_build_info(&self, version: &str, profile: &str) {
        self.build_info
            .with_label_values(&[version, profile])
            .set(1.0);
    }
}

/// Counters and gauges for the tick driver and the events it emits.
#[derive(Clone, Debug)]
pub struct SimulatorMetrics {
    registry: SharedRegistry,
    ticks_total: IntCounter,
    events_total: IntCounterVec,
    alerts_total: IntCounterVec,
    publish_failures_total: IntCounter,
    fleet_size: IntGauge,
    vehicles_by_status: IntGaugeVec,
    tick_jitter_seconds: Histogram,
}

impl SimulatorMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let ticks_total = IntCounter::with_opts(Opts::new(
            "railsim_driver_ticks_total",
            "Driver ticks executed",
        ))?;
        registry.register(Box::new(ticks_total.clone()))?;

        let events_total = IntCounterVec::new(
            Opts::new("railsim_events_total", "Telemetry events produced by kind"),
            &["kind"],
        )?;
        registry.register(Box::new(events_total.clone()))?;

        let alerts_total = IntCounterVec::new(
            Opts::new(
                "railsim_alerts_total",
                "Alerts attached to emitted telemetry by severity",
            ),
            &["severity"],
        )?;
        registry.register(Box::new(alerts_total.clone()))?;

        let publish_failures_total = IntCounter::with_opts(Opts::new(
            "railsim_publish_failures_total",
            "Events at least one transport failed to accept",
        ))?;
        registry.register(Box::new(publish_failures_total.clone()))?;

        let fleet_size = IntGauge::with_opts(Opts::new(
            "railsim_fleet_vehicles",
            "Vehicles configured across all depots",
        ))?;
        registry.register(Box::new(fleet_size.clone()))?;

        let vehicles_by_status = IntGaugeVec::new(
            Opts::new(
                "railsim_vehicles_by_status",
                "Initialised vehicles by operational status",
            ),
            &["status"],
        )?;
        registry.register(Box::new(vehicles_by_status.clone()))?;

        let buckets = prometheus::exponential_buckets(0.0001, 2.0, 14)
            .context("failed to construct histogram buckets")?;
        let tick_jitter_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "railsim_tick_jitter_seconds",
                "Absolute deviation of driver tick periods from the configured interval",
            )
            .buckets(buckets),
        )?;
        registry.register(Box::new(tick_jitter_seconds.clone()))?;

        Ok(Self {
            registry,
            ticks_total,
            events_total,
            alerts_total,
            publish_failures_total,
            fleet_size,
            vehicles_by_status,
            tick_jitter_seconds,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn inc_tick(&self) {
        self.ticks_total.inc();
    }

    pub fn ticks(&self) -> u64 {
        self.ticks_total.get()
    }

    pub fn record_event(&self, kind: &str) {
        self.events_total.with_label_values(&[kind]).inc();
    }

    pub fn record_alert(&self, severity: &str) {
        self.alerts_total.with_label_values(&[severity]).inc();
    }

    pub fn record_publish_failure(&self) {
        self.publish_failures_total.inc();
    }

    pub fn set_fleet_size(&self, count: usize) {
        self.fleet_size.set(count as i64);
    }

    pub fn set_status_count(&self, status: &str, count: usize) {
        self.vehicles_by_status
            .with_label_values(&[status])
            .set(count as i64);
    }

    /// Record tick jitter in microseconds; the sign is dropped.
    pub fn observe_jitter_us(&self, jitter_us: i64) {
        self.tick_jitter_seconds
            .observe(jitter_us.unsigned_abs() as f64 / 1_000_000.0);
    }
}

pub use prometheus;

#[cfg(test)]
mod tests {
    use super::*;

    fn family<'a>(
        families: &'a [prometheus::proto::MetricFamily],
        name: &str,
    ) -> &'a prometheus::proto::MetricFamily {
        families
            .iter()
            .find(|family| family.get_name() == name)
            .unwrap_or_else(|| panic!("missing family {name}"))
    }

    #[test]
    fn simulator_metrics_track_events_by_kind() {
        let registry = new_registry();
        let metrics = SimulatorMetrics::new(registry.clone()).unwrap();
        metrics.inc_tick();
        metrics.inc_tick();
        metrics.record_event("vehicle");
        metrics.record_event("vehicle");
        metrics.record_event("pointMachine");
        metrics.record_alert("CRITICAL");
        metrics.set_fleet_size(4);
        metrics.set_status_count("IN_SERVICE", 3);
        metrics.observe_jitter_us(-1500);

        assert_eq!(metrics.ticks(), 2);
        let families = registry.gather();
        let events = family(&families, "railsim_events_total");
        assert_eq!(events.get_metric().len(), 2);
        assert_eq!(
            family(&families, "railsim_fleet_vehicles").get_metric()[0]
                .get_gauge()
                .get_value(),
            4.0
        );
        let jitter = family(&families, "railsim_tick_jitter_seconds").get_metric()[0]
            .get_histogram()
            .get_sample_sum();
        assert!((jitter - 0.0015).abs() < 1e-9);
    }

    #[test]
    fn daemon_and_simulator_metrics_share_a_registry() {
        let registry = new_registry();
        let daemon = DaemonMetrics::new(registry.clone()).unwrap();
        SimulatorMetrics::new(registry.clone()).unwrap();
        daemon.inc_start();
        daemon.set_build_info("0.1.0", "mainline");
        assert!(SimulatorMetrics::new(registry).is_err());
    }

    fn scrape(addr: SocketAddr) -> String {
        use std::io::{Read, Write};

        let mut stream = std::net::TcpStream::connect(addr).unwrap();
        stream
            .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn http_exporter_serves_scrapes_and_shuts_down() {
        let registry = new_registry();
        DaemonMetrics::new(registry.clone()).unwrap().inc_start();
        let server = spawn_http_server(registry, "127.0.0.1:0".parse().unwrap()).unwrap();
        assert_ne!(server.addr().port(), 0);

        let addr = server.addr();
        let response = tokio::task::spawn_blocking(move || scrape(addr))
            .await
            .unwrap();
        let lowered = response.to_ascii_lowercase();
        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
        assert!(lowered.contains(&format!(
            "content-type: {}",
            prometheus::TEXT_FORMAT.to_ascii_lowercase()
        )));
        assert!(response.contains("railsimd_starts_total 1"));

        server.shutdown().await.unwrap();
    }
}
