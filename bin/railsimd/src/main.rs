//! ---
//! rsim_section: "01-core-functionality"
//! rsim_subsection: "binary"
//! rsim_type: "source"
//! rsim_scope: "code"
//! rsim_description: "Binary entrypoint for the railsim daemon."
//! rsim_version: "v0.1.0"
//! rsim_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use railsim_common::config::{AppConfig, LoadedAppConfig, ProfileKind, DEFAULT_CONFIG_CANDIDATES};
use railsim_common::logging::{init_stderr_tracing, init_tracing};
use railsim_core::{SimulatorRuntime, TickDriver};
use railsim_metrics::{new_registry, spawn_http_server, DaemonMetrics, SimulatorMetrics};
use railsim_msg::{
    InMemoryTransport, JsonLinesTarget, JsonLinesTransport, MessagingMetricsExporter,
    MessagingSupervisor,
};
use tokio::signal;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(author, version, about = "railsim telemetry daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Override the random seed")]
    seed: Option<u64>,

    #[arg(long, value_name = "N", help = "Stop after N driver ticks")]
    ticks: Option<u64>,

    #[arg(long, help = "Override the engine profile (mainline, light_rail, legacy)")]
    profile: Option<ProfileKind>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the simulator until ctrl-c or the tick limit")]
    Run,
    #[command(about = "Load and validate the configuration, then exit")]
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let load_started = Instant::now();
    let loaded = load_config(cli.config.as_ref())?;
    let load_duration = load_started.elapsed();
    let LoadedAppConfig {
        mut config,
        source: config_path,
    } = loaded;

    if let Some(seed) = cli.seed {
        config.simulation.seed = Some(seed);
    }
    if let Some(profile) = cli.profile {
        config.simulation.profile = profile;
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::CheckConfig => {
            render_config_summary(&config, &config_path);
            Ok(())
        }
        Commands::Run => {
            // JSON lines on stdout would interleave with log records.
            let stdout_telemetry = config
                .transport
                .json_lines
                .as_deref()
                .is_some_and(|spec| JsonLinesTarget::parse(spec) == JsonLinesTarget::Stdout);
            if stdout_telemetry {
                init_stderr_tracing();
            } else {
                init_tracing("railsimd", &config.logging)?;
            }
            info!(
                config_path = %config_path.display(),
                load_ms = load_duration.as_millis() as u64,
                "configuration loaded"
            );
            run_daemon(config, cli.ticks, load_duration.as_secs_f64()).await
        }
    }
}

fn load_config(explicit: Option<&PathBuf>) -> Result<LoadedAppConfig> {
    match explicit {
        Some(path) => Ok(LoadedAppConfig {
            config: AppConfig::from_path(path)?,
            source: path.clone(),
        }),
        None => AppConfig::load_with_source(&DEFAULT_CONFIG_CANDIDATES),
    }
}

async fn run_daemon(config: AppConfig, tick_limit: Option<u64>, load_seconds: f64) -> Result<()> {
    let registry = new_registry();
    let daemon_metrics = DaemonMetrics::new(registry.clone())?;
    daemon_metrics.observe_config_load(load_seconds);
    daemon_metrics.inc_start();
    daemon_metrics.set_build_info(
        env!("CARGO_PKG_VERSION"),
        &config.simulation.profile.to_string(),
    );
    let simulator_metrics = SimulatorMetrics::new(registry.clone())?;
    let exporter = MessagingMetricsExporter::register(&registry)
        .context("failed to register messaging metrics")?;

    let mut supervisor = MessagingSupervisor::new().with_exporter(exporter);
    if let Some(spec) = &config.transport.json_lines {
        let target = JsonLinesTarget::parse(spec);
        info!(sink = ?target, "json lines transport enabled");
        supervisor.register_transport(Arc::new(JsonLinesTransport::new(
            target,
            config.transport.reconnect_backoff,
        )));
    }
    if config.transport.in_memory {
        let capacity = config.transport.in_memory_capacity;
        info!(capacity, "in-memory transport enabled; oldest messages are dropped when full");
        supervisor.register_transport(Arc::new(InMemoryTransport::bounded(capacity)));
    }
    if supervisor.transport_names().is_empty() {
        warn!("no transports configured; telemetry is generated but not published");
    }

    let metrics_server = if config.metrics.enabled {
        Some(spawn_http_server(registry.clone(), config.metrics.listen)?)
    } else {
        info!("metrics exporter disabled by configuration");
        None
    };

    let driver = TickDriver::from_config(&config)?;
    let runtime = SimulatorRuntime::new(
        driver,
        Arc::new(supervisor),
        config.simulation.tick_interval,
    )
    .with_metrics(simulator_metrics)
    .with_tick_limit(tick_limit);

    let handle = runtime.spawn();
    let trigger = handle.shutdown_trigger();
    let ctrl_c = tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("ctrl-c received; shutting down");
                let _ = trigger.send(());
            }
            Err(err) => warn!(error = %err, "unable to listen for ctrl-c"),
        }
    });

    info!(
        profile = %config.simulation.profile,
        vehicles = config.fleet_size(),
        depots = config.depots.len(),
        "daemon running; waiting for termination signal"
    );
    let summary = handle.join().await?;
    ctrl_c.abort();

    info!(
        ticks = summary.ticks,
        events = summary.events,
        publish_failures = summary.publish_failures,
        "simulator stopped"
    );

    if let Some(server) = metrics_server {
        server.shutdown().await?;
    }
    Ok(())
}

fn render_config_summary(config: &AppConfig, source: &std::path::Path) {
    println!("Configuration: {}", source.display());
    println!(
        "Profile: {}  Tick interval: {} ms  Point machine sweep every {} ticks",
        config.simulation.profile,
        config.simulation.tick_interval.as_millis(),
        config.simulation.point_machine_every
    );
    match config.simulation.seed {
        Some(seed) => println!("Seed: {seed}"),
        None => println!("Seed: entropy"),
    }
    for (depot_id, depot) in &config.depots {
        println!(
            "Depot {} ({}): {} stops, {} vehicles, {} point machines",
            depot_id,
            depot.display_name(depot_id),
            depot.route.len(),
            depot.vehicles.len(),
            depot.point_machines.len()
        );
    }
    println!("Fleet size: {}", config.fleet_size());
}
