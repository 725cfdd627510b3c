//! ---
//! rsim_section: "11-simulation"
//! rsim_subsection: "01-bootstrap"
//! rsim_type: "source"
//! rsim_scope: "code"
//! rsim_description: "Offline telemetry generator for fixtures and analysis."
//! rsim_version: "v0.1.0"
//! rsim_owner: "tbd"
//! ---
//! Runs the tick driver without pacing and writes every message it produces.
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use clap::{Parser, ValueEnum};
use railsim_common::config::{AppConfig, ProfileKind};
use railsim_common::init_stderr_tracing;
use railsim_core::TickDriver;
use railsim_msg::Message;
use railsim_sim::TelemetryEvent;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::info;

const DEFAULT_SEED: u64 = 0x5EED_F00D;
const BUILTIN_FLEET: &str = include_str!("../../../configs/example.toml");

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// A single JSON array of message envelopes.
    Json,
    /// One message envelope per line.
    Ndjson,
    /// Flattened vehicle rows; other events are skipped.
    Csv,
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Generate railsim telemetry offline",
    long_about = None
)]
struct Cli {
    /// Fleet configuration. Defaults to the bundled example fleet.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of driver ticks to generate
    #[arg(long, default_value_t = 100)]
    ticks: u64,

    /// Random seed; overrides the configuration seed
    #[arg(long)]
    seed: Option<u64>,

    /// Engine profile; overrides the configuration profile
    #[arg(long)]
    profile: Option<ProfileKind>,

    /// Timestamp of tick zero (RFC 3339). Defaults to now.
    #[arg(long)]
    start: Option<DateTime<Utc>>,

    /// Output file path. Use '-' for stdout.
    #[arg(long, default_value = "-")]
    output: PathBuf,

    /// Explicit output format when extension is ambiguous
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,
}

/// A message together with the driver tick that produced it.
#[derive(Debug, Clone)]
struct Generated {
    tick: u64,
    message: Message,
}

#[derive(Debug, Serialize)]
struct VehicleRow<'a> {
    tick: u64,
    timestamp: DateTime<Utc>,
    vehicle_id: &'a str,
    depot_id: Option<&'a str>,
    operational_status: String,
    motion_phase: String,
    speed: f64,
    current_stop: &'a str,
    next_stop: Option<&'a str>,
    odometer: u64,
    health_score: u8,
    alert_count: usize,
    alert_codes: String,
}

fn main() -> Result<()> {
    init_stderr_tracing();
    let cli = Cli::parse();
    if cli.ticks == 0 {
        return Err(anyhow!("ticks must be greater than zero"));
    }

    let config = load_config(&cli)?;
    let format = determine_format(&cli.output, cli.format);
    let seed = cli.seed.or(config.simulation.seed).unwrap_or(DEFAULT_SEED);
    let start = cli.start.unwrap_or_else(Utc::now);
    let generated = generate(&config, seed, cli.ticks, start)?;

    let writer: Box<dyn Write> = if cli.output.as_os_str() == "-" {
        Box::new(io::stdout().lock())
    } else {
        Box::new(BufWriter::new(File::create(&cli.output).with_context(
            || format!("failed to create output file {}", cli.output.display()),
        )?))
    };
    match format {
        OutputFormat::Json => write_json(writer, &generated)?,
        OutputFormat::Ndjson => write_ndjson(writer, &generated)?,
        OutputFormat::Csv => write_csv(writer, &generated)?,
    }

    info!(
        ticks = cli.ticks,
        seed,
        messages = generated.len(),
        format = ?format,
        output = %cli.output.display(),
        "telemetry generated"
    );
    Ok(())
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::from_path(path)?,
        None => BUILTIN_FLEET
            .parse()
            .context("bundled example fleet is invalid")?,
    };
    if let Some(profile) = cli.profile {
        config.simulation.profile = profile;
    }
    Ok(config)
}

fn determine_format(path: &Path, override_format: Option<OutputFormat>) -> OutputFormat {
    if let Some(format) = override_format {
        return format;
    }
    if path.as_os_str() == "-" {
        return OutputFormat::Ndjson;
    }
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => OutputFormat::Json,
        Some("csv") => OutputFormat::Csv,
        _ => OutputFormat::Ndjson,
    }
}

/// Announcements at tick zero, then `ticks` driver ticks spaced by the
/// configured interval starting from `start`.
fn generate(
    config: &AppConfig,
    seed: u64,
    ticks: u64,
    start: DateTime<Utc>,
) -> Result<Vec<Generated>> {
    let mut driver = TickDriver::new(config, StdRng::seed_from_u64(seed))?;
    let step = ChronoDuration::from_std(config.simulation.tick_interval)
        .context("tick interval out of range")?;

    let mut generated: Vec<Generated> = driver
        .announcements()
        .into_iter()
        .map(|event| Generated {
            tick: 0,
            message: Message::at(event, start),
        })
        .collect();

    let mut timestamp = start;
    for tick in 1..=ticks {
        timestamp += step;
        generated.extend(driver.step(timestamp).into_iter().map(|event| Generated {
            tick,
            message: Message::at(event, timestamp),
        }));
    }
    Ok(generated)
}

fn write_json<W: Write>(mut writer: W, generated: &[Generated]) -> Result<()> {
    let messages: Vec<&Message> = generated.iter().map(|item| &item.message).collect();
    serde_json::to_writer_pretty(&mut writer, &messages)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

fn write_ndjson<W: Write>(mut writer: W, generated: &[Generated]) -> Result<()> {
    for item in generated {
        serde_json::to_writer(&mut writer, &item.message)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

fn write_csv<W: Write>(writer: W, generated: &[Generated]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for item in generated {
        let TelemetryEvent::Vehicle(vehicle) = &item.message.payload else {
            continue;
        };
        writer.serialize(VehicleRow {
            tick: item.tick,
            timestamp: vehicle.timestamp,
            vehicle_id: &vehicle.vehicle_id,
            depot_id: vehicle.depot_id.as_deref(),
            operational_status: vehicle.operational_status.to_string(),
            motion_phase: vehicle.motion_phase.to_string(),
            speed: vehicle.speed,
            current_stop: &vehicle.current_stop,
            next_stop: vehicle.next_stop.as_deref(),
            odometer: vehicle.odometer,
            health_score: vehicle.health_score,
            alert_count: vehicle.alerts.len(),
            alert_codes: vehicle
                .alerts
                .iter()
                .map(|alert| alert.code.as_str())
                .collect::<Vec<_>>()
                .join(";"),
        })?;
    }
    writer.flush()?;
    Ok(())
}
