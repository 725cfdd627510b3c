//! ---
//! rsim_section: "01-core-functionality"
//! rsim_subsection: "module"
//! rsim_type: "source"
//! rsim_scope: "code"
//! rsim_description: "Fleet, depot and runtime configuration loading."
//! rsim_version: "v0.1.0"
//! rsim_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use strum::{Display, EnumString};
use tracing::debug;

use crate::logging::LogFormat;

/// Default search path used by the binaries when no explicit path is given.
pub const DEFAULT_CONFIG_CANDIDATES: [&str; 2] = ["configs/railsim.toml", "configs/example.toml"];

fn default_tick_interval() -> Duration {
    Duration::from_millis(250)
}

fn default_point_machine_every() -> u64 {
    5
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9899))
}

fn default_reconnect_backoff() -> Duration {
    Duration::from_secs(2)
}

fn default_in_memory_capacity() -> usize {
    10_000
}

/// Primary configuration object for the simulator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub depots: IndexMap<String, DepotConfig>,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "RAILSIM_CONFIG";

    /// Load configuration from disk together with the effective source path,
    /// respecting the `RAILSIM_CONFIG` override.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    /// Read, parse and validate a single file.
    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn depot(&self, depot_id: &str) -> Option<&DepotConfig> {
        self.depots.get(depot_id)
    }

    /// Every vehicle id paired with its depot, in configuration order.
    pub fn fleet(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.depots.iter().flat_map(|(depot_id, depot)| {
            depot
                .vehicles
                .iter()
                .map(move |vehicle| (depot_id.as_str(), vehicle.as_str()))
        })
    }

    pub fn fleet_size(&self) -> usize {
        self.depots.values().map(|depot| depot.vehicles.len()).sum()
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.simulation.validate()?;
        if self.transport.in_memory && self.transport.in_memory_capacity == 0 {
            return Err(anyhow!(
                "transport.in_memory_capacity must be greater than zero"
            ));
        }
        if self.depots.is_empty() {
            return Err(anyhow!("configuration must contain at least one depot"));
        }
        let mut vehicle_ids = HashSet::new();
        let mut device_ids = HashSet::new();
        for (depot_id, depot) in &self.depots {
            depot.validate(depot_id)?;
            for vehicle in &depot.vehicles {
                if !vehicle_ids.insert(vehicle.as_str()) {
                    return Err(anyhow!("vehicle '{}' is declared more than once", vehicle));
                }
            }
            for device in &depot.point_machines {
                if !device_ids.insert(device.as_str()) {
                    return Err(anyhow!(
                        "point machine '{}' is declared more than once",
                        device
                    ));
                }
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Built-in engine profile selector.
#[derive(
    Debug,
    Copy,
    Clone,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    Default,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ProfileKind {
    #[default]
    Mainline,
    LightRail,
    Legacy,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Driver period: one vehicle advances per interval.
    #[serde(rename = "tick_interval_ms", default = "default_tick_interval")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub tick_interval: Duration,
    /// Point machines are swept every `point_machine_every` driver ticks.
    #[serde(default = "default_point_machine_every")]
    pub point_machine_every: u64,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub profile: ProfileKind,
    #[serde(default)]
    pub status_change_probability: Option<f64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_interval: default_tick_interval(),
            point_machine_every: default_point_machine_every(),
            seed: None,
            profile: ProfileKind::default(),
            status_change_probability: None,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(anyhow!("simulation.tick_interval_ms must be greater than zero"));
        }
        if self.point_machine_every == 0 {
            return Err(anyhow!(
                "simulation.point_machine_every must be greater than zero"
            ));
        }
        if let Some(probability) = self.status_change_probability {
            if !(0.0..=1.0).contains(&probability) {
                return Err(anyhow!(
                    "simulation.status_change_probability {} is outside [0, 1]",
                    probability
                ));
            }
        }
        Ok(())
    }
}

/// A depot: its route, vehicle roster and trackside device roster.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DepotConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub route: Vec<String>,
    pub vehicles: Vec<String>,
    #[serde(default)]
    pub point_machines: Vec<String>,
}

impl DepotConfig {
    pub fn validate(&self, depot_id: &str) -> Result<()> {
        if self.route.len() < 2 {
            return Err(anyhow!(
                "depot '{}' route must list at least two stops",
                depot_id
            ));
        }
        if self.vehicles.is_empty() {
            return Err(anyhow!(
                "depot '{}' must declare at least one vehicle",
                depot_id
            ));
        }
        Ok(())
    }

    /// Human-readable name, falling back to the depot id.
    pub fn display_name<'a>(&'a self, depot_id: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(depot_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            listen: default_metrics_listen(),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Keep an in-process copy of every message (tests and embedding).
    #[serde(default)]
    pub in_memory: bool,
    /// Queue bound for the in-memory transport; the oldest message is dropped when full.
    #[serde(default = "default_in_memory_capacity")]
    pub in_memory_capacity: usize,
    /// `-` writes to stdout, anything else is a file path.
    #[serde(default)]
    pub json_lines: Option<String>,
    #[serde(rename = "reconnect_backoff_ms", default = "default_reconnect_backoff")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub reconnect_backoff: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            in_memory: false,
            in_memory_capacity: default_in_memory_capacity(),
            json_lines: None,
            reconnect_backoff: default_reconnect_backoff(),
        }
    }
}
