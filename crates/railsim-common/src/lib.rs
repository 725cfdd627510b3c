//! ---
//! rsim_section: "01-core-functionality"
//! rsim_subsection: "module"
//! rsim_type: "source"
//! rsim_scope: "code"
//! rsim_description: "Shared configuration, logging and timing primitives."
//! rsim_version: "v0.1.0"
//! rsim_owner: "tbd"
//! ---
//! Shared primitives for the railsim workspace: configuration loading,
//! tracing bootstrap and driver tick timing.

pub mod config;
pub mod logging;
pub mod timing;

pub use config::{
    AppConfig, DepotConfig, LoadedAppConfig, LoggingConfig, MetricsConfig, ProfileKind,
    SimulationConfig, TransportConfig, DEFAULT_CONFIG_CANDIDATES,
};
pub use logging::{init_stderr_tracing, init_tracing, LogFormat};
pub use timing::{jitter_us, JitterSummary, TickTimer};
