//! ---
//! rsim_section: "01-core-functionality"
//! rsim_subsection: "module"
//! rsim_type: "source"
//! rsim_scope: "code"
//! rsim_description: "Tick driver and runtime lifecycle."
//! rsim_version: "v0.1.0"
//! rsim_owner: "tbd"
//! ---
//! Drives a [`railsim_sim::TelemetryEngine`] from configuration: the
//! synchronous [`TickDriver`] decides which entities advance on each tick and
//! the async [`SimulatorRuntime`] paces it and publishes the results.

pub mod driver;
pub mod runtime;

pub use driver::TickDriver;
pub use runtime::{RunSummary, RuntimeHandle, SimulatorRuntime};
