//! ---
//! rsim_section: "11-simulation"
//! rsim_subsection: "01-bootstrap"
//! rsim_type: "source"
//! rsim_scope: "code"
//! rsim_description: "Simulation engine module exports and shared types."
//! rsim_version: "v0.1.0"
//! rsim_owner: "tbd"
//! ---
//! Stateful telemetry simulation for rail vehicles and trackside point machines.
//!
//! The [`TelemetryEngine`] owns every per-entity state registry and a single
//! injected random source. Callers drive it one entity at a time through
//! [`TelemetryEngine::advance_vehicle`] and [`TelemetryEngine::sweep_depot`];
//! each call returns an immutable event snapshot from [`events`].

pub mod alert;
pub mod engine;
pub mod events;
pub mod health;
pub mod motion;
pub mod numeric;
pub mod point_machine;
pub mod profile;
pub mod scoring;
pub mod selector;
pub mod vehicle;

/// Shared result type for engine construction.
pub type Result<T> = std::result::Result<T, SimError>;

/// Errors raised while building engine inputs. Ticking itself never fails.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SimError {
    /// A weight table was built without entries.
    #[error("weight table must contain at least one entry")]
    EmptyWeightTable,
    /// A weight was negative or not finite.
    #[error("weight at position {index} is invalid: {weight}")]
    InvalidWeight { index: usize, weight: f64 },
    /// Every weight in the table was zero.
    #[error("weight table total must be greater than zero")]
    ZeroTotalWeight,
    /// Probability outside `[0, 1]`.
    #[error("probability {0} is outside [0, 1]")]
    InvalidProbability(f64),
    /// Routes need somewhere to go and somewhere to come back from.
    #[error("route must contain at least two stops, got {0}")]
    RouteTooShort(usize),
    /// A profile was configured without any vehicle subsystems.
    #[error("profile '{0}' declares no subsystems")]
    NoSubsystems(String),
    /// Distribution parameters rejected by `rand_distr`.
    #[error("invalid distribution parameters: {0}")]
    Distribution(String),
}

pub use alert::{Alert, Severity};
pub use engine::TelemetryEngine;
pub use events::{
    ComponentReading, DepotAnnouncement, PointMachineTelemetry, TelemetryEvent, VehicleTelemetry,
    EVENT_SCHEMA_VERSION,
};
pub use health::{ComponentState, DiscreteState, Measurement, Subsystem, TransitionModel};
pub use motion::{Direction, MotionModel, MotionPhase, MotionProfile, MotionState, Route};
pub use point_machine::{PointMachineModel, PointMachineState, PointPosition};
pub use profile::EngineProfile;
pub use selector::WeightTable;
pub use vehicle::{OperationalStatus, VehicleState};
