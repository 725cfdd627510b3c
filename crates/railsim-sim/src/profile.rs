//! ---
//! rsim_section: "11-simulation"
//! rsim_subsection: "module"
//! rsim_type: "source"
//! rsim_scope: "code"
//! rsim_description: "Engine profiles: subsystem sets, status weights and motion models."
//! rsim_version: "v0.1.0"
//! rsim_owner: "tbd"
//! ---
use railsim_common::config::{ProfileKind, SimulationConfig};
use tracing::debug;

use crate::health::{Subsystem, TransitionModel};
use crate::motion::{MotionModel, MotionProfile};
use crate::point_machine::PointMachineModel;
use crate::selector::WeightTable;
use crate::vehicle::OperationalStatus;
use crate::{Result, SimError};

pub const DEFAULT_STATUS_CHANGE_PROBABILITY: f64 = 0.04;

const MAINLINE_STATUS_WEIGHTS: [(OperationalStatus, f64); 5] = [
    (OperationalStatus::InService, 0.70),
    (OperationalStatus::Standby, 0.12),
    (OperationalStatus::InDepot, 0.10),
    (OperationalStatus::Maintenance, 0.05),
    (OperationalStatus::Fault, 0.03),
];

const LIGHT_RAIL_STATUS_WEIGHTS: [(OperationalStatus, f64); 5] = [
    (OperationalStatus::InService, 0.60),
    (OperationalStatus::Standby, 0.22),
    (OperationalStatus::InDepot, 0.10),
    (OperationalStatus::Maintenance, 0.05),
    (OperationalStatus::Fault, 0.03),
];

/// Everything that distinguishes one fleet flavour from another.
#[derive(Debug, Clone)]
pub struct EngineProfile {
    name: String,
    subsystems: Vec<Subsystem>,
    status_weights: WeightTable<OperationalStatus>,
    status_change_probability: f64,
    motion: MotionProfile,
    component_model: TransitionModel,
    point_machine_model: PointMachineModel,
}

impl EngineProfile {
    pub fn new(
        name: impl Into<String>,
        subsystems: Vec<Subsystem>,
        status_weights: WeightTable<OperationalStatus>,
        motion_model: MotionModel,
    ) -> Result<Self> {
        let name = name.into();
        if subsystems.is_empty() {
            return Err(SimError::NoSubsystems(name));
        }
        let mut unique = Vec::with_capacity(subsystems.len());
        for subsystem in subsystems {
            if !unique.contains(&subsystem) {
                unique.push(subsystem);
            }
        }
        Ok(Self {
            name,
            subsystems: unique,
            status_weights,
            status_change_probability: DEFAULT_STATUS_CHANGE_PROBABILITY,
            motion: MotionProfile::new(motion_model)?,
            component_model: TransitionModel::vehicle_components()?,
            point_machine_model: PointMachineModel::standard()?,
        })
    }

    /// Heavy rail: every subsystem, phased motion.
    pub fn mainline() -> Result<Self> {
        Self::new(
            ProfileKind::Mainline.to_string(),
            vec![
                Subsystem::Doors,
                Subsystem::Brakes,
                Subsystem::Hvac,
                Subsystem::Pantograph,
                Subsystem::Propulsion,
                Subsystem::Battery,
                Subsystem::Cctv,
            ],
            WeightTable::new(MAINLINE_STATUS_WEIGHTS)?,
            MotionModel::Phased,
        )
    }

    /// Battery-fed light rail: no pantograph, more time on standby.
    pub fn light_rail() -> Result<Self> {
        Self::new(
            ProfileKind::LightRail.to_string(),
            vec![
                Subsystem::Doors,
                Subsystem::Brakes,
                Subsystem::Hvac,
                Subsystem::Propulsion,
                Subsystem::Battery,
                Subsystem::Cctv,
            ],
            WeightTable::new(LIGHT_RAIL_STATUS_WEIGHTS)?,
            MotionModel::Phased,
        )
    }

    /// Older rolling stock with a reduced subsystem set and the deprecated
    /// random-walk motion model.
    pub fn legacy() -> Result<Self> {
        Self::new(
            ProfileKind::Legacy.to_string(),
            vec![Subsystem::Doors, Subsystem::Brakes, Subsystem::Propulsion],
            WeightTable::new(MAINLINE_STATUS_WEIGHTS)?,
            MotionModel::RandomWalk,
        )
    }

    pub fn for_kind(kind: ProfileKind) -> Result<Self> {
        match kind {
            ProfileKind::Mainline => Self::mainline(),
            ProfileKind::LightRail => Self::light_rail(),
            ProfileKind::Legacy => Self::legacy(),
        }
    }

    /// Built-in profile selected by `config`, with its overrides applied.
    pub fn from_config(config: &SimulationConfig) -> Result<Self> {
        let mut profile = Self::for_kind(config.profile)?;
        if let Some(probability) = config.status_change_probability {
            profile = profile.with_status_change_probability(probability)?;
        }
        debug!(
            profile = %profile.name,
            subsystems = profile.subsystems.len(),
            motion_model = %profile.motion.model(),
            status_change_probability = profile.status_change_probability,
            "engine profile resolved"
        );
        Ok(profile)
    }

    pub fn with_status_change_probability(mut self, probability: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(SimError::InvalidProbability(probability));
        }
        self.status_change_probability = probability;
        Ok(self)
    }

    pub fn with_status_weights(mut self, weights: WeightTable<OperationalStatus>) -> Self {
        self.status_weights = weights;
        self
    }

    pub fn with_component_model(mut self, model: TransitionModel) -> Self {
        self.component_model = model;
        self
    }

    pub fn with_point_machine_model(mut self, model: PointMachineModel) -> Self {
        self.point_machine_model = model;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subsystems(&self) -> &[Subsystem] {
        &self.subsystems
    }

    pub fn status_weights(&self) -> &WeightTable<OperationalStatus> {
        &self.status_weights
    }

    pub fn status_change_probability(&self) -> f64 {
        self.status_change_probability
    }

    pub fn motion(&self) -> &MotionProfile {
        &self.motion
    }

    pub fn component_model(&self) -> &TransitionModel {
        &self.component_model
    }

    pub fn point_machine_model(&self) -> &PointMachineModel {
        &self.point_machine_model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_profiles_differ_where_expected() {
        let mainline = EngineProfile::mainline().unwrap();
        let light_rail = EngineProfile::light_rail().unwrap();
        let legacy = EngineProfile::legacy().unwrap();

        assert_eq!(mainline.subsystems().len(), 7);
        assert!(!light_rail.subsystems().contains(&Subsystem::Pantograph));
        assert_eq!(legacy.subsystems().len(), 3);
        assert_eq!(mainline.motion().model(), MotionModel::Phased);
        assert_eq!(legacy.motion().model(), MotionModel::RandomWalk);
        assert_eq!(light_rail.name(), "light_rail");
    }

    #[test]
    fn rejects_empty_subsystem_sets() {
        let weights = WeightTable::new(MAINLINE_STATUS_WEIGHTS).unwrap();
        let err = EngineProfile::new("bare", Vec::new(), weights, MotionModel::Phased).unwrap_err();
        assert_eq!(err, SimError::NoSubsystems("bare".into()));
    }

    #[test]
    fn duplicate_subsystems_are_collapsed() {
        let weights = WeightTable::new(MAINLINE_STATUS_WEIGHTS).unwrap();
        let profile = EngineProfile::new(
            "dup",
            vec![Subsystem::Doors, Subsystem::Doors, Subsystem::Brakes],
            weights,
            MotionModel::Phased,
        )
        .unwrap();
        assert_eq!(profile.subsystems(), &[Subsystem::Doors, Subsystem::Brakes]);
    }

    #[test]
    fn config_overrides_status_change_probability() {
        let config = SimulationConfig {
            profile: ProfileKind::LightRail,
            status_change_probability: Some(0.0),
            ..SimulationConfig::default()
        };
        let profile = EngineProfile::from_config(&config).unwrap();
        assert_eq!(profile.status_change_probability(), 0.0);
        assert_eq!(profile.name(), "light_rail");

        let default = EngineProfile::from_config(&SimulationConfig::default()).unwrap();
        assert_eq!(
            default.status_change_probability(),
            DEFAULT_STATUS_CHANGE_PROBABILITY
        );
        assert!(default.with_status_change_probability(-0.1).is_err());
    }
}
