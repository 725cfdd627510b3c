//! ---
//! rsim_section: "11-simulation"
//! rsim_subsection: "module"
//! rsim_type: "source"
//! rsim_scope: "code"
//! rsim_description: "Trackside point machine health and position model."
//! rsim_version: "v0.1.0"
//! rsim_owner: "tbd"
//! ---
use rand::Rng;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::alert::{Alert, Severity};
use crate::health::{DiscreteState, ScalarSpec, TransitionModel};
use crate::numeric::{bounded_walk, Band};
use crate::selector::WeightTable;
use crate::{Result, SimError};

pub const POINT_MACHINE_STATE_CHANGE_PROBABILITY: f64 = 0.03;
pub const POINT_MACHINE_STATE_WEIGHTS: [(DiscreteState, f64); 3] = [
    (DiscreteState::Normal, 0.93),
    (DiscreteState::Warning, 0.05),
    (DiscreteState::Fault, 0.02),
];
/// Per-sweep probability that a healthy device throws to the other position.
pub const THROW_PROBABILITY: f64 = 0.2;
const INITIAL_OPERATIONS_MAX: u64 = 5_000;

pub const MOTOR_CURRENT: ScalarSpec = ScalarSpec {
    field: "motorCurrent",
    normal: Band::new(2.0, 3.5),
    warning: Band::new(3.0, 5.0),
    fault: Band::new(4.5, 8.0),
    step: 0.2,
    fault_bias: 0.0,
};

pub const VOLTAGE: ScalarSpec = ScalarSpec {
    field: "voltage",
    normal: Band::new(105.0, 115.0),
    warning: Band::new(98.0, 118.0),
    fault: Band::new(80.0, 120.0),
    step: 1.0,
    fault_bias: 0.0,
};

pub const STROKE_TIME: ScalarSpec = ScalarSpec {
    field: "strokeTime",
    normal: Band::new(2.5, 4.0),
    warning: Band::new(4.0, 6.0),
    fault: Band::new(6.0, 10.0),
    step: 0.2,
    fault_bias: 0.0,
};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PointPosition {
    Normal,
    Reverse,
    /// Blades between end positions; only seen while faulted.
    Intermediate,
}

impl PointPosition {
    fn thrown(self) -> Self {
        match self {
            PointPosition::Normal => PointPosition::Reverse,
            PointPosition::Reverse => PointPosition::Normal,
            PointPosition::Intermediate => PointPosition::Intermediate,
        }
    }

    fn random_end<R: Rng + ?Sized>(rng: &mut R) -> Self {
        if rng.gen_bool(0.5) {
            PointPosition::Normal
        } else {
            PointPosition::Reverse
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointMachineModel {
    transitions: TransitionModel,
    throw_probability: f64,
}

impl PointMachineModel {
    pub fn new(transitions: TransitionModel, throw_probability: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&throw_probability) {
            return Err(SimError::InvalidProbability(throw_probability));
        }
        Ok(Self {
            transitions,
            throw_probability,
        })
    }

    pub fn standard() -> Result<Self> {
        Self::new(
            TransitionModel::new(
                POINT_MACHINE_STATE_CHANGE_PROBABILITY,
                WeightTable::new(POINT_MACHINE_STATE_WEIGHTS)?,
            )?,
            THROW_PROBABILITY,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointMachineState {
    pub state: DiscreteState,
    pub motor_current: f64,
    pub voltage: f64,
    pub stroke_time: f64,
    pub position: PointPosition,
    pub operation_count: u64,
}

impl PointMachineState {
    pub fn initialize<R: Rng + ?Sized>(model: &PointMachineModel, rng: &mut R) -> Self {
        let state = model.transitions.initial(rng);
        let position = if state == DiscreteState::Fault {
            PointPosition::Intermediate
        } else {
            PointPosition::random_end(rng)
        };
        Self {
            state,
            motor_current: MOTOR_CURRENT.band(state).sample(rng),
            voltage: VOLTAGE.band(state).sample(rng),
            stroke_time: STROKE_TIME.band(state).sample(rng),
            position,
            operation_count: rng.gen_range(0..INITIAL_OPERATIONS_MAX),
        }
    }

    /// One sweep: state transition, measurement walks, then position.
    pub fn sweep<R: Rng + ?Sized>(&mut self, model: &PointMachineModel, rng: &mut R) {
        self.state = model.transitions.evolve(self.state, rng);
        let state = self.state;
        self.motor_current = walk(rng, self.motor_current, &MOTOR_CURRENT, state);
        self.voltage = walk(rng, self.voltage, &VOLTAGE, state);
        self.stroke_time = walk(rng, self.stroke_time, &STROKE_TIME, state);

        if state == DiscreteState::Fault {
            self.position = PointPosition::Intermediate;
        } else if self.position == PointPosition::Intermediate {
            self.position = PointPosition::random_end(rng);
            self.operation_count += 1;
        } else if rng.gen_bool(model.throw_probability) {
            self.position = self.position.thrown();
            self.operation_count += 1;
        }
    }

    /// At most one alert per device per sweep.
    pub fn alert(&self, device_id: &str) -> Option<Alert> {
        match self.state {
            DiscreteState::Fault => Some(Alert::new(
                "POINT_STUCK_THROW",
                Severity::Critical,
                format!(
                    "Point machine {device_id} stuck mid-throw, motor current {:.1} A",
                    self.motor_current
                ),
            )),
            DiscreteState::Warning => Some(Alert::new(
                "POINT_SLOW_OPERATION",
                Severity::High,
                format!(
                    "Point machine {device_id} slow to throw, stroke time {:.1}s",
                    self.stroke_time
                ),
            )),
            DiscreteState::Normal => None,
        }
    }
}

fn walk<R: Rng + ?Sized>(rng: &mut R, value: f64, spec: &ScalarSpec, state: DiscreteState) -> f64 {
    bounded_walk(rng, value, spec.step, spec.bias(state), spec.band(state))
}
