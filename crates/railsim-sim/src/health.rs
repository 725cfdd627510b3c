//! ---
//! rsim_section: "11-simulation"
//! rsim_subsection: "module"
//! rsim_type: "source"
//! rsim_scope: "code"
//! rsim_description: "Discrete health states and per-subsystem measurement models."
//! rsim_version: "v0.1.0"
//! rsim_owner: "tbd"
//! ---
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use strum::{Display, EnumIter, EnumString};

use crate::alert::{Alert, Severity};
use crate::numeric::{bounded_walk, round1, Band};
use crate::selector::WeightTable;
use crate::{Result, SimError};

/// Per-tick probability that a vehicle component resamples its state.
pub const VEHICLE_STATE_CHANGE_PROBABILITY: f64 = 0.05;
pub const VEHICLE_STATE_WEIGHTS: [(DiscreteState, f64); 3] = [
    (DiscreteState::Normal, 0.88),
    (DiscreteState::Warning, 0.09),
    (DiscreteState::Fault, 0.03),
];

/// Number of cameras carried by the CCTV subsystem.
pub const CAMERA_COUNT: usize = 8;
const CAMERA_TOGGLE_PROBABILITY: f64 = 0.1;

/// Alerting thresholds applied regardless of the discrete state.
pub const LINE_VOLTAGE_ALERT_BELOW: f64 = 1200.0;
pub const MOTOR_TEMP_ALERT_ABOVE: f64 = 120.0;

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
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
pub enum DiscreteState {
    #[default]
    Normal,
    Warning,
    Fault,
}

/// Sticky discrete evolution: keep the current state unless a uniform draw
/// falls under `change_probability`, then resample from the weight table.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionModel {
    change_probability: f64,
    table: WeightTable<DiscreteState>,
}

impl TransitionModel {
    pub fn new(change_probability: f64, table: WeightTable<DiscreteState>) -> Result<Self> {
        if !(0.0..=1.0).contains(&change_probability) {
            return Err(SimError::InvalidProbability(change_probability));
        }
        Ok(Self {
            change_probability,
            table,
        })
    }

    /// Default model for vehicle subsystems.
    pub fn vehicle_components() -> Result<Self> {
        Self::new(
            VEHICLE_STATE_CHANGE_PROBABILITY,
            WeightTable::new(VEHICLE_STATE_WEIGHTS)?,
        )
    }

    pub fn initial<R: Rng + ?Sized>(&self, rng: &mut R) -> DiscreteState {
        self.table.sample(rng)
    }

    pub fn evolve<R: Rng + ?Sized>(&self, current: DiscreteState, rng: &mut R) -> DiscreteState {
        if rng.gen::<f64>() < self.change_probability {
            self.table.sample(rng)
        } else {
            current
        }
    }
}

/// Vehicle subsystems monitored by the health model.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Subsystem {
    Doors,
    Brakes,
    Hvac,
    Pantograph,
    Propulsion,
    Battery,
    Cctv,
}

/// Random walk parameters for a single-valued subsystem measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalarSpec {
    pub field: &'static str,
    pub normal: Band,
    pub warning: Band,
    pub fault: Band,
    pub step: f64,
    pub fault_bias: f64,
}

impl ScalarSpec {
    pub fn band(&self, state: DiscreteState) -> Band {
        match state {
            DiscreteState::Normal => self.normal,
            DiscreteState::Warning => self.warning,
            DiscreteState::Fault => self.fault,
        }
    }

    pub fn bias(&self, state: DiscreteState) -> f64 {
        if state == DiscreteState::Fault {
            self.fault_bias
        } else {
            0.0
        }
    }
}

impl Subsystem {
    /// Walk parameters, or `None` for subsystems with a non-scalar measurement.
    pub fn scalar_spec(&self) -> Option<ScalarSpec> {
        let spec = match self {
            Subsystem::Doors => ScalarSpec {
                field: "closeTimeS",
                normal: Band::new(2.5, 4.0),
                warning: Band::new(3.5, 6.0),
                fault: Band::new(5.0, 12.0),
                step: 0.3,
                fault_bias: 0.2,
            },
            Subsystem::Brakes => ScalarSpec {
                field: "pressurePsi",
                normal: Band::new(80.0, 110.0),
                warning: Band::new(72.0, 110.0),
                fault: Band::new(55.0, 110.0),
                step: 1.5,
                fault_bias: -1.0,
            },
            Subsystem::Hvac => ScalarSpec {
                field: "cabinTempC",
                normal: Band::new(19.0, 25.0),
                warning: Band::new(16.0, 28.0),
                fault: Band::new(10.0, 35.0),
                step: 0.4,
                fault_bias: 0.0,
            },
            Subsystem::Pantograph => ScalarSpec {
                field: "lineVoltageV",
                normal: Band::new(1450.0, 1650.0),
                warning: Band::new(1150.0, 1700.0),
                fault: Band::new(900.0, 1800.0),
                step: 15.0,
                fault_bias: -10.0,
            },
            Subsystem::Propulsion => ScalarSpec {
                field: "motorTempC",
                normal: Band::new(40.0, 95.0),
                warning: Band::new(60.0, 125.0),
                fault: Band::new(80.0, 140.0),
                step: 2.0,
                fault_bias: 2.0,
            },
            Subsystem::Battery => ScalarSpec {
                field: "stateOfChargePct",
                normal: Band::new(70.0, 100.0),
                warning: Band::new(40.0, 100.0),
                fault: Band::new(10.0, 60.0),
                step: 1.0,
                fault_bias: -0.5,
            },
            Subsystem::Cctv => return None,
        };
        Some(spec)
    }
}

/// Inclusive range of offline cameras permitted in each state.
pub fn offline_camera_band(state: DiscreteState) -> (usize, usize) {
    match state {
        DiscreteState::Normal => (0, 0),
        DiscreteState::Warning => (1, 2),
        DiscreteState::Fault => (3, CAMERA_COUNT),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Measurement {
    Scalar(f64),
    /// Online flag per camera.
    Cameras(Vec<bool>),
}

impl Measurement {
    pub fn scalar(&self) -> Option<f64> {
        match self {
            Measurement::Scalar(value) => Some(*value),
            Measurement::Cameras(_) => None,
        }
    }

    pub fn offline_cameras(&self) -> Vec<usize> {
        match self {
            Measurement::Cameras(cameras) => cameras
                .iter()
                .enumerate()
                .filter(|(_, online)| !**online)
                .map(|(index, _)| index)
                .collect(),
            Measurement::Scalar(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComponentState {
    pub state: DiscreteState,
    pub measurement: Measurement,
}

impl ComponentState {
    /// Fresh component whose measurement sits inside the band for `state`.
    pub fn initialize<R: Rng + ?Sized>(
        subsystem: Subsystem,
        state: DiscreteState,
        rng: &mut R,
    ) -> Self {
        let measurement = match subsystem.scalar_spec() {
            Some(spec) => Measurement::Scalar(spec.band(state).sample(rng)),
            None => {
                let mut cameras = vec![true; CAMERA_COUNT];
                enforce_offline_band(&mut cameras, state, rng);
                Measurement::Cameras(cameras)
            }
        };
        Self { state, measurement }
    }

    /// Evolve the discrete state, then walk the measurement under the new state's band.
    pub fn evolve<R: Rng + ?Sized>(
        &mut self,
        subsystem: Subsystem,
        model: &TransitionModel,
        rng: &mut R,
    ) {
        self.state = model.evolve(self.state, rng);
        let state = self.state;
        match (&mut self.measurement, subsystem.scalar_spec()) {
            (Measurement::Scalar(value), Some(spec)) => {
                *value = bounded_walk(rng, *value, spec.step, spec.bias(state), spec.band(state));
            }
            (Measurement::Cameras(cameras), None) => {
                if !cameras.is_empty() && rng.gen_bool(CAMERA_TOGGLE_PROBABILITY) {
                    let index = rng.gen_range(0..cameras.len());
                    cameras[index] = !cameras[index];
                }
                enforce_offline_band(cameras, state, rng);
            }
            (measurement, _) => {
                *measurement = Self::initialize(subsystem, state, rng).measurement;
            }
        }
    }

    /// Alerts implied by this component's current state and measurement.
    pub fn alerts(&self, subsystem: Subsystem) -> Vec<Alert> {
        let mut alerts = Vec::new();
        let fault = self.state == DiscreteState::Fault;
        let warning = self.state == DiscreteState::Warning;

        if let Measurement::Cameras(cameras) = &self.measurement {
            if fault {
                let offline = self.measurement.offline_cameras().len();
                alerts.push(Alert::new(
                    "CCTV_OFFLINE",
                    Severity::Medium,
                    format!("{offline} of {} cameras offline", cameras.len()),
                ));
            }
            return alerts;
        }

        let value = self.measurement.scalar().map(round1).unwrap_or_default();
        match subsystem {
            Subsystem::Doors => {
                if fault {
                    alerts.push(Alert::new(
                        "DOOR_FAULT",
                        Severity::High,
                        format!("Door close time {value:.1}s exceeds limit"),
                    ));
                } else if warning {
                    alerts.push(Alert::new(
                        "DOOR_SLOW_CLOSE",
                        Severity::Low,
                        format!("Doors closing slowly ({value:.1}s)"),
                    ));
                }
            }
            Subsystem::Brakes => {
                if fault {
                    alerts.push(Alert::new(
                        "BRAKE_PRESSURE_LOW",
                        Severity::Critical,
                        format!("Brake pressure {value:.1} psi below operating minimum"),
                    ));
                }
            }
            Subsystem::Hvac => {
                if fault {
                    alerts.push(Alert::new(
                        "HVAC_FAULT",
                        Severity::Medium,
                        format!("Climate control failure, cabin at {value:.1}C"),
                    ));
                }
            }
            Subsystem::Pantograph => {
                if fault {
                    alerts.push(Alert::new(
                        "PANTOGRAPH_FAULT",
                        Severity::High,
                        format!("Pantograph fault, line voltage {value:.1} V"),
                    ));
                }
                if value < LINE_VOLTAGE_ALERT_BELOW {
                    alerts.push(Alert::new(
                        "LINE_VOLTAGE_LOW",
                        Severity::High,
                        format!("Line voltage {value:.1} V below {LINE_VOLTAGE_ALERT_BELOW:.0} V"),
                    ));
                }
            }
            Subsystem::Propulsion => {
                if fault {
                    alerts.push(Alert::new(
                        "PROPULSION_FAULT",
                        Severity::Critical,
                        format!("Propulsion fault, motor at {value:.1}C"),
                    ));
                }
                if value > MOTOR_TEMP_ALERT_ABOVE {
                    alerts.push(Alert::new(
                        "MOTOR_OVERTEMP",
                        Severity::High,
                        format!(
                            "Traction motor at {value:.1}C exceeds {MOTOR_TEMP_ALERT_ABOVE:.0}C"
                        ),
                    ));
                }
            }
            Subsystem::Battery => {
                if fault {
                    alerts.push(Alert::new(
                        "BATTERY_FAULT",
                        Severity::High,
                        format!("Onboard battery fault, charge {value:.1}%"),
                    ));
                } else if warning {
                    alerts.push(Alert::new(
                        "BATTERY_LOW",
                        Severity::Low,
                        format!("Onboard battery low, charge {value:.1}%"),
                    ));
                }
            }
            Subsystem::Cctv => {}
        }
        alerts
    }

    /// Externally reported fields, values rounded to one decimal.
    pub fn reported_values(&self, subsystem: Subsystem) -> Map<String, Value> {
        let mut values = Map::new();
        match &self.measurement {
            Measurement::Scalar(value) => {
                let field = subsystem
                    .scalar_spec()
                    .map(|spec| spec.field)
                    .unwrap_or("value");
                values.insert(field.to_owned(), json!(round1(*value)));
            }
            Measurement::Cameras(cameras) => {
                let offline = self.measurement.offline_cameras();
                values.insert("camerasTotal".to_owned(), json!(cameras.len()));
                values.insert(
                    "camerasOnline".to_owned(),
                    json!(cameras.len() - offline.len()),
                );
                values.insert("offlineCameras".to_owned(), json!(offline));
            }
        }
        values
    }
}

// Flip cameras until the offline count sits inside the state's band.
fn enforce_offline_band<R: Rng + ?Sized>(cameras: &mut [bool], state: DiscreteState, rng: &mut R) {
    let (min_offline, max_offline) = offline_camera_band(state);
    loop {
        let offline: Vec<usize> = (0..cameras.len()).filter(|&i| !cameras[i]).collect();
        if offline.len() < min_offline {
            let online: Vec<usize> = (0..cameras.len()).filter(|&i| cameras[i]).collect();
            if online.is_empty() {
                break;
            }
            cameras[online[rng.gen_range(0..online.len())]] = false;
        } else if offline.len() > max_offline {
            cameras[offline[rng.gen_range(0..offline.len())]] = true;
        } else {
            break;
        }
    }
}
