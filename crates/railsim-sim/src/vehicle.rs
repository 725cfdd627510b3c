//! ---
//! rsim_section: "11-simulation"
//! rsim_subsection: "module"
//! rsim_type: "source"
//! rsim_scope: "code"
//! rsim_description: "Per-vehicle operational, motion and component state."
//! rsim_version: "v0.1.0"
//! rsim_owner: "tbd"
//! ---
use indexmap::IndexMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::health::{ComponentState, DiscreteState, Subsystem};
use crate::motion::{MotionState, MotionStep, Route};
use crate::profile::EngineProfile;

/// Upper bound for the odometer of a freshly initialized vehicle.
pub const INITIAL_ODOMETER_MAX: f64 = 60_000.0;
/// Upper bound for distance since last service at initialization.
pub const INITIAL_SINCE_SERVICE_MAX: f64 = 50_000.0;

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
    EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationalStatus {
    InService,
    Standby,
    InDepot,
    Maintenance,
    Fault,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VehicleState {
    pub status: OperationalStatus,
    pub motion: MotionState,
    pub odometer: f64,
    pub odometer_at_last_service: f64,
    pub components: IndexMap<Subsystem, ComponentState>,
}

/// Summary of what one tick changed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOutcome {
    pub previous_status: OperationalStatus,
    pub status: OperationalStatus,
    pub arrived: bool,
    pub distance: f64,
}

impl TickOutcome {
    pub fn status_changed(&self) -> bool {
        self.previous_status != self.status
    }
}

impl VehicleState {
    /// Random but internally consistent starting state on `route`.
    pub fn initialize<R: Rng + ?Sized>(profile: &EngineProfile, route: &Route, rng: &mut R) -> Self {
        let status = profile.status_weights().sample(rng);
        let mut motion = MotionState::randomized(route, rng);
        if status != OperationalStatus::InService {
            motion.reset_to_dwell(rng);
        }

        let odometer = rng.gen_range(0.0..INITIAL_ODOMETER_MAX);
        let since_service = rng.gen_range(0.0..INITIAL_SINCE_SERVICE_MAX).min(odometer);

        let model = profile.component_model();
        let components = profile
            .subsystems()
            .iter()
            .map(|&subsystem| {
                let state = model.initial(rng);
                (subsystem, ComponentState::initialize(subsystem, state, rng))
            })
            .collect();

        Self {
            status,
            motion,
            odometer,
            odometer_at_last_service: odometer - since_service,
            components,
        }
    }

    /// Advance status, motion and components by one tick.
    pub fn tick<R: Rng + ?Sized>(
        &mut self,
        profile: &EngineProfile,
        route: &Route,
        rng: &mut R,
    ) -> TickOutcome {
        let previous_status = self.status;
        if rng.gen::<f64>() < profile.status_change_probability() {
            self.status = profile.status_weights().sample(rng);
        }

        let step = match self.status {
            OperationalStatus::InService if previous_status != OperationalStatus::InService => {
                self.motion.reset_to_dwell(rng);
                MotionStep::STATIONARY
            }
            OperationalStatus::InService => profile.motion().advance(&mut self.motion, route, rng),
            OperationalStatus::Standby => {
                self.motion.hold_standby(rng);
                MotionStep::STATIONARY
            }
            OperationalStatus::InDepot
            | OperationalStatus::Maintenance
            | OperationalStatus::Fault => {
                self.motion.reset_to_dwell(rng);
                MotionStep::STATIONARY
            }
        };

        let model = profile.component_model();
        for (subsystem, component) in self.components.iter_mut() {
            component.evolve(*subsystem, model, rng);
        }
        self.odometer += step.distance;

        TickOutcome {
            previous_status,
            status: self.status,
            arrived: step.arrived,
            distance: step.distance,
        }
    }

    /// Mark the vehicle as serviced at its current odometer reading.
    pub fn record_service(&mut self) {
        self.odometer_at_last_service = self.odometer;
    }

    pub fn distance_since_service(&self) -> f64 {
        self.odometer - self.odometer_at_last_service
    }

    /// `(faults, warnings)` across all components.
    pub fn state_counts(&self) -> (usize, usize) {
        self.components
            .values()
            .fold((0, 0), |(faults, warnings), component| match component.state {
                DiscreteState::Fault => (faults + 1, warnings),
                DiscreteState::Warning => (faults, warnings + 1),
                DiscreteState::Normal => (faults, warnings),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::{MotionPhase, MAX_SPEED};
    use crate::selector::WeightTable;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn route() -> Route {
        Route::new(vec!["A".into(), "B".into(), "C".into()]).unwrap()
    }

    fn pinned(status: OperationalStatus, change_probability: f64) -> EngineProfile {
        EngineProfile::mainline()
            .unwrap()
            .with_status_weights(WeightTable::new([(status, 1.0)]).unwrap())
            .with_status_change_probability(change_probability)
            .unwrap()
    }

    #[test]
    fn initialization_is_consistent() {
        let profile = EngineProfile::mainline().unwrap();
        let mut rng = StdRng::seed_from_u64(12);
        for _ in 0..500 {
            let vehicle = VehicleState::initialize(&profile, &route(), &mut rng);
            assert!(vehicle.odometer_at_last_service >= 0.0);
            assert!(vehicle.odometer_at_last_service <= vehicle.odometer);
            assert_eq!(vehicle.components.len(), profile.subsystems().len());
            if vehicle.status != OperationalStatus::InService {
                assert_eq!(vehicle.motion.phase, MotionPhase::Dwell);
                assert_eq!(vehicle.motion.speed, 0.0);
            }
        }
    }

    #[test]
    fn maintenance_mid_cruise_stops_on_the_same_tick() {
        let profile = pinned(OperationalStatus::Maintenance, 1.0);
        let mut rng = StdRng::seed_from_u64(13);
        let mut vehicle = VehicleState::initialize(&pinned(OperationalStatus::InService, 0.0), &route(), &mut rng);
        vehicle.status = OperationalStatus::InService;
        vehicle.motion.phase = MotionPhase::Cruise;
        vehicle.motion.speed = 78.0;
        vehicle.motion.progress = 0.4;

        let outcome = vehicle.tick(&profile, &route(), &mut rng);
        assert!(outcome.status_changed());
        assert_eq!(vehicle.status, OperationalStatus::Maintenance);
        assert_eq!(vehicle.motion.speed, 0.0);
        assert_eq!(vehicle.motion.phase, MotionPhase::Dwell);
        assert_eq!(vehicle.motion.progress, 0.0);
    }

    #[test]
    fn returning_to_service_restarts_from_dwell() {
        let profile = pinned(OperationalStatus::InService, 1.0);
        let mut rng = StdRng::seed_from_u64(14);
        let mut vehicle = VehicleState::initialize(&profile, &route(), &mut rng);
        vehicle.status = OperationalStatus::Standby;
        vehicle.motion.speed = 12.0;
        vehicle.motion.progress = 0.5;

        let outcome = vehicle.tick(&profile, &route(), &mut rng);
        assert_eq!(outcome.status, OperationalStatus::InService);
        assert_eq!(outcome.distance, 0.0);
        assert_eq!(vehicle.motion.phase, MotionPhase::Dwell);
        assert_eq!(vehicle.motion.speed, 0.0);
        assert_eq!(vehicle.motion.progress, 0.0);
    }

    #[test]
    fn odometer_never_decreases_and_speed_stays_bounded() {
        let profile = EngineProfile::mainline().unwrap();
        let mut rng = StdRng::seed_from_u64(15);
        let mut vehicle = VehicleState::initialize(&profile, &route(), &mut rng);
        let mut last = vehicle.odometer;
        for _ in 0..5_000 {
            vehicle.tick(&profile, &route(), &mut rng);
            assert!(vehicle.odometer >= last);
            assert!((0.0..=MAX_SPEED).contains(&vehicle.motion.speed));
            last = vehicle.odometer;
        }
    }

    #[test]
    fn record_service_clears_distance_since_service() {
        let profile = EngineProfile::mainline().unwrap();
        let mut rng = StdRng::seed_from_u64(16);
        let mut vehicle = VehicleState::initialize(&profile, &route(), &mut rng);
        vehicle.odometer = 45_000.0;
        vehicle.odometer_at_last_service = 0.0;
        vehicle.record_service();
        assert_eq!(vehicle.distance_since_service(), 0.0);
    }
}
