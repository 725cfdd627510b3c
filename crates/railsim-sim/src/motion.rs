//! ---
//! rsim_section: "11-simulation"
//! rsim_subsection: "module"
//! rsim_type: "source"
//! rsim_scope: "code"
//! rsim_description: "Route traversal and the phased motion state machine."
//! rsim_version: "v0.1.0"
//! rsim_owner: "tbd"
//! ---
use std::ops::{Range, RangeInclusive};

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::warn;

use crate::numeric::{bounded_walk, Band};
use crate::{Result, SimError};

pub const MAX_SPEED: f64 = 80.0;
pub const CRUISE_THRESHOLD: f64 = 0.92 * MAX_SPEED;
pub const CRUISE_JITTER_SIGMA: f64 = 1.2;
pub const DWELL_TICKS: RangeInclusive<u32> = 8..=20;
pub const ACCEL_RATE: Range<f64> = 6.0..9.0;
pub const BRAKE_RATE: Range<f64> = 9.0..13.0;
pub const BRAKE_TRIGGER_PROGRESS: f64 = 0.68;
/// `progress += speed / PROGRESS_DIVISOR` per moving tick.
pub const PROGRESS_DIVISOR: f64 = 1500.0;
pub const PROGRESS_CEILING: f64 = 0.999;
/// Distance units covered by one full segment.
pub const SEGMENT_LENGTH: f64 = 1200.0;
pub const STANDBY_IDLE_CEILING: f64 = 15.0;
pub const STANDBY_DECAY: f64 = 0.5;
const STANDBY_SNAP_BELOW: f64 = 0.5;
pub const RANDOM_WALK_STEP: f64 = 8.0;

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
pub enum MotionPhase {
    #[default]
    Dwell,
    Accel,
    Cruise,
    Brake,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn delta(self) -> isize {
        match self {
            Direction::Forward => 1,
            Direction::Backward => -1,
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }
}

/// Ordered stops traversed back and forth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    stops: Vec<String>,
}

impl Route {
    pub fn new(stops: Vec<String>) -> Result<Self> {
        if stops.len() < 2 {
            return Err(SimError::RouteTooShort(stops.len()));
        }
        Ok(Self { stops })
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    pub fn stops(&self) -> &[String] {
        &self.stops
    }

    pub fn stop(&self, index: usize) -> Option<&str> {
        self.stops.get(index).map(String::as_str)
    }

    /// Index reached by one step in `direction`, reflecting at either end.
    pub fn step_from(&self, index: usize, direction: Direction) -> (usize, Direction) {
        let index = index.min(self.stops.len() - 1) as isize;
        let next = index + direction.delta();
        if next >= 0 && (next as usize) < self.stops.len() {
            (next as usize, direction)
        } else {
            let flipped = direction.reversed();
            ((index + flipped.delta()) as usize, flipped)
        }
    }
}

/// How speed and position evolve while a vehicle is in service.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MotionModel {
    /// DWELL → ACCEL → CRUISE → BRAKE between consecutive stops.
    #[default]
    Phased,
    /// Deprecated: unstructured bounded speed walk.
    RandomWalk,
}

/// Outcome of one motion tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionStep {
    pub distance: f64,
    pub arrived: bool,
}

impl MotionStep {
    pub const STATIONARY: Self = Self {
        distance: 0.0,
        arrived: false,
    };
}

#[derive(Debug, Clone, PartialEq)]
pub struct MotionState {
    pub phase: MotionPhase,
    pub speed: f64,
    pub progress: f64,
    pub stop_index: usize,
    pub direction: Direction,
    pub dwell_remaining: u32,
}

impl MotionState {
    /// Standing at a stop with a fresh dwell countdown.
    pub fn at_rest<R: Rng + ?Sized>(stop_index: usize, direction: Direction, rng: &mut R) -> Self {
        Self {
            phase: MotionPhase::Dwell,
            speed: 0.0,
            progress: 0.0,
            stop_index,
            direction,
            dwell_remaining: rng.gen_range(DWELL_TICKS),
        }
    }

    /// Random position on `route` in a random phase with consistent speed and progress.
    pub fn randomized<R: Rng + ?Sized>(route: &Route, rng: &mut R) -> Self {
        let stop_index = rng.gen_range(0..route.len());
        let direction = if rng.gen_bool(0.5) {
            Direction::Forward
        } else {
            Direction::Backward
        };
        let mut state = Self::at_rest(stop_index, direction, rng);
        state.phase = match rng.gen_range(0..4) {
            0 => MotionPhase::Dwell,
            1 => MotionPhase::Accel,
            2 => MotionPhase::Cruise,
            _ => MotionPhase::Brake,
        };
        match state.phase {
            MotionPhase::Dwell => {}
            MotionPhase::Accel => {
                state.speed = rng.gen_range(0.0..CRUISE_THRESHOLD);
                state.progress = rng.gen_range(0.0..0.3);
            }
            MotionPhase::Cruise => {
                state.speed = rng.gen_range(CRUISE_THRESHOLD..=MAX_SPEED);
                state.progress = rng.gen_range(0.3..BRAKE_TRIGGER_PROGRESS);
            }
            MotionPhase::Brake => {
                state.speed = rng.gen_range(10.0..=MAX_SPEED);
                state.progress = rng.gen_range(BRAKE_TRIGGER_PROGRESS..0.9);
            }
        }
        state
    }

    /// Stop dead at the current stop and restart the dwell countdown.
    pub fn reset_to_dwell<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.phase = MotionPhase::Dwell;
        self.speed = 0.0;
        self.progress = 0.0;
        self.dwell_remaining = rng.gen_range(DWELL_TICKS);
    }

    /// Yard idling: speed decays under the idle ceiling while parked in DWELL.
    pub fn hold_standby<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let decayed = self.speed.min(STANDBY_IDLE_CEILING) * STANDBY_DECAY;
        self.reset_to_dwell(rng);
        self.speed = if decayed < STANDBY_SNAP_BELOW {
            0.0
        } else {
            decayed
        };
    }

    /// Next stop the vehicle is heading for.
    pub fn next_stop_index(&self, route: &Route) -> usize {
        route.step_from(self.stop_index, self.direction).0
    }

    fn step_stop(&mut self, route: &Route) {
        let (index, direction) = route.step_from(self.stop_index, self.direction);
        self.stop_index = index;
        self.direction = direction;
    }

    fn accrue(&mut self) -> f64 {
        let travelled = self.speed / PROGRESS_DIVISOR;
        self.progress = (self.progress + travelled).min(PROGRESS_CEILING);
        travelled * SEGMENT_LENGTH
    }
}

/// Motion model plus its pre-built noise distribution.
#[derive(Debug, Clone)]
pub struct MotionProfile {
    model: MotionModel,
    cruise_noise: Normal<f64>,
}

impl MotionProfile {
    pub fn new(model: MotionModel) -> Result<Self> {
        let cruise_noise = Normal::new(0.0, CRUISE_JITTER_SIGMA)
            .map_err(|err| SimError::Distribution(err.to_string()))?;
        if model == MotionModel::RandomWalk {
            warn!(
                motion_model = %model,
                "random_walk motion is deprecated; use phased"
            );
        }
        Ok(Self {
            model,
            cruise_noise,
        })
    }

    pub fn model(&self) -> MotionModel {
        self.model
    }

    /// Advance one in-service tick.
    pub fn advance<R: Rng + ?Sized>(
        &self,
        state: &mut MotionState,
        route: &Route,
        rng: &mut R,
    ) -> MotionStep {
        match self.model {
            MotionModel::Phased => self.advance_phased(state, route, rng),
            MotionModel::RandomWalk => advance_random_walk(state, route, rng),
        }
    }

    fn advance_phased<R: Rng + ?Sized>(
        &self,
        state: &mut MotionState,
        route: &Route,
        rng: &mut R,
    ) -> MotionStep {
        match state.phase {
            MotionPhase::Dwell => {
                state.speed = 0.0;
                state.dwell_remaining = state.dwell_remaining.saturating_sub(1);
                if state.dwell_remaining == 0 {
                    state.phase = MotionPhase::Accel;
                    state.progress = 0.0;
                }
                return MotionStep::STATIONARY;
            }
            MotionPhase::Accel => {
                state.speed = (state.speed + rng.gen_range(ACCEL_RATE)).min(MAX_SPEED);
                if state.speed >= CRUISE_THRESHOLD {
                    state.phase = MotionPhase::Cruise;
                }
            }
            MotionPhase::Cruise => {
                let jitter = self.cruise_noise.sample(rng);
                state.speed = (state.speed + jitter).clamp(CRUISE_THRESHOLD, MAX_SPEED);
            }
            MotionPhase::Brake => {
                state.speed = (state.speed - rng.gen_range(BRAKE_RATE)).max(0.0);
                if state.speed <= 0.0 {
                    state.step_stop(route);
                    state.reset_to_dwell(rng);
                    return MotionStep {
                        distance: 0.0,
                        arrived: true,
                    };
                }
            }
        }

        let distance = state.accrue();
        if matches!(state.phase, MotionPhase::Accel | MotionPhase::Cruise)
            && state.progress >= BRAKE_TRIGGER_PROGRESS
        {
            state.phase = MotionPhase::Brake;
        }
        MotionStep {
            distance,
            arrived: false,
        }
    }
}

fn advance_random_walk<R: Rng + ?Sized>(
    state: &mut MotionState,
    route: &Route,
    rng: &mut R,
) -> MotionStep {
    state.speed = bounded_walk(
        rng,
        state.speed,
        RANDOM_WALK_STEP,
        0.0,
        Band::new(0.0, MAX_SPEED),
    );
    if state.speed <= 0.0 {
        state.phase = MotionPhase::Dwell;
        return MotionStep::STATIONARY;
    }

    state.phase = MotionPhase::Cruise;
    let travelled = state.speed / PROGRESS_DIVISOR;
    let distance = travelled * SEGMENT_LENGTH;
    if state.progress + travelled >= 1.0 {
        state.progress = 0.0;
        state.step_stop(route);
        return MotionStep {
            distance,
            arrived: true,
        };
    }
    state.progress += travelled;
    MotionStep {
        distance,
        arrived: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn route(len: usize) -> Route {
        Route::new((0..len).map(|i| format!("Stop {i}")).collect()).unwrap()
    }

    fn state(phase: MotionPhase, speed: f64, progress: f64, stop_index: usize) -> MotionState {
        MotionState {
            phase,
            speed,
            progress,
            stop_index,
            direction: Direction::Forward,
            dwell_remaining: 10,
        }
    }

    #[test]
    fn routes_need_two_stops() {
        assert_eq!(
            Route::new(vec!["Only".into()]).unwrap_err(),
            SimError::RouteTooShort(1)
        );
    }

    #[test]
    fn step_from_reflects_at_both_ends() {
        let route = route(3);
        assert_eq!(route.step_from(1, Direction::Forward), (2, Direction::Forward));
        assert_eq!(route.step_from(2, Direction::Forward), (1, Direction::Backward));
        assert_eq!(route.step_from(0, Direction::Backward), (1, Direction::Forward));
        assert_eq!(route.step_from(1, Direction::Backward), (0, Direction::Backward));
    }

    #[test]
    fn phased_motion_respects_bounds_over_long_runs() {
        let profile = MotionProfile::new(MotionModel::Phased).unwrap();
        let route = route(4);
        let mut rng = StdRng::seed_from_u64(99);
        let mut motion = MotionState::randomized(&route, &mut rng);
        let mut arrivals = 0;
        for _ in 0..20_000 {
            let before = motion.clone();
            let step = profile.advance(&mut motion, &route, &mut rng);
            assert!((0.0..=MAX_SPEED).contains(&motion.speed));
            assert!((0.0..1.0).contains(&motion.progress));
            assert!(motion.stop_index < route.len());
            if step.arrived {
                arrivals += 1;
                let (index, direction) = route.step_from(before.stop_index, before.direction);
                assert_eq!(motion.stop_index, index);
                assert_eq!(motion.direction, direction);
            } else {
                assert_eq!(motion.stop_index, before.stop_index);
            }
        }
        assert!(arrivals > 50, "only {arrivals} arrivals");
    }

    #[test]
    fn dwell_expiry_starts_accel_from_zero_progress() {
        let profile = MotionProfile::new(MotionModel::Phased).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let mut motion = state(MotionPhase::Dwell, 0.0, 0.4, 1);
        motion.dwell_remaining = 1;
        let step = profile.advance(&mut motion, &route(3), &mut rng);
        assert_eq!(motion.phase, MotionPhase::Accel);
        assert_eq!(motion.progress, 0.0);
        assert_eq!(step, MotionStep::STATIONARY);
    }

    #[test]
    fn braking_to_zero_arrives_and_dwells() {
        let profile = MotionProfile::new(MotionModel::Phased).unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        let mut motion = state(MotionPhase::Brake, 5.0, 0.95, 1);
        let step = profile.advance(&mut motion, &route(3), &mut rng);
        assert!(step.arrived);
        assert_eq!(motion.phase, MotionPhase::Dwell);
        assert_eq!(motion.stop_index, 2);
        assert_eq!(motion.progress, 0.0);
        assert_eq!(motion.speed, 0.0);
        assert!(DWELL_TICKS.contains(&motion.dwell_remaining));
    }

    #[test]
    fn arrival_at_route_end_turns_back() {
        let profile = MotionProfile::new(MotionModel::Phased).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let mut motion = state(MotionPhase::Brake, 1.0, 0.95, 2);
        profile.advance(&mut motion, &route(3), &mut rng);
        assert_eq!(motion.stop_index, 1);
        assert_eq!(motion.direction, Direction::Backward);
    }

    #[test]
    fn brake_trigger_wins_over_cruise_entry() {
        let profile = MotionProfile::new(MotionModel::Phased).unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        let mut motion = state(MotionPhase::Accel, 70.0, 0.67, 0);
        profile.advance(&mut motion, &route(3), &mut rng);
        assert_eq!(motion.phase, MotionPhase::Brake);
    }

    #[test]
    fn cruise_stays_in_band() {
        let profile = MotionProfile::new(MotionModel::Phased).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let mut motion = state(MotionPhase::Cruise, 76.0, 0.0, 0);
        for _ in 0..10 {
            profile.advance(&mut motion, &route(3), &mut rng);
            assert!((CRUISE_THRESHOLD..=MAX_SPEED).contains(&motion.speed));
        }
    }

    #[test]
    fn standby_decays_toward_rest() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut motion = state(MotionPhase::Cruise, 60.0, 0.5, 0);
        motion.hold_standby(&mut rng);
        assert_eq!(motion.phase, MotionPhase::Dwell);
        assert_eq!(motion.speed, 7.5);
        for _ in 0..5 {
            motion.hold_standby(&mut rng);
        }
        assert_eq!(motion.speed, 0.0);
    }

    #[test]
    fn random_walk_stays_bounded() {
        let profile = MotionProfile::new(MotionModel::RandomWalk).unwrap();
        let route = route(5);
        let mut rng = StdRng::seed_from_u64(7);
        let mut motion = MotionState::at_rest(0, Direction::Forward, &mut rng);
        let mut arrivals = 0;
        for _ in 0..10_000 {
            if profile.advance(&mut motion, &route, &mut rng).arrived {
                arrivals += 1;
            }
            assert!((0.0..=MAX_SPEED).contains(&motion.speed));
            assert!((0.0..1.0).contains(&motion.progress));
            assert!(motion.stop_index < route.len());
        }
        assert!(arrivals > 0);
    }
}
