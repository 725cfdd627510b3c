//! ---
//! rsim_section: "11-simulation"
//! rsim_subsection: "module"
//! rsim_type: "source"
//! rsim_scope: "code"
//! rsim_description: "Telemetry engine owning vehicle and point machine registries."
//! rsim_version: "v0.1.0"
//! rsim_owner: "tbd"
//! ---
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use crate::events::{PointMachineTelemetry, VehicleTelemetry};
use crate::motion::Route;
use crate::point_machine::PointMachineState;
use crate::profile::EngineProfile;
use crate::vehicle::VehicleState;

#[derive(Debug, Clone)]
struct VehicleAssignment {
    depot_id: Option<String>,
    route: Arc<Route>,
}

#[derive(Debug, Clone, Default)]
struct DepotDevices {
    roster: Vec<String>,
    states: HashMap<String, PointMachineState>,
}

/// Stateful simulation of a fleet and its trackside devices.
///
/// All randomness flows through the injected `rng`, so two engines built with
/// the same profile, routes and seed produce identical event sequences when
/// driven identically. Entities are initialized lazily the first time they are
/// advanced.
#[derive(Debug)]
pub struct TelemetryEngine<R = StdRng> {
    profile: EngineProfile,
    rng: R,
    default_route: Arc<Route>,
    assignments: HashMap<String, VehicleAssignment>,
    vehicles: HashMap<String, VehicleState>,
    depots: IndexMap<String, DepotDevices>,
}

impl TelemetryEngine<StdRng> {
    pub fn seeded(profile: EngineProfile, default_route: Route, seed: u64) -> Self {
        Self::new(profile, default_route, StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy(profile: EngineProfile, default_route: Route) -> Self {
        Self::new(profile, default_route, StdRng::from_entropy())
    }
}

impl<R: Rng> TelemetryEngine<R> {
    /// `default_route` is used for vehicles that were never assigned one.
    pub fn new(profile: EngineProfile, default_route: Route, rng: R) -> Self {
        Self {
            profile,
            rng,
            default_route: Arc::new(default_route),
            assignments: HashMap::new(),
            vehicles: HashMap::new(),
            depots: IndexMap::new(),
        }
    }

    pub fn profile(&self) -> &EngineProfile {
        &self.profile
    }

    /// Bind a vehicle to a depot and route before its first tick.
    pub fn assign_vehicle(
        &mut self,
        vehicle_id: impl Into<String>,
        depot_id: Option<&str>,
        route: Arc<Route>,
    ) {
        self.assignments.insert(
            vehicle_id.into(),
            VehicleAssignment {
                depot_id: depot_id.map(str::to_owned),
                route,
            },
        );
    }

    /// Declare a depot's static point machine roster. Sweeps follow roster order.
    pub fn register_depot(&mut self, depot_id: impl Into<String>, roster: Vec<String>) {
        let devices = self.depots.entry(depot_id.into()).or_default();
        devices.states.retain(|device_id, _| roster.contains(device_id));
        devices.roster = roster;
    }

    /// Tick one vehicle, initializing it first if unseen, and snapshot it.
    pub fn advance_vehicle(&mut self, vehicle_id: &str, timestamp: DateTime<Utc>) -> VehicleTelemetry {
        let (depot_id, route) = match self.assignments.get(vehicle_id) {
            Some(assignment) => (assignment.depot_id.clone(), Arc::clone(&assignment.route)),
            None => (None, Arc::clone(&self.default_route)),
        };

        let vehicle = match self.vehicles.entry(vehicle_id.to_owned()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let state = VehicleState::initialize(&self.profile, &route, &mut self.rng);
                debug!(
                    vehicle_id,
                    status = %state.status,
                    phase = %state.motion.phase,
                    odometer = state.odometer,
                    "vehicle state initialised"
                );
                entry.insert(state)
            }
        };

        let outcome = vehicle.tick(&self.profile, &route, &mut self.rng);
        if outcome.status_changed() {
            debug!(
                vehicle_id,
                from = %outcome.previous_status,
                to = %outcome.status,
                "vehicle status changed"
            );
        }
        if outcome.arrived {
            trace!(
                vehicle_id,
                stop = route.stop(vehicle.motion.stop_index).unwrap_or_default(),
                "vehicle arrived"
            );
        }

        VehicleTelemetry::capture(vehicle_id, depot_id.as_deref(), vehicle, &route, timestamp)
    }

    /// Sweep a single device, initializing it first if unseen.
    pub fn advance_point_machine(
        &mut self,
        depot_id: &str,
        device_id: &str,
        timestamp: DateTime<Utc>,
    ) -> PointMachineTelemetry {
        let model = self.profile.point_machine_model();
        let devices = self.depots.entry(depot_id.to_owned()).or_default();
        let device = match devices.states.entry(device_id.to_owned()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let state = PointMachineState::initialize(model, &mut self.rng);
                debug!(
                    depot_id,
                    device_id,
                    state = %state.state,
                    position = %state.position,
                    "point machine state initialised"
                );
                entry.insert(state)
            }
        };
        device.sweep(model, &mut self.rng);
        PointMachineTelemetry::capture(device_id, depot_id, device, timestamp)
    }

    /// Sweep every device on a depot's roster. Unknown depots yield nothing.
    pub fn sweep_depot(&mut self, depot_id: &str, timestamp: DateTime<Utc>) -> Vec<PointMachineTelemetry> {
        let Some(roster) = self.depots.get(depot_id).map(|devices| devices.roster.clone()) else {
            return Vec::new();
        };
        roster
            .iter()
            .map(|device_id| self.advance_point_machine(depot_id, device_id, timestamp))
            .collect()
    }

    pub fn vehicle(&self, vehicle_id: &str) -> Option<&VehicleState> {
        self.vehicles.get(vehicle_id)
    }

    pub fn vehicle_mut(&mut self, vehicle_id: &str) -> Option<&mut VehicleState> {
        self.vehicles.get_mut(vehicle_id)
    }

    /// Seed a vehicle's state directly, bypassing lazy initialization.
    pub fn insert_vehicle(&mut self, vehicle_id: impl Into<String>, state: VehicleState) {
        self.vehicles.insert(vehicle_id.into(), state);
    }

    pub fn vehicles(&self) -> impl Iterator<Item = (&str, &VehicleState)> + '_ {
        self.vehicles.iter().map(|(id, state)| (id.as_str(), state))
    }

    pub fn point_machine(&self, depot_id: &str, device_id: &str) -> Option<&PointMachineState> {
        self.depots.get(depot_id)?.states.get(device_id)
    }

    pub fn insert_point_machine(
        &mut self,
        depot_id: &str,
        device_id: impl Into<String>,
        state: PointMachineState,
    ) {
        self.depots
            .entry(depot_id.to_owned())
            .or_default()
            .states
            .insert(device_id.into(), state);
    }
}
