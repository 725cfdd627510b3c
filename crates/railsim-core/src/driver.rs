//! ---
//! rsim_section: "01-core-functionality"
//! rsim_subsection: "module"
//! rsim_type: "source"
//! rsim_scope: "code"
//! rsim_description: "Round-robin fleet stepping and point machine cadence."
//! rsim_version: "v0.1.0"
//! rsim_owner: "tbd"
//! ---
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use railsim_common::config::AppConfig;
use railsim_sim::{
    DepotAnnouncement, EngineProfile, OperationalStatus, Route, TelemetryEngine, TelemetryEvent,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strum::IntoEnumIterator;
use tracing::{debug, info};

/// Decides which entities advance on each driver tick.
///
/// One vehicle advances per tick, walking the whole fleet in configuration
/// order. Every `point_machine_every` ticks each depot's point machines are
/// swept after that tick's vehicle.
#[derive(Debug)]
pub struct TickDriver<R = StdRng> {
    engine: TelemetryEngine<R>,
    fleet: Vec<String>,
    depots: Vec<DepotAnnouncement>,
    point_machine_every: u64,
    ticks: u64,
    cursor: usize,
    announced: bool,
}

impl TickDriver<StdRng> {
    /// Build from configuration, seeding from `simulation.seed` or entropy.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let rng = match config.simulation.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::new(config, rng)
    }
}

impl<R: Rng> TickDriver<R> {
    pub fn new(config: &AppConfig, rng: R) -> Result<Self> {
        let profile = EngineProfile::from_config(&config.simulation)
            .context("failed to resolve engine profile")?;

        let mut routes = Vec::with_capacity(config.depots.len());
        for (depot_id, depot) in &config.depots {
            let route = Route::new(depot.route.clone())
                .with_context(|| format!("invalid route for depot '{}'", depot_id))?;
            routes.push(Arc::new(route));
        }
        let default_route = routes
            .first()
            .map(|route| route.as_ref().clone())
            .context("configuration declares no depots")?;

        let mut engine = TelemetryEngine::new(profile, default_route, rng);
        let mut fleet = Vec::with_capacity(config.fleet_size());
        let mut depots = Vec::with_capacity(config.depots.len());
        for ((depot_id, depot), route) in config.depots.iter().zip(routes) {
            for vehicle_id in &depot.vehicles {
                engine.assign_vehicle(
                    vehicle_id.clone(),
                    Some(depot_id.as_str()),
                    Arc::clone(&route),
                );
                fleet.push(vehicle_id.clone());
            }
            engine.register_depot(depot_id.clone(), depot.point_machines.clone());
            depots.push(DepotAnnouncement {
                depot_id: depot_id.clone(),
                depot_name: depot.display_name(depot_id).to_owned(),
                vehicle_count: depot.vehicles.len(),
                vehicle_roster: depot.vehicles.clone(),
                device_roster: depot.point_machines.clone(),
            });
        }

        info!(
            profile = engine.profile().name(),
            vehicles = fleet.len(),
            depots = depots.len(),
            point_machine_every = config.simulation.point_machine_every,
            "tick driver ready"
        );

        Ok(Self {
            engine,
            fleet,
            depots,
            point_machine_every: config.simulation.point_machine_every.max(1),
            ticks: 0,
            cursor: 0,
            announced: false,
        })
    }

    /// Depot announcements, returned on the first call only.
    pub fn announcements(&mut self) -> Vec<TelemetryEvent> {
        if self.announced {
            return Vec::new();
        }
        self.announced = true;
        self.depots
            .iter()
            .cloned()
            .map(TelemetryEvent::from)
            .collect()
    }

    /// Execute one driver tick and return the events it produced.
    pub fn step(&mut self, timestamp: DateTime<Utc>) -> Vec<TelemetryEvent> {
        self.ticks += 1;
        let mut events = Vec::new();

        if !self.fleet.is_empty() {
            let vehicle_id = &self.fleet[self.cursor];
            events.push(self.engine.advance_vehicle(vehicle_id, timestamp).into());
            self.cursor = (self.cursor + 1) % self.fleet.len();
        }

        if self.ticks % self.point_machine_every == 0 {
            for depot in &self.depots {
                let swept = self.engine.sweep_depot(&depot.depot_id, timestamp);
                debug!(
                    depot_id = %depot.depot_id,
                    devices = swept.len(),
                    tick = self.ticks,
                    "point machine sweep"
                );
                events.extend(swept.into_iter().map(TelemetryEvent::from));
            }
        }

        events
    }

    /// Driver ticks executed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn fleet(&self) -> &[String] {
        &self.fleet
    }

    pub fn point_machine_every(&self) -> u64 {
        self.point_machine_every
    }

    pub fn engine(&self) -> &TelemetryEngine<R> {
        &self.engine
    }

    /// Initialised vehicles per operational status, every status listed.
    pub fn status_counts(&self) -> Vec<(OperationalStatus, usize)> {
        OperationalStatus::iter()
            .map(|status| {
                let count = self
                    .engine
                    .vehicles()
                    .filter(|(_, vehicle)| vehicle.status == status)
                    .count();
                (status, count)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
        [simulation]
        point_machine_every = 3
        seed = 11

        [depots.north]
        name = "North Depot"
        route = ["Harbour", "Central", "Airport"]
        vehicles = ["N-101", "N-102"]
        point_machines = ["PM-N-01"]

        [depots.south]
        route = ["Quay", "Market"]
        vehicles = ["S-201"]
    "#;

    fn driver() -> TickDriver {
        TickDriver::from_config(&CONFIG.parse().unwrap()).unwrap()
    }

    #[test]
    fn announcements_describe_each_depot_once() {
        let mut driver = driver();
        let first = driver.announcements();
        assert_eq!(first.len(), 2);
        match &first[0] {
            TelemetryEvent::DepotAnnouncement(depot) => {
                assert_eq!(depot.depot_name, "North Depot");
                assert_eq!(depot.vehicle_count, 2);
                assert_eq!(depot.device_roster, vec!["PM-N-01"]);
            }
            other => panic!("unexpected event {other:?}"),
        }
        match &first[1] {
            TelemetryEvent::DepotAnnouncement(depot) => assert_eq!(depot.depot_name, "south"),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(driver.announcements().is_empty());
    }

    #[test]
    fn vehicles_carry_their_depot() {
        let mut driver = driver();
        let now = Utc::now();
        let depots: Vec<Option<String>> = (0..3)
            .map(|_| driver.step(now)[0].depot_id().map(str::to_owned))
            .collect();
        assert_eq!(
            depots,
            vec![
                Some("north".to_owned()),
                Some("north".to_owned()),
                Some("south".to_owned())
            ]
        );
    }

    #[test]
    fn status_counts_cover_every_status() {
        let mut driver = driver();
        assert!(driver.status_counts().iter().all(|(_, count)| *count == 0));
        for _ in 0..3 {
            driver.step(Utc::now());
        }
        let counts = driver.status_counts();
        assert_eq!(counts.len(), OperationalStatus::iter().count());
        assert_eq!(counts.iter().map(|(_, count)| count).sum::<usize>(), 3);
    }
}
