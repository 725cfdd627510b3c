//! ---
//! rsim_section: "11-simulation"
//! rsim_subsection: "module"
//! rsim_type: "source"
//! rsim_scope: "code"
//! rsim_description: "Immutable telemetry snapshots handed to the messaging layer."
//! rsim_version: "v0.1.0"
//! rsim_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::alert::Alert;
use crate::health::{DiscreteState, Subsystem};
use crate::motion::{MotionPhase, Route};
use crate::numeric::round1;
use crate::point_machine::{PointMachineState, PointPosition};
use crate::scoring;
use crate::vehicle::{OperationalStatus, VehicleState};

/// Version of the event payload layout below.
pub const EVENT_SCHEMA_VERSION: u16 = 1;

/// Subsystem state plus its measurement fields, flattened into one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentReading {
    pub state: DiscreteState,
    #[serde(flatten)]
    pub values: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleTelemetry {
    pub vehicle_id: String,
    pub depot_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub operational_status: OperationalStatus,
    pub speed: f64,
    pub motion_phase: MotionPhase,
    pub current_stop: String,
    /// Stop the vehicle arrives at next; only set while in service.
    pub next_stop: Option<String>,
    pub odometer: u64,
    pub health_score: u8,
    pub components: IndexMap<Subsystem, ComponentReading>,
    pub alerts: Vec<Alert>,
}

impl VehicleTelemetry {
    pub fn capture(
        vehicle_id: &str,
        depot_id: Option<&str>,
        vehicle: &VehicleState,
        route: &Route,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let assessment = scoring::assess(vehicle);
        let motion = &vehicle.motion;
        let next_stop = if vehicle.status == OperationalStatus::InService {
            route
                .stop(motion.next_stop_index(route))
                .map(str::to_owned)
        } else {
            None
        };
        let components = vehicle
            .components
            .iter()
            .map(|(subsystem, component)| {
                (
                    *subsystem,
                    ComponentReading {
                        state: component.state,
                        values: component.reported_values(*subsystem),
                    },
                )
            })
            .collect();

        Self {
            vehicle_id: vehicle_id.to_owned(),
            depot_id: depot_id.map(str::to_owned),
            timestamp,
            operational_status: vehicle.status,
            speed: round1(motion.speed),
            motion_phase: motion.phase,
            current_stop: route
                .stop(motion.stop_index)
                .unwrap_or_default()
                .to_owned(),
            next_stop,
            odometer: vehicle.odometer.max(0.0).round() as u64,
            health_score: assessment.score,
            components,
            alerts: assessment.alerts,
        }
    }

    pub fn has_alert(&self, code: &str) -> bool {
        self.alerts.iter().any(|alert| alert.code == code)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointMachineTelemetry {
    pub device_id: String,
    pub depot_id: String,
    pub state: DiscreteState,
    pub motor_current: f64,
    pub voltage: f64,
    pub stroke_time: f64,
    pub position: PointPosition,
    pub operation_count: u64,
    pub alert: Option<Alert>,
    pub timestamp: DateTime<Utc>,
}

impl PointMachineTelemetry {
    pub fn capture(
        device_id: &str,
        depot_id: &str,
        device: &PointMachineState,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            device_id: device_id.to_owned(),
            depot_id: depot_id.to_owned(),
            state: device.state,
            motor_current: round1(device.motor_current),
            voltage: round1(device.voltage),
            stroke_time: round1(device.stroke_time),
            position: device.position,
            operation_count: device.operation_count,
            alert: device.alert(device_id),
            timestamp,
        }
    }
}

/// One-off description of a depot's rosters, published at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepotAnnouncement {
    pub depot_id: String,
    pub depot_name: String,
    pub vehicle_count: usize,
    pub vehicle_roster: Vec<String>,
    pub device_roster: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TelemetryEvent {
    Vehicle(VehicleTelemetry),
    PointMachine(PointMachineTelemetry),
    DepotAnnouncement(DepotAnnouncement),
}

impl TelemetryEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            TelemetryEvent::Vehicle(_) => "vehicle",
            TelemetryEvent::PointMachine(_) => "pointMachine",
            TelemetryEvent::DepotAnnouncement(_) => "depotAnnouncement",
        }
    }

    pub fn depot_id(&self) -> Option<&str> {
        match self {
            TelemetryEvent::Vehicle(event) => event.depot_id.as_deref(),
            TelemetryEvent::PointMachine(event) => Some(&event.depot_id),
            TelemetryEvent::DepotAnnouncement(event) => Some(&event.depot_id),
        }
    }

    /// Vehicle id, device id or depot id depending on the variant.
    pub fn entity_id(&self) -> &str {
        match self {
            TelemetryEvent::Vehicle(event) => &event.vehicle_id,
            TelemetryEvent::PointMachine(event) => &event.device_id,
            TelemetryEvent::DepotAnnouncement(event) => &event.depot_id,
        }
    }

    pub fn alerts(&self) -> &[Alert] {
        match self {
            TelemetryEvent::Vehicle(event) => &event.alerts,
            TelemetryEvent::PointMachine(event) => event.alert.as_slice(),
            TelemetryEvent::DepotAnnouncement(_) => &[],
        }
    }
}

impl From<VehicleTelemetry> for TelemetryEvent {
    fn from(event: VehicleTelemetry) -> Self {
        TelemetryEvent::Vehicle(event)
    }
}

impl From<PointMachineTelemetry> for TelemetryEvent {
    fn from(event: PointMachineTelemetry) -> Self {
        TelemetryEvent::PointMachine(event)
    }
}

impl From<DepotAnnouncement> for TelemetryEvent {
    fn from(event: DepotAnnouncement) -> Self {
        TelemetryEvent::DepotAnnouncement(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{ComponentState, Measurement};
    use crate::motion::{Direction, MotionState};
    use chrono::TimeZone;
    use serde_json::json;

    fn vehicle(status: OperationalStatus) -> VehicleState {
        let mut components = IndexMap::new();
        components.insert(
            Subsystem::Brakes,
            ComponentState {
                state: DiscreteState::Fault,
                measurement: Measurement::Scalar(61.04),
            },
        );
        components.insert(
            Subsystem::Doors,
            ComponentState {
                state: DiscreteState::Warning,
                measurement: Measurement::Scalar(4.2),
            },
        );
        VehicleState {
            status,
            motion: MotionState {
                phase: MotionPhase::Cruise,
                speed: 75.36,
                progress: 0.5,
                stop_index: 2,
                direction: Direction::Forward,
                dwell_remaining: 0,
            },
            odometer: 45_000.4,
            odometer_at_last_service: 0.0,
            components,
        }
    }

    fn route() -> Route {
        Route::new(vec!["Harbour".into(), "Central".into(), "Airport".into()]).unwrap()
    }

    #[test]
    fn vehicle_snapshot_serializes_in_camel_case() {
        let timestamp = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let event = TelemetryEvent::from(VehicleTelemetry::capture(
            "N-101",
            Some("north"),
            &vehicle(OperationalStatus::InService),
            &route(),
            timestamp,
        ));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], json!("vehicle"));
        assert_eq!(value["vehicleId"], json!("N-101"));
        assert_eq!(value["operationalStatus"], json!("IN_SERVICE"));
        assert_eq!(value["motionPhase"], json!("CRUISE"));
        assert_eq!(value["speed"], json!(75.4));
        assert_eq!(value["currentStop"], json!("Airport"));
        assert_eq!(value["nextStop"], json!("Central"));
        assert_eq!(value["odometer"], json!(45_000));
        assert_eq!(value["healthScore"], json!(75));
        assert_eq!(
            value["components"]["BRAKES"],
            json!({"state": "FAULT", "pressurePsi": 61.0})
        );
        let codes: Vec<&str> = value["alerts"]
            .as_array()
            .unwrap()
            .iter()
            .map(|alert| alert["code"].as_str().unwrap())
            .collect();
        assert_eq!(codes, vec!["BRAKE_PRESSURE_LOW", "DOOR_SLOW_CLOSE", "MAINTENANCE_DUE"]);
    }

    #[test]
    fn next_stop_is_null_outside_service() {
        let snapshot = VehicleTelemetry::capture(
            "N-102",
            None,
            &vehicle(OperationalStatus::InDepot),
            &route(),
            Utc::now(),
        );
        assert_eq!(snapshot.next_stop, None);
        let value = serde_json::to_value(&snapshot).unwrap();
        assert!(value["nextStop"].is_null());
        assert!(value["depotId"].is_null());
    }

    #[test]
    fn point_machine_snapshot_carries_alert() {
        let device = PointMachineState {
            state: DiscreteState::Fault,
            motor_current: 6.25,
            voltage: 99.0,
            stroke_time: 7.0,
            position: PointPosition::Intermediate,
            operation_count: 12,
        };
        let event: TelemetryEvent =
            PointMachineTelemetry::capture("PM-N-01", "north", &device, Utc::now()).into();
        assert_eq!(event.kind(), "pointMachine");
        assert_eq!(event.depot_id(), Some("north"));
        assert_eq!(event.alerts().len(), 1);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["position"], json!("INTERMEDIATE"));
        assert_eq!(value["alert"]["severity"], json!("CRITICAL"));
        assert_eq!(value["operationCount"], json!(12));
    }
}
