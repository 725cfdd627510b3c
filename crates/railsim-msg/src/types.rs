//! ---
//! rsim_section: "02-messaging"
//! rsim_subsection: "module"
//! rsim_type: "source"
//! rsim_scope: "code"
//! rsim_description: "Message envelope and topic naming."
//! rsim_version: "v0.1.0"
//! rsim_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use railsim_sim::{TelemetryEvent, EVENT_SCHEMA_VERSION};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Schema version broadcast alongside every message payload.
pub const SCHEMA_VERSION: u16 = EVENT_SCHEMA_VERSION;

/// First segment of every topic.
pub const TOPIC_ROOT: &str = "railsim";

const UNASSIGNED_DEPOT: &str = "unassigned";

/// `railsim/<depot>/vehicles/<id>`.
pub fn vehicle_topic(depot_id: Option<&str>, vehicle_id: &str) -> String {
    format!(
        "{TOPIC_ROOT}/{}/vehicles/{vehicle_id}",
        depot_id.unwrap_or(UNASSIGNED_DEPOT)
    )
}

/// `railsim/<depot>/points/<id>`.
pub fn point_machine_topic(depot_id: &str, device_id: &str) -> String {
    format!("{TOPIC_ROOT}/{depot_id}/points/{device_id}")
}

/// `railsim/<depot>/announce`.
pub fn announce_topic(depot_id: &str) -> String {
    format!("{TOPIC_ROOT}/{depot_id}/announce")
}

/// Envelope wrapping one telemetry event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique identifier for deduplication and tracing.
    pub id: Uuid,
    /// Version of the schema used by the payload.
    pub schema_version: u16,
    /// Timestamp when the message was created.
    pub timestamp: DateTime<Utc>,
    /// Destination topic derived from the payload.
    pub topic: String,
    /// Whether consumers joining later should still see this message.
    pub retained: bool,
    /// Event carried by the message.
    pub payload: TelemetryEvent,
}

impl Message {
    /// Wrap an event, stamping it with the current time.
    pub fn new(payload: TelemetryEvent) -> Self {
        Self::at(payload, Utc::now())
    }

    /// Wrap an event with an explicit envelope timestamp.
    pub fn at(payload: TelemetryEvent, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            schema_version: SCHEMA_VERSION,
            timestamp,
            topic: Self::topic_for(&payload),
            retained: matches!(payload, TelemetryEvent::DepotAnnouncement(_)),
            payload,
        }
    }

    /// Topic a given event is published under.
    pub fn topic_for(event: &TelemetryEvent) -> String {
        match event {
            TelemetryEvent::Vehicle(vehicle) => {
                vehicle_topic(vehicle.depot_id.as_deref(), &vehicle.vehicle_id)
            }
            TelemetryEvent::PointMachine(device) => {
                point_machine_topic(&device.depot_id, &device.device_id)
            }
            TelemetryEvent::DepotAnnouncement(depot) => announce_topic(&depot.depot_id),
        }
    }

    /// Payload kind as a static string.
    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use railsim_sim::DepotAnnouncement;

    fn announcement() -> TelemetryEvent {
        TelemetryEvent::DepotAnnouncement(DepotAnnouncement {
            depot_id: "north".into(),
            depot_name: "North Depot".into(),
            vehicle_count: 2,
            vehicle_roster: vec!["N-101".into(), "N-102".into()],
            device_roster: vec!["PM-N-01".into()],
        })
    }

    #[test]
    fn topics_follow_depot_hierarchy() {
        assert_eq!(vehicle_topic(Some("north"), "N-101"), "railsim/north/vehicles/N-101");
        assert_eq!(vehicle_topic(None, "X"), "railsim/unassigned/vehicles/X");
        assert_eq!(point_machine_topic("north", "PM-1"), "railsim/north/points/PM-1");
        assert_eq!(announce_topic("north"), "railsim/north/announce");
    }

    #[test]
    fn announcements_are_retained() {
        let message = Message::new(announcement());
        assert!(message.retained);
        assert_eq!(message.topic, "railsim/north/announce");
        assert_eq!(message.kind(), "depotAnnouncement");
        assert_eq!(message.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn envelope_serializes_in_camel_case() {
        let value = serde_json::to_value(Message::new(announcement())).unwrap();
        assert_eq!(value["schemaVersion"], 1);
        assert_eq!(value["retained"], true);
        assert_eq!(value["payload"]["type"], "depotAnnouncement");
        assert_eq!(value["payload"]["vehicleRoster"][1], "N-102");
    }
}
