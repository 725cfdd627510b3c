//! ---
//! rsim_section: "02-messaging"
//! rsim_subsection: "tests"
//! rsim_type: "test"
//! rsim_scope: "code"
//! rsim_description: "Engine events flowing through the messaging supervisor."
//! rsim_version: "v0.1.0"
//! rsim_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use railsim_msg::{
    InMemoryTransport, JsonLinesTarget, JsonLinesTransport, Message, MessagingSupervisor,
    Transport,
};
use railsim_sim::{DepotAnnouncement, EngineProfile, Route, TelemetryEngine, TelemetryEvent};

fn engine() -> TelemetryEngine {
    let route = Route::new(vec!["Harbour".into(), "Central".into(), "Airport".into()]).unwrap();
    let mut engine = TelemetryEngine::seeded(EngineProfile::mainline().unwrap(), route.clone(), 21);
    engine.assign_vehicle("N-101", Some("north"), Arc::new(route));
    engine.register_depot("north", vec!["PM-N-01".into()]);
    engine
}

fn supervisor_with_transport() -> (MessagingSupervisor, Arc<InMemoryTransport>) {
    let mut supervisor = MessagingSupervisor::new();
    let transport = Arc::new(InMemoryTransport::new());
    supervisor.register_transport(transport.clone());
    (supervisor, transport)
}

#[test]
fn engine_events_land_on_depot_topics() {
    let (supervisor, transport) = supervisor_with_transport();
    let mut engine = engine();

    supervisor.publish_event(engine.advance_vehicle("N-101", Utc::now()).into());
    for event in engine.sweep_depot("north", Utc::now()) {
        supervisor.publish_event(event.into());
    }

    let vehicle = transport.recv().expect("vehicle message");
    assert_eq!(vehicle.topic, "railsim/north/vehicles/N-101");
    assert!(!vehicle.retained);
    assert_eq!(vehicle.kind(), "vehicle");

    let device = transport.recv().expect("point machine message");
    assert_eq!(device.topic, "railsim/north/points/PM-N-01");
    assert!(transport.recv().is_none());
}

#[test]
fn late_consumers_still_see_announcements() {
    let (supervisor, transport) = supervisor_with_transport();
    let announcement = TelemetryEvent::DepotAnnouncement(DepotAnnouncement {
        depot_id: "north".into(),
        depot_name: "North Depot".into(),
        vehicle_count: 1,
        vehicle_roster: vec!["N-101".into()],
        device_roster: vec!["PM-N-01".into()],
    });
    supervisor.publish_event(announcement);
    assert_eq!(supervisor.poll().len(), 1);

    let retained = transport
        .retained("railsim/north/announce")
        .expect("retained announcement");
    assert!(retained.retained);
    match retained.payload {
        TelemetryEvent::DepotAnnouncement(depot) => assert_eq!(depot.vehicle_roster, vec!["N-101"]),
        other => panic!("unexpected payload {other:?}"),
    }
}

#[test]
fn json_lines_output_parses_back_into_envelopes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("telemetry.ndjson");
    let mut supervisor = MessagingSupervisor::new();
    supervisor.register_transport(Arc::new(JsonLinesTransport::new(
        JsonLinesTarget::File(path.clone()),
        Duration::from_millis(100),
    )));
    let mut engine = engine();
    for _ in 0..5 {
        let outcome = supervisor.publish_event(engine.advance_vehicle("N-101", Utc::now()).into());
        assert_eq!(outcome.delivered, 1);
    }

    let contents = std::fs::read_to_string(&path).unwrap();
    let envelopes: Vec<serde_json::Value> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(envelopes.len(), 5);
    for envelope in &envelopes {
        assert_eq!(envelope["schemaVersion"], 1);
        assert_eq!(envelope["payload"]["type"], "vehicle");
        assert_eq!(envelope["payload"]["vehicleId"], "N-101");
        assert!(envelope["payload"]["healthScore"].as_u64().unwrap() <= 100);
    }
}

#[test]
fn explicit_timestamps_are_preserved() {
    let at = Utc::now() - chrono::Duration::hours(1);
    let mut engine = engine();
    let message = Message::at(engine.advance_vehicle("N-101", at).into(), at);
    assert_eq!(message.timestamp, at);
    let transport = InMemoryTransport::new();
    transport.send(message.clone()).unwrap();
    assert_eq!(transport.recv(), Some(message));
}
