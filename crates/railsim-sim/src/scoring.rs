//! ---
//! rsim_section: "11-simulation"
//! rsim_subsection: "module"
//! rsim_type: "source"
//! rsim_scope: "code"
//! rsim_description: "Health score and alert aggregation for vehicles."
//! rsim_version: "v0.1.0"
//! rsim_owner: "tbd"
//! ---
use crate::alert::{Alert, Severity};
use crate::vehicle::VehicleState;

/// Distance after which a vehicle is due for scheduled maintenance.
pub const MAINTENANCE_INTERVAL: f64 = 40_000.0;
const FAULT_PENALTY: usize = 20;
const WARNING_PENALTY: usize = 5;

/// `max(0, 100 - 20 * faults - 5 * warnings)`.
pub fn health_score(faults: usize, warnings: usize) -> u8 {
    let penalty = faults
        .saturating_mul(FAULT_PENALTY)
        .saturating_add(warnings.saturating_mul(WARNING_PENALTY));
    100usize.saturating_sub(penalty) as u8
}

pub fn maintenance_alert(odometer: f64, odometer_at_last_service: f64) -> Option<Alert> {
    let since_service = odometer - odometer_at_last_service;
    (since_service > MAINTENANCE_INTERVAL).then(|| {
        Alert::new(
            "MAINTENANCE_DUE",
            Severity::Low,
            format!(
                "Scheduled maintenance due: {since_service:.0} since last service (interval {MAINTENANCE_INTERVAL:.0})"
            ),
        )
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub score: u8,
    pub alerts: Vec<Alert>,
}

/// Score plus alerts: component alerts in subsystem order, then maintenance.
pub fn assess(vehicle: &VehicleState) -> Assessment {
    let (faults, warnings) = vehicle.state_counts();
    let mut alerts: Vec<Alert> = vehicle
        .components
        .iter()
        .flat_map(|(subsystem, component)| component.alerts(*subsystem))
        .collect();
    alerts.extend(maintenance_alert(
        vehicle.odometer,
        vehicle.odometer_at_last_service,
    ));
    Assessment {
        score: health_score(faults, warnings),
        alerts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_depends_only_on_counts() {
        assert_eq!(health_score(0, 0), 100);
        assert_eq!(health_score(1, 0), 80);
        assert_eq!(health_score(0, 3), 85);
        assert_eq!(health_score(2, 2), 50);
        assert_eq!(health_score(5, 0), 0);
        assert_eq!(health_score(4, 7), 0);
        assert_eq!(health_score(usize::MAX, usize::MAX), 0);
    }

    #[test]
    fn maintenance_due_only_past_interval() {
        assert!(maintenance_alert(40_000.0, 0.0).is_none());
        let alert = maintenance_alert(45_000.0, 0.0).unwrap();
        assert_eq!(alert.code, "MAINTENANCE_DUE");
        assert_eq!(alert.severity, Severity::Low);
        assert!(maintenance_alert(90_000.0, 60_000.0).is_none());
    }
}
