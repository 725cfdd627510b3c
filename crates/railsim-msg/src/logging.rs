//! ---
//! rsim_section: "02-messaging"
//! rsim_subsection: "module"
//! rsim_type: "source"
//! rsim_scope: "code"
//! rsim_description: "Structured logging and prometheus counters for message flow."
//! rsim_version: "v0.1.0"
//! rsim_owner: "tbd"
//! ---
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use tracing::debug;

use crate::types::Message;

/// Direction of the message movement, used for consistent logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDirection {
    /// Message handed to a transport.
    Outbound,
    /// Message read back from a transport.
    Inbound,
}

/// Emit a structured log entry for message activity.
pub fn log_message(direction: MessageDirection, message: &Message) {
    debug!(
        message_id = %message.id,
        topic = %message.topic,
        kind = message.kind(),
        retained = message.retained,
        schema_version = message.schema_version,
        direction = ?direction,
        "messaging activity"
    );
}

/// Prometheus metric handles for messaging activity.
#[derive(Clone)]
pub struct MessagingMetricsExporter {
    sent: IntCounterVec,
    dropped: IntCounterVec,
    received: IntCounter,
}

impl MessagingMetricsExporter {
    /// Register messaging metrics with the provided registry.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let sent = IntCounterVec::new(
            Opts::new(
                "railsim_messages_sent_total",
                "Messages accepted by a transport",
            ),
            &["transport"],
        )?;
        let dropped = IntCounterVec::new(
            Opts::new(
                "railsim_messages_dropped_total",
                "Messages a transport failed to accept",
            ),
            &["transport"],
        )?;
        let received = IntCounter::with_opts(Opts::new(
            "railsim_messages_received_total",
            "Messages read back from transports",
        ))?;

        registry.register(Box::new(sent.clone()))?;
        registry.register(Box::new(dropped.clone()))?;
        registry.register(Box::new(received.clone()))?;

        Ok(Self {
            sent,
            dropped,
            received,
        })
    }

    /// Record a message accepted by `transport`.
    pub fn observe_sent(&self, transport: &str) {
        self.sent.with_label_values(&[transport]).inc();
    }

    /// Record a message rejected by `transport`.
    pub fn observe_dropped(&self, transport: &str) {
        self.dropped.with_label_values(&[transport]).inc();
    }

    /// Record a received message.
    pub fn observe_received(&self) {
        self.received.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exporter_labels_counts_by_transport() {
        let registry = Registry::new();
        let metrics = MessagingMetricsExporter::register(&registry).expect("register metrics");
        metrics.observe_sent("in_memory");
        metrics.observe_sent("in_memory");
        metrics.observe_dropped("json_lines");
        metrics.observe_received();

        let families = registry.gather();
        let sent = families
            .iter()
            .find(|family| family.get_name() == "railsim_messages_sent_total")
            .expect("sent family");
        assert_eq!(sent.get_metric()[0].get_counter().get_value(), 2.0);
        assert!(families
            .iter()
            .any(|family| family.get_name() == "railsim_messages_dropped_total"));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = Registry::new();
        MessagingMetricsExporter::register(&registry).unwrap();
        assert!(MessagingMetricsExporter::register(&registry).is_err());
    }
}
