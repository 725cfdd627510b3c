//! ---
//! rsim_section: "02-messaging"
//! rsim_subsection: "module"
//! rsim_type: "source"
//! rsim_scope: "code"
//! rsim_description: "Fan-out of telemetry messages to registered transports."
//! rsim_version: "v0.1.0"
//! rsim_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use railsim_sim::TelemetryEvent;
use tracing::warn;

use crate::logging::{log_message, MessageDirection, MessagingMetricsExporter};
use crate::{Message, Transport};

/// Snapshot of messaging counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MessagingMetrics {
    /// Deliveries accepted by a transport.
    pub sent: u64,
    /// Messages read back from transports.
    pub received: u64,
    /// Deliveries rejected by a transport.
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    sent: AtomicU64,
    received: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> MessagingMetrics {
        MessagingMetrics {
            sent: self.sent.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Per-publish delivery tally.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishOutcome {
    /// Transports that accepted the message.
    pub delivered: usize,
    /// Transports that rejected it.
    pub failed: usize,
}

impl PublishOutcome {
    /// True when at least one transport rejected the message.
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Hands each message to every registered transport.
///
/// A failing transport is logged and counted; it never prevents delivery to
/// the others and never surfaces as an error to the caller.
#[derive(Default)]
pub struct MessagingSupervisor {
    transports: Vec<Arc<dyn Transport>>,
    counters: Counters,
    exporter: Option<MessagingMetricsExporter>,
}

impl MessagingSupervisor {
    /// Supervisor without transports or metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror counters into prometheus.
    pub fn with_exporter(mut self, exporter: MessagingMetricsExporter) -> Self {
        self.exporter = Some(exporter);
        self
    }

    /// Register a transport for publish/receive operations.
    pub fn register_transport<T>(&mut self, transport: Arc<T>)
    where
        T: Transport + 'static,
    {
        self.transports.push(transport as Arc<dyn Transport>);
    }

    /// Names of registered transports in registration order.
    pub fn transport_names(&self) -> Vec<&'static str> {
        self.transports.iter().map(|transport| transport.name()).collect()
    }

    /// Wrap `event` in a fresh envelope and publish it.
    pub fn publish_event(&self, event: TelemetryEvent) -> PublishOutcome {
        self.publish(Message::new(event))
    }

    /// Publish a message to all registered transports.
    pub fn publish(&self, message: Message) -> PublishOutcome {
        let mut outcome = PublishOutcome::default();
        for transport in &self.transports {
            match transport.send(message.clone()) {
                Ok(()) => {
                    log_message(MessageDirection::Outbound, &message);
                    self.counters.sent.fetch_add(1, Ordering::Relaxed);
                    if let Some(exporter) = &self.exporter {
                        exporter.observe_sent(transport.name());
                    }
                    outcome.delivered += 1;
                }
                Err(err) => {
                    warn!(
                        transport = transport.name(),
                        topic = %message.topic,
                        error = %err,
                        "transport send failed"
                    );
                    self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    if let Some(exporter) = &self.exporter {
                        exporter.observe_dropped(transport.name());
                    }
                    outcome.failed += 1;
                }
            }
        }
        outcome
    }

    /// Poll transports for any available messages.
    pub fn poll(&self) -> Vec<Message> {
        let mut collected = Vec::new();
        for transport in &self.transports {
            while let Some(message) = transport.recv() {
                log_message(MessageDirection::Inbound, &message);
                self.counters.received.fetch_add(1, Ordering::Relaxed);
                if let Some(exporter) = &self.exporter {
                    exporter.observe_received();
                }
                collected.push(message);
            }
        }
        collected
    }

    /// Return the current metrics snapshot.
    pub fn metrics(&self) -> MessagingMetrics {
        self.counters.snapshot()
    }
}
