//! ---
//! rsim_section: "02-messaging"
//! rsim_subsection: "module"
//! rsim_type: "source"
//! rsim_scope: "code"
//! rsim_description: "Telemetry message envelope, topics and transport seam."
//! rsim_version: "v0.1.0"
//! rsim_owner: "tbd"
//! ---
//! Hands engine events to whatever sits downstream.
//!
//! Events are wrapped in a [`Message`] envelope carrying a topic and a
//! retained flag, then fanned out by the [`MessagingSupervisor`] to every
//! registered [`Transport`].
#![warn(missing_docs)]

pub mod logging;
pub mod supervisor;
pub mod transport;
pub mod types;

use std::time::Duration;

/// Shared result type for messaging operations.
pub type Result<T> = std::result::Result<T, MessagingError>;

/// Failures raised by transports.
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    /// Wrapper for IO errors encountered while writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Wrapper for JSON serialization problems.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// The transport lost its sink and is waiting out its reconnect backoff.
    #[error("transport {transport} disconnected; retrying in {retry_in:?}")]
    Disconnected {
        /// Transport name.
        transport: &'static str,
        /// Time left before the next reopen attempt.
        retry_in: Duration,
    },
}

pub use logging::{log_message, MessageDirection, MessagingMetricsExporter};
pub use supervisor::{MessagingMetrics, MessagingSupervisor, PublishOutcome};
pub use transport::{InMemoryTransport, JsonLinesTarget, JsonLinesTransport, Transport};
pub use types::{
    announce_topic, point_machine_topic, vehicle_topic, Message, SCHEMA_VERSION, TOPIC_ROOT,
};
