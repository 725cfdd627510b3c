//! ---
//! rsim_section: "02-messaging"
//! rsim_subsection: "module"
//! rsim_type: "source"
//! rsim_scope: "code"
//! rsim_description: "Transport abstraction with in-memory and JSON lines sinks."
//! rsim_version: "v0.1.0"
//! rsim_owner: "tbd"
//! ---
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::{Message, MessagingError, Result};

/// Transport abstraction used by all messaging backends.
pub trait Transport: Send + Sync {
    /// Send a message into the transport.
    fn send(&self, msg: Message) -> Result<()>;
    /// Receive the next message from the transport, if available.
    fn recv(&self) -> Option<Message>;
    /// Human-readable transport name for logging/metrics.
    fn name(&self) -> &'static str;
}

/// In-memory transport: a FIFO queue plus the last retained message per topic.
///
/// The queue is unbounded unless built with [`InMemoryTransport::bounded`];
/// a bounded queue drops its oldest entry to make room. Retained copies are
/// one per topic and never evicted.
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    queue: Arc<Mutex<VecDeque<Message>>>,
    retained: Arc<Mutex<IndexMap<String, Message>>>,
    capacity: Option<usize>,
    dropped: Arc<AtomicU64>,
}

impl InMemoryTransport {
    /// Create a new in-memory transport channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue holding at most `capacity` messages (at least one).
    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            ..Self::default()
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Messages evicted from a full bounded queue.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Last retained message published on `topic`.
    pub fn retained(&self, topic: &str) -> Option<Message> {
        self.retained.lock().get(topic).cloned()
    }

    /// All retained messages in first-publish order.
    pub fn retained_messages(&self) -> Vec<Message> {
        self.retained.lock().values().cloned().collect()
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Remove and return every queued message.
    pub fn drain(&self) -> Vec<Message> {
        self.queue.lock().drain(..).collect()
    }
}

impl Transport for InMemoryTransport {
    fn send(&self, msg: Message) -> Result<()> {
        if msg.retained {
            self.retained.lock().insert(msg.topic.clone(), msg.clone());
        }
        let mut queue = self.queue.lock();
        if let Some(capacity) = self.capacity {
            while queue.len() >= capacity {
                queue.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
        queue.push_back(msg);
        Ok(())
    }

    fn recv(&self) -> Option<Message> {
        self.queue.lock().pop_front()
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}

/// Where a [`JsonLinesTransport`] writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonLinesTarget {
    /// Process stdout.
    Stdout,
    /// Append to a file, created on first open.
    File(PathBuf),
}

impl JsonLinesTarget {
    /// `-` selects stdout; anything else is treated as a path.
    pub fn parse(spec: &str) -> Self {
        if spec.trim() == "-" {
            JsonLinesTarget::Stdout
        } else {
            JsonLinesTarget::File(PathBuf::from(spec))
        }
    }

    fn open(&self) -> io::Result<Box<dyn Write + Send>> {
        match self {
            JsonLinesTarget::Stdout => Ok(Box::new(io::stdout())),
            JsonLinesTarget::File(path) => {
                let file: File = OpenOptions::new().create(true).append(true).open(path)?;
                Ok(Box::new(io::BufWriter::new(file)))
            }
        }
    }
}

#[derive(Default)]
struct SinkState {
    writer: Option<Box<dyn Write + Send>>,
    retry_after: Option<Instant>,
}

/// Writes one JSON message per line.
///
/// A write or open failure drops the sink; sends inside the following
/// backoff window fail fast with [`MessagingError::Disconnected`], and the
/// first send after it reopens the target.
pub struct JsonLinesTransport {
    target: JsonLinesTarget,
    backoff: Duration,
    state: Mutex<SinkState>,
}

impl JsonLinesTransport {
    /// Create a transport; the target is opened lazily on first send.
    pub fn new(target: JsonLinesTarget, backoff: Duration) -> Self {
        Self {
            target,
            backoff,
            state: Mutex::new(SinkState::default()),
        }
    }

    /// Target this transport writes to.
    pub fn target(&self) -> &JsonLinesTarget {
        &self.target
    }

    fn write_line(&self, state: &mut SinkState, line: &[u8]) -> io::Result<()> {
        if state.writer.is_none() {
            state.writer = Some(self.target.open()?);
            info!(sink = ?self.target, "json lines sink opened");
        }
        match state.writer.as_mut() {
            Some(writer) => {
                writer.write_all(line)?;
                writer.write_all(b"\n")?;
                writer.flush()
            }
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "sink unavailable")),
        }
    }
}

impl Transport for JsonLinesTransport {
    fn send(&self, msg: Message) -> Result<()> {
        let line = serde_json::to_vec(&msg)?;
        let mut state = self.state.lock();

        let now = Instant::now();
        if let Some(retry_after) = state.retry_after {
            if now < retry_after {
                return Err(MessagingError::Disconnected {
                    transport: self.name(),
                    retry_in: retry_after - now,
                });
            }
            state.retry_after = None;
        }

        if let Err(err) = self.write_line(&mut state, &line) {
            state.writer = None;
            state.retry_after = Some(now + self.backoff);
            warn!(
                sink = ?self.target,
                error = %err,
                backoff_ms = self.backoff.as_millis() as u64,
                "json lines sink failed; reopening after backoff"
            );
            return Err(err.into());
        }
        Ok(())
    }

    fn recv(&self) -> Option<Message> {
        None
    }

    fn name(&self) -> &'static str {
        "json_lines"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use railsim_sim::{DepotAnnouncement, TelemetryEvent};

    fn announcement(depot: &str) -> Message {
        Message::new(TelemetryEvent::DepotAnnouncement(DepotAnnouncement {
            depot_id: depot.into(),
            depot_name: depot.to_uppercase(),
            vehicle_count: 1,
            vehicle_roster: vec!["V-1".into()],
            device_roster: Vec::new(),
        }))
    }

    #[test]
    fn in_memory_keeps_fifo_order_and_retained_copies() {
        let transport = InMemoryTransport::new();
        transport.send(announcement("north")).unwrap();
        transport.send(announcement("south")).unwrap();

        assert_eq!(transport.len(), 2);
        assert_eq!(transport.recv().unwrap().topic, "railsim/north/announce");
        assert_eq!(transport.recv().unwrap().topic, "railsim/south/announce");
        assert!(transport.is_empty());

        assert!(transport.retained("railsim/north/announce").is_some());
        assert_eq!(transport.retained_messages().len(), 2);
    }

    #[test]
    fn bounded_queue_evicts_oldest_but_keeps_retained() {
        let transport = InMemoryTransport::bounded(2);
        for depot in ["north", "south", "east", "west"] {
            transport.send(announcement(depot)).unwrap();
        }

        assert_eq!(transport.capacity(), Some(2));
        assert_eq!(transport.len(), 2);
        assert_eq!(transport.dropped(), 2);
        let topics: Vec<String> = transport.drain().into_iter().map(|m| m.topic).collect();
        assert_eq!(topics, vec!["railsim/east/announce", "railsim/west/announce"]);
        assert_eq!(transport.retained_messages().len(), 4);
        assert!(transport.retained("railsim/north/announce").is_some());
    }

    #[test]
    fn target_spec_parsing() {
        assert_eq!(JsonLinesTarget::parse("-"), JsonLinesTarget::Stdout);
        assert_eq!(
            JsonLinesTarget::parse("out/events.ndjson"),
            JsonLinesTarget::File(PathBuf::from("out/events.ndjson"))
        );
    }

    #[test]
    fn json_lines_writes_one_message_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.ndjson");
        let transport =
            JsonLinesTransport::new(JsonLinesTarget::File(path.clone()), Duration::from_secs(1));
        transport.send(announcement("north")).unwrap();
        transport.send(announcement("south")).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["topic"], "railsim/north/announce");
    }

    #[test]
    fn json_lines_backs_off_then_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("late");
        let path = nested.join("events.ndjson");
        let transport = JsonLinesTransport::new(
            JsonLinesTarget::File(path.clone()),
            Duration::from_millis(50),
        );

        assert!(matches!(
            transport.send(announcement("north")),
            Err(MessagingError::Io(_))
        ));
        assert!(matches!(
            transport.send(announcement("north")),
            Err(MessagingError::Disconnected { transport: "json_lines", .. })
        ));

        std::fs::create_dir_all(&nested).unwrap();
        std::thread::sleep(Duration::from_millis(80));
        transport.send(announcement("north")).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 1);
    }
}
