#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! Event bus for the rate-control daemon.
//!
//! Mirrors the teacher's event bus: a typed event enum, sequential ids, and
//! a bounded in-memory replay ring so a late subscriber (e.g. the metrics
//! exporter, or a future status endpoint) can catch up on recent history.
//! Built on `tokio::sync::broadcast`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::{Receiver, Sender};
use tracing::error;

/// Identifier assigned to each event emitted by the daemon.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
const DEFAULT_REPLAY_CAPACITY: usize = 256;

/// Typed domain events surfaced by the coordinator loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A torrent's upload limit was changed.
    LimitChanged {
        /// Torrent hash.
        hash: String,
        /// Previously applied limit, bytes/s (`-1` = unlimited).
        previous: i64,
        /// Newly applied limit, bytes/s (`-1` = unlimited).
        current: i64,
        /// Reason string produced by the rate controller.
        reason: String,
    },
    /// A tracker re-announce was fired for a torrent.
    ReannounceFired {
        /// Torrent hash.
        hash: String,
    },
    /// A torrent's upload cycle rolled over.
    CycleReport {
        /// Torrent hash.
        hash: String,
        /// Index of the cycle that just completed.
        cycle_index: u64,
        /// Cycle duration, seconds.
        elapsed: f64,
        /// Bytes uploaded during the cycle.
        uploaded_in_cycle: f64,
        /// Achieved / intended cumulative upload ratio.
        ratio: f64,
        /// Phase the torrent was in when the cycle rolled over.
        phase: String,
    },
    /// Daemon health status changed (degraded or restored components).
    HealthChanged {
        /// Components currently considered degraded.
        degraded: Vec<String>,
    },
    /// Configuration was reloaded and applied.
    SettingsChanged {
        /// Description of the applied configuration change.
        description: String,
    },
}

impl Event {
    /// Machine-friendly discriminator, useful for metrics labels/logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::LimitChanged { .. } => "limit_changed",
            Self::ReannounceFired { .. } => "reannounce_fired",
            Self::CycleReport { .. } => "cycle_report",
            Self::HealthChanged { .. } => "health_changed",
            Self::SettingsChanged { .. } => "settings_changed",
        }
    }
}

/// Metadata wrapper around events: each envelope tracks the event id and
/// emission timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    /// Monotonic identifier assigned to the wrapped event.
    pub id: EventId,
    /// Timestamp recording when the envelope was produced.
    pub timestamp: DateTime<Utc>,
    /// Wrapped event payload.
    pub event: Event,
}

/// Shared event bus built on top of `tokio::sync::broadcast`.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    buffer: Arc<Mutex<VecDeque<EventEnvelope>>>,
    next_id: Arc<AtomicU64>,
    replay_capacity: usize,
}

impl EventBus {
    /// Constructs a new bus with the given broadcast/replay capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "event bus capacity must be positive");
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            next_id: Arc::new(AtomicU64::new(1)),
            replay_capacity: capacity,
        }
    }

    /// Constructs a bus with the default in-memory buffer size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Publishes a new event, assigning it a sequential identifier.
    ///
    /// # Panics
    ///
    /// Panics if the replay buffer mutex has been poisoned.
    #[must_use]
    pub fn publish(&self, event: Event) -> EventId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };

        {
            let mut buffer = self.lock_buffer();
            if buffer.len() == self.replay_capacity {
                buffer.pop_front();
            }
            buffer.push_back(envelope.clone());
        }

        let _ = self.sender.send(envelope);
        id
    }

    /// Subscribes to the bus, replaying any buffered events newer than
    /// `since_id`.
    ///
    /// # Panics
    ///
    /// Panics if the replay buffer mutex has been poisoned.
    #[must_use]
    pub fn subscribe(&self, since_id: Option<EventId>) -> EventStream {
        let mut backlog = VecDeque::new();
        if let Some(since) = since_id {
            let buffer = self.lock_buffer();
            for item in buffer.iter() {
                if item.id > since {
                    backlog.push_back(item.clone());
                }
            }
        }

        let receiver = self.sender.subscribe();
        EventStream { backlog, receiver }
    }

    /// Returns the last assigned identifier, if any events have been
    /// published.
    ///
    /// # Panics
    ///
    /// Panics if the replay buffer mutex has been poisoned.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        let buffer = self.lock_buffer();
        buffer.back().map(|event| event.id)
    }

    fn lock_buffer(&self) -> MutexGuard<'_, VecDeque<EventEnvelope>> {
        match self.buffer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("event buffer mutex poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream wrapper that yields events from the replay backlog first, then
/// from the live broadcast channel.
pub struct EventStream {
    backlog: VecDeque<EventEnvelope>,
    receiver: Receiver<EventEnvelope>,
}

impl EventStream {
    /// Receives the next event, respecting the replay backlog first.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }

        match self.receiver.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(_)) => self.receiver.recv().await.ok(),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(i: u64) -> Event {
        Event::LimitChanged {
            hash: format!("hash{i}"),
            previous: -1,
            current: 1_000_000,
            reason: "steady".to_string(),
        }
    }

    #[test]
    fn event_kind_matches_variant() {
        assert_eq!(sample(0).kind(), "limit_changed");
        assert_eq!(Event::ReannounceFired { hash: "h".into() }.kind(), "reannounce_fired");
        assert_eq!(Event::HealthChanged { degraded: vec![] }.kind(), "health_changed");
    }

    #[tokio::test]
    async fn sequential_ids_and_replay() {
        let bus = EventBus::with_capacity(16);
        let mut last_id = 0;
        for i in 0..5 {
            last_id = bus.publish(sample(i));
        }
        assert_eq!(last_id, 5);

        let mut stream = bus.subscribe(Some(2));
        let mut received = Vec::new();
        for _ in 0..3 {
            received.push(stream.next().await.unwrap());
        }
        assert_eq!(received.first().unwrap().id, 3);
        assert_eq!(received.last().unwrap().id, 5);
    }

    #[tokio::test]
    async fn last_event_id_reflects_recent_publish() {
        let bus = EventBus::with_capacity(2);
        assert!(bus.last_event_id().is_none());
        let published = bus.publish(sample(0));
        assert_eq!(bus.last_event_id(), Some(published));
    }

    #[tokio::test]
    async fn replay_buffer_drops_oldest_beyond_capacity() {
        let bus = EventBus::with_capacity(2);
        bus.publish(sample(0));
        bus.publish(sample(1));
        bus.publish(sample(2));

        let mut stream = bus.subscribe(Some(0));
        let first = stream.next().await.unwrap();
        assert_eq!(first.id, 2, "oldest buffered event should have been evicted");
    }

    #[tokio::test]
    async fn stream_returns_none_after_sender_dropped() {
        let mut stream = {
            let bus = EventBus::with_capacity(1);
            let stream = bus.subscribe(None);
            drop(bus);
            stream
        };
        assert!(stream.next().await.is_none());
    }
}
