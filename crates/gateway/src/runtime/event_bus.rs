//! Event Bus (§4.6): one ordered event stream per conversation.
//!
//! Grounded on `RunStore`'s bounded-ring-plus-broadcast-channel pattern,
//! generalized from "one channel per run" to "one channel per conversation"
//! with a sequence cursor so a reconnecting SSE client can resume with
//! `Last-Event-ID` instead of missing events while disconnected.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use parley_domain::event::{Event, EventKind};
use tokio::sync::broadcast;
use uuid::Uuid;

/// A single conversation's event stream. The broadcast channel is the live
/// path the SSE Gateway consumes; the ring buffer is a separate replay log
/// sized independently so a slow or disconnected subscriber can still
/// recover everything after its last seen sequence, up to `ring_capacity`
/// entries back.
pub struct EventBus {
    conversation_id: Uuid,
    next_sequence: AtomicU64,
    ring: RwLock<VecDeque<Event>>,
    ring_capacity: usize,
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(conversation_id: Uuid, queue_capacity: usize, ring_capacity: usize) -> Self {
        let (sender, _rx) = broadcast::channel(queue_capacity.max(1));
        Self {
            conversation_id,
            next_sequence: AtomicU64::new(0),
            ring: RwLock::new(VecDeque::with_capacity(ring_capacity)),
            ring_capacity: ring_capacity.max(1),
            sender,
        }
    }

    /// Assign the next sequence number, append to the ring (evicting the
    /// oldest entry once full), and fan out to any live subscriber.
    pub fn publish(&self, kind: EventKind) -> Event {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let event = Event {
            sequence,
            conversation_id: self.conversation_id,
            timestamp: Utc::now(),
            kind,
        };

        {
            let mut ring = self.ring.write();
            if ring.len() >= self.ring_capacity {
                ring.pop_front();
            }
            ring.push_back(event.clone());
        }

        // No live subscriber is not an error: the orchestrator keeps running
        // server-authoritative even with nobody watching (§4.8).
        let _ = self.sender.send(event.clone());
        event
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Events strictly after `after_sequence`. `None` means the client's
    /// cursor has already fallen off the back of the ring and needs a full
    /// `lifecycle.resync` instead of incremental replay.
    pub fn replay_after(&self, after_sequence: u64) -> Option<Vec<Event>> {
        let ring = self.ring.read();
        match ring.front() {
            None => Some(Vec::new()),
            Some(oldest) if after_sequence + 1 < oldest.sequence => None,
            _ => Some(
                ring.iter()
                    .filter(|e| e.sequence > after_sequence)
                    .cloned()
                    .collect(),
            ),
        }
    }

    pub fn latest_sequence(&self) -> Option<u64> {
        self.ring.read().back().map(|e| e.sequence)
    }
}

/// Per-process registry of live event buses, one per running conversation.
pub struct EventBusRegistry {
    buses: RwLock<HashMap<Uuid, Arc<EventBus>>>,
    queue_capacity: usize,
    ring_capacity: usize,
}

impl EventBusRegistry {
    pub fn new(queue_capacity: usize, ring_capacity: usize) -> Self {
        Self {
            buses: RwLock::new(HashMap::new()),
            queue_capacity,
            ring_capacity,
        }
    }

    pub fn get_or_create(&self, conversation_id: Uuid) -> Arc<EventBus> {
        if let Some(bus) = self.buses.read().get(&conversation_id) {
            return bus.clone();
        }
        self.buses
            .write()
            .entry(conversation_id)
            .or_insert_with(|| {
                Arc::new(EventBus::new(
                    conversation_id,
                    self.queue_capacity,
                    self.ring_capacity,
                ))
            })
            .clone()
    }

    pub fn get(&self, conversation_id: Uuid) -> Option<Arc<EventBus>> {
        self.buses.read().get(&conversation_id).cloned()
    }

    pub fn remove(&self, conversation_id: Uuid) {
        self.buses.write().remove(&conversation_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_assigns_monotonic_sequence() {
        let bus = EventBus::new(Uuid::new_v4(), 16, 8);
        let a = bus.publish(EventKind::LifecycleReady);
        let b = bus.publish(EventKind::LifecycleRunning);
        assert_eq!(a.sequence, 0);
        assert_eq!(b.sequence, 1);
    }

    #[test]
    fn ring_evicts_oldest_once_full() {
        let bus = EventBus::new(Uuid::new_v4(), 16, 2);
        bus.publish(EventKind::LifecycleReady);
        bus.publish(EventKind::LifecycleRunning);
        bus.publish(EventKind::LifecycleCompleted);
        let replay = bus.replay_after(0).unwrap();
        assert_eq!(replay.len(), 1);
        assert_eq!(replay[0].sequence, 2);
    }

    #[test]
    fn replay_after_returns_events_past_cursor() {
        let bus = EventBus::new(Uuid::new_v4(), 16, 8);
        bus.publish(EventKind::LifecycleReady);
        bus.publish(EventKind::LifecycleRunning);
        bus.publish(EventKind::LifecycleCompleted);
        let replay = bus.replay_after(0).unwrap();
        assert_eq!(replay.len(), 2);
        assert_eq!(replay[0].sequence, 1);
    }

    #[test]
    fn replay_after_evicted_cursor_returns_none() {
        let bus = EventBus::new(Uuid::new_v4(), 16, 1);
        bus.publish(EventKind::LifecycleReady);
        bus.publish(EventKind::LifecycleRunning);
        bus.publish(EventKind::LifecycleCompleted);
        assert!(bus.replay_after(0).is_none());
    }

    #[test]
    fn subscriber_receives_live_events() {
        let bus = EventBus::new(Uuid::new_v4(), 16, 8);
        let mut rx = bus.subscribe();
        bus.publish(EventKind::LifecycleReady);
        let received = rx.try_recv().unwrap();
        assert_eq!(received.sequence, 0);
    }

    #[test]
    fn registry_reuses_existing_bus() {
        let registry = EventBusRegistry::new(16, 8);
        let id = Uuid::new_v4();
        let a = registry.get_or_create(id);
        a.publish(EventKind::LifecycleReady);
        let b = registry.get_or_create(id);
        assert_eq!(b.latest_sequence(), Some(0));
    }

    #[test]
    fn registry_get_missing_conversation_is_none() {
        let registry = EventBusRegistry::new(16, 8);
        assert!(registry.get(Uuid::new_v4()).is_none());
    }

    #[test]
    fn registry_remove_drops_bus() {
        let registry = EventBusRegistry::new(16, 8);
        let id = Uuid::new_v4();
        registry.get_or_create(id);
        registry.remove(id);
        assert!(registry.get(id).is_none());
    }
}
