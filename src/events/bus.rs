//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Fan-out event bus distributing engine events to any number of subscribers. Publication is
// non-blocking: a slow subscriber drops events from its own queue rather than stalling the
// engine's critical section.
//
// | Component     | Description                                                               |
// |---------------|---------------------------------------------------------------------------|
// | EventBus      | Cloneable handle over the shared subscriber map                           |
// | Subscription  | One subscriber's receiving end                                            |
// | EventLogger   | Drains a subscription into tracing records                                |
//--------------------------------------------------------------------------------------------------

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::types::{EngineEvent, EventMetadata};

/// One subscriber's receiving end of the bus.
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    receiver: Receiver<(EngineEvent, EventMetadata)>,
}

impl Subscription {
    /// Returns the subscription id, usable with [`EventBus::unsubscribe`].
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Blocks until the next event arrives. Returns `None` once every bus handle is dropped.
    pub fn receive(&self) -> Option<(EngineEvent, EventMetadata)> {
        self.receiver.recv().ok()
    }

    /// Receives the next event without blocking.
    pub fn try_receive(&self) -> Option<(EngineEvent, EventMetadata)> {
        self.receiver.try_recv().ok()
    }

    /// Drains every event currently queued.
    pub fn drain(&self) -> Vec<(EngineEvent, EventMetadata)> {
        let mut drained = Vec::new();
        while let Some(entry) = self.try_receive() {
            drained.push(entry);
        }
        drained
    }
}

/// Shared state behind every clone of a bus.
#[derive(Debug)]
struct EventBusInner {
    senders: HashMap<Uuid, Sender<(EngineEvent, EventMetadata)>>,
}

/// Fan-out event bus for engine and registry events.
///
/// Cheap to clone; all clones publish into the same subscriber set. Sequence numbers are assigned
/// at publication and are strictly increasing per bus.
#[derive(Debug, Clone)]
pub struct EventBus {
    inner: Arc<RwLock<EventBusInner>>,
    sequence: Arc<AtomicU64>,
    source: String,
}

impl EventBus {
    /// Creates a new bus. `source` names the publishing component in event metadata.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(EventBusInner {
                senders: HashMap::new(),
            })),
            sequence: Arc::new(AtomicU64::new(1)),
            source: source.into(),
        }
    }

    /// Registers a new subscriber and returns its receiving end.
    pub fn subscribe(&self) -> Subscription {
        let id = Uuid::new_v4();
        let (sender, receiver) = unbounded();
        self.inner.write().senders.insert(id, sender);
        Subscription { id, receiver }
    }

    /// Removes a subscriber. Returns false if the id was unknown.
    pub fn unsubscribe(&self, id: Uuid) -> bool {
        self.inner.write().senders.remove(&id).is_some()
    }

    /// Publishes an event to every subscriber.
    pub fn publish(&self, event: EngineEvent) {
        let metadata = EventMetadata {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            source: self.source.clone(),
        };

        // Collect the senders first so publication never holds the lock while sending.
        let senders: Vec<_> = self.inner.read().senders.values().cloned().collect();
        for sender in senders {
            let _ = sender.try_send((event.clone(), metadata.clone()));
        }
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.read().senders.len()
    }
}

/// Bridges the event stream into `tracing` records.
///
/// Attach one to a bus and call [`EventLogger::drain`] wherever a log of recent activity is
/// wanted; each drained event becomes one debug-level record.
#[derive(Debug)]
pub struct EventLogger {
    subscription: Subscription,
}

impl EventLogger {
    /// Subscribes a new logger to the bus.
    pub fn attach(bus: &EventBus) -> Self {
        Self {
            subscription: bus.subscribe(),
        }
    }

    /// Logs every queued event and returns how many were logged.
    pub fn drain(&self) -> usize {
        let mut logged = 0;
        while let Some((event, metadata)) = self.subscription.try_receive() {
            debug!(
                sequence = metadata.sequence,
                source = %metadata.source,
                event = ?event,
                "engine event"
            );
            logged += 1;
        }
        logged
    }
}

//--------------------------------------------------------------------------------------------------
//  TESTS
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> EngineEvent {
        EngineEvent::QuoteTokenAdded {
            asset: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_subscribe_and_receive() {
        let bus = EventBus::new("test");
        let subscription = bus.subscribe();
        let event = sample_event();
        bus.publish(event.clone());
        let (received, metadata) = match subscription.try_receive() {
            Some(entry) => entry,
            None => panic!("expected a published event"),
        };
        assert_eq!(received, event);
        assert_eq!(metadata.source, "test");
        assert_eq!(metadata.sequence, 1);
    }

    #[test]
    fn test_fan_out_to_all_subscribers() {
        let bus = EventBus::new("test");
        let first = bus.subscribe();
        let second = bus.subscribe();
        bus.publish(sample_event());
        assert!(first.try_receive().is_some());
        assert!(second.try_receive().is_some());
    }

    #[test]
    fn test_sequence_is_strictly_increasing() {
        let bus = EventBus::new("test");
        let subscription = bus.subscribe();
        bus.publish(sample_event());
        bus.publish(sample_event());
        let drained = subscription.drain();
        assert_eq!(drained.len(), 2);
        assert!(drained[0].1.sequence < drained[1].1.sequence);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new("test");
        let subscription = bus.subscribe();
        assert!(bus.unsubscribe(subscription.id()));
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(sample_event());
        assert!(subscription.try_receive().is_none());
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::new("test");
        bus.publish(sample_event());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_logger_drains() {
        let bus = EventBus::new("test");
        let logger = EventLogger::attach(&bus);
        bus.publish(sample_event());
        bus.publish(sample_event());
        assert_eq!(logger.drain(), 2);
        assert_eq!(logger.drain(), 0);
    }
}
