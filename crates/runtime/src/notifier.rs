//! Fan-out of [`ChangeEvent`]s to live subscribers.
//!
//! Delivery is best-effort: each subscriber is tried on its own and one that
//! fails is dropped from the registry without affecting the rest.  The
//! registry lock is held for the whole broadcast, so every subscriber sees
//! events in the order the reconciler produced them.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use teamdeck_sync::ChangeEvent;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

pub type SubscriberId = u64;

/// The subscriber is gone and should be forgotten.
#[derive(Debug, Error)]
#[error("subscriber disconnected")]
pub struct Disconnected;

pub trait Subscriber: Send {
    fn deliver(&mut self, event: &ChangeEvent) -> Result<(), Disconnected>;
}

impl Subscriber for mpsc::UnboundedSender<ChangeEvent> {
    fn deliver(&mut self, event: &ChangeEvent) -> Result<(), Disconnected> {
        self.send(event.clone()).map_err(|_| Disconnected)
    }
}

#[derive(Default)]
struct Registry {
    next_id: SubscriberId,
    subscribers: BTreeMap<SubscriberId, Box<dyn Subscriber>>,
}

#[derive(Default)]
pub struct Notifier {
    registry: Mutex<Registry>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, subscriber: impl Subscriber + 'static) -> SubscriberId {
        let mut registry = self.registry.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.subscribers.insert(id, Box::new(subscriber));
        id
    }

    /// Register a channel subscriber and hand back its receiving end.
    pub fn subscribe_channel(&self) -> (SubscriberId, mpsc::UnboundedReceiver<ChangeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (self.subscribe(tx), rx)
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.registry.lock().subscribers.remove(&id).is_some()
    }

    /// Deliver `event` to every subscriber, pruning the ones that fail.
    /// Returns how many received it.
    pub fn broadcast(&self, event: &ChangeEvent) -> usize {
        let mut registry = self.registry.lock();
        let before = registry.subscribers.len();
        registry.subscribers.retain(|id, subscriber| match subscriber.deliver(event) {
            Ok(()) => true,
            Err(Disconnected) => {
                debug!(subscriber = id, "dropping disconnected subscriber");
                false
            }
        });
        let delivered = registry.subscribers.len();
        debug!(
            kind = ?event.kind,
            team = %event.team(),
            delivered,
            dropped = before - delivered,
            "change event broadcast"
        );
        delivered
    }

    pub fn len(&self) -> usize {
        self.registry.lock().subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every subscriber.  Channel receivers observe the close.
    pub fn clear(&self) {
        self.registry.lock().subscribers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use teamdeck_sync::ChangeKind;

    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl Subscriber for Recorder {
        fn deliver(&mut self, event: &ChangeEvent) -> Result<(), Disconnected> {
            self.0.lock().push(event.team().to_string());
            Ok(())
        }
    }

    struct Broken;

    impl Subscriber for Broken {
        fn deliver(&mut self, _event: &ChangeEvent) -> Result<(), Disconnected> {
            Err(Disconnected)
        }
    }

    fn event(team: &str) -> ChangeEvent {
        ChangeEvent::new(ChangeKind::TeamUpdate, team)
    }

    #[test]
    fn failing_subscriber_is_pruned_without_affecting_others() {
        let notifier = Notifier::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        notifier.subscribe(Recorder(seen.clone()));
        notifier.subscribe(Broken);
        notifier.subscribe(Recorder(seen.clone()));
        assert_eq!(notifier.len(), 3);

        assert_eq!(notifier.broadcast(&event("alpha")), 2);
        assert_eq!(notifier.len(), 2);
        assert_eq!(*seen.lock(), vec!["alpha", "alpha"]);
    }

    #[test]
    fn channel_subscriber_receives_in_order() {
        let notifier = Notifier::new();
        let (_, mut rx) = notifier.subscribe_channel();
        notifier.broadcast(&event("a"));
        notifier.broadcast(&ChangeEvent::new(ChangeKind::MessageNew, "b"));

        assert_eq!(rx.try_recv().unwrap(), event("a"));
        assert_eq!(rx.try_recv().unwrap().kind, ChangeKind::MessageNew);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_receiver_is_removed_on_next_broadcast() {
        let notifier = Notifier::new();
        let (_, rx) = notifier.subscribe_channel();
        drop(rx);
        assert_eq!(notifier.broadcast(&event("alpha")), 0);
        assert!(notifier.is_empty());
    }

    #[test]
    fn unsubscribe_and_clear() {
        let notifier = Notifier::new();
        let (id, mut rx) = notifier.subscribe_channel();
        let (_, _rx2) = notifier.subscribe_channel();
        assert!(notifier.unsubscribe(id));
        assert!(!notifier.unsubscribe(id));
        assert_eq!(notifier.broadcast(&event("alpha")), 1);
        assert!(rx.try_recv().is_err());

        notifier.clear();
        assert!(notifier.is_empty());
    }
}
