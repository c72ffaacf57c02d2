//! Progression events and the subscription-handle event bus.
//!
//! Every subscriber gets its own channel, created by `subscribe` and torn
//! down by passing the returned `Subscription` back to `unsubscribe`.
//! Subscriptions are keyed by a caller-chosen identity string, so
//! subscribing the same listener twice is rejected instead of silently
//! duplicating deliveries, and disposal is exactly-once because
//! `unsubscribe` consumes the handle.

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use updraft_common::{AchievementId, LevelId};

/// Events emitted by the progression engine for UI/audio consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressionEvent {
    /// An achievement crossed its target and unlocked.
    AchievementUnlocked {
        /// Achievement that unlocked.
        id: AchievementId,
    },
    /// An achievement's progress changed without unlocking.
    AchievementProgress {
        /// Achievement being tracked.
        id: AchievementId,
        /// Current progress value.
        current: u32,
        /// Target value.
        target: u32,
    },
    /// A level became available through the unlock graph.
    LevelUnlocked {
        /// Newly unlocked level.
        id: LevelId,
    },
    /// A level was completed.
    LevelCompleted {
        /// Completed level.
        id: LevelId,
        /// Completion time in seconds.
        time_seconds: f64,
        /// Score earned.
        score: u64,
    },
    /// The player's level changed.
    PlayerLevelChanged {
        /// Previous level.
        old_level: u32,
        /// New level.
        new_level: u32,
    },
    /// Total experience changed.
    ExperienceChanged {
        /// New experience total.
        total: u64,
        /// Experience remaining until the next level.
        to_next: u64,
    },
    /// The collectible count for the active level changed.
    CollectibleCountChanged {
        /// Collectibles still uncollected.
        remaining: usize,
        /// Total collectibles registered for the level.
        total: usize,
    },
    /// A save completed successfully.
    SaveCompleted {
        /// Slot written.
        slot: usize,
    },
    /// A save failed; it will be retried on the next autosave tick.
    SaveFailed {
        /// Human-readable message for display.
        message: String,
    },
    /// The fixed level sequence was exhausted and endless mode engaged.
    EndlessModeEntered {
        /// Current endless location index.
        location_index: u32,
    },
}

/// Errors from event-bus operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventBusError {
    /// A subscription with this identity already exists.
    #[error("Listener already subscribed: {0}")]
    AlreadySubscribed(String),
}

/// Monotonic identifier for one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Handle for one active subscription.
///
/// Holds the receiving end of the subscriber's channel. Returning it to
/// `EventBus::unsubscribe` disposes the subscription; the handle cannot be
/// disposed twice because it is consumed.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    name: String,
    receiver: Receiver<ProgressionEvent>,
}

impl Subscription {
    /// Returns the subscriber identity this handle was created with.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Receives the next pending event, if any.
    pub fn try_recv(&self) -> Option<ProgressionEvent> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Drains all pending events.
    pub fn drain(&self) -> Vec<ProgressionEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.try_recv() {
            events.push(event);
        }
        events
    }

    /// Returns the number of pending events.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }
}

/// One active subscriber channel.
#[derive(Debug)]
struct Subscriber {
    /// Listener identity this channel was registered under.
    name: String,
    /// Sending end of the subscriber's channel.
    sender: Sender<ProgressionEvent>,
}

/// Event bus connecting the progression engine to external consumers.
#[derive(Debug, Default)]
pub struct EventBus {
    /// Active subscribers, keyed by subscription ID.
    subscribers: HashMap<SubscriptionId, Subscriber>,
    /// Identity -> subscription ID, to reject double subscription.
    names: HashMap<String, SubscriptionId>,
    /// Next subscription ID.
    next_id: u64,
}

impl EventBus {
    /// Creates a new, empty event bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes a listener identified by `name`.
    ///
    /// Fails if a subscription with the same identity is already active;
    /// the unsubscribe-then-resubscribe dance is never necessary.
    pub fn subscribe(&mut self, name: impl Into<String>) -> Result<Subscription, EventBusError> {
        let name = name.into();
        if self.names.contains_key(&name) {
            return Err(EventBusError::AlreadySubscribed(name));
        }

        let id = SubscriptionId(self.next_id);
        self.next_id += 1;

        let (sender, receiver) = unbounded();
        self.subscribers.insert(
            id,
            Subscriber {
                name: name.clone(),
                sender,
            },
        );
        self.names.insert(name.clone(), id);
        debug!("Subscribed listener '{}'", name);

        Ok(Subscription { id, name, receiver })
    }

    /// Unsubscribes a listener by consuming its handle.
    pub fn unsubscribe(&mut self, subscription: Subscription) {
        self.subscribers.remove(&subscription.id);
        self.names.remove(&subscription.name);
        debug!("Unsubscribed listener '{}'", subscription.name);
    }

    /// Publishes an event to every active subscriber.
    ///
    /// A subscriber whose handle was dropped without `unsubscribe` has a
    /// disconnected channel; such entries are pruned here so the identity
    /// becomes free to subscribe again.
    pub fn publish(&mut self, event: &ProgressionEvent) {
        let mut dropped = Vec::new();
        for (&id, subscriber) in &self.subscribers {
            if subscriber.sender.try_send(event.clone()).is_err() {
                dropped.push(id);
            }
        }
        for id in dropped {
            if let Some(subscriber) = self.subscribers.remove(&id) {
                debug!("Pruned dropped listener '{}'", subscriber.name);
                self.names.remove(&subscriber.name);
            }
        }
    }

    /// Publishes a batch of events in order.
    pub fn publish_all(&mut self, events: &[ProgressionEvent]) {
        for event in events {
            self.publish(event);
        }
    }

    /// Returns the number of active subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Returns whether a listener identity is currently subscribed.
    #[must_use]
    pub fn is_subscribed(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_and_receive() {
        let mut bus = EventBus::new();
        let sub = bus.subscribe("hud").expect("subscribe failed");

        bus.publish(&ProgressionEvent::SaveCompleted { slot: 1 });

        assert_eq!(sub.pending_count(), 1);
        assert_eq!(
            sub.try_recv(),
            Some(ProgressionEvent::SaveCompleted { slot: 1 })
        );
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn test_double_subscription_rejected() {
        let mut bus = EventBus::new();
        let _sub = bus.subscribe("hud").expect("subscribe failed");

        let result = bus.subscribe("hud");
        assert_eq!(
            result.err(),
            Some(EventBusError::AlreadySubscribed("hud".to_string()))
        );
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_unsubscribe_consumes_handle() {
        let mut bus = EventBus::new();
        let sub = bus.subscribe("audio").expect("subscribe failed");
        assert!(bus.is_subscribed("audio"));

        bus.unsubscribe(sub);
        assert!(!bus.is_subscribed("audio"));
        assert_eq!(bus.subscriber_count(), 0);

        // The identity is free again.
        let _sub = bus.subscribe("audio").expect("resubscribe failed");
    }

    #[test]
    fn test_publish_reaches_all_subscribers() {
        let mut bus = EventBus::new();
        let hud = bus.subscribe("hud").expect("subscribe failed");
        let audio = bus.subscribe("audio").expect("subscribe failed");

        bus.publish(&ProgressionEvent::PlayerLevelChanged {
            old_level: 1,
            new_level: 2,
        });

        assert_eq!(hud.pending_count(), 1);
        assert_eq!(audio.pending_count(), 1);
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let mut bus = EventBus::new();
        bus.publish(&ProgressionEvent::SaveCompleted { slot: 0 });
    }

    #[test]
    fn test_dropped_handle_is_pruned_and_identity_freed() {
        let mut bus = EventBus::new();
        let sub = bus.subscribe("hud").expect("subscribe failed");
        drop(sub);

        // The next publish notices the disconnected channel.
        bus.publish(&ProgressionEvent::SaveCompleted { slot: 0 });
        assert_eq!(bus.subscriber_count(), 0);
        assert!(!bus.is_subscribed("hud"));

        let sub = bus.subscribe("hud").expect("resubscribe after drop failed");
        bus.publish(&ProgressionEvent::SaveCompleted { slot: 1 });
        assert_eq!(sub.pending_count(), 1);
    }

    #[test]
    fn test_drain_preserves_order() {
        let mut bus = EventBus::new();
        let sub = bus.subscribe("hud").expect("subscribe failed");

        bus.publish_all(&[
            ProgressionEvent::ExperienceChanged {
                total: 100,
                to_next: 50,
            },
            ProgressionEvent::PlayerLevelChanged {
                old_level: 1,
                new_level: 2,
            },
        ]);

        let events = sub.drain();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            ProgressionEvent::ExperienceChanged { .. }
        ));
        assert!(matches!(
            events[1],
            ProgressionEvent::PlayerLevelChanged { .. }
        ));
    }
}
