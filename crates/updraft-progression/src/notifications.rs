//! Unlock-notification queue.
//!
//! At most one notification is visible at a time; further unlocks queue in
//! FIFO order. The queue is advanced by a scheduler tick that counts down
//! the remaining display time, so tests never depend on wall-clock time.

use std::collections::VecDeque;
use tracing::debug;

use updraft_common::AchievementId;

/// Default display duration per notification, in seconds.
pub const DEFAULT_DISPLAY_DURATION: f64 = 3.0;

/// The currently visible notification.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveNotification {
    /// Achievement being announced.
    pub id: AchievementId,
    /// Seconds of display time remaining.
    pub remaining: f64,
}

/// FIFO queue of unlock notifications with a single visible item.
#[derive(Debug)]
pub struct NotificationQueue {
    /// Display duration applied to each notification.
    display_duration: f64,
    /// The notification currently shown, if any.
    active: Option<ActiveNotification>,
    /// Pending notifications in FIFO order.
    pending: VecDeque<AchievementId>,
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new(DEFAULT_DISPLAY_DURATION)
    }
}

impl NotificationQueue {
    /// Creates a queue with the given per-item display duration.
    #[must_use]
    pub fn new(display_duration: f64) -> Self {
        Self {
            display_duration: display_duration.max(0.0),
            active: None,
            pending: VecDeque::new(),
        }
    }

    /// Enqueues a notification. Shown immediately if nothing is visible.
    pub fn push(&mut self, id: AchievementId) {
        if self.active.is_none() {
            self.active = Some(ActiveNotification {
                id,
                remaining: self.display_duration,
            });
        } else {
            self.pending.push_back(id);
        }
    }

    /// Advances display time and rotates to the next notification when the
    /// current one expires.
    pub fn tick(&mut self, delta_seconds: f64) {
        let expired = match &mut self.active {
            Some(active) => {
                active.remaining -= delta_seconds;
                active.remaining <= 0.0
            }
            None => false,
        };
        if expired {
            self.advance();
        }
    }

    /// Clears the visible notification and immediately shows the next
    /// queued one. The cleared notification is not re-enqueued.
    pub fn clear_active(&mut self) {
        if self.active.is_some() {
            debug!("Notification display cancelled");
            self.advance();
        }
    }

    fn advance(&mut self) {
        self.active = self.pending.pop_front().map(|id| ActiveNotification {
            id,
            remaining: self.display_duration,
        });
    }

    /// Returns the currently visible notification.
    #[must_use]
    pub fn active(&self) -> Option<&ActiveNotification> {
        self.active.as_ref()
    }

    /// Returns the number of notifications not yet shown.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Returns the total number of queued notifications, visible included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len() + usize::from(self.active.is_some())
    }

    /// Returns whether nothing is queued or visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_push_shows_immediately() {
        let mut queue = NotificationQueue::new(2.0);
        queue.push(AchievementId::new(1));

        let active = queue.active().expect("should be visible");
        assert_eq!(active.id, AchievementId::new(1));
        assert_eq!(queue.pending_count(), 0);
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = NotificationQueue::new(1.0);
        queue.push(AchievementId::new(1));
        queue.push(AchievementId::new(2));
        queue.push(AchievementId::new(3));

        assert_eq!(queue.active().map(|a| a.id), Some(AchievementId::new(1)));
        queue.tick(1.5);
        assert_eq!(queue.active().map(|a| a.id), Some(AchievementId::new(2)));
        queue.tick(1.5);
        assert_eq!(queue.active().map(|a| a.id), Some(AchievementId::new(3)));
        queue.tick(1.5);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_tick_does_not_skip_items() {
        let mut queue = NotificationQueue::new(2.0);
        queue.push(AchievementId::new(1));
        queue.push(AchievementId::new(2));

        // A large tick expires only the visible item; the next one gets
        // its full display duration.
        queue.tick(100.0);
        let active = queue.active().expect("second item should be visible");
        assert_eq!(active.id, AchievementId::new(2));
        assert!((active.remaining - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_clear_active_advances_immediately() {
        let mut queue = NotificationQueue::new(5.0);
        queue.push(AchievementId::new(1));
        queue.push(AchievementId::new(2));

        queue.clear_active();
        assert_eq!(queue.active().map(|a| a.id), Some(AchievementId::new(2)));
        // The cleared one is gone for good.
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_clear_on_empty_is_noop() {
        let mut queue = NotificationQueue::new(1.0);
        queue.clear_active();
        assert!(queue.is_empty());
    }
}
