//! Achievement definitions and the typed progress state machine.
//!
//! Each achievement moves `Locked -> Unlocked` exactly once, on the update
//! where progress crosses from below the target to at or above it. After
//! unlock, progress reports are no-ops. Unknown IDs are logged and
//! ignored; gameplay never crashes because a definition was removed or an
//! ID was misspelled.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::events::ProgressionEvent;
use crate::notifications::NotificationQueue;
use crate::persistence::now_epoch_seconds;
use crate::profile::SaveProfile;
use updraft_common::AchievementId;

/// How progress updates are interpreted for an achievement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AchievementKind {
    /// Boolean completion; any positive report collapses to 1.
    OneTime,
    /// Progress is the running maximum ever reported.
    Progressive,
    /// Progress is replaced by the latest reported absolute total.
    ///
    /// Callers pass a running total from a single source of truth, never a
    /// delta; the tracker does not aggregate.
    Cumulative,
    /// Progress is replaced verbatim; the unlock predicate lives with the
    /// caller, the tracker only applies the cross-target rule.
    Conditional,
}

/// Rarity tier, for display sorting and styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    /// Most players will earn this.
    #[default]
    Common,
    /// Requires some dedication.
    Uncommon,
    /// Requires real dedication.
    Rare,
    /// Few players will earn this.
    Epic,
    /// Almost nobody will earn this.
    Legendary,
}

/// A single achievement definition plus its runtime state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementDef {
    /// Stable identifier.
    pub id: AchievementId,
    /// Display name.
    pub name: String,
    /// Display description.
    pub description: String,
    /// Progress semantics.
    pub kind: AchievementKind,
    /// Value at which the achievement unlocks.
    pub target: u32,
    /// Current progress value.
    pub current_progress: u32,
    /// Whether the achievement has unlocked.
    pub unlocked: bool,
    /// Unix epoch seconds of the unlock, if unlocked.
    pub unlock_timestamp: Option<u64>,
    /// Score added to the profile on unlock.
    pub score_reward: u64,
    /// Display category (e.g. "Flight", "Exploration").
    pub category: String,
    /// Rarity tier.
    pub rarity: Rarity,
    /// Name/description hidden until unlocked.
    pub hidden_until_unlocked: bool,
    /// Entirely absent from lists until unlocked.
    pub secret: bool,
}

impl AchievementDef {
    /// Creates a new definition.
    ///
    /// `OneTime` achievements always have a target of 1, whatever is
    /// passed.
    #[must_use]
    pub fn new(
        id: AchievementId,
        name: impl Into<String>,
        kind: AchievementKind,
        target: u32,
    ) -> Self {
        let target = match kind {
            AchievementKind::OneTime => 1,
            _ => target.max(1),
        };
        Self {
            id,
            name: name.into(),
            description: String::new(),
            kind,
            target,
            current_progress: 0,
            unlocked: false,
            unlock_timestamp: None,
            score_reward: 0,
            category: String::new(),
            rarity: Rarity::default(),
            hidden_until_unlocked: false,
            secret: false,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the score reward.
    #[must_use]
    pub fn with_score_reward(mut self, reward: u64) -> Self {
        self.score_reward = reward;
        self
    }

    /// Sets the category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Sets the rarity.
    #[must_use]
    pub const fn with_rarity(mut self, rarity: Rarity) -> Self {
        self.rarity = rarity;
        self
    }

    /// Hides name/description until unlocked.
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.hidden_until_unlocked = true;
        self
    }

    /// Hides the achievement entirely until unlocked.
    #[must_use]
    pub const fn secret(mut self) -> Self {
        self.secret = true;
        self.hidden_until_unlocked = true;
        self
    }

    /// Returns whether the achievement should appear in lists at all.
    #[must_use]
    pub const fn is_listed(&self) -> bool {
        self.unlocked || !self.secret
    }

    /// Returns whether name/description may be shown.
    #[must_use]
    pub const fn is_revealed(&self) -> bool {
        self.unlocked || !self.hidden_until_unlocked
    }
}

/// Tracker holding all achievement definitions and their progress.
#[derive(Debug, Default)]
pub struct AchievementTracker {
    /// Definitions by ID.
    definitions: HashMap<AchievementId, AchievementDef>,
    /// Queue of unlock notifications for sequential display.
    notifications: NotificationQueue,
}

impl AchievementTracker {
    /// Creates a tracker with the given notification display duration.
    #[must_use]
    pub fn new(notification_duration: f64) -> Self {
        Self {
            definitions: HashMap::new(),
            notifications: NotificationQueue::new(notification_duration),
        }
    }

    /// Registers a definition. Replaces any previous definition with the
    /// same ID.
    pub fn register(&mut self, def: AchievementDef) {
        self.definitions.insert(def.id, def);
    }

    /// Returns a definition by ID.
    #[must_use]
    pub fn get(&self, id: AchievementId) -> Option<&AchievementDef> {
        self.definitions.get(&id)
    }

    /// Returns the number of registered definitions.
    #[must_use]
    pub fn count(&self) -> usize {
        self.definitions.len()
    }

    /// Returns the number of unlocked achievements.
    #[must_use]
    pub fn unlocked_count(&self) -> usize {
        self.definitions.values().filter(|d| d.unlocked).count()
    }

    /// Returns the notification queue.
    #[must_use]
    pub fn notifications(&self) -> &NotificationQueue {
        &self.notifications
    }

    /// Returns the notification queue mutably (for tick/cancel).
    pub fn notifications_mut(&mut self) -> &mut NotificationQueue {
        &mut self.notifications
    }

    /// Iterates over all definitions.
    pub fn iter(&self) -> impl Iterator<Item = &AchievementDef> {
        self.definitions.values()
    }

    /// Restores runtime state from a loaded profile.
    pub fn rehydrate(&mut self, profile: &SaveProfile) {
        for def in self.definitions.values_mut() {
            if profile.unlocked_achievements.contains(&def.id) {
                def.unlocked = true;
                def.current_progress = def.target;
            } else {
                def.unlocked = false;
                def.unlock_timestamp = None;
                def.current_progress = profile
                    .achievement_progress
                    .get(&def.id)
                    .copied()
                    .unwrap_or(0);
            }
        }
    }

    /// Reports a progress value for an achievement.
    ///
    /// Returns the events produced by the update; an empty vec means
    /// nothing changed (unknown ID, post-unlock report, or no-op value).
    /// The caller marks persistence dirty when events are returned.
    pub fn report_progress(
        &mut self,
        id: AchievementId,
        value: u32,
        profile: &mut SaveProfile,
    ) -> Vec<ProgressionEvent> {
        let Some(def) = self.definitions.get_mut(&id) else {
            warn!("Progress reported for unknown achievement {:?}", id);
            return Vec::new();
        };

        if def.unlocked {
            debug!("Ignoring progress for unlocked achievement {:?}", id);
            return Vec::new();
        }

        let new_progress = match def.kind {
            AchievementKind::OneTime => {
                if value > 0 {
                    1
                } else {
                    def.current_progress
                }
            }
            AchievementKind::Progressive => def.current_progress.max(value),
            AchievementKind::Cumulative | AchievementKind::Conditional => value,
        };

        if new_progress == def.current_progress {
            return Vec::new();
        }

        let crossed = def.current_progress < def.target && new_progress >= def.target;
        def.current_progress = new_progress;

        if crossed {
            let event = Self::apply_unlock(def, profile, &mut self.notifications);
            vec![event]
        } else {
            profile.achievement_progress.insert(id, new_progress);
            vec![ProgressionEvent::AchievementProgress {
                id,
                current: new_progress,
                target: def.target,
            }]
        }
    }

    /// Unlocks an achievement directly, regardless of progress.
    ///
    /// Unlocking an already-unlocked achievement or an unknown ID is a
    /// logged no-op.
    pub fn unlock(&mut self, id: AchievementId, profile: &mut SaveProfile) -> Vec<ProgressionEvent> {
        let Some(def) = self.definitions.get_mut(&id) else {
            warn!("Unlock requested for unknown achievement {:?}", id);
            return Vec::new();
        };

        if def.unlocked {
            debug!("Achievement {:?} already unlocked", id);
            return Vec::new();
        }

        def.current_progress = def.target;
        let event = Self::apply_unlock(def, profile, &mut self.notifications);
        vec![event]
    }

    /// Applies every unlock side effect: flag, timestamp, profile sets,
    /// score reward, notification.
    fn apply_unlock(
        def: &mut AchievementDef,
        profile: &mut SaveProfile,
        notifications: &mut NotificationQueue,
    ) -> ProgressionEvent {
        def.unlocked = true;
        def.unlock_timestamp = Some(now_epoch_seconds());

        profile.achievement_progress.remove(&def.id);
        if profile.unlocked_achievements.insert(def.id) {
            profile.add_score(def.score_reward);
        }
        notifications.push(def.id);

        debug!("Achievement unlocked: {:?} ({})", def.id, def.name);
        ProgressionEvent::AchievementUnlocked { id: def.id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker_with(kind: AchievementKind, target: u32) -> (AchievementTracker, AchievementId) {
        let id = AchievementId::new(1);
        let mut tracker = AchievementTracker::new(1.0);
        tracker.register(
            AchievementDef::new(id, "Test", kind, target).with_score_reward(100),
        );
        (tracker, id)
    }

    fn unlock_events(events: &[ProgressionEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, ProgressionEvent::AchievementUnlocked { .. }))
            .count()
    }

    #[test]
    fn test_one_time_collapses_to_one() {
        let (mut tracker, id) = tracker_with(AchievementKind::OneTime, 5);
        let mut profile = SaveProfile::default();

        // Target is forced to 1 for OneTime.
        assert_eq!(tracker.get(id).map(|d| d.target), Some(1));

        let events = tracker.report_progress(id, 37, &mut profile);
        assert_eq!(unlock_events(&events), 1);
        assert!(profile.unlocked_achievements.contains(&id));
    }

    #[test]
    fn test_progressive_monotonic() {
        let (mut tracker, id) = tracker_with(AchievementKind::Progressive, 8);
        let mut profile = SaveProfile::default();

        let mut unlocks = 0;
        for value in [5, 3, 8, 2] {
            let events = tracker.report_progress(id, value, &mut profile);
            unlocks += unlock_events(&events);
        }

        assert_eq!(tracker.get(id).map(|d| d.current_progress), Some(8));
        assert_eq!(unlocks, 1);
    }

    #[test]
    fn test_cumulative_replace_semantics() {
        let (mut tracker, id) = tracker_with(AchievementKind::Cumulative, 20);
        let mut profile = SaveProfile::default();

        let first = tracker.report_progress(id, 10, &mut profile);
        assert_eq!(unlock_events(&first), 0);
        assert_eq!(first.len(), 1); // progress event

        let second = tracker.report_progress(id, 10, &mut profile);
        assert!(second.is_empty()); // no change

        let third = tracker.report_progress(id, 25, &mut profile);
        assert_eq!(unlock_events(&third), 1);
    }

    #[test]
    fn test_unlock_idempotent() {
        let (mut tracker, id) = tracker_with(AchievementKind::OneTime, 1);
        let mut profile = SaveProfile::default();

        let first = tracker.unlock(id, &mut profile);
        assert_eq!(unlock_events(&first), 1);
        let score_after_first = profile.total_score;
        let queue_after_first = tracker.notifications().len();

        let second = tracker.unlock(id, &mut profile);
        assert!(second.is_empty());
        assert_eq!(profile.total_score, score_after_first);
        assert_eq!(tracker.notifications().len(), queue_after_first);
    }

    #[test]
    fn test_post_unlock_progress_ignored() {
        let (mut tracker, id) = tracker_with(AchievementKind::Progressive, 5);
        let mut profile = SaveProfile::default();

        tracker.report_progress(id, 5, &mut profile);
        assert!(tracker.get(id).map(|d| d.unlocked).unwrap_or(false));

        let events = tracker.report_progress(id, 100, &mut profile);
        assert!(events.is_empty());
        assert_eq!(tracker.get(id).map(|d| d.current_progress), Some(5));
    }

    #[test]
    fn test_unknown_id_is_noop() {
        let mut tracker = AchievementTracker::new(1.0);
        let mut profile = SaveProfile::default();

        let events = tracker.report_progress(AchievementId::new(99), 10, &mut profile);
        assert!(events.is_empty());
        let events = tracker.unlock(AchievementId::new(99), &mut profile);
        assert!(events.is_empty());
    }

    #[test]
    fn test_unlock_moves_id_between_profile_sets() {
        let (mut tracker, id) = tracker_with(AchievementKind::Cumulative, 10);
        let mut profile = SaveProfile::default();

        tracker.report_progress(id, 4, &mut profile);
        assert_eq!(profile.achievement_progress.get(&id), Some(&4));

        tracker.report_progress(id, 12, &mut profile);
        assert!(!profile.achievement_progress.contains_key(&id));
        assert!(profile.unlocked_achievements.contains(&id));
        assert!(profile.achievement_state_consistent());
    }

    #[test]
    fn test_score_reward_applied_once() {
        let (mut tracker, id) = tracker_with(AchievementKind::Progressive, 3);
        let mut profile = SaveProfile::default();

        tracker.report_progress(id, 3, &mut profile);
        assert_eq!(profile.total_score, 100);

        tracker.report_progress(id, 10, &mut profile);
        assert_eq!(profile.total_score, 100);
    }

    #[test]
    fn test_rehydrate_from_profile() {
        let a = AchievementId::new(1);
        let b = AchievementId::new(2);
        let mut tracker = AchievementTracker::new(1.0);
        tracker.register(AchievementDef::new(a, "A", AchievementKind::Cumulative, 50));
        tracker.register(AchievementDef::new(b, "B", AchievementKind::OneTime, 1));

        let mut profile = SaveProfile::default();
        profile.achievement_progress.insert(a, 30);
        profile.unlocked_achievements.insert(b);

        tracker.rehydrate(&profile);
        assert_eq!(tracker.get(a).map(|d| d.current_progress), Some(30));
        assert!(!tracker.get(a).map(|d| d.unlocked).unwrap_or(true));
        assert!(tracker.get(b).map(|d| d.unlocked).unwrap_or(false));
    }

    #[test]
    fn test_notification_queued_per_unlock() {
        let mut tracker = AchievementTracker::new(1.0);
        let mut profile = SaveProfile::default();
        for i in 1..=3 {
            tracker.register(AchievementDef::new(
                AchievementId::new(i),
                format!("A{i}"),
                AchievementKind::OneTime,
                1,
            ));
        }

        for i in 1..=3 {
            tracker.unlock(AchievementId::new(i), &mut profile);
        }
        assert_eq!(tracker.notifications().len(), 3);
        // One visible, two pending.
        assert_eq!(tracker.notifications().pending_count(), 2);
    }

    #[test]
    fn test_secret_visibility() {
        let def = AchievementDef::new(
            AchievementId::new(1),
            "Ghost",
            AchievementKind::OneTime,
            1,
        )
        .secret();
        assert!(!def.is_listed());
        assert!(!def.is_revealed());

        let mut unlocked = def;
        unlocked.unlocked = true;
        assert!(unlocked.is_listed());
        assert!(unlocked.is_revealed());
    }
}
