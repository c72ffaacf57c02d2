//! The progression service facade.
//!
//! `ProgressionService` owns every progression component — persistence
//! store, active profile, unlock graph, achievement tracker, level
//! runtime, flag store, autosave scheduler, and the event bus — and
//! wires their interactions. It is plain owned state: construct one
//! where the game state lives and drive it from the frame loop.
//!
//! Events flow one way. Components return the events their state
//! changes produced; the service publishes them on the bus and marks
//! the persistence store dirty whenever a change needs to reach disk.

use tracing::{debug, info, warn};

use crate::achievements::{AchievementDef, AchievementTracker};
use crate::autosave::AutosaveScheduler;
use crate::config::ProgressionConfig;
use crate::events::{EventBus, EventBusError, ProgressionEvent, Subscription};
use crate::flags::FlagStore;
use crate::graph::{GraphError, LevelNode, ProgressionGraph};
use crate::persistence::{PersistenceStore, SlotSummary};
use crate::profile::{SaveProfile, StatSnapshot};
use crate::runtime::{CollectOutcome, LevelRuntimeTracker, NextScene};
use updraft_common::{AchievementId, CollectibleId, UpdraftResult};

/// Owns and coordinates all progression state for one player.
#[derive(Debug)]
pub struct ProgressionService {
    config: ProgressionConfig,
    store: PersistenceStore,
    profile: SaveProfile,
    graph: ProgressionGraph,
    achievements: AchievementTracker,
    runtime: LevelRuntimeTracker,
    flags: FlagStore,
    autosave: AutosaveScheduler,
    bus: EventBus,
    /// Seconds elapsed in the active level.
    level_elapsed: f64,
    /// Score accumulated in the active level.
    level_score: u64,
    /// Whether the player is currently airborne.
    airborne: bool,
    /// Play time accrued since the store was last marked dirty for it.
    unflushed_play_time: f64,
}

/// Accrued play time that forces a dirty-mark, so an otherwise idle
/// session still reaches disk on the next flush.
const PLAY_TIME_DIRTY_THRESHOLD: f64 = 60.0;

impl ProgressionService {
    /// Builds a service from the given config and loads slot 0.
    ///
    /// A missing or unreadable slot file yields a fresh profile, so
    /// construction only fails on invalid config or a save directory
    /// that cannot be created.
    pub fn new(config: ProgressionConfig) -> UpdraftResult<Self> {
        config.validate()?;

        let mut store =
            PersistenceStore::new(&config.save_dir, config.slot_count, config.key_bytes());
        let profile = store.load_or_default(0)?;
        let flags = FlagStore::open(config.flags_path());

        let mut achievements = AchievementTracker::new(config.notification_duration);
        achievements.rehydrate(&profile);

        let mut autosave = AutosaveScheduler::new(config.autosave_interval);
        autosave.set_enabled(config.autosave_enabled);

        let runtime = LevelRuntimeTracker::new(config.fallback_levels.clone());
        let graph = ProgressionGraph::new(config.curve());

        info!("Progression service ready ({} slots)", store.slot_count());
        Ok(Self {
            config,
            store,
            profile,
            graph,
            achievements,
            runtime,
            flags,
            autosave,
            bus: EventBus::new(),
            level_elapsed: 0.0,
            level_score: 0,
            airborne: false,
            unflushed_play_time: 0.0,
        })
    }

    // ------------------------------------------------------------------
    // Setup
    // ------------------------------------------------------------------

    /// Registers an achievement definition.
    pub fn register_achievement(&mut self, def: AchievementDef) {
        self.achievements.register(def);
    }

    /// Adds a level to the unlock graph.
    pub fn add_level(&mut self, node: LevelNode) {
        self.graph.add_node(node);
    }

    /// Validates the unlock graph, then recomputes unlock state for the
    /// current profile. Call once after all levels are registered.
    pub fn finish_setup(&mut self) -> Result<(), GraphError> {
        self.graph.validate()?;
        self.achievements.rehydrate(&self.profile);
        let unlocked = self.graph.check_unlocks(&self.profile);
        debug!("Initial unlock pass opened {} levels", unlocked.len());
        Ok(())
    }

    /// Subscribes a named listener to progression events.
    pub fn subscribe(&mut self, name: impl Into<String>) -> Result<Subscription, EventBusError> {
        self.bus.subscribe(name)
    }

    /// Removes a listener; its handle is consumed.
    pub fn unsubscribe(&mut self, subscription: Subscription) {
        self.bus.unsubscribe(subscription);
    }

    // ------------------------------------------------------------------
    // Frame loop
    // ------------------------------------------------------------------

    /// Advances time-driven state: play time, airborne time, the
    /// notification queue, and the autosave scheduler.
    ///
    /// Play time alone marks the store dirty only once per
    /// [`PLAY_TIME_DIRTY_THRESHOLD`] seconds, so an idle session is
    /// flushed without every frame forcing a write.
    pub fn tick(&mut self, delta_seconds: f64) {
        self.profile.play_time_seconds += delta_seconds;
        self.unflushed_play_time += delta_seconds;
        if self.unflushed_play_time >= PLAY_TIME_DIRTY_THRESHOLD {
            self.unflushed_play_time = 0.0;
            self.store.mark_dirty();
        }
        if self.airborne {
            self.profile.stats.flight_time += delta_seconds;
        }
        if self.runtime.active_level().is_some() {
            self.level_elapsed += delta_seconds;
        }
        self.achievements.notifications_mut().tick(delta_seconds);

        let events = self
            .autosave
            .tick(delta_seconds, &mut self.store, &mut self.profile);
        self.bus.publish_all(&events);
    }

    // ------------------------------------------------------------------
    // Level lifecycle
    // ------------------------------------------------------------------

    /// Starts tracking a level; resets the in-level timer and score.
    pub fn begin_level(&mut self, name: impl Into<String>, next_override: Option<String>) {
        self.runtime.begin_level(name, next_override);
        self.level_elapsed = 0.0;
        self.level_score = 0;
    }

    /// Registers a collectible for the active level.
    pub fn register_collectible(&mut self) -> Option<CollectibleId> {
        self.runtime.register_collectible()
    }

    /// Adds points scored during the active level. Counted toward the
    /// profile when the level completes.
    pub fn add_level_score(&mut self, points: u64) {
        self.level_score = self.level_score.saturating_add(points);
    }

    /// Handles a collectible pickup.
    ///
    /// A successful pickup publishes the updated count; a pickup that
    /// empties the level completes it in the same call, in that order.
    /// Duplicate and unknown pickups are no-ops.
    pub fn collectible_picked(&mut self, id: CollectibleId) -> Vec<ProgressionEvent> {
        let CollectOutcome::Collected {
            remaining,
            total,
            level_cleared,
        } = self.runtime.collect(id)
        else {
            return Vec::new();
        };

        let mut events = vec![ProgressionEvent::CollectibleCountChanged { remaining, total }];
        if level_cleared {
            // A full clear counts as a perfect run.
            events.extend(self.complete_active_level(true));
        }

        self.store.mark_dirty();
        self.bus.publish_all(&events);
        events
    }

    /// Reports the active level finished without a final pickup (exit
    /// portal, scripted end). The completion latch makes repeated
    /// notices no-ops.
    pub fn level_finished(&mut self, perfect: bool) -> Vec<ProgressionEvent> {
        if !self.runtime.try_complete() {
            return Vec::new();
        }

        let events = self.complete_active_level(perfect);
        self.store.mark_dirty();
        self.bus.publish_all(&events);
        events
    }

    /// Applies completion side effects for the active level. Levels the
    /// graph knows get records, experience, and unlock propagation;
    /// anything else (procedural locations) gets a location record.
    fn complete_active_level(&mut self, perfect: bool) -> Vec<ProgressionEvent> {
        let Some(name) = self.runtime.active_level().map(str::to_owned) else {
            warn!("Completion with no active level");
            return Vec::new();
        };
        let time = self.level_elapsed;
        let score = self.level_score;

        match self.graph.find_by_name(&name) {
            Some(id) => self
                .graph
                .complete_level(id, time, score, perfect, &mut self.profile),
            None => {
                debug!("Completed untracked location '{}'", name);
                self.profile.record_location_time(&name, time);
                self.profile.add_score(score);
                Vec::new()
            }
        }
    }

    /// Resolves the scene to load after the active level.
    ///
    /// Entering endless mode for the first time publishes
    /// [`ProgressionEvent::EndlessModeEntered`].
    pub fn next_scene(&mut self) -> UpdraftResult<Option<NextScene>> {
        let Some(current) = self.runtime.active_level().map(str::to_owned) else {
            return Ok(None);
        };

        let next = self
            .runtime
            .next_scene(&current, &self.graph, &self.profile, &mut self.flags)?;
        if let NextScene::Endless {
            location_index,
            entered: true,
        } = next
        {
            self.bus
                .publish(&ProgressionEvent::EndlessModeEntered { location_index });
        }
        Ok(Some(next))
    }

    /// Stops tracking the active level.
    pub fn end_level(&mut self) {
        self.runtime.end_level();
        self.level_elapsed = 0.0;
        self.level_score = 0;
    }

    // ------------------------------------------------------------------
    // Achievements and stats
    // ------------------------------------------------------------------

    /// Reports achievement progress; see
    /// [`AchievementTracker::report_progress`] for the per-kind rules.
    pub fn report_achievement(
        &mut self,
        id: AchievementId,
        value: u32,
    ) -> Vec<ProgressionEvent> {
        let events = self
            .achievements
            .report_progress(id, value, &mut self.profile);
        if !events.is_empty() {
            self.store.mark_dirty();
            self.bus.publish_all(&events);
        }
        events
    }

    /// Unlocks an achievement directly, bypassing progress.
    pub fn unlock_achievement(&mut self, id: AchievementId) -> Vec<ProgressionEvent> {
        let events = self.achievements.unlock(id, &mut self.profile);
        if !events.is_empty() {
            self.store.mark_dirty();
            self.bus.publish_all(&events);
        }
        events
    }

    /// Merges a gameplay statistics snapshot into the profile.
    pub fn apply_stats(&mut self, snapshot: &StatSnapshot) {
        self.profile.stats.apply_snapshot(snapshot);
        self.store.mark_dirty();
    }

    /// Reports a grounded/flying transition from gameplay.
    ///
    /// While airborne, `tick` accrues the time into the profile's
    /// flight-time total; landing marks the store dirty so the accrued
    /// time reaches disk. Repeated reports of the same state are no-ops.
    pub fn set_flying(&mut self, flying: bool) {
        if self.airborne == flying {
            return;
        }
        self.airborne = flying;
        debug!("Player is now {}", if flying { "flying" } else { "grounded" });
        if !flying {
            self.store.mark_dirty();
        }
    }

    /// Returns whether the player is currently airborne.
    #[must_use]
    pub const fn is_airborne(&self) -> bool {
        self.airborne
    }

    /// Grants experience outside level completion (quests, bonuses).
    pub fn grant_experience(&mut self, amount: u64) -> Vec<ProgressionEvent> {
        let mut events = self.graph.add_experience(amount, &mut self.profile);
        events.extend(
            self.graph
                .check_unlocks(&self.profile)
                .into_iter()
                .map(|id| ProgressionEvent::LevelUnlocked { id }),
        );
        self.store.mark_dirty();
        self.bus.publish_all(&events);
        events
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Saves the current profile to a slot.
    pub fn save_slot(&mut self, slot: usize) -> UpdraftResult<()> {
        match self.store.save(slot, &mut self.profile) {
            Ok(()) => {
                self.bus.publish(&ProgressionEvent::SaveCompleted { slot });
                Ok(())
            }
            Err(err) => {
                self.bus.publish(&ProgressionEvent::SaveFailed {
                    message: err.to_string(),
                });
                Err(err.into())
            }
        }
    }

    /// Loads a slot and makes it the active profile. Unreadable files
    /// fall back to a fresh profile for the slot.
    pub fn load_slot(&mut self, slot: usize) -> UpdraftResult<()> {
        self.profile = self.store.load_or_default(slot)?;
        self.achievements.rehydrate(&self.profile);
        self.graph.check_unlocks(&self.profile);
        self.end_level();
        Ok(())
    }

    /// Reports the state of every configured slot.
    #[must_use]
    pub fn list_slots(&self) -> Vec<SlotSummary> {
        self.store.list_slots()
    }

    /// Serializes the active profile for external backup.
    pub fn export_profile(&self) -> UpdraftResult<String> {
        Ok(PersistenceStore::export_json(&self.profile)?)
    }

    /// Replaces the active profile from exported JSON. The imported
    /// state is unsaved until the next save or autosave.
    pub fn import_profile(&mut self, text: &str) -> UpdraftResult<()> {
        self.profile = PersistenceStore::import_json(text)?;
        self.achievements.rehydrate(&self.profile);
        self.graph.check_unlocks(&self.profile);
        self.store.mark_dirty();
        Ok(())
    }

    /// Flushes unsaved changes when the window loses focus.
    pub fn focus_lost(&mut self) {
        let events = self.autosave.flush(false, &mut self.store, &mut self.profile);
        self.bus.publish_all(&events);
    }

    /// Final save on shutdown; writes even when nothing is dirty.
    pub fn shutdown(&mut self) {
        info!("Shutting down, flushing save state");
        let events = self.autosave.flush(true, &mut self.store, &mut self.profile);
        self.bus.publish_all(&events);
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// The active profile.
    #[must_use]
    pub const fn profile(&self) -> &SaveProfile {
        &self.profile
    }

    /// Mutable profile access. Call [`Self::mark_dirty`] after edits
    /// that need to reach disk.
    pub fn profile_mut(&mut self) -> &mut SaveProfile {
        &mut self.profile
    }

    /// Marks the profile changed so the next autosave writes it.
    pub fn mark_dirty(&mut self) {
        self.store.mark_dirty();
    }

    /// The unlock graph.
    #[must_use]
    pub const fn graph(&self) -> &ProgressionGraph {
        &self.graph
    }

    /// The achievement tracker.
    #[must_use]
    pub const fn achievements(&self) -> &AchievementTracker {
        &self.achievements
    }

    /// The persisted flag store.
    #[must_use]
    pub const fn flags(&self) -> &FlagStore {
        &self.flags
    }

    /// The service configuration.
    #[must_use]
    pub const fn config(&self) -> &ProgressionConfig {
        &self.config
    }

    /// Enables or disables interval autosave.
    pub fn set_autosave_enabled(&mut self, enabled: bool) {
        self.autosave.set_enabled(enabled);
    }
}
