//! Per-active-level runtime tracking.
//!
//! This module provides:
//! - `CollectibleRef`: registry entries for spawned collectibles, owned
//!   exclusively by the tracker for the lifetime of the active level
//! - `LevelRuntimeTracker`: remaining-count bookkeeping, a re-entrant
//!   pickup guard per collectible, and a one-shot completion latch
//! - Next-scene resolution: explicit override, then the unlock graph,
//!   then a static fallback table, then persisted endless mode

use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::flags::FlagStore;
use crate::graph::ProgressionGraph;
use crate::profile::SaveProfile;
use updraft_common::{CollectibleId, LevelId, UpdraftResult};

/// One spawned collectible. Runtime only; never persisted.
#[derive(Debug, Clone, Copy)]
pub struct CollectibleRef {
    /// Identity of the spawned collectible.
    pub id: CollectibleId,
    /// Whether it has been collected.
    pub collected: bool,
    /// Pickup guard: set on the first trigger so a re-entrant trigger in
    /// the same update cannot double-fire the pickup.
    collecting: bool,
}

/// Outcome of a pickup attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectOutcome {
    /// Unknown ID, no active level, or the collectible was already
    /// collected (or mid-collection). Nothing changed.
    Ignored,
    /// The collectible was collected.
    Collected {
        /// Collectibles still uncollected.
        remaining: usize,
        /// Total collectibles registered for the level.
        total: usize,
        /// True when this pickup emptied the level and tripped the
        /// completion latch (first time only).
        level_cleared: bool,
    },
}

/// The resolved next scene after finishing a level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextScene {
    /// The level config named an explicit next scene.
    Override(String),
    /// The unlock graph recommended a successor level.
    Level(LevelId),
    /// The static fallback table supplied the next entry.
    Fallback(String),
    /// Procedurally-sourced endless content.
    Endless {
        /// Location index consumed for this transition.
        location_index: u32,
        /// True when this resolution flipped the persisted endless flag.
        entered: bool,
    },
}

/// State for the currently loaded level.
#[derive(Debug)]
struct ActiveLevel {
    /// Level name (the completion-map key).
    name: String,
    /// Explicit next-scene override from the level config, if any.
    next_override: Option<String>,
    /// Registered collectibles.
    collectibles: HashMap<CollectibleId, CollectibleRef>,
    /// One-shot completion latch.
    completion_fired: bool,
}

/// Tracks collectibles and completion for the active level.
#[derive(Debug, Default)]
pub struct LevelRuntimeTracker {
    /// The active level, if one is loaded.
    active: Option<ActiveLevel>,
    /// Static ordered fallback table of level names.
    fallback_sequence: Vec<String>,
}

impl LevelRuntimeTracker {
    /// Creates a tracker with the given static fallback sequence.
    #[must_use]
    pub fn new(fallback_sequence: Vec<String>) -> Self {
        Self {
            active: None,
            fallback_sequence,
        }
    }

    /// Begins tracking a level. Any previous level's collectibles are
    /// discarded.
    pub fn begin_level(&mut self, name: impl Into<String>, next_override: Option<String>) {
        let name = name.into();
        debug!("Tracking level '{}'", name);
        self.active = Some(ActiveLevel {
            name,
            next_override,
            collectibles: HashMap::new(),
            completion_fired: false,
        });
    }

    /// Stops tracking; collectible entries are destroyed.
    pub fn end_level(&mut self) {
        if let Some(active) = self.active.take() {
            debug!("Stopped tracking level '{}'", active.name);
        }
    }

    /// Returns the active level name.
    #[must_use]
    pub fn active_level(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.name.as_str())
    }

    /// Registers a collectible for the active level and returns its ID.
    /// Returns `None` when no level is active.
    pub fn register_collectible(&mut self) -> Option<CollectibleId> {
        let active = self.active.as_mut()?;
        let id = CollectibleId::new();
        active.collectibles.insert(
            id,
            CollectibleRef {
                id,
                collected: false,
                collecting: false,
            },
        );
        Some(id)
    }

    /// Deregisters a collectible (destroyed without pickup).
    pub fn deregister_collectible(&mut self, id: CollectibleId) {
        if let Some(active) = self.active.as_mut() {
            active.collectibles.remove(&id);
        }
    }

    /// Returns the number of uncollected collectibles.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.active.as_ref().map_or(0, |a| {
            a.collectibles.values().filter(|c| !c.collected).count()
        })
    }

    /// Returns the total number of registered collectibles.
    #[must_use]
    pub fn total(&self) -> usize {
        self.active.as_ref().map_or(0, |a| a.collectibles.len())
    }

    /// Attempts to collect a collectible.
    ///
    /// The per-instance guard makes a re-entrant trigger within one
    /// update a no-op, and the completion latch fires at most once per
    /// level.
    pub fn collect(&mut self, id: CollectibleId) -> CollectOutcome {
        let Some(active) = self.active.as_mut() else {
            warn!("Pickup with no active level: {:?}", id);
            return CollectOutcome::Ignored;
        };
        let Some(entry) = active.collectibles.get_mut(&id) else {
            warn!("Pickup for unknown collectible {:?}", id);
            return CollectOutcome::Ignored;
        };

        if entry.collected || entry.collecting {
            debug!("Duplicate pickup ignored: {:?}", id);
            return CollectOutcome::Ignored;
        }
        entry.collecting = true;
        entry.collected = true;

        let total = active.collectibles.len();
        let remaining = active.collectibles.values().filter(|c| !c.collected).count();

        let level_cleared = remaining == 0 && !active.completion_fired;
        if level_cleared {
            active.completion_fired = true;
            info!("Level '{}' cleared", active.name);
        }

        CollectOutcome::Collected {
            remaining,
            total,
            level_cleared,
        }
    }

    /// Trips the completion latch directly (for level-finished notices
    /// that arrive without a final pickup). Returns true the first time
    /// only; completion is a latch, not a counter.
    pub fn try_complete(&mut self) -> bool {
        match self.active.as_mut() {
            Some(active) if !active.completion_fired => {
                active.completion_fired = true;
                info!("Level '{}' completed", active.name);
                true
            }
            _ => false,
        }
    }

    /// Resolves the scene to load after `current`.
    ///
    /// Order: explicit override from the level config, then the first
    /// available-and-incomplete graph successor, then persisted endless
    /// mode, then the static fallback table. Exhausting the table flips
    /// the endless flag and starts consuming location indices.
    pub fn next_scene(
        &self,
        current: &str,
        graph: &ProgressionGraph,
        profile: &SaveProfile,
        flags: &mut FlagStore,
    ) -> UpdraftResult<NextScene> {
        if let Some(active) = &self.active {
            if active.name == current {
                if let Some(next) = &active.next_override {
                    return Ok(NextScene::Override(next.clone()));
                }
            }
        }

        if let Some(next) = Self::graph_successor(current, graph, profile) {
            return Ok(NextScene::Level(next));
        }

        if flags.endless_mode_enabled() {
            let location_index = flags.consume_endless_location()?;
            return Ok(NextScene::Endless {
                location_index,
                entered: false,
            });
        }

        let position = self.fallback_sequence.iter().position(|name| name == current);
        match position {
            Some(pos) if pos + 1 < self.fallback_sequence.len() => {
                Ok(NextScene::Fallback(self.fallback_sequence[pos + 1].clone()))
            }
            Some(_) => {
                // End of the fixed sequence: switch to endless content.
                flags.set_endless_mode(true)?;
                let location_index = flags.consume_endless_location()?;
                Ok(NextScene::Endless {
                    location_index,
                    entered: true,
                })
            }
            None => match self.fallback_sequence.first() {
                Some(first) => Ok(NextScene::Fallback(first.clone())),
                None => {
                    flags.set_endless_mode(true)?;
                    let location_index = flags.consume_endless_location()?;
                    Ok(NextScene::Endless {
                        location_index,
                        entered: true,
                    })
                }
            },
        }
    }

    /// First available-and-incomplete successor of `current` in the
    /// graph, skipping replay self-edges.
    fn graph_successor(
        current: &str,
        graph: &ProgressionGraph,
        profile: &SaveProfile,
    ) -> Option<LevelId> {
        let current_id = graph.find_by_name(current)?;
        let node = graph.get(current_id)?;
        node.unlocks
            .iter()
            .copied()
            .filter(|&next| next != current_id)
            .find(|&next| {
                graph.is_available(next, profile)
                    && graph
                        .get(next)
                        .is_some_and(|n| !profile.is_level_completed(&n.name))
            })
    }
}
