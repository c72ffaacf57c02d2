//! The durable player profile stored in each save slot.
//!
//! This module provides:
//! - `SaveProfile`: everything that survives across sessions
//! - `PlayerStats`: cumulative gameplay statistics
//! - `ProfileSettings`: per-profile preferences (volumes, quality, language)

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use updraft_common::{AchievementId, CURRENT_SAVE_VERSION};

/// Default player name for a freshly created profile.
pub const DEFAULT_PLAYER_NAME: &str = "Pilot";

/// Graphics quality preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GraphicsQuality {
    /// Low quality for performance.
    Low,
    /// Medium quality (default).
    #[default]
    Medium,
    /// High quality.
    High,
    /// Ultra quality.
    Ultra,
}

impl GraphicsQuality {
    /// Returns display name.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Ultra => "Ultra",
        }
    }
}

/// Per-profile preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSettings {
    /// Master volume (0.0 - 1.0).
    pub master_volume: f32,
    /// Music volume (0.0 - 1.0).
    pub music_volume: f32,
    /// Sound-effect volume (0.0 - 1.0).
    pub sfx_volume: f32,
    /// Graphics quality preset.
    pub quality: GraphicsQuality,
    /// Language code (e.g. "en").
    pub language: String,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self {
            master_volume: 1.0,
            music_volume: 0.8,
            sfx_volume: 1.0,
            quality: GraphicsQuality::default(),
            language: "en".to_string(),
        }
    }
}

/// Cumulative gameplay statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PlayerStats {
    /// Total jumps performed.
    pub jumps: u64,
    /// Total distance travelled (meters).
    pub distance: f64,
    /// Total time spent airborne (seconds).
    pub flight_time: f64,
    /// Highest altitude reached (meters).
    pub max_height: f32,
    /// Fastest speed reached (meters per second).
    pub max_speed: f32,
}

impl PlayerStats {
    /// Merges a gameplay statistics snapshot into the running totals.
    ///
    /// Jump count, distance, and flight time are running totals reported
    /// by gameplay; max height and speed are high-water marks.
    pub fn apply_snapshot(&mut self, snapshot: &StatSnapshot) {
        self.jumps = self.jumps.max(snapshot.jumps);
        self.distance = self.distance.max(snapshot.distance);
        self.flight_time = self.flight_time.max(snapshot.flight_time);
        self.max_height = self.max_height.max(snapshot.max_height);
        self.max_speed = self.max_speed.max(snapshot.max_speed);
    }
}

/// A statistics snapshot consumed from gameplay code.
///
/// All counters are running totals for the profile, not deltas. The
/// single source of truth for each total lives on the gameplay side.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StatSnapshot {
    /// Total jumps performed.
    pub jumps: u64,
    /// Total distance travelled (meters).
    pub distance: f64,
    /// Total time spent airborne (seconds).
    pub flight_time: f64,
    /// Highest altitude reached (meters).
    pub max_height: f32,
    /// Fastest speed reached (meters per second).
    pub max_speed: f32,
}

/// Durable player progress for one save slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveProfile {
    /// Player display name.
    pub player_name: String,
    /// Current player level.
    pub player_level: u32,
    /// Total experience accumulated (drives `player_level`).
    pub total_experience: u64,
    /// Total score across all levels and achievement rewards.
    pub total_score: u64,
    /// Cumulative play time in seconds.
    pub play_time_seconds: f64,
    /// Per-level completion map (level name -> completed).
    pub completed_levels: HashMap<String, bool>,
    /// Best completion time per fixed level (level name -> seconds).
    pub best_times: HashMap<String, f64>,
    /// Cumulative gameplay statistics.
    pub stats: PlayerStats,
    /// Achievements already unlocked.
    pub unlocked_achievements: HashSet<AchievementId>,
    /// In-progress achievement counters.
    ///
    /// Invariant: an ID never appears both here and in
    /// `unlocked_achievements`; unlocking removes the progress entry.
    pub achievement_progress: HashMap<AchievementId, u32>,
    /// Per-profile preferences.
    pub settings: ProfileSettings,
    /// Best times for named procedural locations.
    pub location_best_times: HashMap<String, f64>,
    /// Slot index this profile was last saved to.
    pub slot_index: usize,
    /// Unix epoch seconds of the last successful save.
    pub last_saved: u64,
    /// Save-format version.
    pub version: u32,
}

impl Default for SaveProfile {
    fn default() -> Self {
        Self::new(0)
    }
}

impl SaveProfile {
    /// Creates a fresh first-run profile for the given slot.
    #[must_use]
    pub fn new(slot_index: usize) -> Self {
        Self {
            player_name: DEFAULT_PLAYER_NAME.to_string(),
            player_level: 1,
            total_experience: 0,
            total_score: 0,
            play_time_seconds: 0.0,
            completed_levels: HashMap::new(),
            best_times: HashMap::new(),
            stats: PlayerStats::default(),
            unlocked_achievements: HashSet::new(),
            achievement_progress: HashMap::new(),
            settings: ProfileSettings::default(),
            location_best_times: HashMap::new(),
            slot_index,
            last_saved: 0,
            version: CURRENT_SAVE_VERSION,
        }
    }

    /// Returns whether the named level has been completed.
    #[must_use]
    pub fn is_level_completed(&self, level_name: &str) -> bool {
        self.completed_levels
            .get(level_name)
            .copied()
            .unwrap_or(false)
    }

    /// Marks the named level completed.
    pub fn mark_level_completed(&mut self, level_name: impl Into<String>) {
        self.completed_levels.insert(level_name.into(), true);
    }

    /// Returns the number of completed levels.
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.completed_levels.values().filter(|&&v| v).count()
    }

    /// Records a best time for a fixed level if strictly better.
    /// Returns true if the record was replaced.
    pub fn record_best_time(&mut self, level_name: &str, time_seconds: f64) -> bool {
        match self.best_times.get(level_name) {
            Some(&best) if time_seconds >= best => false,
            _ => {
                self.best_times
                    .insert(level_name.to_string(), time_seconds);
                true
            }
        }
    }

    /// Records a best time for a named procedural location if strictly
    /// better. Returns true if the record was replaced.
    pub fn record_location_time(&mut self, location: &str, time_seconds: f64) -> bool {
        match self.location_best_times.get(location) {
            Some(&best) if time_seconds >= best => false,
            _ => {
                self.location_best_times
                    .insert(location.to_string(), time_seconds);
                true
            }
        }
    }

    /// Adds score, saturating rather than wrapping.
    pub fn add_score(&mut self, amount: u64) {
        self.total_score = self.total_score.saturating_add(amount);
    }

    /// Returns whether the achievement-ID invariant holds: no ID appears
    /// in both the unlocked set and the progress map.
    #[must_use]
    pub fn achievement_state_consistent(&self) -> bool {
        self.achievement_progress
            .keys()
            .all(|id| !self.unlocked_achievements.contains(id))
    }
}
