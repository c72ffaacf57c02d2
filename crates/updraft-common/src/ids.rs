//! ID types for levels, achievements, and runtime collectibles.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for collectible IDs.
static COLLECTIBLE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Stable identifier for a level node in the unlock graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LevelId(u32);

impl LevelId {
    /// Creates a level ID from a raw value.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Stable identifier for an achievement definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AchievementId(u32);

impl AchievementId {
    /// Creates an achievement ID from a raw value.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Unique identifier for a spawned collectible.
///
/// Collectibles exist only for the lifetime of the active level and are
/// never persisted, so IDs come from a process-wide counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CollectibleId(u64);

impl CollectibleId {
    /// Creates a new unique collectible ID.
    #[must_use]
    pub fn new() -> Self {
        Self(COLLECTIBLE_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Creates a collectible ID from a raw value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl Default for CollectibleId {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_id_raw() {
        let id = LevelId::new(7);
        assert_eq!(id.raw(), 7);
    }

    #[test]
    fn test_achievement_id_raw() {
        let id = AchievementId::new(42);
        assert_eq!(id.raw(), 42);
    }

    #[test]
    fn test_collectible_id_unique() {
        let a = CollectibleId::new();
        let b = CollectibleId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_collectible_id_from_raw() {
        let id = CollectibleId::from_raw(99);
        assert_eq!(id.raw(), 99);
    }
}
