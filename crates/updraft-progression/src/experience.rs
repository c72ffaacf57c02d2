//! Player experience curve.
//!
//! Level `n` requires `base * multiplier^(n-1)` experience; the cumulative
//! requirement for reaching level `L` is the sum over `i = 1..L-1`. Both
//! the UI preview and the level-up check call the same functions here, so
//! the displayed requirement can never disagree with the enforced one.

use serde::{Deserialize, Serialize};

/// Default base experience for level 2.
pub const DEFAULT_BASE_EXPERIENCE: u64 = 100;

/// Default per-level requirement multiplier.
pub const DEFAULT_MULTIPLIER: f64 = 1.5;

/// Upper bound on computed levels, to keep the iteration finite even for
/// absurd experience totals.
pub const MAX_PLAYER_LEVEL: u32 = 200;

/// Geometric experience curve shared by display and enforcement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExperienceCurve {
    /// Experience required to go from level 1 to level 2.
    pub base: u64,
    /// Geometric growth factor per level.
    pub multiplier: f64,
}

impl Default for ExperienceCurve {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE_EXPERIENCE,
            multiplier: DEFAULT_MULTIPLIER,
        }
    }
}

impl ExperienceCurve {
    /// Creates a new curve.
    #[must_use]
    pub const fn new(base: u64, multiplier: f64) -> Self {
        Self { base, multiplier }
    }

    /// Experience required to advance from level `n` to level `n + 1`.
    ///
    /// Level 0 and 1 require nothing; the curve starts at level 1.
    #[must_use]
    pub fn requirement_for(&self, level: u32) -> u64 {
        if level == 0 {
            return 0;
        }
        let raw = self.base as f64 * self.multiplier.powi(level as i32 - 1);
        raw.round() as u64
    }

    /// Cumulative experience required to have reached `level`.
    #[must_use]
    pub fn cumulative_for(&self, level: u32) -> u64 {
        (1..level).map(|n| self.requirement_for(n)).sum()
    }

    /// The greatest level reachable with `total` experience.
    #[must_use]
    pub fn level_for_total(&self, total: u64) -> u32 {
        let mut level = 1;
        while level < MAX_PLAYER_LEVEL && self.cumulative_for(level + 1) <= total {
            level += 1;
        }
        level
    }

    /// Experience remaining until the next level, given a total.
    #[must_use]
    pub fn remaining_to_next(&self, total: u64) -> u64 {
        let level = self.level_for_total(total);
        if level >= MAX_PLAYER_LEVEL {
            return 0;
        }
        self.cumulative_for(level + 1).saturating_sub(total)
    }
}
