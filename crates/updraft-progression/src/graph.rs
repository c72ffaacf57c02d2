//! The directed level-unlock graph.
//!
//! This module provides:
//! - `LevelNode`: one level with its unlock requirements and records
//! - `Difficulty`: ordered difficulty tiers
//! - `ProgressionGraph`: availability resolution, same-pass unlock
//!   propagation, completion handling, and next-level recommendation
//!
//! Prerequisite cycles are rejected at validation time. A node listing
//! itself in its outbound `unlocks` edges is legal: that edge means
//! "replay the same node" (endless/procedural content), not "prerequisite
//! of itself".

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, warn};

use crate::events::ProgressionEvent;
use crate::experience::ExperienceCurve;
use crate::profile::SaveProfile;
use updraft_common::{AchievementId, LevelId};

/// Experience bonus for finishing under the estimated time.
pub const TIME_BONUS_EXPERIENCE: u64 = 25;

/// Experience bonus for a perfect completion.
pub const PERFECT_BONUS_EXPERIENCE: u64 = 50;

/// Difficulty tiers, ordered from easiest to hardest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// Introductory content.
    #[default]
    Tutorial,
    /// Easy.
    Easy,
    /// Medium.
    Medium,
    /// Hard.
    Hard,
    /// Expert.
    Expert,
    /// Master tier.
    Master,
}

impl Difficulty {
    /// Returns display name.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Tutorial => "Tutorial",
            Self::Easy => "Easy",
            Self::Medium => "Medium",
            Self::Hard => "Hard",
            Self::Expert => "Expert",
            Self::Master => "Master",
        }
    }
}

/// Errors from graph construction and validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    /// A node depends on itself through its prerequisite chain.
    #[error("Prerequisite cycle involving level {0:?}")]
    CycleDetected(LevelId),

    /// A node requires a level that is not in the graph.
    #[error("Level {level:?} requires unknown level {missing:?}")]
    UnknownRequirement {
        /// Node with the dangling requirement.
        level: LevelId,
        /// The missing prerequisite.
        missing: LevelId,
    },
}

/// One level in the unlock graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelNode {
    /// Stable identifier.
    pub id: LevelId,
    /// Display name; also the key in the profile's completion map.
    pub name: String,
    /// Target scene identifier for the host engine.
    pub scene: String,
    /// Difficulty tier.
    pub difficulty: Difficulty,
    /// Minimum player level required.
    pub required_player_level: u32,
    /// Achievements that must be unlocked.
    pub required_achievements: HashSet<AchievementId>,
    /// Levels that must be completed.
    pub required_levels: HashSet<LevelId>,
    /// Levels this one unlocks on completion (a self-edge means replay).
    pub unlocks: Vec<LevelId>,
    /// Estimated completion time in seconds.
    pub estimated_time: f64,
    /// Base experience reward for completion.
    pub base_reward: u64,
    /// Best completion time, if any.
    pub best_time: Option<f64>,
    /// Best score, if any.
    pub best_score: Option<u64>,
    /// Whether a perfect completion has been achieved.
    pub perfect: bool,
    /// Whether the node is currently unlocked (derived from the profile).
    pub unlocked: bool,
}

impl LevelNode {
    /// Creates a new node.
    #[must_use]
    pub fn new(id: LevelId, name: impl Into<String>, scene: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            scene: scene.into(),
            difficulty: Difficulty::default(),
            required_player_level: 0,
            required_achievements: HashSet::new(),
            required_levels: HashSet::new(),
            unlocks: Vec::new(),
            estimated_time: 0.0,
            base_reward: 0,
            best_time: None,
            best_score: None,
            perfect: false,
            unlocked: false,
        }
    }

    /// Sets the difficulty tier.
    #[must_use]
    pub const fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = difficulty;
        self
    }

    /// Sets the minimum player level.
    #[must_use]
    pub const fn with_required_level(mut self, level: u32) -> Self {
        self.required_player_level = level;
        self
    }

    /// Adds a required achievement.
    #[must_use]
    pub fn requires_achievement(mut self, id: AchievementId) -> Self {
        self.required_achievements.insert(id);
        self
    }

    /// Adds a required completed level.
    #[must_use]
    pub fn requires_level(mut self, id: LevelId) -> Self {
        self.required_levels.insert(id);
        self
    }

    /// Adds an outbound unlock edge.
    #[must_use]
    pub fn unlocks_level(mut self, id: LevelId) -> Self {
        self.unlocks.push(id);
        self
    }

    /// Sets the estimated completion time.
    #[must_use]
    pub const fn with_estimated_time(mut self, seconds: f64) -> Self {
        self.estimated_time = seconds;
        self
    }

    /// Sets the base experience reward.
    #[must_use]
    pub const fn with_base_reward(mut self, reward: u64) -> Self {
        self.base_reward = reward;
        self
    }

    /// Returns whether this node has no requirements at all.
    #[must_use]
    pub fn has_no_requirements(&self) -> bool {
        self.required_player_level <= 1
            && self.required_achievements.is_empty()
            && self.required_levels.is_empty()
    }

    /// Returns whether the requirement predicate is satisfied against
    /// `profile`, given a name lookup for required level IDs.
    fn requirements_met(&self, profile: &SaveProfile, names: &HashMap<LevelId, String>) -> bool {
        if profile.player_level < self.required_player_level {
            return false;
        }
        if !self
            .required_achievements
            .iter()
            .all(|id| profile.unlocked_achievements.contains(id))
        {
            return false;
        }
        self.required_levels.iter().all(|id| {
            names
                .get(id)
                .is_some_and(|name| profile.is_level_completed(name))
        })
    }
}

/// The level-unlock graph plus the player experience curve.
#[derive(Debug, Default)]
pub struct ProgressionGraph {
    /// Nodes by ID.
    nodes: HashMap<LevelId, LevelNode>,
    /// Experience curve shared by display and enforcement.
    curve: ExperienceCurve,
}

impl ProgressionGraph {
    /// Creates an empty graph with the given experience curve.
    #[must_use]
    pub fn new(curve: ExperienceCurve) -> Self {
        Self {
            nodes: HashMap::new(),
            curve,
        }
    }

    /// Returns the experience curve.
    #[must_use]
    pub const fn curve(&self) -> &ExperienceCurve {
        &self.curve
    }

    /// Adds a node. Nodes with an empty requirement set are unlocked by
    /// definition at construction time.
    pub fn add_node(&mut self, mut node: LevelNode) {
        if node.has_no_requirements() {
            node.unlocked = true;
        }
        self.nodes.insert(node.id, node);
    }

    /// Returns a node by ID.
    #[must_use]
    pub fn get(&self, id: LevelId) -> Option<&LevelNode> {
        self.nodes.get(&id)
    }

    /// Looks up a node ID by its display name.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<LevelId> {
        self.nodes
            .values()
            .find(|node| node.name == name)
            .map(|node| node.id)
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Iterates over all nodes.
    pub fn iter(&self) -> impl Iterator<Item = &LevelNode> {
        self.nodes.values()
    }

    /// Validates that every prerequisite exists and that the prerequisite
    /// relation is acyclic.
    ///
    /// Only `required_levels` edges count as dependencies. Self-edges in
    /// `unlocks` are replay markers and never inspected here.
    pub fn validate(&self) -> Result<(), GraphError> {
        for node in self.nodes.values() {
            for &req in &node.required_levels {
                if !self.nodes.contains_key(&req) {
                    return Err(GraphError::UnknownRequirement {
                        level: node.id,
                        missing: req,
                    });
                }
            }
        }

        // DFS with colors over the prerequisite relation.
        let mut visiting = HashSet::new();
        let mut done = HashSet::new();
        for &start in self.nodes.keys() {
            self.visit(start, &mut visiting, &mut done)?;
        }
        Ok(())
    }

    fn visit(
        &self,
        id: LevelId,
        visiting: &mut HashSet<LevelId>,
        done: &mut HashSet<LevelId>,
    ) -> Result<(), GraphError> {
        if done.contains(&id) {
            return Ok(());
        }
        if !visiting.insert(id) {
            return Err(GraphError::CycleDetected(id));
        }
        if let Some(node) = self.nodes.get(&id) {
            for &req in &node.required_levels {
                self.visit(req, visiting, done)?;
            }
        }
        visiting.remove(&id);
        done.insert(id);
        Ok(())
    }

    /// Returns whether a level is currently available: already unlocked,
    /// or every requirement is satisfied against `profile`.
    #[must_use]
    pub fn is_available(&self, id: LevelId, profile: &SaveProfile) -> bool {
        let Some(node) = self.nodes.get(&id) else {
            return false;
        };
        if node.unlocked {
            return true;
        }
        let names = self.name_table();
        node.requirements_met(profile, &names)
    }

    fn name_table(&self) -> HashMap<LevelId, String> {
        self.nodes
            .iter()
            .map(|(&id, node)| (id, node.name.clone()))
            .collect()
    }

    /// Flips every newly-satisfiable node to unlocked and propagates
    /// through direct successors in the same pass.
    ///
    /// A node whose prerequisites become satisfied because of a node
    /// unlocked earlier in this pass unlocks now, not on a later call.
    /// Returns the newly unlocked IDs in ascending order.
    pub fn check_unlocks(&mut self, profile: &SaveProfile) -> Vec<LevelId> {
        let names = self.name_table();
        let mut newly_unlocked = Vec::new();

        loop {
            let mut changed = false;
            let candidates: Vec<LevelId> = self
                .nodes
                .values()
                .filter(|n| !n.unlocked)
                .map(|n| n.id)
                .collect();

            for id in candidates {
                let satisfied = self
                    .nodes
                    .get(&id)
                    .is_some_and(|n| n.requirements_met(profile, &names));
                if satisfied {
                    if let Some(node) = self.nodes.get_mut(&id) {
                        node.unlocked = true;
                        newly_unlocked.push(id);
                        changed = true;
                        debug!("Level unlocked: {:?} ({})", id, node.name);
                    }
                }
            }

            if !changed {
                break;
            }
        }

        newly_unlocked.sort_unstable();
        newly_unlocked
    }

    /// Recomputes the player level from an experience gain.
    ///
    /// Fires a level-changed event only on an actual change; the
    /// experience-changed event always fires.
    pub fn add_experience(&self, amount: u64, profile: &mut SaveProfile) -> Vec<ProgressionEvent> {
        profile.total_experience = profile.total_experience.saturating_add(amount);

        let old_level = profile.player_level;
        let new_level = self.curve.level_for_total(profile.total_experience);
        profile.player_level = new_level;

        let mut events = vec![ProgressionEvent::ExperienceChanged {
            total: profile.total_experience,
            to_next: self.curve.remaining_to_next(profile.total_experience),
        }];
        if new_level != old_level {
            events.push(ProgressionEvent::PlayerLevelChanged {
                old_level,
                new_level,
            });
        }
        events
    }

    /// Marks a level completed and applies every completion side effect:
    /// records, experience award, and a same-pass unlock re-check.
    ///
    /// An unknown ID is a logged no-op.
    pub fn complete_level(
        &mut self,
        id: LevelId,
        time_seconds: f64,
        score: u64,
        perfect: bool,
        profile: &mut SaveProfile,
    ) -> Vec<ProgressionEvent> {
        let Some(node) = self.nodes.get_mut(&id) else {
            warn!("Completion reported for unknown level {:?}", id);
            return Vec::new();
        };

        profile.mark_level_completed(node.name.clone());
        profile.record_best_time(&node.name, time_seconds);
        profile.add_score(score);

        if node.best_time.map_or(true, |best| time_seconds < best) {
            node.best_time = Some(time_seconds);
        }
        if node.best_score.map_or(true, |best| score > best) {
            node.best_score = Some(score);
        }
        node.perfect = node.perfect || perfect;

        let mut award = node.base_reward / 10;
        if node.estimated_time > 0.0 && time_seconds < node.estimated_time {
            award += TIME_BONUS_EXPERIENCE;
        }
        if perfect {
            award += PERFECT_BONUS_EXPERIENCE;
        }

        let mut events = vec![ProgressionEvent::LevelCompleted {
            id,
            time_seconds,
            score,
        }];
        events.extend(self.add_experience(award, profile));
        events.extend(
            self.check_unlocks(profile)
                .into_iter()
                .map(|id| ProgressionEvent::LevelUnlocked { id }),
        );
        events
    }

    /// Recommends the next level to play.
    ///
    /// Among available-and-incomplete nodes, picks the one with the lowest
    /// difficulty tier, then the lowest estimated time. When everything is
    /// complete, falls back to the hardest completed node for replay.
    #[must_use]
    pub fn recommend_next(&self, profile: &SaveProfile) -> Option<&LevelNode> {
        let names = self.name_table();

        let next = self
            .nodes
            .values()
            .filter(|n| !profile.is_level_completed(&n.name))
            .filter(|n| n.unlocked || n.requirements_met(profile, &names))
            .min_by(|a, b| {
                a.difficulty
                    .cmp(&b.difficulty)
                    .then(a.estimated_time.total_cmp(&b.estimated_time))
                    .then(a.id.cmp(&b.id))
            });

        next.or_else(|| {
            self.nodes
                .values()
                .filter(|n| profile.is_level_completed(&n.name))
                .max_by(|a, b| a.difficulty.cmp(&b.difficulty).then(a.id.cmp(&b.id)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (LevelId, LevelId, LevelId) {
        (LevelId::new(1), LevelId::new(2), LevelId::new(3))
    }

    /// A -> B -> C chain: B requires A completed, C requires B completed.
    fn chain_graph() -> ProgressionGraph {
        let (a, b, c) = ids();
        let mut graph = ProgressionGraph::new(ExperienceCurve::default());
        graph.add_node(
            LevelNode::new(a, "alpha", "scene_alpha")
                .with_base_reward(100)
                .unlocks_level(b),
        );
        graph.add_node(
            LevelNode::new(b, "beta", "scene_beta")
                .with_difficulty(Difficulty::Easy)
                .requires_level(a)
                .unlocks_level(c),
        );
        graph.add_node(
            LevelNode::new(c, "gamma", "scene_gamma")
                .with_difficulty(Difficulty::Medium)
                .requires_level(b),
        );
        graph
    }

    #[test]
    fn test_empty_requirements_unlock_at_construction() {
        let graph = chain_graph();
        let (a, b, _) = ids();
        assert!(graph.get(a).map(|n| n.unlocked).unwrap_or(false));
        assert!(!graph.get(b).map(|n| n.unlocked).unwrap_or(true));
    }

    #[test]
    fn test_chain_validates() {
        assert_eq!(chain_graph().validate(), Ok(()));
    }

    #[test]
    fn test_cycle_detected() {
        let (a, b, _) = ids();
        let mut graph = ProgressionGraph::new(ExperienceCurve::default());
        graph.add_node(LevelNode::new(a, "alpha", "s").requires_level(b));
        graph.add_node(LevelNode::new(b, "beta", "s").requires_level(a));
        assert!(matches!(
            graph.validate(),
            Err(GraphError::CycleDetected(_))
        ));
    }

    #[test]
    fn test_self_unlock_edge_is_legal() {
        let a = LevelId::new(1);
        let mut graph = ProgressionGraph::new(ExperienceCurve::default());
        // An endless level that replays itself.
        graph.add_node(LevelNode::new(a, "endless", "s").unlocks_level(a));
        assert_eq!(graph.validate(), Ok(()));
        assert!(graph.get(a).map(|n| n.unlocked).unwrap_or(false));
    }

    #[test]
    fn test_unknown_requirement_rejected() {
        let (a, _, _) = ids();
        let mut graph = ProgressionGraph::new(ExperienceCurve::default());
        graph.add_node(LevelNode::new(a, "alpha", "s").requires_level(LevelId::new(99)));
        assert!(matches!(
            graph.validate(),
            Err(GraphError::UnknownRequirement { .. })
        ));
    }

    #[test]
    fn test_unlock_propagation_step_by_step() {
        let (a, b, c) = ids();
        let mut graph = chain_graph();
        let mut profile = SaveProfile::default();

        // Nothing completed: only A is unlocked, nothing new.
        assert!(graph.check_unlocks(&profile).is_empty());

        // Completing A unlocks B but not C.
        let events = graph.complete_level(a, 30.0, 500, false, &mut profile);
        assert!(events
            .iter()
            .any(|e| *e == ProgressionEvent::LevelUnlocked { id: b }));
        assert!(!events
            .iter()
            .any(|e| *e == ProgressionEvent::LevelUnlocked { id: c }));

        // Completing B unlocks C.
        let events = graph.complete_level(b, 45.0, 700, false, &mut profile);
        assert!(events
            .iter()
            .any(|e| *e == ProgressionEvent::LevelUnlocked { id: c }));
    }

    #[test]
    fn test_same_pass_unlocks_all_satisfied_dependents() {
        let (a, b, c) = ids();
        let mut graph = ProgressionGraph::new(ExperienceCurve::default());
        graph.add_node(LevelNode::new(a, "alpha", "s"));
        graph.add_node(LevelNode::new(b, "beta", "s").requires_level(a));
        graph.add_node(LevelNode::new(c, "gamma", "s").requires_level(a));

        let mut profile = SaveProfile::default();
        profile.mark_level_completed("alpha");

        // Both dependents unlock in one call, not one per call.
        let unlocked = graph.check_unlocks(&profile);
        assert_eq!(unlocked, vec![b, c]);
        assert!(graph.check_unlocks(&profile).is_empty());
    }

    #[test]
    fn test_availability_requires_all_requirement_sets() {
        let a = LevelId::new(1);
        let gate = LevelId::new(2);
        let ach = AchievementId::new(7);

        let mut graph = ProgressionGraph::new(ExperienceCurve::default());
        graph.add_node(LevelNode::new(a, "alpha", "s"));
        graph.add_node(
            LevelNode::new(gate, "gate", "s")
                .with_required_level(3)
                .requires_achievement(ach)
                .requires_level(a),
        );

        let mut profile = SaveProfile::default();
        assert!(!graph.is_available(gate, &profile));

        profile.mark_level_completed("alpha");
        assert!(!graph.is_available(gate, &profile));

        profile.unlocked_achievements.insert(ach);
        assert!(!graph.is_available(gate, &profile));

        profile.player_level = 3;
        assert!(graph.is_available(gate, &profile));
    }

    #[test]
    fn test_complete_level_records() {
        let (a, _, _) = ids();
        let mut graph = chain_graph();
        let mut profile = SaveProfile::default();

        graph.complete_level(a, 60.0, 500, false, &mut profile);
        graph.complete_level(a, 50.0, 400, true, &mut profile);
        graph.complete_level(a, 55.0, 900, false, &mut profile);

        let node = graph.get(a).expect("node exists");
        assert_eq!(node.best_time, Some(50.0));
        assert_eq!(node.best_score, Some(900));
        assert!(node.perfect);
        assert!((profile.best_times["alpha"] - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_completion_award_feeds_experience() {
        let (a, _, _) = ids();
        let mut graph = chain_graph();
        let mut profile = SaveProfile::default();

        // base_reward 100, estimated_time 0 (no time bonus), perfect.
        let events = graph.complete_level(a, 30.0, 0, true, &mut profile);
        assert_eq!(
            profile.total_experience,
            100 / 10 + PERFECT_BONUS_EXPERIENCE
        );
        assert!(events
            .iter()
            .any(|e| matches!(e, ProgressionEvent::ExperienceChanged { .. })));
    }

    #[test]
    fn test_time_bonus_requires_beating_estimate() {
        let a = LevelId::new(1);
        let mut graph = ProgressionGraph::new(ExperienceCurve::default());
        graph.add_node(
            LevelNode::new(a, "alpha", "s")
                .with_estimated_time(60.0)
                .with_base_reward(200),
        );

        let mut profile = SaveProfile::default();
        graph.complete_level(a, 75.0, 0, false, &mut profile);
        assert_eq!(profile.total_experience, 20);

        graph.complete_level(a, 45.0, 0, false, &mut profile);
        assert_eq!(profile.total_experience, 20 + 20 + TIME_BONUS_EXPERIENCE);
    }

    #[test]
    fn test_unknown_level_completion_is_noop() {
        let mut graph = chain_graph();
        let mut profile = SaveProfile::default();
        let events = graph.complete_level(LevelId::new(99), 10.0, 100, false, &mut profile);
        assert!(events.is_empty());
        assert_eq!(profile.total_score, 0);
    }

    #[test]
    fn test_add_experience_level_change_event_only_on_change() {
        let graph = chain_graph();
        let mut profile = SaveProfile::default();

        let events = graph.add_experience(50, &mut profile);
        assert_eq!(events.len(), 1); // experience only

        let events = graph.add_experience(50, &mut profile);
        assert_eq!(events.len(), 2); // crossed 100 -> level 2
        assert!(events.contains(&ProgressionEvent::PlayerLevelChanged {
            old_level: 1,
            new_level: 2,
        }));
    }

    #[test]
    fn test_recommend_next_orders_by_difficulty_then_time() {
        let easy_slow = LevelId::new(1);
        let easy_fast = LevelId::new(2);
        let hard = LevelId::new(3);

        let mut graph = ProgressionGraph::new(ExperienceCurve::default());
        graph.add_node(
            LevelNode::new(easy_slow, "slow", "s")
                .with_difficulty(Difficulty::Easy)
                .with_estimated_time(120.0),
        );
        graph.add_node(
            LevelNode::new(easy_fast, "fast", "s")
                .with_difficulty(Difficulty::Easy)
                .with_estimated_time(60.0),
        );
        graph.add_node(LevelNode::new(hard, "hard", "s").with_difficulty(Difficulty::Hard));

        let profile = SaveProfile::default();
        let pick = graph.recommend_next(&profile).expect("recommendation");
        assert_eq!(pick.id, easy_fast);
    }

    #[test]
    fn test_recommend_next_replay_fallback() {
        let (a, b, c) = ids();
        let mut graph = chain_graph();
        let mut profile = SaveProfile::default();

        graph.complete_level(a, 10.0, 0, false, &mut profile);
        graph.complete_level(b, 10.0, 0, false, &mut profile);
        graph.complete_level(c, 10.0, 0, false, &mut profile);

        // Everything complete: replay the hardest.
        let pick = graph.recommend_next(&profile).expect("replay pick");
        assert_eq!(pick.id, c);
    }
}
