//! Save-slot persistence.
//!
//! This module provides:
//! - `PersistenceStore`: reads/writes numbered save slots
//! - Canonical JSON encoding of `SaveProfile`
//! - Optional keyed-XOR + base64 obfuscation
//! - Atomic save operations (temp file + rename)
//! - Dirty-flag tracking consulted by the autosave scheduler
//! - Slot listing and JSON export/import
//!
//! Obfuscation is a reversible keyed XOR over the payload bytes followed
//! by base64. It is **not** cryptographic protection; it only deters
//! casual editing of save files. Anyone who reads this source can decode
//! a save.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::profile::SaveProfile;
use updraft_common::{UpdraftError, CURRENT_SAVE_VERSION};

/// Default number of configured save slots.
pub const DEFAULT_SLOT_COUNT: usize = 3;

/// Maximum number of save slots allowed.
pub const MAX_SLOT_COUNT: usize = 10;

/// Save file name prefix; full pattern is `save_slot_<2-digit-index>.dat`.
pub const SAVE_FILE_PREFIX: &str = "save_slot_";

/// Errors that can occur while saving.
#[derive(Debug, Error)]
pub enum SaveError {
    /// Slot index outside the configured range; rejected before any IO.
    #[error("Invalid save slot: {slot} (configured slots: {max})")]
    InvalidSlot {
        /// Requested slot index.
        slot: usize,
        /// Number of configured slots.
        max: usize,
    },

    /// IO error at the storage layer.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Atomic write failed.
    #[error("Atomic write failed: {0}")]
    AtomicWriteFailed(String),
}

/// Errors that can occur while loading.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Slot index outside the configured range; rejected before any IO.
    #[error("Invalid save slot: {slot} (configured slots: {max})")]
    InvalidSlot {
        /// Requested slot index.
        slot: usize,
        /// Number of configured slots.
        max: usize,
    },

    /// IO error at the storage layer.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse or obfuscation-reversal failure. Never fatal: callers fall
    /// back to a default profile for the slot.
    #[error("Corrupted save file: {0}")]
    Corrupted(String),

    /// Save was written by a newer build.
    #[error("Save version mismatch: expected <= {expected}, found {found}")]
    VersionMismatch {
        /// Newest version this build can read.
        expected: u32,
        /// Version found in the file.
        found: u32,
    },
}

/// Result type for save operations.
pub type SaveResult<T> = Result<T, SaveError>;

impl From<SaveError> for UpdraftError {
    fn from(err: SaveError) -> Self {
        match err {
            SaveError::InvalidSlot { slot, max } => {
                Self::InvalidConfig(format!("invalid save slot {slot} (configured: {max})"))
            }
            SaveError::Io(err) => Self::Io(err),
            SaveError::Serialization(msg) | SaveError::AtomicWriteFailed(msg) => {
                Self::Serialization(msg)
            }
        }
    }
}

impl From<LoadError> for UpdraftError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::InvalidSlot { slot, max } => {
                Self::InvalidConfig(format!("invalid save slot {slot} (configured: {max})"))
            }
            LoadError::Io(err) => Self::Io(err),
            LoadError::Corrupted(msg) => Self::Serialization(msg),
            LoadError::VersionMismatch { expected, found } => Self::VersionMismatch {
                expected,
                actual: found,
            },
        }
    }
}

/// Lightweight metadata for one occupied slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotMetadata {
    /// Player display name.
    pub player_name: String,
    /// Player level.
    pub player_level: u32,
    /// Total score.
    pub total_score: u64,
    /// Cumulative play time in seconds.
    pub play_time_seconds: f64,
    /// Unix epoch seconds of the last save.
    pub last_saved: u64,
    /// Number of completed levels.
    pub completed_levels: usize,
}

impl SlotMetadata {
    fn from_profile(profile: &SaveProfile) -> Self {
        Self {
            player_name: profile.player_name.clone(),
            player_level: profile.player_level,
            total_score: profile.total_score,
            play_time_seconds: profile.play_time_seconds,
            last_saved: profile.last_saved,
            completed_levels: profile.completed_count(),
        }
    }
}

/// State of one configured save slot.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotStatus {
    /// No file exists for this slot.
    Empty,
    /// A file exists but could not be decoded.
    Corrupted,
    /// A readable save exists.
    Occupied(SlotMetadata),
}

/// Summary of one configured save slot, as reported by `list_slots`.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotSummary {
    /// Slot index.
    pub slot: usize,
    /// Slot state.
    pub status: SlotStatus,
}

/// Returns the current Unix epoch time in seconds.
#[must_use]
pub fn now_epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

/// XORs `bytes` in place with a cycling key. Applying twice with the same
/// key restores the original bytes.
fn xor_with_key(bytes: &mut [u8], key: &[u8]) {
    if key.is_empty() {
        return;
    }
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte ^= key[i % key.len()];
    }
}

/// Store for numbered save slots on durable storage.
#[derive(Debug)]
pub struct PersistenceStore {
    /// Directory holding the slot files.
    save_dir: PathBuf,
    /// Number of configured slots.
    slot_count: usize,
    /// Obfuscation key; `None` writes plain UTF-8 JSON.
    obfuscation_key: Option<Vec<u8>>,
    /// Whether in-memory state has diverged from disk.
    dirty: bool,
    /// Slot the active profile belongs to.
    active_slot: usize,
}

impl PersistenceStore {
    /// Creates a new store.
    ///
    /// `slot_count` is clamped to `1..=MAX_SLOT_COUNT`.
    #[must_use]
    pub fn new(
        save_dir: impl AsRef<Path>,
        slot_count: usize,
        obfuscation_key: Option<Vec<u8>>,
    ) -> Self {
        Self {
            save_dir: save_dir.as_ref().to_path_buf(),
            slot_count: slot_count.clamp(1, MAX_SLOT_COUNT),
            obfuscation_key,
            dirty: false,
            active_slot: 0,
        }
    }

    /// Returns the save directory path.
    #[must_use]
    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    /// Returns the number of configured slots.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Returns the active slot index.
    #[must_use]
    pub fn active_slot(&self) -> usize {
        self.active_slot
    }

    /// Returns whether unsaved changes exist.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Marks the active profile as having unsaved changes. Idempotent.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Returns the file path for a slot.
    fn slot_path(&self, slot: usize) -> PathBuf {
        self.save_dir.join(format!("{SAVE_FILE_PREFIX}{slot:02}.dat"))
    }

    /// Returns the temp path used for atomic writes.
    fn temp_path(&self, slot: usize) -> PathBuf {
        self.save_dir.join(format!("{SAVE_FILE_PREFIX}{slot:02}.tmp"))
    }

    fn validate_slot_for_save(&self, slot: usize) -> SaveResult<()> {
        if slot >= self.slot_count {
            return Err(SaveError::InvalidSlot {
                slot,
                max: self.slot_count,
            });
        }
        Ok(())
    }

    fn validate_slot_for_load(&self, slot: usize) -> Result<(), LoadError> {
        if slot >= self.slot_count {
            return Err(LoadError::InvalidSlot {
                slot,
                max: self.slot_count,
            });
        }
        Ok(())
    }

    /// Ensures the save directory exists.
    fn ensure_save_dir(&self) -> SaveResult<()> {
        if !self.save_dir.exists() {
            fs::create_dir_all(&self.save_dir)?;
            info!("Created save directory: {:?}", self.save_dir);
        }
        Ok(())
    }

    /// Encodes the canonical JSON payload for disk.
    fn encode_payload(&self, json: &str) -> Vec<u8> {
        match &self.obfuscation_key {
            Some(key) => {
                let mut bytes = json.as_bytes().to_vec();
                xor_with_key(&mut bytes, key);
                BASE64.encode(bytes).into_bytes()
            }
            None => json.as_bytes().to_vec(),
        }
    }

    /// Decodes raw file bytes back into the canonical JSON payload.
    fn decode_payload(&self, raw: &[u8]) -> Result<String, LoadError> {
        let bytes = match &self.obfuscation_key {
            Some(key) => {
                let mut bytes = BASE64
                    .decode(raw)
                    .map_err(|e| LoadError::Corrupted(format!("base64 decode failed: {e}")))?;
                xor_with_key(&mut bytes, key);
                bytes
            }
            None => raw.to_vec(),
        };
        String::from_utf8(bytes)
            .map_err(|e| LoadError::Corrupted(format!("payload is not UTF-8: {e}")))
    }

    /// Saves a profile to a slot.
    ///
    /// Stamps `last_saved` and `slot_index` on the profile, writes
    /// atomically (temp file + rename), and clears the dirty flag on
    /// success.
    pub fn save(&mut self, slot: usize, profile: &mut SaveProfile) -> SaveResult<()> {
        self.validate_slot_for_save(slot)?;
        self.ensure_save_dir()?;

        profile.last_saved = now_epoch_seconds();
        profile.slot_index = slot;
        profile.version = CURRENT_SAVE_VERSION;

        let json = serde_json::to_string_pretty(profile)
            .map_err(|e| SaveError::Serialization(e.to_string()))?;
        let payload = self.encode_payload(&json);

        let temp_path = self.temp_path(slot);
        let final_path = self.slot_path(slot);

        {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(&payload)?;
            writer.flush()?;
        }

        fs::rename(&temp_path, &final_path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            SaveError::AtomicWriteFailed(e.to_string())
        })?;

        self.dirty = false;
        self.active_slot = slot;
        info!("Saved profile to slot {}", slot);
        Ok(())
    }

    /// Loads a profile from a slot.
    ///
    /// A missing file is the first-run case, not an error: a fresh default
    /// profile is returned and the store is marked dirty so the next save
    /// creates the file. A file that fails decoding or parsing returns
    /// `Corrupted`; callers fall back to a default profile.
    pub fn load(&mut self, slot: usize) -> Result<SaveProfile, LoadError> {
        self.validate_slot_for_load(slot)?;

        let path = self.slot_path(slot);
        if !path.exists() {
            debug!("Slot {} is empty, creating fresh profile", slot);
            self.dirty = true;
            self.active_slot = slot;
            return Ok(SaveProfile::new(slot));
        }

        let raw = fs::read(&path)?;
        let json = self.decode_payload(&raw)?;
        let profile: SaveProfile = serde_json::from_str(&json)
            .map_err(|e| LoadError::Corrupted(format!("parse failed: {e}")))?;

        if profile.version > CURRENT_SAVE_VERSION {
            return Err(LoadError::VersionMismatch {
                expected: CURRENT_SAVE_VERSION,
                found: profile.version,
            });
        }

        self.active_slot = slot;
        info!("Loaded profile from slot {}", slot);
        Ok(profile)
    }

    /// Loads a slot, falling back to a fresh default profile on any
    /// corruption or read failure.
    ///
    /// Only `InvalidSlot` propagates; everything else degrades to the
    /// first-run profile with the dirty flag set, so the next save
    /// overwrites the unreadable file.
    pub fn load_or_default(&mut self, slot: usize) -> Result<SaveProfile, LoadError> {
        match self.load(slot) {
            Ok(profile) => Ok(profile),
            Err(err @ LoadError::InvalidSlot { .. }) => Err(err),
            Err(err) => {
                warn!("Slot {} unreadable ({}), falling back to defaults", slot, err);
                self.dirty = true;
                self.active_slot = slot;
                Ok(SaveProfile::new(slot))
            }
        }
    }

    /// Reports the state of every configured slot without mutating any
    /// active state.
    #[must_use]
    pub fn list_slots(&self) -> Vec<SlotSummary> {
        (0..self.slot_count)
            .map(|slot| {
                let path = self.slot_path(slot);
                let status = if path.exists() {
                    self.read_slot_metadata(&path)
                        .map_or(SlotStatus::Corrupted, SlotStatus::Occupied)
                } else {
                    SlotStatus::Empty
                };
                SlotSummary { slot, status }
            })
            .collect()
    }

    fn read_slot_metadata(&self, path: &Path) -> Option<SlotMetadata> {
        let raw = fs::read(path).ok()?;
        let json = self.decode_payload(&raw).ok()?;
        let profile: SaveProfile = serde_json::from_str(&json).ok()?;
        Some(SlotMetadata::from_profile(&profile))
    }

    /// Serializes a profile to the human-readable backup document.
    ///
    /// The export is always unobfuscated JSON, regardless of the store's
    /// obfuscation setting.
    pub fn export_json(profile: &SaveProfile) -> SaveResult<String> {
        serde_json::to_string_pretty(profile)
            .map_err(|e| SaveError::Serialization(e.to_string()))
    }

    /// Parses a backup document produced by `export_json`.
    ///
    /// The caller replaces the active profile with the result and marks
    /// the store dirty.
    pub fn import_json(text: &str) -> Result<SaveProfile, LoadError> {
        let profile: SaveProfile = serde_json::from_str(text)
            .map_err(|e| LoadError::Corrupted(format!("import parse failed: {e}")))?;
        if profile.version > CURRENT_SAVE_VERSION {
            return Err(LoadError::VersionMismatch {
                expected: CURRENT_SAVE_VERSION,
                found: profile.version,
            });
        }
        Ok(profile)
    }

    /// Checks whether a slot file exists on disk.
    #[must_use]
    pub fn slot_exists(&self, slot: usize) -> bool {
        self.slot_path(slot).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn test_save_dir(name: &str) -> PathBuf {
        env::temp_dir().join("updraft_test_persistence").join(name)
    }

    fn cleanup_test_dir(path: &Path) {
        if path.exists() {
            let _ = fs::remove_dir_all(path);
        }
    }

    fn populated_profile() -> SaveProfile {
        let mut profile = SaveProfile::new(0);
        profile.player_name = "Ada".to_string();
        profile.player_level = 4;
        profile.total_score = 12_500;
        profile.mark_level_completed("canyon");
        profile.mark_level_completed("mesa");
        profile.record_best_time("canyon", 52.75);
        profile
            .achievement_progress
            .insert(updraft_common::AchievementId::new(3), 7);
        profile.record_location_time("ridge_4", 91.0);
        profile
    }

    #[test]
    fn test_xor_round_trip() {
        let key = b"skylark";
        let mut bytes = b"some save payload".to_vec();
        xor_with_key(&mut bytes, key);
        assert_ne!(bytes, b"some save payload");
        xor_with_key(&mut bytes, key);
        assert_eq!(bytes, b"some save payload");
    }

    #[test]
    fn test_save_load_round_trip_plain() {
        let dir = test_save_dir("round_trip_plain");
        cleanup_test_dir(&dir);

        let mut store = PersistenceStore::new(&dir, 3, None);
        let mut profile = populated_profile();

        store.mark_dirty();
        store.save(1, &mut profile).expect("save failed");
        assert!(!store.is_dirty());
        assert!(store.slot_exists(1));

        let loaded = store.load(1).expect("load failed");
        assert_eq!(loaded, profile);
        assert_eq!(loaded.slot_index, 1);

        cleanup_test_dir(&dir);
    }

    #[test]
    fn test_save_load_round_trip_obfuscated() {
        let dir = test_save_dir("round_trip_obfuscated");
        cleanup_test_dir(&dir);

        let key = Some(b"thermal".to_vec());
        let mut store = PersistenceStore::new(&dir, 3, key);
        let mut profile = populated_profile();

        store.save(0, &mut profile).expect("save failed");

        // The on-disk bytes must not contain the plaintext payload.
        let raw = fs::read(dir.join("save_slot_00.dat")).expect("read failed");
        let text = String::from_utf8_lossy(&raw);
        assert!(!text.contains("player_name"));

        let loaded = store.load(0).expect("load failed");
        assert_eq!(loaded, profile);

        cleanup_test_dir(&dir);
    }

    #[test]
    fn test_invalid_slot_rejected_before_io() {
        let dir = test_save_dir("invalid_slot");
        cleanup_test_dir(&dir);

        let mut store = PersistenceStore::new(&dir, 3, None);
        let mut profile = SaveProfile::default();

        let result = store.save(3, &mut profile);
        assert!(matches!(result, Err(SaveError::InvalidSlot { slot: 3, .. })));
        // No directory should have been created.
        assert!(!dir.exists());

        let result = store.load(7);
        assert!(matches!(result, Err(LoadError::InvalidSlot { slot: 7, .. })));
    }

    #[test]
    fn test_first_run_returns_default_and_marks_dirty() {
        let dir = test_save_dir("first_run");
        cleanup_test_dir(&dir);

        let mut store = PersistenceStore::new(&dir, 3, None);
        let profile = store.load(2).expect("first-run load failed");

        assert_eq!(profile.slot_index, 2);
        assert_eq!(profile.player_level, 1);
        assert!(store.is_dirty());

        cleanup_test_dir(&dir);
    }

    #[test]
    fn test_corrupted_save_fallback() {
        let dir = test_save_dir("corrupted");
        cleanup_test_dir(&dir);
        fs::create_dir_all(&dir).expect("mkdir failed");

        fs::write(dir.join("save_slot_00.dat"), b"{ definitely not json")
            .expect("write failed");

        let mut store = PersistenceStore::new(&dir, 3, None);
        let result = store.load(0);
        assert!(matches!(result, Err(LoadError::Corrupted(_))));

        let profile = store.load_or_default(0).expect("fallback failed");
        assert_eq!(profile.player_level, 1);
        assert!(store.is_dirty());

        cleanup_test_dir(&dir);
    }

    #[test]
    fn test_truncated_obfuscated_save_fallback() {
        let dir = test_save_dir("truncated");
        cleanup_test_dir(&dir);

        let key = Some(b"thermal".to_vec());
        let mut store = PersistenceStore::new(&dir, 3, key);
        let mut profile = populated_profile();
        store.save(0, &mut profile).expect("save failed");

        // Garble the file.
        let path = dir.join("save_slot_00.dat");
        let mut raw = fs::read(&path).expect("read failed");
        raw.truncate(raw.len() / 2);
        raw.push(b'!');
        fs::write(&path, &raw).expect("write failed");

        let profile = store.load_or_default(0).expect("fallback failed");
        assert_eq!(profile.total_score, 0);

        cleanup_test_dir(&dir);
    }

    #[test]
    fn test_list_slots() {
        let dir = test_save_dir("list_slots");
        cleanup_test_dir(&dir);

        let mut store = PersistenceStore::new(&dir, 3, None);
        let mut profile = populated_profile();
        store.save(0, &mut profile).expect("save failed");

        fs::write(dir.join("save_slot_02.dat"), b"garbled").expect("write failed");

        let slots = store.list_slots();
        assert_eq!(slots.len(), 3);

        match &slots[0].status {
            SlotStatus::Occupied(meta) => {
                assert_eq!(meta.player_name, "Ada");
                assert_eq!(meta.player_level, 4);
                assert_eq!(meta.completed_levels, 2);
            }
            other => panic!("expected occupied slot, got {other:?}"),
        }
        assert_eq!(slots[1].status, SlotStatus::Empty);
        assert_eq!(slots[2].status, SlotStatus::Corrupted);

        cleanup_test_dir(&dir);
    }

    #[test]
    fn test_export_import_round_trip() {
        let profile = populated_profile();
        let text = PersistenceStore::export_json(&profile).expect("export failed");
        assert!(text.contains("player_name"));

        let imported = PersistenceStore::import_json(&text).expect("import failed");
        assert_eq!(imported, profile);
    }

    #[test]
    fn test_import_rejects_garbage() {
        let result = PersistenceStore::import_json("not a profile");
        assert!(matches!(result, Err(LoadError::Corrupted(_))));
    }

    #[test]
    fn test_version_mismatch() {
        let mut profile = SaveProfile::default();
        profile.version = CURRENT_SAVE_VERSION + 1;
        let text = PersistenceStore::export_json(&profile).expect("export failed");
        let result = PersistenceStore::import_json(&text);
        assert!(matches!(result, Err(LoadError::VersionMismatch { .. })));
    }

    #[test]
    fn test_mark_dirty_idempotent() {
        let store_dir = test_save_dir("dirty");
        let mut store = PersistenceStore::new(&store_dir, 3, None);
        assert!(!store.is_dirty());
        store.mark_dirty();
        store.mark_dirty();
        assert!(store.is_dirty());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;
        use updraft_common::AchievementId;

        /// Profiles with arbitrary non-empty maps and sets. Achievement
        /// IDs for the unlocked set and the progress map come from
        /// disjoint ranges, keeping the at-most-one-of-the-two invariant.
        fn profile_strategy() -> impl Strategy<Value = SaveProfile> {
            (
                "[a-z]{1,8}",
                1u32..50,
                0u64..1_000_000,
                prop::collection::hash_map("[a-z]{1,6}", any::<bool>(), 1..4),
                prop::collection::hash_map("[a-z]{1,6}", 0.5f64..5000.0, 1..4),
                prop::collection::hash_set(0u32..500, 1..4),
                prop::collection::hash_map(500u32..1000, 1u32..100, 1..4),
                prop::collection::hash_map("[a-z]{1,6}", 0.5f64..5000.0, 1..4),
            )
                .prop_map(
                    |(name, level, xp, completed, times, unlocked, progress, locations)| {
                        let mut profile = SaveProfile::default();
                        profile.player_name = name;
                        profile.player_level = level;
                        profile.total_experience = xp;
                        profile.completed_levels = completed;
                        profile.best_times = times;
                        profile.unlocked_achievements =
                            unlocked.into_iter().map(AchievementId::new).collect();
                        profile.achievement_progress = progress
                            .into_iter()
                            .map(|(id, value)| (AchievementId::new(id), value))
                            .collect();
                        profile.location_best_times = locations;
                        profile
                    },
                )
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(24))]

            #[test]
            fn round_trip_preserves_profile(
                mut profile in profile_strategy(),
                obfuscate in any::<bool>(),
            ) {
                let dir = tempfile::tempdir().expect("tempdir failed");
                let key = if obfuscate {
                    Some(b"prop-key".to_vec())
                } else {
                    None
                };

                let mut store = PersistenceStore::new(dir.path(), 3, key);
                store.save(1, &mut profile).expect("save failed");
                let loaded = store.load(1).expect("load failed");

                prop_assert_eq!(loaded, profile);
            }
        }
    }
}
