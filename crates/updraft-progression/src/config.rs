//! Progression service configuration.
//!
//! Everything the service composes is parameterized here: the save
//! directory and slot count, the optional obfuscation key, autosave and
//! notification timing, the flags file, the experience curve, and the
//! static fallback level sequence.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::autosave::DEFAULT_AUTOSAVE_INTERVAL;
use crate::experience::{DEFAULT_BASE_EXPERIENCE, DEFAULT_MULTIPLIER, ExperienceCurve};
use crate::flags::FLAGS_FILE_NAME;
use crate::notifications::DEFAULT_DISPLAY_DURATION;
use crate::persistence::DEFAULT_SLOT_COUNT;
use updraft_common::{UpdraftError, UpdraftResult};

/// Default directory for save data, relative to the working directory.
pub const DEFAULT_SAVE_DIR: &str = "saves";

/// Configuration for [`crate::service::ProgressionService`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressionConfig {
    /// Directory holding slot files and the flags file.
    pub save_dir: PathBuf,
    /// Number of save slots.
    pub slot_count: usize,
    /// Obfuscation key for slot files. `None` writes plain JSON.
    pub obfuscation_key: Option<String>,
    /// Seconds between autosave dirty-flag polls.
    pub autosave_interval: f64,
    /// Whether interval autosave starts enabled.
    pub autosave_enabled: bool,
    /// Seconds each achievement notification stays visible.
    pub notification_duration: f64,
    /// Base experience required for level 2.
    pub experience_base: u64,
    /// Geometric growth factor of the experience curve.
    pub experience_multiplier: f64,
    /// Ordered fallback level names used when the unlock graph has no
    /// opinion on what comes next.
    pub fallback_levels: Vec<String>,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from(DEFAULT_SAVE_DIR),
            slot_count: DEFAULT_SLOT_COUNT,
            obfuscation_key: None,
            autosave_interval: DEFAULT_AUTOSAVE_INTERVAL,
            autosave_enabled: true,
            notification_duration: DEFAULT_DISPLAY_DURATION,
            experience_base: DEFAULT_BASE_EXPERIENCE,
            experience_multiplier: DEFAULT_MULTIPLIER,
            fallback_levels: Vec::new(),
        }
    }
}

impl ProgressionConfig {
    /// Loads a config from a JSON file, falling back to defaults when
    /// the file is missing or unreadable.
    #[must_use]
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(config) => {
                    info!("Loaded progression config from {}", path.display());
                    config
                }
                Err(err) => {
                    warn!(
                        "Invalid progression config {}: {}; using defaults",
                        path.display(),
                        err
                    );
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Validates the config values.
    pub fn validate(&self) -> UpdraftResult<()> {
        if self.autosave_interval <= 0.0 {
            return Err(UpdraftError::InvalidConfig(format!(
                "autosave_interval must be positive, got {}",
                self.autosave_interval
            )));
        }
        if self.notification_duration <= 0.0 {
            return Err(UpdraftError::InvalidConfig(format!(
                "notification_duration must be positive, got {}",
                self.notification_duration
            )));
        }
        if self.experience_multiplier < 1.0 {
            return Err(UpdraftError::InvalidConfig(format!(
                "experience_multiplier must be at least 1.0, got {}",
                self.experience_multiplier
            )));
        }
        if self.experience_base == 0 {
            return Err(UpdraftError::InvalidConfig(
                "experience_base must be nonzero".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds the experience curve from the configured parameters.
    #[must_use]
    pub fn curve(&self) -> ExperienceCurve {
        ExperienceCurve::new(self.experience_base, self.experience_multiplier)
    }

    /// Path of the persisted flags file inside the save directory.
    #[must_use]
    pub fn flags_path(&self) -> PathBuf {
        self.save_dir.join(FLAGS_FILE_NAME)
    }

    /// Obfuscation key as bytes, if one is set.
    #[must_use]
    pub fn key_bytes(&self) -> Option<Vec<u8>> {
        self.obfuscation_key
            .as_ref()
            .filter(|key| !key.is_empty())
            .map(|key| key.as_bytes().to_vec())
    }

    /// Sets the save directory.
    #[must_use]
    pub fn with_save_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_dir = dir.into();
        self
    }

    /// Sets the obfuscation key.
    #[must_use]
    pub fn with_obfuscation_key(mut self, key: impl Into<String>) -> Self {
        self.obfuscation_key = Some(key.into());
        self
    }

    /// Sets the fallback level sequence.
    #[must_use]
    pub fn with_fallback_levels(mut self, levels: Vec<String>) -> Self {
        self.fallback_levels = levels;
        self
    }
}
