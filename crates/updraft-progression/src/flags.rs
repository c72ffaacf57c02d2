//! Persisted key/value flags.
//!
//! The platform-preferences analog for the handful of values that must
//! survive a full process restart outside any save slot: the endless-mode
//! switch and the auto-incrementing endless location index. Values are
//! written through to disk on every change.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use updraft_common::{UpdraftError, UpdraftResult};

/// Default flags file name.
pub const FLAGS_FILE_NAME: &str = "flags.json";

/// Serialized flag values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
struct FlagValues {
    /// Whether the fixed level sequence has been exhausted.
    endless_mode_enabled: bool,
    /// Next procedural location index for endless mode.
    endless_location_index: u32,
}

/// Durable flag store backed by a small JSON file.
#[derive(Debug)]
pub struct FlagStore {
    /// File path.
    path: PathBuf,
    /// Current values.
    values: FlagValues,
}

impl FlagStore {
    /// Opens the store at `path`, reading existing values.
    ///
    /// A missing file yields defaults; an unreadable file is logged and
    /// also yields defaults (the next write replaces it).
    #[must_use]
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(values) => values,
                Err(err) => {
                    warn!("Flags file unreadable ({}), using defaults", err);
                    FlagValues::default()
                }
            },
            Err(_) => FlagValues::default(),
        };
        Self { path, values }
    }

    fn write_through(&self) -> UpdraftResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let text = serde_json::to_string_pretty(&self.values)
            .map_err(|e| UpdraftError::Serialization(e.to_string()))?;
        fs::write(&self.path, text)?;
        Ok(())
    }

    /// Returns whether endless mode is enabled.
    #[must_use]
    pub fn endless_mode_enabled(&self) -> bool {
        self.values.endless_mode_enabled
    }

    /// Returns the current endless location index.
    #[must_use]
    pub fn endless_location_index(&self) -> u32 {
        self.values.endless_location_index
    }

    /// Enables or disables endless mode, writing through to disk.
    pub fn set_endless_mode(&mut self, enabled: bool) -> UpdraftResult<()> {
        if self.values.endless_mode_enabled != enabled {
            self.values.endless_mode_enabled = enabled;
            info!("Endless mode set to {}", enabled);
            self.write_through()?;
        }
        Ok(())
    }

    /// Consumes the current endless location: returns its index and
    /// advances the counter, writing through to disk.
    pub fn consume_endless_location(&mut self) -> UpdraftResult<u32> {
        let index = self.values.endless_location_index;
        self.values.endless_location_index = index.wrapping_add(1);
        self.write_through()?;
        Ok(index)
    }
}
