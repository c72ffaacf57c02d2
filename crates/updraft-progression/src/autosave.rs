//! Interval-polled autosave.
//!
//! The scheduler owns no data. Each interval it checks the persistence
//! store's dirty flag and writes the active slot when there are unsaved
//! changes. A failed write is retried on the next interval. Focus loss
//! and shutdown bypass the interval entirely.

use tracing::{debug, error, info};

use crate::events::ProgressionEvent;
use crate::persistence::PersistenceStore;
use crate::profile::SaveProfile;

/// Default seconds between dirty-flag checks.
pub const DEFAULT_AUTOSAVE_INTERVAL: f64 = 60.0;

/// Periodic save scheduler driven by frame ticks.
#[derive(Debug)]
pub struct AutosaveScheduler {
    /// Seconds between dirty-flag polls.
    interval: f64,
    /// Seconds accumulated since the last poll.
    elapsed: f64,
    /// Whether interval autosave is active.
    enabled: bool,
    /// Set after a failed write so the next poll retries even if
    /// nothing new was marked dirty in between.
    retry_pending: bool,
}

impl Default for AutosaveScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_AUTOSAVE_INTERVAL)
    }
}

impl AutosaveScheduler {
    /// Creates a scheduler polling every `interval` seconds.
    #[must_use]
    pub fn new(interval: f64) -> Self {
        Self {
            interval: interval.max(1.0),
            elapsed: 0.0,
            enabled: true,
            retry_pending: false,
        }
    }

    /// Enables or disables interval autosave. Explicit flushes still
    /// work while disabled.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            info!("Autosave {}", if enabled { "enabled" } else { "disabled" });
        }
        self.enabled = enabled;
        self.elapsed = 0.0;
    }

    /// Returns whether interval autosave is active.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Advances the scheduler by `delta` seconds. Saves the active slot
    /// when an interval elapses with unsaved changes (or a retry
    /// pending).
    pub fn tick(
        &mut self,
        delta: f64,
        store: &mut PersistenceStore,
        profile: &mut SaveProfile,
    ) -> Vec<ProgressionEvent> {
        if !self.enabled {
            return Vec::new();
        }

        self.elapsed += delta;
        if self.elapsed < self.interval {
            return Vec::new();
        }
        self.elapsed = 0.0;

        if !store.is_dirty() && !self.retry_pending {
            return Vec::new();
        }
        debug!("Autosave interval elapsed with unsaved changes");
        self.save_now(store, profile)
    }

    /// Immediate save, used for focus loss and shutdown. Skips the
    /// write when nothing is dirty unless `force` is set.
    pub fn flush(
        &mut self,
        force: bool,
        store: &mut PersistenceStore,
        profile: &mut SaveProfile,
    ) -> Vec<ProgressionEvent> {
        if !force && !store.is_dirty() && !self.retry_pending {
            return Vec::new();
        }
        self.elapsed = 0.0;
        self.save_now(store, profile)
    }

    fn save_now(
        &mut self,
        store: &mut PersistenceStore,
        profile: &mut SaveProfile,
    ) -> Vec<ProgressionEvent> {
        let slot = store.active_slot();
        match store.save(slot, profile) {
            Ok(()) => {
                self.retry_pending = false;
                info!("Autosaved slot {}", slot);
                vec![ProgressionEvent::SaveCompleted { slot }]
            }
            Err(err) => {
                self.retry_pending = true;
                error!("Autosave of slot {} failed: {}", slot, err);
                vec![ProgressionEvent::SaveFailed {
                    message: err.to_string(),
                }]
            }
        }
    }
}
