//! # Updraft Progression
//!
//! Player progression and persistence for Updraft.
//!
//! This crate provides the full progression engine:
//! - Save profiles with slot-based obfuscated persistence
//! - Interval autosave with focus-loss and shutdown flushes
//! - Typed achievements with unlock notifications
//! - The level-unlock graph and experience curve
//! - Per-level collectible tracking and next-scene resolution
//! - Persisted flags for endless mode
//! - An event bus connecting progression to UI and gameplay
//!
//! [`service::ProgressionService`] composes all of it behind one facade.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod achievements;
pub mod autosave;
pub mod config;
pub mod events;
pub mod experience;
pub mod flags;
pub mod graph;
pub mod notifications;
pub mod persistence;
pub mod profile;
pub mod runtime;
pub mod service;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::achievements::*;
    pub use crate::autosave::*;
    pub use crate::config::*;
    pub use crate::events::*;
    pub use crate::experience::*;
    pub use crate::flags::*;
    pub use crate::graph::*;
    pub use crate::notifications::*;
    pub use crate::persistence::*;
    pub use crate::profile::*;
    pub use crate::runtime::*;
    pub use crate::service::*;
}

pub use prelude::*;
