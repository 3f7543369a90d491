//! Snapshot Store: a lock-free atomic pointer to the active, immutable
//! `Snapshot`, with a one-deep rollback slot. The Watcher is the sole
//! writer; any number of readers may call `get()` concurrently.

pub mod validator;

use arc_swap::ArcSwapOption;
use chrono::Utc;
use contentnode_domain_model::{Manifest, Snapshot, SnapshotSource};

pub use validator::{ValidateOptions, ValidationError};

/// Holds the currently active snapshot and, once a swap has happened, the
/// snapshot it replaced.
pub struct Store {
    active: ArcSwapOption<Snapshot>,
    previous: ArcSwapOption<Snapshot>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            active: ArcSwapOption::empty(),
            previous: ArcSwapOption::empty(),
        }
    }

    /// Publishes `snapshot` as the active snapshot. Stamps `loaded_at` if
    /// unset. Retains the previously active snapshot for one rollback.
    pub fn set(&self, mut snapshot: Snapshot) {
        if snapshot.meta.loaded_at.is_none() {
            snapshot.meta.loaded_at = Some(Utc::now());
        }
        let replaced = self.active.swap(Some(std::sync::Arc::new(snapshot)));
        if let Some(replaced) = replaced {
            self.previous.store(Some(replaced));
        }
    }

    /// Returns the active snapshot and whether one is actually present.
    /// `present` is false when the slot is empty.
    pub fn get(&self) -> (Option<std::sync::Arc<Snapshot>>, bool) {
        let guard = self.active.load_full();
        let present = guard.is_some();
        (guard, present)
    }

    /// Reinstalls the previously active snapshot, if one was retained.
    /// Returns `true` if a rollback actually happened.
    pub fn rollback(&self) -> bool {
        let previous = self.previous.load_full();
        match previous {
            Some(previous) => {
                self.active.store(Some(previous));
                self.previous.store(None);
                true
            }
            None => false,
        }
    }

    /// `None` when a snapshot is present and ready to serve; otherwise a
    /// human-readable reason. Emptiness of the file tree is the
    /// Validator's concern, not the Store's.
    pub fn ready_err(&self) -> Option<String> {
        let (_, present) = self.get();
        if present {
            None
        } else {
            Some("no active snapshot".to_string())
        }
    }

    pub fn content_version(&self) -> Option<String> {
        self.get().0.and_then(|s| s.content_version().map(str::to_string))
    }

    pub fn content_hash(&self) -> Option<String> {
        self.get().0.map(|s| s.content_hash().to_string())
    }

    pub fn source(&self) -> Option<SnapshotSource> {
        self.get().0.map(|s| s.meta.source)
    }

    pub fn loaded_at(&self) -> Option<chrono::DateTime<Utc>> {
        self.get().0.and_then(|s| s.meta.loaded_at)
    }

    pub fn manifest(&self) -> Option<Manifest> {
        self.get().0.and_then(|s| s.manifest.clone())
    }
}
