use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use teamdeck_store::TeamStore;

/// The two directory trees mirrored into the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRoots {
    pub teams: PathBuf,
    pub tasks: PathBuf,
}

impl WatchRoots {
    pub fn new(teams: impl Into<PathBuf>, tasks: impl Into<PathBuf>) -> Self {
        Self {
            teams: teams.into(),
            tasks: tasks.into(),
        }
    }
}

/// Owns the reconciliation critical section.  Full and incremental passes
/// take the same gate, so they never interleave on any team; store readers
/// do not touch it.
pub struct Reconciler {
    pub(crate) store: Arc<TeamStore>,
    pub(crate) roots: WatchRoots,
    pub(crate) gate: Mutex<()>,
}

impl Reconciler {
    pub fn new(store: Arc<TeamStore>, roots: WatchRoots) -> Self {
        Self {
            store,
            roots,
            gate: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<TeamStore> {
        &self.store
    }

    pub fn roots(&self) -> &WatchRoots {
        &self.roots
    }
}
