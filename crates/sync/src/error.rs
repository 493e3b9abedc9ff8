use std::io;
use std::path::PathBuf;

use teamdeck_store::StoreError;
use thiserror::Error;

/// Failures that abort a reconciliation pass.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Why a single source file was skipped.  Never aborts a pass.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("unreadable: {0}")]
    Io(#[from] io::Error),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected shape: {0}")]
    Shape(&'static str),
}
