//! Reconciliation of the on-disk team, inbox and task trees into a
//! [`TeamStore`](teamdeck_store::TeamStore).
//!
//! The filesystem is the source of truth.  [`Reconciler::full_scan`] mirrors
//! both trees from scratch and prunes vanished teams;
//! [`Reconciler::on_path_changed`] re-reads just the team a single path
//! belongs to and reports what kind of change it was.

pub mod classify;
pub mod error;
pub mod event;
pub mod files;
pub mod full;
pub mod guard;
pub mod incremental;
pub mod parser;
pub mod reconciler;

pub use classify::classify;
pub use error::{InputError, SyncError};
pub use event::{ChangeData, ChangeEvent, ChangeKind};
pub use full::ScanSummary;
pub use parser::{SYNTHETIC_PALETTE, TeamParse};
pub use reconciler::{Reconciler, WatchRoots};
