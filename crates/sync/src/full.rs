use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use teamdeck_store::Team;
use tracing::{debug, error, info, warn};

use crate::error::SyncError;
use crate::files;
use crate::guard;
use crate::parser::{self, TeamParse};
use crate::reconciler::Reconciler;

/// What a completed full scan did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    /// Teams parsed in this pass, by name.
    pub teams: Vec<String>,
    /// Teams pruned because their directory is gone.
    pub removed: Vec<String>,
    /// Task directories with no matching team.
    pub orphan_task_dirs: Vec<String>,
    pub elapsed_ms: u64,
}

impl Reconciler {
    /// Mirror both trees into the store and prune teams whose directory
    /// vanished.  Errors end the pass and are logged; `None` means the pass
    /// did not complete.  Teams committed before the failure stay committed.
    pub fn full_scan(&self) -> Option<ScanSummary> {
        let _gate = self.gate.lock();
        let started = Instant::now();
        info!(teams_root = %self.roots.teams.display(), "full scan started");

        match self.scan_all() {
            Ok(mut summary) => {
                summary.elapsed_ms = started.elapsed().as_millis() as u64;
                info!(
                    teams = summary.teams.len(),
                    removed = summary.removed.len(),
                    elapsed_ms = summary.elapsed_ms,
                    "full scan complete"
                );
                Some(summary)
            }
            Err(err) => {
                error!(?err, "full scan aborted");
                None
            }
        }
    }

    fn scan_all(&self) -> Result<ScanSummary, SyncError> {
        let teams_root = &self.roots.teams;
        let tasks_root = &self.roots.tasks;
        if !teams_root.is_dir() {
            warn!(path = %teams_root.display(), "teams root does not exist; nothing to reconcile");
            return Ok(ScanSummary::default());
        }

        let mut seen: BTreeMap<String, Team> = BTreeMap::new();
        // Team directories that exist but could not be parsed this time.
        let mut shielded: BTreeSet<PathBuf> = BTreeSet::new();
        for team_dir in list_dirs(teams_root)? {
            match parser::parse_team(&self.store, teams_root, &team_dir)? {
                TeamParse::Parsed(team) => {
                    seen.insert(team.name.clone(), team);
                }
                TeamParse::Rejected => {
                    shielded.insert(team_dir);
                }
                TeamParse::Absent => {}
            }
        }

        let mut removed = Vec::new();
        for team in self.store.teams()? {
            if seen.contains_key(&team.name) || is_shielded(&team, &shielded) {
                continue;
            }
            if self.store.delete_team(&team.name)? {
                info!(team = %team.name, "team directory gone; removed");
                removed.push(team.name);
            }
        }

        // Tasks follow every team still stored, including ones whose config
        // failed to parse this pass.
        let known: BTreeMap<String, u64> = self
            .store
            .teams()?
            .into_iter()
            .map(|team| (team.name, team.id))
            .collect();

        let mut orphan_task_dirs = Vec::new();
        if tasks_root.is_dir() {
            for task_dir in list_dirs(tasks_root)? {
                let name = task_dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if !known.contains_key(&name) {
                    debug!(path = %task_dir.display(), "task directory has no team");
                    orphan_task_dirs.push(name);
                }
            }
        }
        // Teams whose task directory vanished lose their stale tasks too.
        for (name, id) in &known {
            parser::parse_tasks_for_team(&self.store, tasks_root, name, *id)?;
        }

        Ok(ScanSummary {
            teams: seen.into_keys().collect(),
            removed,
            orphan_task_dirs,
            elapsed_ms: 0,
        })
    }
}

fn list_dirs(root: &Path) -> Result<Vec<PathBuf>, SyncError> {
    files::subdirectories(root).map_err(|source| SyncError::Io {
        path: root.to_path_buf(),
        source,
    })
}

/// A stored team is kept when the directory its config came from is still
/// present but failed to parse.
fn is_shielded(team: &Team, shielded: &BTreeSet<PathBuf>) -> bool {
    let config_dir = Path::new(&team.config_path)
        .parent()
        .and_then(|dir| guard::resolve(dir).ok());
    shielded.iter().any(|dir| {
        dir.file_name().is_some_and(|name| name == team.name.as_str())
            || (config_dir.is_some() && guard::resolve(dir).ok() == config_dir)
    })
}
