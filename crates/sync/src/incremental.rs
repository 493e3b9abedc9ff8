use std::path::{Component, Path};

use tracing::{debug, error, warn};

use crate::error::SyncError;
use crate::event::{ChangeEvent, ChangeKind};
use crate::files::INBOX_DIR;
use crate::guard;
use crate::parser;
use crate::reconciler::Reconciler;

impl Reconciler {
    /// Re-read the team `path` belongs to and report what changed.  Paths
    /// outside both roots, or that do not name a team, yield `None` without
    /// touching the store.
    pub fn on_path_changed(&self, path: &Path) -> Option<ChangeEvent> {
        let _gate = self.gate.lock();
        match self.reconcile_path(path) {
            Ok(event) => event,
            Err(err) => {
                error!(path = %path.display(), ?err, "incremental reconcile failed");
                None
            }
        }
    }

    fn reconcile_path(&self, path: &Path) -> Result<Option<ChangeEvent>, SyncError> {
        if let Some(relative) = guard::relative_within(&self.roots.teams, path) {
            let Some(segment) = team_segment(&relative) else {
                debug!(path = %path.display(), "change does not belong to a team");
                return Ok(None);
            };
            let team_dir = self.roots.teams.join(segment);
            if !team_dir.is_dir() {
                return Ok(None);
            }
            let Some(team) =
                parser::parse_team(&self.store, &self.roots.teams, &team_dir)?.into_team()
            else {
                return Ok(None);
            };
            parser::parse_tasks_for_team(&self.store, &self.roots.tasks, &team.name, team.id)?;

            // Matches a whole path component, not a substring of the path
            // string, so a team named e.g. `inboxes-dev` no longer turns
            // every config edit into a message event.
            let kind = if relative
                .components()
                .any(|c| c.as_os_str() == INBOX_DIR)
            {
                ChangeKind::MessageNew
            } else {
                ChangeKind::TeamUpdate
            };
            return Ok(Some(ChangeEvent::new(kind, team.name)));
        }

        if let Some(relative) = guard::relative_within(&self.roots.tasks, path) {
            let Some(segment) = team_segment(&relative) else {
                debug!(path = %path.display(), "change does not belong to a team");
                return Ok(None);
            };
            let Some(team) = self.store.team_by_name(segment)? else {
                debug!(team = %segment, "tasks changed for unknown team");
                return Ok(None);
            };
            parser::parse_tasks_for_team(&self.store, &self.roots.tasks, &team.name, team.id)?;
            return Ok(Some(ChangeEvent::new(ChangeKind::TaskUpdate, team.name)));
        }

        warn!(
            target: "security",
            path = %path.display(),
            "change outside the watched roots rejected"
        );
        Ok(None)
    }
}

/// First component of a root-relative path, provided something lies below
/// it.  A file placed directly in a root names no team.
fn team_segment(relative: &Path) -> Option<&str> {
    let mut components = relative.components();
    let Some(Component::Normal(first)) = components.next() else {
        return None;
    };
    components.next()?;
    first.to_str()
}
