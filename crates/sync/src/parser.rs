//! Turns one team's files into store records.
//!
//! Every step is fail-soft: a bad file is logged and skipped, a missing file
//! means "nothing here".  Only store failures propagate as [`SyncError`].

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use teamdeck_store::{Member, NewMember, NewMessage, NewTask, Team, TeamStore, TeamUpsert};
use tracing::{debug, info, warn};

use crate::classify::classify;
use crate::error::SyncError;
use crate::files::{self, CONFIG_FILE, INBOX_DIR, TeamConfigFile, TaskFile};
use crate::guard;

/// Colours handed to members inferred from message traffic, in order.
pub const SYNTHETIC_PALETTE: [&str; 8] = [
    "#3b82f6", "#22c55e", "#ef4444", "#f59e0b", "#8b5cf6", "#ec4899", "#06b6d4", "#84cc16",
];

/// Outcome of parsing one team directory.
#[derive(Debug, Clone, PartialEq)]
pub enum TeamParse {
    /// Config read and all collections replaced.
    Parsed(Team),
    /// No config file; the directory does not describe a team.
    Absent,
    /// The directory escaped its root or its config was unreadable.  Stored
    /// records for the team were left alone.
    Rejected,
}

impl TeamParse {
    pub fn into_team(self) -> Option<Team> {
        match self {
            Self::Parsed(team) => Some(team),
            Self::Absent | Self::Rejected => None,
        }
    }
}

/// Parse `team_dir` (a directory under `teams_root`): upsert the team, then
/// replace its members and messages.
pub fn parse_team(
    store: &TeamStore,
    teams_root: &Path,
    team_dir: &Path,
) -> Result<TeamParse, SyncError> {
    let config_path = team_dir.join(CONFIG_FILE);
    if !guard::confine(teams_root, team_dir) || !guard::confine(teams_root, &config_path) {
        warn!(
            target: "security",
            path = %team_dir.display(),
            root = %teams_root.display(),
            "team directory resolves outside the teams root; skipped"
        );
        return Ok(TeamParse::Rejected);
    }

    if !config_path.is_file() {
        debug!(path = %team_dir.display(), "no team config; not a team");
        return Ok(TeamParse::Absent);
    }

    let config: TeamConfigFile = match files::read_json(&config_path) {
        Ok(config) => config,
        Err(err) => {
            warn!(path = %config_path.display(), %err, "team config unreadable; keeping stored state");
            return Ok(TeamParse::Rejected);
        }
    };

    let name = if config.name.trim().is_empty() {
        team_dir
            .file_name()
            .map(|dir| dir.to_string_lossy().into_owned())
            .unwrap_or_default()
    } else {
        config.name.clone()
    };
    let created_at = config.created_at();

    let team = store.upsert_team(TeamUpsert {
        name,
        description: config.description,
        created_at,
        config_path: config_path.display().to_string(),
        lead_agent_id: config.lead_agent_id,
    })?;

    let mut members = declared_members(config.members.into_iter().map(NewMember::from));

    let inbox_dir = team_dir.join(INBOX_DIR);
    let messages = if inbox_dir.is_dir() {
        read_inboxes(teams_root, &inbox_dir)
    } else {
        Some(Vec::new())
    };

    match messages {
        Some(messages) => {
            members.extend(synthetic_members(&members, &messages));
            store.replace_members(team.id, members)?;
            store.replace_messages(team.id, messages)?;
        }
        None => {
            // Inbox listing failed; keep stored messages and infer from them.
            let stored: Vec<NewMessage> = store
                .messages(team.id)?
                .into_iter()
                .map(|m| NewMessage {
                    inbox_owner: m.inbox_owner,
                    from_agent: m.from_agent,
                    ..Default::default()
                })
                .collect();
            members.extend(synthetic_members(&members, &stored));
            store.replace_members(team.id, members)?;
        }
    }

    debug!(team = %team.name, id = team.id, "team parsed");
    Ok(TeamParse::Parsed(team))
}

/// Replace `team_id`'s tasks from `tasks_root/<team_name>/`.  Returns how many
/// tasks are stored afterwards, or `None` when the directory was rejected or
/// unlistable and the stored tasks were left alone.
pub fn parse_tasks_for_team(
    store: &TeamStore,
    tasks_root: &Path,
    team_name: &str,
    team_id: u64,
) -> Result<Option<usize>, SyncError> {
    let task_dir = tasks_root.join(team_name);
    if !guard::confine(tasks_root, &task_dir) {
        warn!(
            target: "security",
            team = %team_name,
            path = %task_dir.display(),
            "task directory resolves outside the tasks root; skipped"
        );
        return Ok(None);
    }

    if !task_dir.is_dir() {
        if !store.tasks(team_id)?.is_empty() {
            info!(team = %team_name, "task directory gone; clearing tasks");
            store.replace_tasks(team_id, Vec::new())?;
        }
        return Ok(Some(0));
    }

    let paths = match files::json_files(&task_dir) {
        Ok(paths) => paths,
        Err(err) => {
            warn!(path = %task_dir.display(), %err, "task directory unlistable; keeping stored tasks");
            return Ok(None);
        }
    };

    let mut tasks: Vec<NewTask> = Vec::with_capacity(paths.len());
    for path in paths {
        if !guard::confine(tasks_root, &path) {
            warn!(target: "security", path = %path.display(), "task file resolves outside the tasks root; skipped");
            continue;
        }
        match files::read_json::<TaskFile>(&path) {
            Ok(task) => tasks.push(task.into_task(&files::file_stem(&path))),
            Err(err) => warn!(path = %path.display(), %err, "skipping unreadable task file"),
        }
    }

    let stored = store.replace_tasks(team_id, tasks)?;
    debug!(team = %team_name, tasks = stored.len(), "tasks parsed");
    Ok(Some(stored.len()))
}

/// Read every inbox file.  `None` only when the directory itself cannot be
/// listed.
fn read_inboxes(teams_root: &Path, inbox_dir: &Path) -> Option<Vec<NewMessage>> {
    let paths = match files::json_files(inbox_dir) {
        Ok(paths) => paths,
        Err(err) => {
            warn!(path = %inbox_dir.display(), %err, "inbox directory unlistable; keeping stored messages");
            return None;
        }
    };

    let mut messages = Vec::new();
    for path in paths {
        if !guard::confine(teams_root, &path) {
            warn!(target: "security", path = %path.display(), "inbox file resolves outside the teams root; skipped");
            continue;
        }
        let inbox = match files::read_inbox(&path) {
            Ok(inbox) => inbox,
            Err(err) => {
                warn!(path = %path.display(), %err, "skipping unreadable inbox");
                continue;
            }
        };
        if inbox.skipped > 0 {
            warn!(path = %path.display(), skipped = inbox.skipped, "inbox contained non-message entries");
        }

        let owner = files::file_stem(&path);
        messages.extend(inbox.entries.into_iter().map(|entry| NewMessage {
            msg_type: classify(&entry.text),
            inbox_owner: owner.clone(),
            from_agent: entry.from,
            text: entry.text,
            summary: entry.summary,
            timestamp: entry.timestamp,
            color: entry.color,
            read: entry.read,
        }));
    }
    Some(messages)
}

/// Config members with repeated names dropped (first wins).
fn declared_members(entries: impl Iterator<Item = NewMember>) -> Vec<NewMember> {
    let mut seen = HashSet::new();
    entries
        .filter(|member| seen.insert(member.name.clone()))
        .collect()
}

/// Members for every sender or inbox owner not already in `known`, sorted
/// by name.  Colours continue the palette from the number of known members.
fn synthetic_members(known: &[NewMember], messages: &[NewMessage]) -> Vec<NewMember> {
    let known: HashSet<&str> = known.iter().map(|m| m.name.as_str()).collect();
    let discovered: BTreeSet<&str> = messages
        .iter()
        .flat_map(|m| [m.from_agent.as_str(), m.inbox_owner.as_str()])
        .filter(|name| !name.is_empty() && !known.contains(name))
        .collect();

    discovered
        .into_iter()
        .enumerate()
        .map(|(offset, name)| NewMember {
            name: name.to_string(),
            agent_type: Member::SYNTHETIC_KIND.to_string(),
            color: SYNTHETIC_PALETTE[(known.len() + offset) % SYNTHETIC_PALETTE.len()]
                .to_string(),
            ..Default::default()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use teamdeck_store::{MessageType, TaskStatus};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        teams: std::path::PathBuf,
        tasks: std::path::PathBuf,
        store: TeamStore,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let teams = dir.path().join("teams");
        let tasks = dir.path().join("tasks");
        fs::create_dir_all(&teams).unwrap();
        fs::create_dir_all(&tasks).unwrap();
        let store = TeamStore::open(dir.path().join("store.redb")).unwrap();
        Fixture {
            _dir: dir,
            teams,
            tasks,
            store,
        }
    }

    fn write(path: &Path, body: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    #[test]
    fn parses_config_members_and_messages() {
        let fx = fixture();
        let team_dir = fx.teams.join("alpha");
        write(
            &team_dir.join("config.json"),
            r#"{"name": "alpha", "description": "demo", "createdAt": 1700000000000,
                "leadAgentId": "lead@alpha",
                "members": [{"name": "lead", "agentType": "team-lead"}, {"name": "bob"}]}"#,
        );
        write(
            &team_dir.join("inboxes/bob.json"),
            r#"[{"from": "lead", "text": "{\"type\":\"task_assignment\"}", "timestamp": "2024-01-01T00:00:00Z"},
                {"from": "lead", "text": "hello", "read": true}]"#,
        );

        let team = parse_team(&fx.store, &fx.teams, &team_dir)
            .unwrap()
            .into_team()
            .unwrap();
        assert_eq!(team.name, "alpha");
        assert_eq!(team.description, "demo");
        assert_eq!(team.lead_agent_id, "lead@alpha");
        assert_eq!(team.created_at.timestamp_millis(), 1_700_000_000_000);

        let members = fx.store.members(team.id).unwrap();
        assert_eq!(
            members.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
            vec!["lead", "bob"]
        );
        assert!(members.iter().all(|m| !m.is_synthetic()));

        let messages = fx.store.messages(team.id).unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m.inbox_owner == "bob"));
        assert_eq!(messages[0].msg_type, MessageType::TaskAssignment);
        assert_eq!(messages[1].msg_type, MessageType::Normal);
        assert!(messages[1].read);
    }

    #[test]
    fn missing_config_means_absent() {
        let fx = fixture();
        let team_dir = fx.teams.join("empty");
        fs::create_dir_all(&team_dir).unwrap();
        assert_eq!(
            parse_team(&fx.store, &fx.teams, &team_dir).unwrap(),
            TeamParse::Absent
        );
        assert!(fx.store.teams().unwrap().is_empty());
    }

    #[test]
    fn malformed_config_leaves_stored_team_untouched() {
        let fx = fixture();
        let team_dir = fx.teams.join("alpha");
        write(
            &team_dir.join("config.json"),
            r#"{"name": "alpha", "members": [{"name": "lead"}]}"#,
        );
        let team = parse_team(&fx.store, &fx.teams, &team_dir)
            .unwrap()
            .into_team()
            .unwrap();

        write(&team_dir.join("config.json"), r#"{"name": "alpha", "#);
        assert_eq!(
            parse_team(&fx.store, &fx.teams, &team_dir).unwrap(),
            TeamParse::Rejected
        );
        assert_eq!(fx.store.members(team.id).unwrap().len(), 1);
    }

    #[test]
    fn name_falls_back_to_directory() {
        let fx = fixture();
        let team_dir = fx.teams.join("gamma");
        write(&team_dir.join("config.json"), r#"{"description": "nameless"}"#);

        let team = parse_team(&fx.store, &fx.teams, &team_dir)
            .unwrap()
            .into_team()
            .unwrap();
        assert_eq!(team.name, "gamma");
    }

    #[test]
    fn unreadable_inbox_does_not_block_siblings() {
        let fx = fixture();
        let team_dir = fx.teams.join("alpha");
        write(&team_dir.join("config.json"), r#"{"name": "alpha"}"#);
        write(&team_dir.join("inboxes/broken.json"), "[{");
        write(&team_dir.join("inboxes/dict.json"), r#"{"from": "x"}"#);
        write(&team_dir.join("inboxes/ok.json"), r#"[{"from": "lead", "text": "hi"}]"#);

        let team = parse_team(&fx.store, &fx.teams, &team_dir)
            .unwrap()
            .into_team()
            .unwrap();
        let messages = fx.store.messages(team.id).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].inbox_owner, "ok");
    }

    #[test]
    fn inferred_members_get_sorted_palette_colours() {
        let fx = fixture();
        let team_dir = fx.teams.join("alpha");
        write(
            &team_dir.join("config.json"),
            r#"{"name": "alpha", "members": [{"name": "lead"}, {"name": "lead"}]}"#,
        );
        write(
            &team_dir.join("inboxes/lead.json"),
            r#"[{"from": "zed", "text": "a"}, {"from": "amy", "text": "b"}, {"from": "zed", "text": "c"}]"#,
        );

        let team = parse_team(&fx.store, &fx.teams, &team_dir)
            .unwrap()
            .into_team()
            .unwrap();
        let members = fx.store.members(team.id).unwrap();
        let names: Vec<&str> = members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["lead", "amy", "zed"]);

        assert!(!members[0].is_synthetic());
        assert!(members[1].is_synthetic());
        assert_eq!(members[1].color, SYNTHETIC_PALETTE[1]);
        assert_eq!(members[2].color, SYNTHETIC_PALETTE[2]);

        // Re-parsing does not duplicate them.
        parse_team(&fx.store, &fx.teams, &team_dir).unwrap();
        assert_eq!(fx.store.members(team.id).unwrap(), members);
    }

    #[test]
    fn palette_wraps_around() {
        let known: Vec<NewMember> = Vec::new();
        let messages: Vec<NewMessage> = (0..10)
            .map(|i| NewMessage {
                from_agent: format!("agent{i:02}"),
                ..Default::default()
            })
            .collect();
        let inferred = synthetic_members(&known, &messages);
        assert_eq!(inferred.len(), 10);
        assert_eq!(inferred[8].color, SYNTHETIC_PALETTE[0]);
        assert_eq!(inferred[9].color, SYNTHETIC_PALETTE[1]);
    }

    #[test]
    fn tasks_are_replaced_wholesale() {
        let fx = fixture();
        let team = fx
            .store
            .upsert_team(TeamUpsert {
                name: "alpha".to_string(),
                ..Default::default()
            })
            .unwrap();
        let dir = fx.tasks.join("alpha");
        write(
            &dir.join("1.json"),
            r#"{"id": "1", "subject": "plan", "status": "completed", "blocks": ["2"]}"#,
        );
        write(&dir.join("2.json"), r#"{"subject": "build", "blockedBy": ["1", "99"]}"#);
        write(&dir.join("3.json"), "not json");

        let count = parse_tasks_for_team(&fx.store, &fx.tasks, "alpha", team.id).unwrap();
        assert_eq!(count, Some(2));
        let tasks = fx.store.tasks(team.id).unwrap();
        assert_eq!(tasks[0].status, TaskStatus::Completed);
        assert_eq!(tasks[1].task_id, "2");
        assert_eq!(tasks[1].status, TaskStatus::Pending);
        assert_eq!(tasks[1].blocked_by, vec!["1", "99"]);

        fs::remove_file(dir.join("2.json")).unwrap();
        parse_tasks_for_team(&fx.store, &fx.tasks, "alpha", team.id).unwrap();
        assert_eq!(fx.store.tasks(team.id).unwrap().len(), 1);

        fs::remove_dir_all(&dir).unwrap();
        assert_eq!(
            parse_tasks_for_team(&fx.store, &fx.tasks, "alpha", team.id).unwrap(),
            Some(0)
        );
        assert!(fx.store.tasks(team.id).unwrap().is_empty());
    }

    #[test]
    fn traversing_team_name_is_rejected() {
        let fx = fixture();
        let team = fx
            .store
            .upsert_team(TeamUpsert {
                name: "../teams".to_string(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(
            parse_tasks_for_team(&fx.store, &fx.tasks, "../teams", team.id).unwrap(),
            None
        );
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_team_directory_is_rejected() {
        let fx = fixture();
        let outside = fx.teams.parent().unwrap().join("outside");
        write(&outside.join("config.json"), r#"{"name": "intruder"}"#);
        let link = fx.teams.join("intruder");
        std::os::unix::fs::symlink(&outside, &link).unwrap();

        assert_eq!(
            parse_team(&fx.store, &fx.teams, &link).unwrap(),
            TeamParse::Rejected
        );
        assert!(fx.store.team_by_name("intruder").unwrap().is_none());
    }
}
