//! Transactional record store backed by [`redb`].
//!
//! The JSON files on disk are the **source of truth**; this store is the
//! normalized mirror the query layer reads.  Every mutating call is exactly
//! one write transaction, so a collection replace is atomic: readers see
//! either the old collection or the new one, never a mix.
//!
//! # Tables
//!
//! | Name       | Key           | Value                          |
//! |------------|---------------|--------------------------------|
//! | `teams`    | team name     | JSON [`Team`]                  |
//! | `members`  | team id (u64) | JSON `Vec<Member>`             |
//! | `messages` | team id (u64) | JSON `Vec<Message>`            |
//! | `tasks`    | team id (u64) | JSON `Vec<Task>`               |
//! | `meta`     | key (&str)    | u64 counters (team id seq.)    |
//!
//! redb serialises writers and gives readers MVCC snapshots, so a reader
//! never waits on a reconciliation in progress.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::schema::{
    Member, Message, NewMember, NewMessage, NewTask, Task, TaskStatus, Team, TeamUpsert,
};

// ── redb table definitions ────────────────────────────────────────────────────

/// Per-team collection table: `team_id → JSON array of records`.
type CollectionTable = TableDefinition<'static, u64, &'static [u8]>;

const TEAMS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("teams");
const MEMBERS_TABLE: CollectionTable = TableDefinition::new("members");
const MESSAGES_TABLE: CollectionTable = TableDefinition::new("messages");
const TASKS_TABLE: CollectionTable = TableDefinition::new("tasks");
const META_TABLE: TableDefinition<&str, u64> = TableDefinition::new("meta");

const NEXT_TEAM_ID_KEY: &str = "next_team_id";

/// Aggregate counts over the whole store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub team_count: usize,
    pub member_count: usize,
    pub message_count: usize,
    pub task_count: usize,
    pub completed_count: usize,
    /// Completed tasks as a percentage 0.0 – 100.0, one decimal place.
    pub completion_rate: f64,
}

pub struct TeamStore {
    db: Database,
    path: PathBuf,
}

impl TeamStore {
    /// Open or create the store file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Database::create(&path)?;

        // Ensure tables exist so read transactions never hit a missing table.
        {
            let tx = db.begin_write()?;
            tx.open_table(TEAMS_TABLE)?;
            tx.open_table(MEMBERS_TABLE)?;
            tx.open_table(MESSAGES_TABLE)?;
            tx.open_table(TASKS_TABLE)?;
            tx.open_table(META_TABLE)?;
            tx.commit()?;
        }

        tracing::debug!(path = %path.display(), "team store opened");
        Ok(Self { db, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ── Teams ─────────────────────────────────────────────────────────────────

    /// Create the team if its name is unseen, else update it in place.  The
    /// team id is stable across updates.
    pub fn upsert_team(&self, upsert: TeamUpsert) -> Result<Team> {
        let tx = self.db.begin_write()?;
        let team = {
            let mut teams = tx.open_table(TEAMS_TABLE)?;
            let existing: Option<Team> = match teams.get(upsert.name.as_str())? {
                Some(raw) => Some(decode(raw.value())?),
                None => None,
            };
            let team = match existing {
                Some(mut team) => {
                    team.description = upsert.description;
                    if let Some(created_at) = upsert.created_at {
                        team.created_at = created_at;
                    }
                    team.config_path = upsert.config_path;
                    team.lead_agent_id = upsert.lead_agent_id;
                    team
                }
                None => Team {
                    id: allocate_team_id(&tx)?,
                    name: upsert.name,
                    description: upsert.description,
                    created_at: upsert.created_at.unwrap_or_else(Utc::now),
                    config_path: upsert.config_path,
                    lead_agent_id: upsert.lead_agent_id,
                },
            };
            teams.insert(team.name.as_str(), encode(&team)?.as_slice())?;
            team
        };
        tx.commit()?;
        Ok(team)
    }

    pub fn team_by_name(&self, name: &str) -> Result<Option<Team>> {
        let tx = self.db.begin_read()?;
        let teams = tx.open_table(TEAMS_TABLE)?;
        match teams.get(name)? {
            Some(raw) => Ok(Some(decode(raw.value())?)),
            None => Ok(None),
        }
    }

    /// All teams, ordered by name.
    pub fn teams(&self) -> Result<Vec<Team>> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(TEAMS_TABLE)?;
        let mut teams = Vec::new();
        for row in table.iter()? {
            let (_, raw) = row?;
            teams.push(decode(raw.value())?);
        }
        Ok(teams)
    }

    /// Remove a team together with its members, messages and tasks in one
    /// transaction.  Returns `false` when no such team exists.
    pub fn delete_team(&self, name: &str) -> Result<bool> {
        let tx = self.db.begin_write()?;
        let removed: Option<Team> = {
            let mut teams = tx.open_table(TEAMS_TABLE)?;
            match teams.remove(name)? {
                Some(raw) => Some(decode(raw.value())?),
                None => None,
            }
        };
        let Some(team) = removed else {
            tx.abort()?;
            return Ok(false);
        };
        for def in [MEMBERS_TABLE, MESSAGES_TABLE, TASKS_TABLE] {
            let mut table = tx.open_table(def)?;
            table.remove(team.id)?;
        }
        tx.commit()?;
        Ok(true)
    }

    // ── Collections ───────────────────────────────────────────────────────────

    pub fn replace_members(&self, team_id: u64, members: Vec<NewMember>) -> Result<Vec<Member>> {
        self.replace_collection(MEMBERS_TABLE, team_id, members, NewMember::into_record)
    }

    pub fn replace_messages(
        &self,
        team_id: u64,
        messages: Vec<NewMessage>,
    ) -> Result<Vec<Message>> {
        self.replace_collection(MESSAGES_TABLE, team_id, messages, NewMessage::into_record)
    }

    pub fn replace_tasks(&self, team_id: u64, tasks: Vec<NewTask>) -> Result<Vec<Task>> {
        self.replace_collection(TASKS_TABLE, team_id, tasks, NewTask::into_record)
    }

    pub fn members(&self, team_id: u64) -> Result<Vec<Member>> {
        self.read_collection(MEMBERS_TABLE, team_id)
    }

    pub fn messages(&self, team_id: u64) -> Result<Vec<Message>> {
        self.read_collection(MESSAGES_TABLE, team_id)
    }

    pub fn tasks(&self, team_id: u64) -> Result<Vec<Task>> {
        self.read_collection(TASKS_TABLE, team_id)
    }

    /// Counts across every team, read from one snapshot.
    pub fn stats(&self) -> Result<StoreStats> {
        let tx = self.db.begin_read()?;
        let team_count = tx.open_table(TEAMS_TABLE)?.len()? as usize;

        let mut member_count = 0;
        for row in tx.open_table(MEMBERS_TABLE)?.iter()? {
            let (_, raw) = row?;
            member_count += decode::<Vec<Member>>(raw.value())?.len();
        }
        let mut message_count = 0;
        for row in tx.open_table(MESSAGES_TABLE)?.iter()? {
            let (_, raw) = row?;
            message_count += decode::<Vec<Message>>(raw.value())?.len();
        }
        let mut task_count = 0;
        let mut completed_count = 0;
        for row in tx.open_table(TASKS_TABLE)?.iter()? {
            let (_, raw) = row?;
            let tasks: Vec<Task> = decode(raw.value())?;
            task_count += tasks.len();
            completed_count += tasks
                .iter()
                .filter(|task| task.status == TaskStatus::Completed)
                .count();
        }

        let completion_rate = if task_count == 0 {
            0.0
        } else {
            (completed_count as f64 / task_count as f64 * 1000.0).round() / 10.0
        };

        Ok(StoreStats {
            team_count,
            member_count,
            message_count,
            task_count,
            completed_count,
            completion_rate,
        })
    }

    /// Per-team collection sizes keyed by team name, for status output.
    pub fn collection_sizes(&self) -> Result<BTreeMap<String, (usize, usize, usize)>> {
        let mut sizes = BTreeMap::new();
        for team in self.teams()? {
            let counts = (
                self.members(team.id)?.len(),
                self.messages(team.id)?.len(),
                self.tasks(team.id)?.len(),
            );
            sizes.insert(team.name, counts);
        }
        Ok(sizes)
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    /// Delete-then-reinsert one team's collection.  Record ids are 1-based
    /// positions within the collection, so replacing with identical input
    /// leaves the stored bytes identical.
    fn replace_collection<N, R, F>(
        &self,
        def: CollectionTable,
        team_id: u64,
        items: Vec<N>,
        build: F,
    ) -> Result<Vec<R>>
    where
        R: Serialize,
        F: Fn(N, u64, u64) -> R,
    {
        let records: Vec<R> = items
            .into_iter()
            .zip(1u64..)
            .map(|(item, id)| build(item, id, team_id))
            .collect();

        let tx = self.db.begin_write()?;
        {
            let mut table = tx.open_table(def)?;
            table.remove(team_id)?;
            if !records.is_empty() {
                table.insert(team_id, encode(&records)?.as_slice())?;
            }
        }
        tx.commit()?;
        Ok(records)
    }

    fn read_collection<R: DeserializeOwned>(
        &self,
        def: CollectionTable,
        team_id: u64,
    ) -> Result<Vec<R>> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(def)?;
        match table.get(team_id)? {
            Some(raw) => Ok(decode(raw.value())?),
            None => Ok(Vec::new()),
        }
    }
}

/// Reserve the next team id.  Team ids are never reused, even after a
/// team is deleted.
fn allocate_team_id(tx: &WriteTransaction) -> Result<u64> {
    let mut meta = tx.open_table(META_TABLE)?;
    let next = meta.get(NEXT_TEAM_ID_KEY)?.map(|raw| raw.value()).unwrap_or(1);
    meta.insert(NEXT_TEAM_ID_KEY, next + 1)?;
    Ok(next)
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

fn decode<T: DeserializeOwned>(raw: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(raw)?)
}
