use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Semantic category assigned to a message body.
///
/// | Type              | Produced by                                          |
/// |-------------------|------------------------------------------------------|
/// | `normal`          | plain text, or structured payloads of any other type |
/// | `idle`            | `idle_notification` and friends                      |
/// | `shutdown`        | `shutdown_request`, `shutdown_response`, ...         |
/// | `task_assignment` | task hand-off payloads                               |
/// | `plan_approval`   | plan approval requests and responses                 |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    Normal,
    Idle,
    Shutdown,
    TaskAssignment,
    PlanApproval,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Idle => "idle",
            Self::Shutdown => "shutdown",
            Self::TaskAssignment => "task_assignment",
            Self::PlanApproval => "plan_approval",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task lifecycle state.  The set is open: values the producers invent later
/// are kept verbatim in [`TaskStatus::Other`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Deleted,
    Other(String),
}

impl TaskStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Deleted => "deleted",
            Self::Other(raw) => raw,
        }
    }
}

impl From<String> for TaskStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "pending" => Self::Pending,
            "in_progress" => Self::InProgress,
            "completed" => Self::Completed,
            "deleted" => Self::Deleted,
            _ => Self::Other(raw),
        }
    }
}

impl From<TaskStatus> for String {
    fn from(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub config_path: String,
    pub lead_agent_id: String,
}

/// Fields written by a team upsert.  `created_at: None` keeps the stored
/// timestamp of an existing team and stamps "now" on a new one.
#[derive(Debug, Clone, Default)]
pub struct TeamUpsert {
    pub name: String,
    pub description: String,
    pub created_at: Option<DateTime<Utc>>,
    pub config_path: String,
    pub lead_agent_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: u64,
    pub team_id: u64,
    pub name: String,
    pub agent_id: String,
    pub agent_type: String,
    pub model: String,
    pub color: String,
    pub cwd: String,
}

impl Member {
    /// `agent_type` marker for members inferred from message traffic.
    pub const SYNTHETIC_KIND: &'static str = "participant";

    pub fn is_synthetic(&self) -> bool {
        self.agent_type == Self::SYNTHETIC_KIND
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewMember {
    pub name: String,
    pub agent_id: String,
    pub agent_type: String,
    pub model: String,
    pub color: String,
    pub cwd: String,
}

impl NewMember {
    pub(crate) fn into_record(self, id: u64, team_id: u64) -> Member {
        Member {
            id,
            team_id,
            name: self.name,
            agent_id: self.agent_id,
            agent_type: self.agent_type,
            model: self.model,
            color: self.color,
            cwd: self.cwd,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub team_id: u64,
    pub inbox_owner: String,
    pub from_agent: String,
    pub text: String,
    pub summary: String,
    /// Opaque producer timestamp; ordered lexically, never parsed.
    pub timestamp: String,
    pub color: String,
    pub read: bool,
    pub msg_type: MessageType,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub inbox_owner: String,
    pub from_agent: String,
    pub text: String,
    pub summary: String,
    pub timestamp: String,
    pub color: String,
    pub read: bool,
    pub msg_type: MessageType,
}

impl NewMessage {
    pub(crate) fn into_record(self, id: u64, team_id: u64) -> Message {
        Message {
            id,
            team_id,
            inbox_owner: self.inbox_owner,
            from_agent: self.from_agent,
            text: self.text,
            summary: self.summary,
            timestamp: self.timestamp,
            color: self.color,
            read: self.read,
            msg_type: self.msg_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub team_id: u64,
    /// Producer-side identifier; unique per team only.
    pub task_id: String,
    pub subject: String,
    pub description: String,
    pub status: TaskStatus,
    pub active_form: String,
    pub owner: String,
    /// Task ids this task blocks.  Not validated; dangling ids are kept.
    pub blocks: Vec<String>,
    pub blocked_by: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub task_id: String,
    pub subject: String,
    pub description: String,
    pub status: TaskStatus,
    pub active_form: String,
    pub owner: String,
    pub blocks: Vec<String>,
    pub blocked_by: Vec<String>,
}

impl NewTask {
    pub(crate) fn into_record(self, id: u64, team_id: u64) -> Task {
        Task {
            id,
            team_id,
            task_id: self.task_id,
            subject: self.subject,
            description: self.description,
            status: self.status,
            active_form: self.active_form,
            owner: self.owner,
            blocks: self.blocks,
            blocked_by: self.blocked_by,
        }
    }
}
