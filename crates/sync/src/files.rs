//! On-disk formats and directory listing.
//!
//! Producers are loosely typed: fields go missing, come back as `null`, or
//! switch between strings and numbers.  Every field here therefore has a
//! default and a lenient decoder, so one odd value never costs a whole file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use teamdeck_store::{NewMember, NewTask, TaskStatus};

use crate::error::InputError;

pub const CONFIG_FILE: &str = "config.json";
pub const INBOX_DIR: &str = "inboxes";
pub const JSON_EXT: &str = "json";

/// `teams/<team>/config.json`
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TeamConfigFile {
    #[serde(deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(deserialize_with = "lenient::string")]
    pub description: String,
    /// Epoch milliseconds.
    #[serde(deserialize_with = "lenient::number")]
    pub created_at: Option<f64>,
    #[serde(deserialize_with = "lenient::string")]
    pub lead_agent_id: String,
    #[serde(deserialize_with = "lenient::objects")]
    pub members: Vec<MemberEntry>,
}

impl TeamConfigFile {
    /// Declared creation time.  Zero and unrepresentable values count as absent.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
            .filter(|ms| ms.is_finite() && *ms != 0.0)
            .and_then(|ms| DateTime::from_timestamp_millis(ms as i64))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MemberEntry {
    #[serde(deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(deserialize_with = "lenient::string")]
    pub agent_id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub agent_type: String,
    #[serde(deserialize_with = "lenient::string")]
    pub model: String,
    #[serde(deserialize_with = "lenient::string")]
    pub color: String,
    #[serde(deserialize_with = "lenient::string")]
    pub cwd: String,
}

impl From<MemberEntry> for NewMember {
    fn from(entry: MemberEntry) -> Self {
        NewMember {
            name: entry.name,
            agent_id: entry.agent_id,
            agent_type: entry.agent_type,
            model: entry.model,
            color: entry.color,
            cwd: entry.cwd,
        }
    }
}

/// One element of `teams/<team>/inboxes/<agent>.json`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InboxEntry {
    #[serde(deserialize_with = "lenient::string")]
    pub from: String,
    #[serde(deserialize_with = "lenient::string")]
    pub text: String,
    #[serde(deserialize_with = "lenient::string")]
    pub summary: String,
    #[serde(deserialize_with = "lenient::string")]
    pub timestamp: String,
    #[serde(deserialize_with = "lenient::string")]
    pub color: String,
    #[serde(deserialize_with = "lenient::flag")]
    pub read: bool,
}

/// A parsed inbox file.  `skipped` counts list elements that were not
/// message objects.
#[derive(Debug, Default)]
pub struct InboxFile {
    pub entries: Vec<InboxEntry>,
    pub skipped: usize,
}

/// `tasks/<team>/<task>.json`
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaskFile {
    #[serde(deserialize_with = "lenient::id")]
    pub id: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub subject: String,
    #[serde(deserialize_with = "lenient::string")]
    pub description: String,
    #[serde(deserialize_with = "lenient::id")]
    pub status: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub active_form: String,
    #[serde(deserialize_with = "lenient::string")]
    pub owner: String,
    #[serde(deserialize_with = "lenient::ids")]
    pub blocks: Vec<String>,
    #[serde(deserialize_with = "lenient::ids")]
    pub blocked_by: Vec<String>,
}

impl TaskFile {
    /// Build the record, taking the id from `fallback_id` (the file stem)
    /// when the payload has none.
    pub fn into_task(self, fallback_id: &str) -> NewTask {
        NewTask {
            task_id: self.id.unwrap_or_else(|| fallback_id.to_string()),
            subject: self.subject,
            description: self.description,
            status: self.status.map(TaskStatus::from).unwrap_or_default(),
            active_form: self.active_form,
            owner: self.owner,
            blocks: self.blocks,
            blocked_by: self.blocked_by,
        }
    }
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, InputError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

pub fn read_inbox(path: &Path) -> Result<InboxFile, InputError> {
    let Value::Array(items) = read_json::<Value>(path)? else {
        return Err(InputError::Shape("inbox is not a list"));
    };

    let mut inbox = InboxFile::default();
    for item in items {
        if !item.is_object() {
            inbox.skipped += 1;
            continue;
        }
        match serde_json::from_value(item) {
            Ok(entry) => inbox.entries.push(entry),
            Err(_) => inbox.skipped += 1,
        }
    }
    Ok(inbox)
}

/// Entries of `dir` ending in `.json` that are not directories, sorted by
/// file name.
pub fn json_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == JSON_EXT) && !path.is_dir() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Immediate subdirectories of `dir`, sorted.
pub fn subdirectories(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// File name without its extension, lossily decoded.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

mod lenient {
    use super::*;

    /// Strings pass through, numbers and booleans are rendered, anything else
    /// (including `null`) becomes empty.
    pub fn string<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
        Ok(scalar_text(&Value::deserialize(de)?).unwrap_or_default())
    }

    pub fn id<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
        Ok(scalar_text(&Value::deserialize(de)?))
    }

    pub fn ids<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<String>, D::Error> {
        Ok(match Value::deserialize(de)? {
            Value::Array(items) => items.iter().filter_map(scalar_text).collect(),
            _ => Vec::new(),
        })
    }

    pub fn number<'de, D: Deserializer<'de>>(de: D) -> Result<Option<f64>, D::Error> {
        Ok(match Value::deserialize(de)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }

    pub fn flag<'de, D: Deserializer<'de>>(de: D) -> Result<bool, D::Error> {
        Ok(matches!(Value::deserialize(de)?, Value::Bool(true)))
    }

    /// Keep only the object elements of a list that decode cleanly.
    pub fn objects<'de, D, T>(de: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(match Value::deserialize(de)? {
            Value::Array(items) => items
                .into_iter()
                .filter(Value::is_object)
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
            _ => Vec::new(),
        })
    }

    fn scalar_text(value: &Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}
