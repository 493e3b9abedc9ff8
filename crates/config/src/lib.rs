use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

// ── Sources ───────────────────────────────────────────────────────────────────

/// The two directory trees mirrored into the store.
///
/// | Key         | Layout                                                     |
/// |-------------|------------------------------------------------------------|
/// | `teams_dir` | `<team>/config.json`, `<team>/inboxes/<agent>.json`        |
/// | `tasks_dir` | `<team>/<task>.json`                                       |
///
/// A leading `~` is expanded to the current user's home directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub teams_dir: String,
    pub tasks_dir: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            teams_dir: "~/.claude/teams".to_string(),
            tasks_dir: "~/.claude/tasks".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Location of the redb file holding the reconciled records.
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: ".teamdeck/store.redb".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Start the filesystem-event source after the startup scan.  With this
    /// off the daemon only reconciles on `rescan`.
    pub enabled: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub socket_path: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: "/tmp/teamdeck.sock".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub sources: SourcesConfig,
    pub store: StoreConfig,
    pub watcher: WatcherConfig,
    pub daemon: DaemonConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }

        // Env overrides take precedence over the config file.
        if let Some(value) = non_empty_env("TEAMDECK_TEAMS_DIR") {
            config.sources.teams_dir = value;
        }
        if let Some(value) = non_empty_env("TEAMDECK_TASKS_DIR") {
            config.sources.tasks_dir = value;
        }
        if let Some(value) = non_empty_env("TEAMDECK_STORE_PATH") {
            config.store.path = value;
        }
        if let Some(value) = non_empty_env("TEAMDECK_SOCKET") {
            config.daemon.socket_path = value;
        }

        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }

    pub fn teams_root(&self) -> PathBuf {
        expand_home(&self.sources.teams_dir)
    }

    pub fn tasks_root(&self) -> PathBuf {
        expand_home(&self.sources.tasks_dir)
    }

    pub fn store_path(&self) -> PathBuf {
        expand_home(&self.store.path)
    }

    pub fn socket_path(&self) -> PathBuf {
        expand_home(&self.daemon.socket_path)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Expand a leading `~` (alone or followed by a separator).  Paths without it,
/// or hosts without a resolvable home directory, are returned unchanged.
pub fn expand_home(raw: &str) -> PathBuf {
    let rest = if raw == "~" {
        Some("")
    } else {
        raw.strip_prefix("~/")
    };
    match (rest, dirs::home_dir()) {
        (Some(rest), Some(home)) if rest.is_empty() => home,
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(raw),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
