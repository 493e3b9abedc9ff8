//! Filesystem-event source feeding the incremental reconciler.
//!
//! `notify` callbacks only filter and enqueue; a single worker thread drains
//! the queue and runs [`Reconciler::on_path_changed`] one path at a time, so
//! two events never rewrite the same team concurrently.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use teamdeck_sync::Reconciler;
use teamdeck_sync::files::JSON_EXT;
use tracing::{debug, info, warn};

use crate::notifier::Notifier;
use crate::recovery::isolate_pass;

enum WatchMessage {
    Changed(PathBuf),
    Stop,
}

pub struct WatchService {
    watcher: Option<RecommendedWatcher>,
    tx: Sender<WatchMessage>,
    worker: Option<JoinHandle<()>>,
}

impl WatchService {
    /// Start the worker, then watch both roots recursively.  A root that
    /// does not exist yet is skipped with a warning.
    pub fn start(reconciler: Arc<Reconciler>, notifier: Arc<Notifier>) -> Result<Self> {
        let roots = reconciler.roots().clone();
        let (tx, rx) = mpsc::channel();
        let worker = spawn_worker(rx, reconciler, notifier)?;

        let event_tx = tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for path in relevant_paths(&event) {
                    if event_tx.send(WatchMessage::Changed(path)).is_err() {
                        break;
                    }
                }
            }
            Err(err) => warn!(?err, "filesystem watcher error"),
        })
        .context("creating filesystem watcher")?;

        for root in [&roots.teams, &roots.tasks] {
            if !root.is_dir() {
                warn!(path = %root.display(), "watch root does not exist; not watching it");
                continue;
            }
            watcher
                .watch(root, RecursiveMode::Recursive)
                .with_context(|| format!("watching {}", root.display()))?;
            info!(path = %root.display(), "watching");
        }

        Ok(Self {
            watcher: Some(watcher),
            tx,
            worker: Some(worker),
        })
    }

    /// Stop accepting events, finish everything already queued, then join
    /// the worker.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the watcher ends new deliveries before the marker is queued.
        self.watcher.take();
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = self.tx.send(WatchMessage::Stop);
        if worker.join().is_err() {
            warn!("watch worker panicked");
        }
        info!("watch service stopped");
    }
}

impl Drop for WatchService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_worker(
    rx: Receiver<WatchMessage>,
    reconciler: Arc<Reconciler>,
    notifier: Arc<Notifier>,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("teamdeck-watch".to_string())
        .spawn(move || {
            while let Ok(message) = rx.recv() {
                let WatchMessage::Changed(path) = message else {
                    break;
                };
                debug!(path = %path.display(), "reconciling change");
                let changed = isolate_pass("incremental", || reconciler.on_path_changed(&path));
                if let Some(event) = changed {
                    notifier.broadcast(&event);
                }
            }
        })
        .context("spawning watch worker")
}

/// Paths of a create/modify event worth reconciling: `.json` files, never
/// directories.
fn relevant_paths(event: &Event) -> Vec<PathBuf> {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return Vec::new();
    }
    event
        .paths
        .iter()
        .filter(|path| is_json_file(path))
        .cloned()
        .collect()
}

fn is_json_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == JSON_EXT) && !path.is_dir()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind, RemoveKind};
    use std::fs;
    use teamdeck_store::TeamStore;
    use teamdeck_sync::{ChangeKind, WatchRoots};
    use tempfile::TempDir;

    #[test]
    fn only_json_create_and_modify_events_pass() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("bob.json");
        fs::write(&file, "[]").unwrap();
        let folder = dir.path().join("inboxes.json");
        fs::create_dir(&folder).unwrap();
        let text = dir.path().join("notes.txt");

        let create = Event::new(EventKind::Create(CreateKind::File))
            .add_path(file.clone())
            .add_path(folder.clone())
            .add_path(text.clone());
        assert_eq!(relevant_paths(&create), vec![file.clone()]);

        let modify = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(file.clone());
        assert_eq!(relevant_paths(&modify), vec![file.clone()]);

        let remove = Event::new(EventKind::Remove(RemoveKind::File)).add_path(file.clone());
        assert!(relevant_paths(&remove).is_empty());

        let access = Event::new(EventKind::Access(AccessKind::Any)).add_path(file);
        assert!(relevant_paths(&access).is_empty());
    }

    #[test]
    fn worker_drains_queue_before_stopping() {
        let dir = TempDir::new().unwrap();
        let teams = dir.path().join("teams");
        let tasks = dir.path().join("tasks");
        fs::create_dir_all(teams.join("alpha/inboxes")).unwrap();
        fs::create_dir_all(&tasks).unwrap();
        fs::write(teams.join("alpha/config.json"), r#"{"name": "alpha"}"#).unwrap();
        fs::write(
            teams.join("alpha/inboxes/bob.json"),
            r#"[{"from": "lead", "text": "hi"}]"#,
        )
        .unwrap();

        let store = Arc::new(TeamStore::open(dir.path().join("store.redb")).unwrap());
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            WatchRoots::new(&teams, &tasks),
        ));
        let notifier = Arc::new(Notifier::new());
        let (_, mut events) = notifier.subscribe_channel();

        let (tx, rx) = mpsc::channel();
        let worker = spawn_worker(rx, reconciler, notifier).unwrap();
        tx.send(WatchMessage::Changed(teams.join("alpha/config.json")))
            .unwrap();
        tx.send(WatchMessage::Changed(teams.join("alpha/inboxes/bob.json")))
            .unwrap();
        tx.send(WatchMessage::Stop).unwrap();
        tx.send(WatchMessage::Changed(teams.join("alpha/config.json")))
            .unwrap();
        worker.join().unwrap();

        assert_eq!(events.try_recv().unwrap().kind, ChangeKind::TeamUpdate);
        assert_eq!(events.try_recv().unwrap().kind, ChangeKind::MessageNew);
        assert!(events.try_recv().is_err());

        let alpha = store.team_by_name("alpha").unwrap().unwrap();
        assert_eq!(store.messages(alpha.id).unwrap().len(), 1);
    }

    #[test]
    fn service_starts_with_missing_roots_and_stops_cleanly() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(TeamStore::open(dir.path().join("store.redb")).unwrap());
        let reconciler = Arc::new(Reconciler::new(
            store,
            WatchRoots::new(dir.path().join("teams"), dir.path().join("tasks")),
        ));
        let service = WatchService::start(reconciler, Arc::new(Notifier::new())).unwrap();
        service.stop();
    }

    #[test]
    fn file_writes_reach_subscribers() {
        let dir = TempDir::new().unwrap();
        let teams = dir.path().join("teams");
        let tasks = dir.path().join("tasks");
        fs::create_dir_all(teams.join("alpha/inboxes")).unwrap();
        fs::create_dir_all(tasks.join("alpha")).unwrap();
        fs::write(teams.join("alpha/config.json"), r#"{"name": "alpha"}"#).unwrap();

        let store = Arc::new(TeamStore::open(dir.path().join("store.redb")).unwrap());
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            WatchRoots::new(&teams, &tasks),
        ));
        reconciler.full_scan().unwrap();
        let notifier = Arc::new(Notifier::new());
        let (_, mut events) = notifier.subscribe_channel();
        let service = WatchService::start(reconciler, notifier).unwrap();

        fs::write(
            teams.join("alpha/inboxes/bob.json"),
            r#"[{"from": "lead", "text": "{\"type\":\"shutdown_request\"}"}]"#,
        )
        .unwrap();
        fs::write(tasks.join("alpha/1.json"), r#"{"id": "1"}"#).unwrap();

        let mut kinds = Vec::new();
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
        while std::time::Instant::now() < deadline
            && !(kinds.contains(&ChangeKind::MessageNew) && kinds.contains(&ChangeKind::TaskUpdate))
        {
            match events.try_recv() {
                Ok(event) => {
                    assert_eq!(event.team(), "alpha");
                    kinds.push(event.kind);
                }
                Err(_) => thread::sleep(std::time::Duration::from_millis(20)),
            }
        }
        service.stop();

        assert!(kinds.contains(&ChangeKind::MessageNew));
        assert!(kinds.contains(&ChangeKind::TaskUpdate));
        let alpha = store.team_by_name("alpha").unwrap().unwrap();
        let messages = store.messages(alpha.id).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].msg_type, teamdeck_store::MessageType::Shutdown);
        assert_eq!(store.tasks(alpha.id).unwrap().len(), 1);
    }
}
