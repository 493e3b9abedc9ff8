//! Reconciliation daemon: startup scan, watch service, and a Unix-socket
//! control surface speaking newline-delimited JSON.

mod connection;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use teamdeck_config::AppConfig;
use teamdeck_store::TeamStore;
use teamdeck_sync::{Reconciler, WatchRoots};
use tokio::net::UnixListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::DaemonStatus;
use crate::notifier::Notifier;
use crate::recovery::isolate_pass;
use crate::watcher::WatchService;

struct DaemonState {
    reconciler: Arc<Reconciler>,
    notifier: Arc<Notifier>,
    watching: bool,
    started_at: Instant,
}

impl DaemonState {
    fn status(&self) -> Result<DaemonStatus> {
        let roots = self.reconciler.roots();
        Ok(DaemonStatus {
            teams_root: roots.teams.display().to_string(),
            tasks_root: roots.tasks.display().to_string(),
            store_path: self.reconciler.store().path().display().to_string(),
            watching: self.watching,
            subscribers: self.notifier.len(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            stats: self.reconciler.store().stats()?,
        })
    }
}

pub async fn run_daemon(config: AppConfig) -> Result<()> {
    let socket_path = config.socket_path();
    if socket_path.exists() {
        let _ = std::fs::remove_file(&socket_path);
    }

    let store_path = config.store_path();
    let store = Arc::new(
        TeamStore::open(&store_path)
            .with_context(|| format!("opening store at {}", store_path.display()))?,
    );
    let roots = WatchRoots::new(config.teams_root(), config.tasks_root());
    let reconciler = Arc::new(Reconciler::new(store, roots));
    let notifier = Arc::new(Notifier::new());

    // The startup scan completes before the event source starts delivering.
    {
        let reconciler = reconciler.clone();
        if tokio::task::spawn_blocking(move || isolate_pass("startup", || reconciler.full_scan()))
            .await?
            .is_none()
        {
            warn!("startup scan failed; serving possibly stale data");
        }
    }

    let watch_service = if config.watcher.enabled {
        match WatchService::start(reconciler.clone(), notifier.clone()) {
            Ok(service) => Some(service),
            Err(err) => {
                error!(?err, "watch service failed to start; changes need a manual rescan");
                None
            }
        }
    } else {
        info!("watcher disabled; reconciling on rescan only");
        None
    };

    let state = Arc::new(DaemonState {
        reconciler,
        notifier: notifier.clone(),
        watching: watch_service.is_some(),
        started_at: Instant::now(),
    });

    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let listener = UnixListener::bind(&socket_path)
        .with_context(|| format!("binding {}", socket_path.display()))?;
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    info!(path = %socket_path.display(), "teamdeck daemon listening");

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_ok() && *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                break;
            }
            accept = listener.accept() => {
                let (stream, _) = accept?;
                let state = state.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = connection::handle_connection(stream, state, shutdown_tx).await {
                        error!(?err, "daemon connection handler failed");
                    }
                });
            }
        }
    }

    info!("daemon shutting down gracefully");
    if let Some(service) = watch_service {
        // Joins the worker after it finishes whatever was already queued.
        tokio::task::spawn_blocking(move || service.stop()).await?;
    }
    notifier.clear();
    let _ = std::fs::remove_file(&socket_path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DaemonClient;
    use std::fs;
    use tempfile::TempDir;

    fn config_for(dir: &TempDir) -> AppConfig {
        let mut config = AppConfig::default();
        config.sources.teams_dir = dir.path().join("teams").display().to_string();
        config.sources.tasks_dir = dir.path().join("tasks").display().to_string();
        config.store.path = dir.path().join("store.redb").display().to_string();
        config.daemon.socket_path = dir.path().join("teamdeck.sock").display().to_string();
        config.watcher.enabled = false;
        config
    }

    #[tokio::test]
    async fn daemon_serves_status_rescan_and_shutdown() {
        let dir = TempDir::new().unwrap();
        let teams = dir.path().join("teams");
        fs::create_dir_all(teams.join("alpha")).unwrap();
        fs::write(
            teams.join("alpha/config.json"),
            r#"{"name": "alpha", "members": [{"name": "lead"}]}"#,
        )
        .unwrap();

        let config = config_for(&dir);
        let socket = config.socket_path();
        let daemon = tokio::spawn(run_daemon(config));

        let client = DaemonClient::new(&socket);
        client.connect_with_backoff(20).await.unwrap();
        client.ping().await.unwrap();

        let status = client.status().await.unwrap();
        assert_eq!(status.stats.team_count, 1);
        assert_eq!(status.stats.member_count, 1);
        assert!(!status.watching);
        assert!(status.store_path.ends_with("store.redb"));

        fs::create_dir_all(teams.join("beta")).unwrap();
        fs::write(teams.join("beta/config.json"), r#"{"name": "beta"}"#).unwrap();
        let summary = client.rescan().await.unwrap();
        assert_eq!(summary.teams, vec!["alpha", "beta"]);

        client.graceful_shutdown().await.unwrap();
        daemon.await.unwrap().unwrap();
        assert!(!socket.exists());
    }

    #[tokio::test]
    async fn subscribers_are_counted_and_released_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let config = config_for(&dir);
        let socket = config.socket_path();
        let daemon = tokio::spawn(run_daemon(config));

        let client = DaemonClient::new(&socket);
        client.connect_with_backoff(20).await.unwrap();

        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let subscriber = {
            let client = client.clone();
            tokio::spawn(async move { client.subscribe(tx).await })
        };

        let mut subscribed = false;
        for _ in 0..50 {
            if client.status().await.unwrap().subscribers == 1 {
                subscribed = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(subscribed);

        client.graceful_shutdown().await.unwrap();
        daemon.await.unwrap().unwrap();
        subscriber.await.unwrap().unwrap();
    }
}
