use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::sync::mpsc;

use teamdeck_config::AppConfig;
use teamdeck_runtime::DaemonClient;
use teamdeck_store::TeamStore;
use teamdeck_sync::{Reconciler, WatchRoots};

pub(crate) fn is_socket_live(path: &Path) -> bool {
    std::os::unix::net::UnixStream::connect(path).is_ok()
}

pub(crate) fn run_scan(config: &AppConfig) -> Result<()> {
    let store_path = config.store_path();
    if is_socket_live(&config.socket_path()) {
        bail!("daemon is running and owns the store; use `teamdeck rescan` instead");
    }
    let store = Arc::new(
        TeamStore::open(&store_path)
            .with_context(|| format!("opening store at {}", store_path.display()))?,
    );
    let reconciler = Reconciler::new(
        store.clone(),
        WatchRoots::new(config.teams_root(), config.tasks_root()),
    );

    let Some(summary) = reconciler.full_scan() else {
        bail!("full scan failed; see log output");
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    for (team, (members, messages, tasks)) in store.collection_sizes()? {
        println!("  {team}: {members} members, {messages} messages, {tasks} tasks");
    }
    print_stats(&store.stats()?);
    Ok(())
}

pub(crate) async fn print_status(config: &AppConfig) -> Result<()> {
    let socket_path = config.socket_path();
    if !is_socket_live(&socket_path) {
        println!("daemon status: stopped");
        println!("- socket: {}", socket_path.display());
        return Ok(());
    }

    let status = DaemonClient::new(&socket_path).status().await?;
    println!("daemon status: running");
    println!("- socket: {}", socket_path.display());
    println!("- store: {}", status.store_path);
    println!("- teams root: {}", status.teams_root);
    println!("- tasks root: {}", status.tasks_root);
    println!("- watching: {}", status.watching);
    println!("- subscribers: {}", status.subscribers);
    println!("- uptime: {}s", status.uptime_secs);
    print_stats(&status.stats);
    Ok(())
}

pub(crate) async fn request_rescan(config: &AppConfig) -> Result<()> {
    let summary = DaemonClient::new(config.socket_path()).rescan().await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

pub(crate) async fn watch_events(config: &AppConfig) -> Result<()> {
    let client = DaemonClient::new(config.socket_path());
    client.connect_with_backoff(5).await?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let stream = tokio::spawn(async move { client.subscribe(tx).await });
    while let Some(event) = rx.recv().await {
        println!("{}", serde_json::to_string(&event)?);
    }
    stream.await??;
    Ok(())
}

pub(crate) async fn stop(config: &AppConfig) -> Result<()> {
    let socket_path = config.socket_path();
    if !is_socket_live(&socket_path) {
        println!("daemon is not running");
        return Ok(());
    }
    DaemonClient::new(&socket_path).graceful_shutdown().await?;
    println!("daemon stop requested gracefully");
    Ok(())
}

fn print_stats(stats: &teamdeck_store::StoreStats) {
    println!("── store ────────────────────────────────────────────");
    println!("  teams            : {}", stats.team_count);
    println!("  members          : {}", stats.member_count);
    println!("  messages         : {}", stats.message_count);
    println!("  tasks            : {}", stats.task_count);
    println!(
        "  completed        : {} ({}%)",
        stats.completed_count, stats.completion_rate
    );
}
