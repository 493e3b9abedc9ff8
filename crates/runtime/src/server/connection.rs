//! Unix domain socket connection handling and command dispatch.

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::net::unix::OwnedWriteHalf;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::recovery::isolate_pass;
use crate::{ClientCommand, ServerEvent};

use super::DaemonState;

pub(super) async fn handle_connection(
    stream: UnixStream,
    state: Arc<DaemonState>,
    shutdown_tx: watch::Sender<bool>,
) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(());
    }

    let command: ClientCommand = serde_json::from_str(line.trim())?;

    match command {
        // Persistent subscription: the connection stays open and receives
        // every change event until either side goes away.
        ClientCommand::Subscribe => {
            let (id, mut rx) = state.notifier.subscribe_channel();
            debug!(subscriber = id, "subscriber connected");
            loop {
                line.clear();
                tokio::select! {
                    event = rx.recv() => {
                        let Some(event) = event else { break };
                        if send_event(&mut write_half, ServerEvent::Change(event))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    // Clients never send more than the one command; a read
                    // returning means the peer hung up.
                    _ = reader.read_line(&mut line) => break,
                }
            }
            state.notifier.unsubscribe(id);
            debug!(subscriber = id, "subscriber disconnected");
        }
        ClientCommand::GetStatus => {
            let reply = match state.status() {
                Ok(status) => ServerEvent::Status(status),
                Err(err) => ServerEvent::Error(format!("{err:#}")),
            };
            send_event(&mut write_half, reply).await?;
        }
        ClientCommand::Rescan => {
            let reconciler = state.reconciler.clone();
            let scan = tokio::task::spawn_blocking(move || {
                isolate_pass("rescan", || reconciler.full_scan())
            });
            let reply = match scan.await? {
                Some(summary) => {
                    info!(teams = summary.teams.len(), "on-demand rescan complete");
                    ServerEvent::Scan(summary)
                }
                None => ServerEvent::Error("full scan failed; see daemon logs".to_string()),
            };
            send_event(&mut write_half, reply).await?;
        }
        ClientCommand::Shutdown => {
            let _ = shutdown_tx.send(true);
            send_event(
                &mut write_half,
                ServerEvent::Ack("shutdown requested".to_string()),
            )
            .await?;
        }
        ClientCommand::Ping => {
            send_event(&mut write_half, ServerEvent::Ack("pong".to_string())).await?;
        }
    }

    Ok(())
}

async fn send_event(writer: &mut OwnedWriteHalf, event: ServerEvent) -> Result<()> {
    let encoded = serde_json::to_string(&event)?;
    writer.write_all(encoded.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
