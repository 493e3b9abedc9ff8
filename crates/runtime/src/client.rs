use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail};
use teamdeck_sync::{ChangeEvent, ScanSummary};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tracing::warn;

use crate::{ClientCommand, DaemonStatus, ServerEvent};

#[derive(Debug, Clone)]
pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }

    pub async fn connect_with_backoff(&self, max_attempts: usize) -> Result<()> {
        let mut delay = Duration::from_millis(100);
        for attempt in 0..max_attempts.max(1) {
            match UnixStream::connect(&self.socket_path).await {
                Ok(_) => return Ok(()),
                Err(err) => {
                    if attempt + 1 == max_attempts.max(1) {
                        return Err(err.into());
                    }
                    warn!(attempt, ?err, "daemon connect failed; retrying");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(2));
                }
            }
        }
        Ok(())
    }

    /// Stream change events into `tx` until the daemon closes the
    /// connection or the receiver is dropped.
    pub async fn subscribe(&self, tx: mpsc::UnboundedSender<ChangeEvent>) -> Result<()> {
        // The daemon treats a closed write side as the subscriber leaving,
        // so hold it open for as long as the stream runs.
        let (mut reader, _writer) = self.send_command(&ClientCommand::Subscribe).await?;
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                break;
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let event: ServerEvent = match serde_json::from_str(trimmed) {
                Ok(event) => event,
                Err(err) => {
                    warn!("subscribe: bad json: {err}");
                    continue;
                }
            };
            if let ServerEvent::Change(change) = event {
                if tx.send(change).is_err() {
                    break;
                }
            }
        }
        Ok(())
    }

    pub async fn status(&self) -> Result<DaemonStatus> {
        match self.request(ClientCommand::GetStatus).await? {
            ServerEvent::Status(status) => Ok(status),
            other => bail!("unexpected daemon reply to status: {other:?}"),
        }
    }

    pub async fn rescan(&self) -> Result<ScanSummary> {
        match self.request(ClientCommand::Rescan).await? {
            ServerEvent::Scan(summary) => Ok(summary),
            ServerEvent::Error(message) => bail!("rescan failed: {message}"),
            other => bail!("unexpected daemon reply to rescan: {other:?}"),
        }
    }

    pub async fn ping(&self) -> Result<()> {
        match self.request(ClientCommand::Ping).await? {
            ServerEvent::Ack(_) => Ok(()),
            other => bail!("unexpected daemon reply to ping: {other:?}"),
        }
    }

    pub async fn graceful_shutdown(&self) -> Result<()> {
        self.request(ClientCommand::Shutdown).await?;
        Ok(())
    }

    /// Send a one-shot command and return its single reply.
    pub async fn request(&self, command: ClientCommand) -> Result<ServerEvent> {
        let (mut reader, _writer) = self.send_command(&command).await?;
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                bail!("daemon closed the connection without replying to {command:?}");
            }
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Ok(serde_json::from_str(trimmed)?);
            }
        }
    }

    async fn send_command(
        &self,
        command: &ClientCommand,
    ) -> Result<(BufReader<OwnedReadHalf>, OwnedWriteHalf)> {
        let stream = UnixStream::connect(&self.socket_path).await?;
        let (read_half, mut write_half) = stream.into_split();

        let request = serde_json::to_string(command)?;
        write_half.write_all(request.as_bytes()).await?;
        write_half.write_all(b"\n").await?;
        write_half.flush().await?;
        Ok((BufReader::new(read_half), write_half))
    }
}
