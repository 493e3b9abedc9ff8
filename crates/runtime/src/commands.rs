use serde::{Deserialize, Serialize};
use teamdeck_store::StoreStats;
use teamdeck_sync::{ChangeEvent, ScanSummary};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub teams_root: String,
    pub tasks_root: String,
    pub store_path: String,
    pub watching: bool,
    pub subscribers: usize,
    pub uptime_secs: u64,
    pub stats: StoreStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientCommand {
    /// Keep the connection open and stream every change event.
    Subscribe,
    GetStatus,
    /// Run a full scan now.
    Rescan,
    Ping,
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerEvent {
    Change(ChangeEvent),
    Status(DaemonStatus),
    Scan(ScanSummary),
    Ack(String),
    Error(String),
}
