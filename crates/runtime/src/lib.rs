mod client;
mod commands;
pub mod notifier;
mod recovery;
mod server;
pub mod watcher;

pub use client::DaemonClient;
pub use commands::{ClientCommand, DaemonStatus, ServerEvent};
pub use notifier::{Disconnected, Notifier, Subscriber, SubscriberId};
pub use server::run_daemon;
pub use watcher::WatchService;
