use thiserror::Error;

/// Failures raised by [`crate::TeamStore`].
///
/// Every redb error family gets its own variant so `?` works directly on the
/// raw redb calls.  An error inside a write transaction drops the transaction
/// uncommitted, which rolls it back.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("opening store: {0}")]
    Database(#[from] redb::DatabaseError),
    #[error("beginning transaction: {0}")]
    Transaction(#[from] redb::TransactionError),
    #[error("opening table: {0}")]
    Table(#[from] redb::TableError),
    #[error("storage: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("committing transaction: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("record codec: {0}")]
    Codec(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
