use thiserror::Error;

/// Errors raised by the durable store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying `SQLite` failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A pending record with this id already exists.
    #[error("pending request already exists: {0}")]
    DuplicatePending(String),

    /// A stored row could not be interpreted.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// The store mutex was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    Lock,

    /// Filesystem problem opening or securing the database file.
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
