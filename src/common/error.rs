use thiserror::Error;

use super::types::PageId;

/// Index error types
#[derive(Error, Debug)]
pub enum ArborError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Buffer pool is full, no evictable frames available")]
    BufferPoolFull,

    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("Disk scheduler error: {0}")]
    DiskScheduler(String),

    #[error("Invalid database file")]
    InvalidDatabaseFile,

    #[error("Index {0} already registered")]
    IndexAlreadyExists(String),

    #[error("Index {0} not found")]
    IndexNotFound(String),

    #[error("Index name {0} exceeds the registry name limit")]
    IndexNameTooLong(String),

    #[error("Header page registry is full")]
    RegistryFull,

    #[error("Invalid tree options: {0}")]
    InvalidTreeOptions(String),

    #[error("Index corrupted: {0}")]
    IndexCorrupted(String),
}

pub type Result<T> = std::result::Result<T, ArborError>;
