//! Error types for the storage engine.

use crate::types::PageId;
use thiserror::Error;

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// The kind of entity an `AlreadyExists`/`NotFound` error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Database,
    Table,
    Index,
    Column,
    Key,
    Page,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Database => "database",
            Self::Table => "table",
            Self::Index => "index",
            Self::Column => "column",
            Self::Key => "key",
            Self::Page => "page",
        };
        write!(f, "{s}")
    }
}

/// Errors that can occur in the storage engine.
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O error from the underlying file system.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Requested page was not found in the buffer pool or on disk.
    #[error("page {0} not found")]
    PageNotFound(PageId),

    /// Page does not have enough space for the operation.
    #[error("page {page_id} is full, need {needed} bytes but only {available} available")]
    PageFull {
        page_id: PageId,
        needed: usize,
        available: usize,
    },

    /// An in-place tuple update did not fit; caller must relocate.
    #[error("not enough space for in-place update on page {0}")]
    NotEnoughSpace(PageId),

    /// The disk manager has reached `MAX_VALID_PAGE_ID`.
    #[error("out of space: no more logical pages can be allocated")]
    OutOfSpace,

    /// `delete_page` was called on a frame with a non-zero pin count.
    #[error("page {0} is pinned and cannot be deleted")]
    PinnedPageInUse(PageId),

    /// An entity with the given name already exists.
    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: EntityKind, name: String },

    /// An entity with the given name or id could not be found.
    #[error("{kind} '{name}' not found")]
    NotFound { kind: EntityKind, name: String },

    /// Data corruption detected (e.g. checksum or invariant mismatch).
    #[error("corruption detected: {0}")]
    Corruption(String),

    /// Invalid page format or type.
    #[error("invalid page: {0}")]
    InvalidPage(String),

    /// Buffer pool has no available frames (all pinned).
    #[error("buffer pool exhausted: no available frames")]
    BufferPoolExhausted,

    /// Invalid operation for the current state; maps to the tagged-sum
    /// `Failed` kind for anything not covered by a more specific variant.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Database file is corrupted or has an invalid format.
    #[error("invalid database file: {0}")]
    InvalidDatabaseFile(String),
}

impl StorageError {
    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }

    pub fn invalid_page(msg: impl Into<String>) -> Self {
        Self::InvalidPage(msg.into())
    }

    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    pub fn invalid_db(msg: impl Into<String>) -> Self {
        Self::InvalidDatabaseFile(msg.into())
    }

    pub fn already_exists(kind: EntityKind, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind,
            name: name.into(),
        }
    }

    pub fn not_found(kind: EntityKind, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }
}
