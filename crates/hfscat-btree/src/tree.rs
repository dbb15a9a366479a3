//! The catalog tree contract

use hfscat_common::{CatalogKey, Error};
use thiserror::Error;

/// Errors reported by a catalog tree
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("record not found")]
    NotFound,
    #[error("record already exists")]
    AlreadyExists,
    #[error("tree is full")]
    NoSpace,
    #[error("tree I/O error: {0}")]
    Io(String),
}

pub type TreeResult<T> = Result<T, TreeError>;

impl From<TreeError> for Error {
    fn from(e: TreeError) -> Self {
        match e {
            TreeError::NotFound => Self::NotFound,
            TreeError::AlreadyExists => Self::AlreadyExists,
            TreeError::NoSpace => Self::NoSpace,
            TreeError::Io(msg) => Self::Io(msg),
        }
    }
}

/// How a record is being looked up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindMode {
    /// Exact match, read only
    ReadEqual,
    /// Exact match; changes made through the handle are stored on release
    WriteIntent,
}

/// A located record
///
/// Holds a copy of the stored key (with its on-disk case) and the record
/// bytes. With [`FindMode::WriteIntent`], [`RecordHandle::set_key`] and
/// [`RecordHandle::set_data`] stage changes that [`CatalogTree::release`]
/// writes back.
#[derive(Debug, Clone)]
pub struct RecordHandle {
    key: CatalogKey,
    data: Vec<u8>,
    mode: FindMode,
    /// Key the record was found under, if `set_key` replaced it
    original_key: Option<CatalogKey>,
    modified: bool,
}

impl RecordHandle {
    pub fn new(key: CatalogKey, data: Vec<u8>, mode: FindMode) -> Self {
        Self {
            key,
            data,
            mode,
            original_key: None,
            modified: false,
        }
    }

    pub fn key(&self) -> &CatalogKey {
        &self.key
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn mode(&self) -> FindMode {
        self.mode
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Key the record is stored under (before any staged `set_key`)
    pub fn stored_key(&self) -> &CatalogKey {
        self.original_key.as_ref().unwrap_or(&self.key)
    }

    /// Stage new record bytes
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.data = data;
        self.modified = true;
    }

    /// Stage replacement key bytes; the key must still collate equal
    pub fn set_key(&mut self, key: CatalogKey) {
        if self.original_key.is_none() {
            self.original_key = Some(self.key.clone());
        }
        self.key = key;
        self.modified = true;
    }

    /// Re-point the handle at another record (used by successor walks)
    pub fn reposition(&mut self, key: CatalogKey, data: Vec<u8>) {
        self.key = key;
        self.data = data;
        self.original_key = None;
        self.modified = false;
    }
}

/// Backing store for catalog records
///
/// Implementations order keys by [`CatalogKey`]'s `Ord`, which is the same
/// collation the cache hashes with.
pub trait CatalogTree: Send + Sync {
    /// Locate the record stored under `key`
    fn find(&self, key: &CatalogKey, mode: FindMode) -> TreeResult<RecordHandle>;

    /// Advance `handle` by `n` records in key order
    fn successor(&self, handle: &mut RecordHandle, n: u16) -> TreeResult<()>;

    /// Give the handle back, storing staged changes for write-intent lookups
    fn release(&self, handle: RecordHandle) -> TreeResult<()>;

    /// Insert a new record
    fn insert(&self, key: &CatalogKey, record: &[u8]) -> TreeResult<()>;

    /// Remove the record stored under `key`
    fn delete(&self, key: &CatalogKey) -> TreeResult<()>;
}
