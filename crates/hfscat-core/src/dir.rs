//! Directory enumeration
//!
//! A [`DirCursor`] walks the records that follow a directory's thread record
//! in key order. Because keys sort by parent first, those are exactly the
//! directory's children, and the walk ends at the first key with another
//! parent. The cursor holds the directory's reader admission until it is
//! closed or dropped, so no create, delete or rename can run inside the
//! directory meanwhile.

use crate::cache::Entry;
use crate::codec::{CatalogRecord, RecordType};
use hfscat_btree::{FindMode, RecordHandle};
use hfscat_common::{CatalogKey, Cnid, Error, Result};
use tracing::debug;

pub struct DirCursor<'a> {
    dir: &'a Entry,
    cnid: Cnid,
    handle: Option<RecordHandle>,
}

impl<'a> DirCursor<'a> {
    /// Start enumerating `dir`
    pub fn open(dir: &'a Entry) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::invalid_argument("not a directory"));
        }
        let cnid = dir.cnid();
        dir.start_read();
        match dir
            .volume()
            .tree()
            .find(&CatalogKey::thread(cnid), FindMode::ReadEqual)
        {
            Ok(handle) => Ok(Self {
                dir,
                cnid,
                handle: Some(handle),
            }),
            Err(e) => {
                dir.end_read();
                Err(e.into())
            }
        }
    }

    /// Skip `n` records and return the child landed on
    ///
    /// Returns `NotFound` once the children are exhausted. Any error closes
    /// the cursor.
    pub fn next_entry(&mut self, n: u16) -> Result<(Cnid, RecordType)> {
        if self.handle.is_none() {
            return Err(Error::NotFound);
        }
        let result = self.step(n);
        if result.is_err() {
            self.close_inner();
        }
        result
    }

    fn step(&mut self, n: u16) -> Result<(Cnid, RecordType)> {
        if n == 0 {
            return Err(Error::invalid_argument("cursor must advance"));
        }
        let tree = self.dir.volume().tree();
        let handle = self.handle.as_mut().ok_or(Error::NotFound)?;
        tree.successor(handle, n)?;
        if handle.key().parent() != self.cnid {
            return Err(Error::NotFound);
        }
        let record = CatalogRecord::decode(handle.data())?;
        let cnid = record.cnid().ok_or_else(|| {
            Error::io(format!("thread record listed inside directory {}", self.cnid))
        })?;
        Ok((cnid, record.record_type()))
    }

    /// Key of the record the cursor is on, while open
    pub fn key(&self) -> Option<&CatalogKey> {
        self.handle.as_ref().map(RecordHandle::key)
    }

    pub const fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// End the enumeration
    pub fn close(mut self) {
        self.close_inner();
    }

    fn close_inner(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = self.dir.volume().tree().release(handle) {
                debug!(dir = %self.cnid, error = %e, "release on close");
            }
            self.dir.end_read();
        }
    }
}

impl Drop for DirCursor<'_> {
    fn drop(&mut self) {
        self.close_inner();
    }
}

impl Iterator for DirCursor<'_> {
    type Item = Result<(Cnid, RecordType)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_entry(1) {
            Err(Error::NotFound) => None,
            other => Some(other),
        }
    }
}

/// Count a directory's child files and directories from the tree
pub(crate) fn count_children(dir: &Entry) -> Result<(u32, u32)> {
    let mut files = 0;
    let mut dirs = 0;
    for child in DirCursor::open(dir)? {
        match child?.1 {
            RecordType::Directory => dirs += 1,
            RecordType::File => files += 1,
            RecordType::Thread | RecordType::FileThread => {}
        }
    }
    Ok((files, dirs))
}

/// Holds a directory's writer admission
pub(crate) struct WriteAdmission<'a>(&'a Entry);

impl<'a> WriteAdmission<'a> {
    pub(crate) fn new(dir: &'a Entry) -> Self {
        dir.start_write();
        Self(dir)
    }
}

impl Drop for WriteAdmission<'_> {
    fn drop(&mut self) {
        self.0.end_write();
    }
}

/// Holds a directory's reader admission
pub(crate) struct ReadAdmission<'a>(&'a Entry);

impl<'a> ReadAdmission<'a> {
    pub(crate) fn new(dir: &'a Entry) -> Self {
        dir.start_read();
        Self(dir)
    }
}

impl Drop for ReadAdmission<'_> {
    fn drop(&mut self) {
        self.0.end_read();
    }
}
