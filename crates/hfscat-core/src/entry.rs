//! Cached entry contents
//!
//! [`EntryData`] is the in-memory image of one file or directory record.
//! Conversions run both ways: [`EntryData::from_record`] when an entry is
//! populated, [`EntryData::store_into`] on writeback. Store only overwrites
//! the fields the cache owns, so anything else in the stored record survives.

use crate::codec::{CatalogRecord, DirRecord, ExtentDescriptor, ExtentRecord, FileRecord};
use bitflags::bitflags;
use hfscat_common::Cnid;

bitflags! {
    /// Entry state flags
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct EntryState: u8 {
        /// Fields changed since the last writeback
        const DIRTY = 1 << 0;
        /// Someone holds the entry's intent lock
        const LOCKED = 1 << 1;
        /// The record is gone; the entry is unhashed and dies with its last ref
        const DELETED = 1 << 2;
        /// The key changed and must be stored with the next writeback
        const KEY_DIRTY = 1 << 3;
    }
}

/// What an entry describes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
}

/// One fork of a file
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Fork {
    pub logical_size: u32,
    pub physical_size: u32,
    /// Extents stored in the catalog record
    pub first_extents: ExtentRecord,
    /// Overflow extents looked up by the layer above; dropped when the
    /// entry's last reference goes
    pub cached_extents: Vec<ExtentDescriptor>,
}

impl Fork {
    fn from_record(logical: u32, physical: u32, extents: ExtentRecord) -> Self {
        Self {
            logical_size: logical,
            physical_size: physical,
            first_extents: extents,
            cached_extents: Vec::new(),
        }
    }

    /// Cut the fork to zero length and forget its extents
    pub fn truncate(&mut self) {
        self.logical_size = 0;
        self.physical_size = 0;
        self.first_extents = ExtentRecord::default();
        self.cached_extents.clear();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ForkKind {
    Data,
    Resource,
}

/// File-only fields
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileInfo {
    pub flags: u8,
    pub user_info: [u8; 16],
    pub finder_info: [u8; 16],
    pub clump_size: u16,
    pub data: Fork,
    pub rsrc: Fork,
}

impl FileInfo {
    pub const fn has_thread(&self) -> bool {
        self.flags & FileRecord::FLAG_THREAD != 0
    }

    pub const fn fork(&self, kind: ForkKind) -> &Fork {
        match kind {
            ForkKind::Data => &self.data,
            ForkKind::Resource => &self.rsrc,
        }
    }

    pub fn fork_mut(&mut self, kind: ForkKind) -> &mut Fork {
        match kind {
            ForkKind::Data => &mut self.data,
            ForkKind::Resource => &mut self.rsrc,
        }
    }
}

/// Directory-only fields
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirInfo {
    pub flags: u16,
    /// Child files, recomputed from the tree when the entry is populated
    pub files: u32,
    /// Child directories
    pub dirs: u32,
    pub user_info: [u8; 16],
    pub finder_info: [u8; 16],
}

impl DirInfo {
    pub const fn valence(&self) -> u32 {
        self.files + self.dirs
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum EntryDetail {
    /// Not populated yet
    #[default]
    Empty,
    File(FileInfo),
    Directory(DirInfo),
}

/// Cached fields of a file or directory
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntryData {
    /// `Cnid::INVALID` until populated
    pub cnid: Cnid,
    pub create_date: u32,
    pub modify_date: u32,
    pub backup_date: u32,
    pub detail: EntryDetail,
}

impl EntryData {
    /// Build from a file or directory record; thread records give `None`
    pub fn from_record(record: &CatalogRecord) -> Option<Self> {
        match record {
            CatalogRecord::Directory(dir) => Some(Self {
                cnid: dir.cnid,
                create_date: dir.create_date,
                modify_date: dir.modify_date,
                backup_date: dir.backup_date,
                detail: EntryDetail::Directory(DirInfo {
                    flags: dir.flags,
                    // Counts are recomputed from the tree when nonzero
                    files: 0,
                    dirs: 0,
                    user_info: dir.user_info,
                    finder_info: dir.finder_info,
                }),
            }),
            CatalogRecord::File(file) => Some(Self {
                cnid: file.cnid,
                create_date: file.create_date,
                modify_date: file.modify_date,
                backup_date: file.backup_date,
                detail: EntryDetail::File(FileInfo {
                    flags: file.flags,
                    user_info: file.user_info,
                    finder_info: file.finder_info,
                    clump_size: file.clump_size,
                    data: Fork::from_record(
                        file.data_logical,
                        file.data_physical,
                        file.data_extents,
                    ),
                    rsrc: Fork::from_record(
                        file.rsrc_logical,
                        file.rsrc_physical,
                        file.rsrc_extents,
                    ),
                }),
            }),
            CatalogRecord::Thread(_) | CatalogRecord::FileThread(_) => None,
        }
    }

    pub const fn kind(&self) -> Option<EntryKind> {
        match self.detail {
            EntryDetail::Empty => None,
            EntryDetail::File(_) => Some(EntryKind::File),
            EntryDetail::Directory(_) => Some(EntryKind::Directory),
        }
    }

    pub const fn file(&self) -> Option<&FileInfo> {
        match &self.detail {
            EntryDetail::File(file) => Some(file),
            _ => None,
        }
    }

    pub fn file_mut(&mut self) -> Option<&mut FileInfo> {
        match &mut self.detail {
            EntryDetail::File(file) => Some(file),
            _ => None,
        }
    }

    pub const fn dir(&self) -> Option<&DirInfo> {
        match &self.detail {
            EntryDetail::Directory(dir) => Some(dir),
            _ => None,
        }
    }

    pub fn dir_mut(&mut self) -> Option<&mut DirInfo> {
        match &mut self.detail {
            EntryDetail::Directory(dir) => Some(dir),
            _ => None,
        }
    }

    /// Whether a thread record exists for this entry
    pub const fn has_thread(&self) -> bool {
        match &self.detail {
            EntryDetail::Directory(_) => true,
            EntryDetail::File(file) => file.has_thread(),
            EntryDetail::Empty => false,
        }
    }

    /// Copy the cached fields over a stored record of the same kind
    ///
    /// Returns false when the record's kind does not match.
    pub fn store_into(&self, record: &mut CatalogRecord) -> bool {
        match (&self.detail, record) {
            (EntryDetail::Directory(info), CatalogRecord::Directory(dir)) => {
                dir.flags = info.flags;
                dir.valence = u16::try_from(info.valence()).unwrap_or(u16::MAX);
                dir.cnid = self.cnid;
                dir.create_date = self.create_date;
                dir.modify_date = self.modify_date;
                dir.backup_date = self.backup_date;
                dir.user_info = info.user_info;
                dir.finder_info = info.finder_info;
                true
            }
            (EntryDetail::File(info), CatalogRecord::File(file)) => {
                file.flags = info.flags;
                file.cnid = self.cnid;
                file.user_info = info.user_info;
                file.finder_info = info.finder_info;
                file.clump_size = info.clump_size;
                file.data_logical = info.data.logical_size;
                file.data_physical = info.data.physical_size;
                file.data_extents = info.data.first_extents;
                file.rsrc_logical = info.rsrc.logical_size;
                file.rsrc_physical = info.rsrc.physical_size;
                file.rsrc_extents = info.rsrc.first_extents;
                file.create_date = self.create_date;
                file.modify_date = self.modify_date;
                file.backup_date = self.backup_date;
                true
            }
            _ => false,
        }
    }

    /// A fresh record carrying the cached fields
    pub fn to_record(&self) -> Option<CatalogRecord> {
        let mut record = match self.kind()? {
            EntryKind::Directory => CatalogRecord::Directory(DirRecord::default()),
            EntryKind::File => CatalogRecord::File(FileRecord::default()),
        };
        self.store_into(&mut record);
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_flags() {
        let mut state = EntryState::DIRTY | EntryState::KEY_DIRTY;
        assert!(state.contains(EntryState::DIRTY));
        assert!(!state.contains(EntryState::DELETED));
        assert!(state.intersects(EntryState::KEY_DIRTY | EntryState::LOCKED));
        state.remove(EntryState::DIRTY);
        assert_eq!(state, EntryState::KEY_DIRTY);
        state.remove(EntryState::KEY_DIRTY);
        assert!(state.is_empty());
        assert_eq!(EntryState::default(), EntryState::empty());
        assert_eq!((EntryState::DIRTY | EntryState::DELETED).bits(), 0b101);
    }

    #[test]
    fn test_store_keeps_uncached_fields() {
        let stored = FileRecord {
            flags: FileRecord::FLAG_USED,
            version: 3,
            cnid: Cnid::new(40),
            start_block: 77,
            reserved: 0xFEED,
            data_logical: 10,
            ..FileRecord::default()
        };
        let mut data = EntryData::from_record(&CatalogRecord::File(stored.clone())).unwrap();
        data.file_mut().unwrap().data.logical_size = 4096;
        data.modify_date = 12345;

        let mut record = CatalogRecord::File(stored);
        assert!(data.store_into(&mut record));
        let CatalogRecord::File(file) = record else {
            panic!("kind changed");
        };
        assert_eq!(file.data_logical, 4096);
        assert_eq!(file.modify_date, 12345);
        assert_eq!(file.version, 3);
        assert_eq!(file.start_block, 77);
        assert_eq!(file.reserved, 0xFEED);
    }

    #[test]
    fn test_store_rejects_kind_mismatch() {
        let data = EntryData::from_record(&CatalogRecord::Directory(DirRecord {
            cnid: Cnid::new(30),
            ..DirRecord::default()
        }))
        .unwrap();
        let mut record = CatalogRecord::File(FileRecord::default());
        assert!(!data.store_into(&mut record));
        assert!(EntryData::default().to_record().is_none());
    }

    #[test]
    fn test_directory_valence_written_from_counts() {
        let mut data = EntryData::from_record(&CatalogRecord::Directory(DirRecord {
            valence: 9,
            cnid: Cnid::new(30),
            ..DirRecord::default()
        }))
        .unwrap();
        assert_eq!(data.dir().unwrap().valence(), 0);
        let dir = data.dir_mut().unwrap();
        dir.files = 2;
        dir.dirs = 1;

        let Some(CatalogRecord::Directory(record)) = data.to_record() else {
            panic!("expected a directory record");
        };
        assert_eq!(record.valence, 3);
        assert_eq!(record.cnid, Cnid::new(30));
        assert!(data.has_thread());
    }
}
