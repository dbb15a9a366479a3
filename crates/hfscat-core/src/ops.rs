//! Catalog mutations: create, delete, rename and parent lookup
//!
//! Every mutation holds the affected directories' writer admission for its
//! whole run and the entry's intent lock while touching the record. Renames
//! are additionally serialized per volume, and take their locks in the order
//! new directory, old directory, destination entry, source entry.
//!
//! Cleanup after a failure is advisory: thread-record deletes on the way out
//! are attempted once and their result is only logged.

use crate::cache::{CatalogCache, Entry};
use crate::codec::{CatalogRecord, DirRecord, FileRecord, ThreadRecord};
use crate::dir::{ReadAdmission, WriteAdmission};
use crate::entry::{DirInfo, EntryData, EntryKind};
use crate::volume::Volume;
use hfscat_btree::{CatalogTree, FindMode, TreeError};
use hfscat_common::{CatalogKey, Cnid, Error, MAX_VALENCE, Result, mac_time_now};
use std::sync::Arc;
use tracing::{debug, warn};

/// Longest thread chain followed while checking a directory rename
const MAX_DEPTH: usize = 4096;

/// Where a rename lands
struct Destination {
    /// Locked by the rename
    entry: Entry,
    /// Created by this rename to hold the copied record
    placeholder: bool,
}

impl CatalogCache {
    /// Create a file in `parent`
    ///
    /// `file_type` and `creator` are the four-character Finder codes.
    pub fn create(
        &self,
        parent: &Entry,
        key: &CatalogKey,
        flags: u8,
        file_type: u32,
        creator: u32,
    ) -> Result<Entry> {
        let volume = parent.volume();
        let now = mac_time_now();
        let mut file = FileRecord {
            flags: flags | FileRecord::FLAG_USED,
            create_date: now,
            modify_date: now,
            clump_size: volume.clump_size(),
            ..FileRecord::default()
        };
        file.user_info[0..4].copy_from_slice(&file_type.to_be_bytes());
        file.user_info[4..8].copy_from_slice(&creator.to_be_bytes());
        self.create_entry(parent, key, &CatalogRecord::File(file))
    }

    /// Create a directory in `parent`
    pub fn mkdir(&self, parent: &Entry, key: &CatalogKey) -> Result<Entry> {
        let now = mac_time_now();
        let mut dir = DirRecord {
            create_date: now,
            modify_date: now,
            ..DirRecord::default()
        };
        dir.user_info[DirRecord::VIEW_OFFSET + 1] = 0xff;
        self.create_entry(parent, key, &CatalogRecord::Directory(dir))
    }

    /// Insert `record` under `key` and return its entry
    ///
    /// Directories, and files flagged for it, also get a thread record. A
    /// record without a CNID is numbered from the volume once the name is
    /// known to be free and the parent has room.
    pub fn create_entry(
        &self,
        parent: &Entry,
        key: &CatalogKey,
        record: &CatalogRecord,
    ) -> Result<Entry> {
        let Some(cnid) = record.cnid() else {
            return Err(Error::invalid_argument(
                "cannot create an entry from a thread record",
            ));
        };
        require_dir(parent)?;
        if key.parent() != parent.cnid() {
            return Err(Error::invalid_argument(format!(
                "key parent {} is not directory {}",
                key.parent(),
                parent.cnid()
            )));
        }
        let volume = Arc::clone(parent.volume());

        let _write = WriteAdmission::new(parent);
        let entry = self.inner.get_entry(&volume, key, false)?;
        if entry.cnid().is_valid() {
            return Err(Error::AlreadyExists);
        }

        let inserted = if valence(parent) >= MAX_VALENCE {
            Err(Error::NoSpace)
        } else {
            let cnid = if cnid.is_valid() {
                cnid
            } else {
                volume.allocate_cnid()
            };
            let record = record.clone().with_cnid(cnid);
            EntryData::from_record(&record)
                .ok_or_else(|| Error::invalid_argument("not a file or directory record"))
                .and_then(|data| {
                    self.insert_records(&volume, parent, key, &record, &data)
                        .map(|()| data)
                })
        };

        match inserted {
            Ok(data) => {
                debug!(cnid = %data.cnid, ?key, "created catalog entry");
                entry.set_data(data);
                entry.unlock_intent();
                Ok(entry)
            }
            Err(e) => {
                self.inner.mark_deleted(entry.slot_id());
                entry.unlock_intent();
                Err(e)
            }
        }
    }

    fn insert_records(
        &self,
        volume: &Volume,
        parent: &Entry,
        key: &CatalogKey,
        record: &CatalogRecord,
        data: &EntryData,
    ) -> Result<()> {
        let tree = volume.tree();
        let is_dir = data.kind() == Some(EntryKind::Directory);
        let thread_key = CatalogKey::thread(data.cnid);
        let has_thread = data.has_thread();

        if has_thread {
            let thread = ThreadRecord {
                parent: key.parent(),
                name: key.name().clone(),
                ..ThreadRecord::default()
            };
            let thread = if is_dir {
                CatalogRecord::Thread(thread)
            } else {
                CatalogRecord::FileThread(thread)
            };
            tree.insert(&thread_key, &thread.encode())?;
        }

        if let Err(e) = tree.insert(key, &record.encode()) {
            // A failed insert that was an I/O error would fail the delete too
            if has_thread && !matches!(e, TreeError::Io(_)) {
                advisory_delete(tree, &thread_key);
            }
            return Err(e.into());
        }

        self.update_dir(parent, is_dir, 1);
        Ok(())
    }

    /// Remove `entry` from `parent`
    ///
    /// `with_thread` also removes the thread record; for files it only
    /// applies when the file is flagged as having one.
    pub fn delete(&self, parent: &Entry, entry: &Entry, with_thread: bool) -> Result<()> {
        same_volume(parent, entry)?;
        require_dir(parent)?;
        let data = entry.data();
        let kind = data
            .kind()
            .ok_or_else(|| Error::invalid_argument("entry is not populated"))?;
        let is_dir = kind == EntryKind::Directory;
        let with_thread = with_thread && data.has_thread();
        let tree = entry.volume().tree();

        let _write = WriteAdmission::new(parent);
        let _read = is_dir.then(|| ReadAdmission::new(entry));
        if is_dir && valence(entry) > 0 {
            return Err(Error::NotEmpty);
        }

        {
            let _lock = entry.lock();
            if entry.is_deleted() {
                return Err(Error::NotFound);
            }
            tree.delete(&entry.key())?;
            self.inner.mark_deleted(entry.slot_id());
        }

        if with_thread {
            advisory_delete(tree, &CatalogKey::thread(data.cnid));
        }
        self.update_dir(parent, is_dir, -1);
        debug!(cnid = %data.cnid, "deleted catalog entry");
        Ok(())
    }

    /// Move `entry` from `old_dir` to `new_key` in `new_dir`
    ///
    /// An existing entry of the same kind at `new_key` is replaced and
    /// returned, marked deleted, for the caller to dispose of. If the source
    /// record has already been removed when a later step fails, `entry` is
    /// marked deleted instead of being rolled back.
    pub fn rename(
        &self,
        old_dir: &Entry,
        new_dir: &Entry,
        entry: &Entry,
        new_key: &CatalogKey,
    ) -> Result<Option<Entry>> {
        same_volume(old_dir, new_dir)?;
        same_volume(old_dir, entry)?;
        require_dir(old_dir)?;
        require_dir(new_dir)?;
        if new_key.parent() != new_dir.cnid() {
            return Err(Error::invalid_argument(format!(
                "key parent {} is not directory {}",
                new_key.parent(),
                new_dir.cnid()
            )));
        }
        let data = entry.data();
        let kind = data
            .kind()
            .ok_or_else(|| Error::invalid_argument("entry is not populated"))?;
        let is_dir = kind == EntryKind::Directory;
        let volume = Arc::clone(entry.volume());
        let tree = volume.tree();

        let _rename = volume.lock_renames();
        let _new_write = WriteAdmission::new(new_dir);
        let _old_write = (!old_dir.same_entry(new_dir)).then(|| WriteAdmission::new(old_dir));

        if is_dir {
            check_not_ancestor(tree, new_dir.cnid(), data.cnid)?;
        }

        let dest = self.resolve_destination(&volume, new_dir, entry, new_key, kind)?;

        entry.lock_intent();
        if entry.is_deleted() {
            entry.unlock_intent();
            self.abandon_destination(tree, new_dir, new_key, is_dir, dest);
            return Err(Error::NotFound);
        }

        if dest.is_some() {
            if let Err(e) = tree.delete(&entry.key()) {
                entry.unlock_intent();
                self.abandon_destination(tree, new_dir, new_key, is_dir, dest);
                return Err(e.into());
            }
            self.update_dir(old_dir, is_dir, -1);
        }

        if data.has_thread() {
            if let Err(e) = move_thread(tree, entry, new_key, is_dir) {
                if dest.is_none() {
                    // Nothing has changed yet
                    entry.unlock_intent();
                    return Err(e);
                }
                warn!(cnid = %data.cnid, error = %e, "rename failed after removing the source record");
                self.inner.mark_deleted(entry.slot_id());
                entry.unlock_intent();
                self.abandon_destination(tree, new_dir, new_key, is_dir, dest);
                return Err(e);
            }
        }

        if let Some(dest) = &dest {
            let (cnid, has_thread) = dest.entry.with_data(|d| (d.cnid, d.has_thread()));
            if cnid.is_valid() && has_thread {
                advisory_delete(tree, &CatalogKey::thread(cnid));
            }
        }

        new_dir.update(|d| d.modify_date = mac_time_now());
        self.inner.rekey(entry.slot_id(), new_key);
        entry.mark_dirty();
        entry.unlock_intent();
        debug!(cnid = %data.cnid, ?new_key, "renamed catalog entry");

        let Some(dest) = dest else {
            return Ok(None);
        };
        self.inner.mark_deleted(dest.entry.slot_id());
        dest.entry.unlock_intent();
        if dest.placeholder {
            Ok(None)
        } else {
            Ok(Some(dest.entry))
        }
    }

    /// Find or create the locked entry a rename lands on
    ///
    /// `None` means `new_key` already names `entry` itself.
    fn resolve_destination(
        &self,
        volume: &Arc<Volume>,
        new_dir: &Entry,
        entry: &Entry,
        new_key: &CatalogKey,
        kind: EntryKind,
    ) -> Result<Option<Destination>> {
        loop {
            let existing = match self.inner.get_entry(volume, new_key, true) {
                Ok(dest) => Some(dest),
                Err(Error::NotFound) => None,
                Err(e) => return Err(e),
            };

            let dest = match existing {
                Some(dest) => dest,
                None => {
                    let placeholder = self.inner.get_entry(volume, new_key, false)?;
                    if !placeholder.cnid().is_valid() {
                        match self.insert_copy(volume.tree(), new_dir, entry, new_key) {
                            Ok(()) => {
                                return Ok(Some(Destination {
                                    entry: placeholder,
                                    placeholder: true,
                                }));
                            }
                            Err(e) => {
                                self.inner.mark_deleted(placeholder.slot_id());
                                placeholder.unlock_intent();
                                if matches!(e, Error::AlreadyExists) {
                                    continue;
                                }
                                return Err(e);
                            }
                        }
                    }
                    // Created by someone else since the lookup
                    placeholder
                }
            };

            if dest.same_entry(entry) || dest.cnid() == entry.cnid() {
                return Ok(None);
            }

            dest.lock_intent();
            if dest.is_deleted() {
                dest.unlock_intent();
                continue;
            }
            let check = dest.with_data(|d| match d.kind() {
                Some(found) if found != kind => Err(Error::invalid_argument(format!(
                    "cannot replace a {found:?} with a {kind:?}"
                ))),
                _ if d.dir().is_some_and(|dir| dir.valence() > 0) => Err(Error::NotEmpty),
                _ => Ok(()),
            });
            if let Err(e) = check {
                dest.unlock_intent();
                return Err(e);
            }
            return Ok(Some(Destination {
                entry: dest,
                placeholder: false,
            }));
        }
    }

    /// Copy `entry`'s record to `new_key` for a rename with no destination
    fn insert_copy(
        &self,
        tree: &dyn CatalogTree,
        new_dir: &Entry,
        entry: &Entry,
        new_key: &CatalogKey,
    ) -> Result<()> {
        if valence(new_dir) >= MAX_VALENCE {
            return Err(Error::NoSpace);
        }
        let data = entry.data();
        let record = data
            .to_record()
            .ok_or_else(|| Error::invalid_argument("entry is not populated"))?;
        tree.insert(new_key, &record.encode())?;
        self.update_dir(new_dir, data.kind() == Some(EntryKind::Directory), 1);
        Ok(())
    }

    /// Undo a rename's hold on its destination
    fn abandon_destination(
        &self,
        tree: &dyn CatalogTree,
        new_dir: &Entry,
        new_key: &CatalogKey,
        is_dir: bool,
        dest: Option<Destination>,
    ) {
        let Some(dest) = dest else {
            return;
        };
        if dest.placeholder {
            advisory_delete(tree, new_key);
            self.update_dir(new_dir, is_dir, -1);
            self.inner.mark_deleted(dest.entry.slot_id());
        }
        dest.entry.unlock_intent();
    }

    /// The directory containing `entry`, found through its parent's thread
    pub fn parent(&self, entry: &Entry) -> Result<Entry> {
        let key = {
            let _lock = entry.lock();
            if entry.is_deleted() {
                return Err(Error::NotFound);
            }
            entry.key()
        };
        let tree = entry.volume().tree();
        let handle = tree.find(&CatalogKey::thread(key.parent()), FindMode::ReadEqual)?;
        let record = CatalogRecord::decode(handle.data());
        tree.release(handle)?;
        let CatalogRecord::Thread(thread) = record? else {
            return Err(Error::io(format!(
                "parent {} has no directory thread",
                key.parent()
            )));
        };
        self.get(entry.volume(), &CatalogKey::new(thread.parent, thread.name))
    }

    /// Apply a child count change to `dir` and the volume counters
    fn update_dir(&self, dir: &Entry, is_dir: bool, delta: i32) {
        let cnid = dir.update(|data| {
            if let Some(info) = data.dir_mut() {
                if is_dir {
                    info.dirs = info.dirs.saturating_add_signed(delta);
                } else {
                    info.files = info.files.saturating_add_signed(delta);
                }
            }
            data.modify_date = mac_time_now();
            data.cnid
        });
        dir.volume().adjust_counts(cnid, is_dir, delta);
    }
}

/// Point `entry`'s thread record at `new_key`
fn move_thread(
    tree: &dyn CatalogTree,
    entry: &Entry,
    new_key: &CatalogKey,
    is_dir: bool,
) -> Result<()> {
    let cnid = entry.cnid();
    let mut handle = match tree.find(&CatalogKey::thread(cnid), FindMode::WriteIntent) {
        Ok(handle) => handle,
        Err(TreeError::NotFound) if !is_dir => {
            warn!(%cnid, "file thread record missing, clearing thread flag");
            entry.update(|d| {
                if let Some(file) = d.file_mut() {
                    file.flags &= !FileRecord::FLAG_THREAD;
                }
            });
            return Ok(());
        }
        Err(TreeError::NotFound) => {
            return Err(Error::io(format!("directory {cnid} has no thread record")));
        }
        Err(e) => return Err(e.into()),
    };

    let relocate = |mut thread: ThreadRecord| {
        thread.parent = new_key.parent();
        thread.name = new_key.name().clone();
        thread
    };
    let updated = match CatalogRecord::decode(handle.data()) {
        Ok(CatalogRecord::Thread(thread)) => Ok(CatalogRecord::Thread(relocate(thread))),
        Ok(CatalogRecord::FileThread(thread)) => Ok(CatalogRecord::FileThread(relocate(thread))),
        Ok(other) => Err(Error::io(format!(
            "thread key of {cnid} holds a {:?} record",
            other.record_type()
        ))),
        Err(e) => Err(e),
    };
    match updated {
        Ok(record) => {
            handle.set_data(record.encode());
            tree.release(handle)?;
            Ok(())
        }
        Err(e) => {
            if let Err(release) = tree.release(handle) {
                debug!(%cnid, error = %release, "release after bad thread record");
            }
            Err(e)
        }
    }
}

/// Walk thread records from `start` to the root, refusing to pass `moving`
fn check_not_ancestor(tree: &dyn CatalogTree, start: Cnid, moving: Cnid) -> Result<()> {
    let mut id = start;
    for _ in 0..MAX_DEPTH {
        if id == Cnid::ROOT {
            return Ok(());
        }
        if id == moving {
            return Err(Error::invalid_argument(
                "cannot move a directory inside itself",
            ));
        }
        let handle = tree.find(&CatalogKey::thread(id), FindMode::ReadEqual)?;
        let record = CatalogRecord::decode(handle.data());
        tree.release(handle)?;
        id = match record? {
            CatalogRecord::Thread(thread) => thread.parent,
            other => {
                return Err(Error::io(format!(
                    "directory {id} has a {:?} thread",
                    other.record_type()
                )));
            }
        };
    }
    Err(Error::io(format!("thread chain from {start} does not reach the root")))
}

/// Delete a record, logging rather than returning failure
fn advisory_delete(tree: &dyn CatalogTree, key: &CatalogKey) {
    if let Err(e) = tree.delete(key) {
        debug!(?key, error = %e, "advisory delete failed");
    }
}

fn valence(dir: &Entry) -> u32 {
    dir.with_data(|d| d.dir().map_or(0, DirInfo::valence))
}

fn require_dir(entry: &Entry) -> Result<()> {
    if entry.is_dir() {
        Ok(())
    } else {
        Err(Error::invalid_argument(format!(
            "{} is not a directory",
            entry.cnid()
        )))
    }
}

fn same_volume(a: &Entry, b: &Entry) -> Result<()> {
    if a.volume().id() == b.volume().id() {
        Ok(())
    } else {
        Err(Error::invalid_argument("entries are on different volumes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::format_volume;
    use hfscat_btree::MemCatalogTree;
    use hfscat_common::{CacheConfig, CatalogName, VolumeConfig, VolumeId};

    struct Fixture {
        cache: CatalogCache,
        tree: Arc<MemCatalogTree>,
        volume: Arc<Volume>,
        root: Entry,
    }

    fn fixture() -> Fixture {
        let tree = Arc::new(MemCatalogTree::default());
        let config = VolumeConfig::default();
        format_volume(tree.as_ref(), &config).unwrap();
        let volume = Volume::new(VolumeId::new(1), tree.clone(), &config).unwrap();
        let cache = CatalogCache::new(CacheConfig::default()).unwrap();
        let root_key = CatalogKey::new(Cnid::ROOT_PARENT, CatalogName::new("Untitled").unwrap());
        let root = cache.get(&volume, &root_key).unwrap();
        Fixture {
            cache,
            tree,
            volume,
            root,
        }
    }

    fn key(parent: Cnid, name: &str) -> CatalogKey {
        CatalogKey::new(parent, CatalogName::new(name).unwrap())
    }

    #[test]
    fn test_create_file_and_directory() {
        let f = fixture();
        let file = f
            .cache
            .create(&f.root, &key(Cnid::ROOT, "notes"), 0, 0x5445_5854, 0x7474_7874)
            .unwrap();
        let dir = f.cache.mkdir(&f.root, &key(Cnid::ROOT, "docs")).unwrap();

        assert_eq!(file.cnid(), Cnid::FIRST_USER);
        assert_eq!(dir.cnid(), Cnid::new(17));
        assert_eq!(file.kind(), Some(EntryKind::File));
        assert!(!file.data().has_thread());
        assert_eq!(&file.data().file().unwrap().user_info[..4], b"TEXT");
        assert!(f.tree.get(&CatalogKey::thread(dir.cnid())).is_some());
        assert!(f.tree.get(&CatalogKey::thread(file.cnid())).is_none());

        let counts = f.root.with_data(|d| d.dir().cloned()).unwrap();
        assert_eq!((counts.files, counts.dirs), (1, 1));
        assert!(f.root.is_dirty());
        assert_eq!(f.volume.counts().root_files, 1);
        assert_eq!(f.volume.counts().root_dirs, 1);
    }

    #[test]
    fn test_create_existing_is_already_exists() {
        let f = fixture();
        let first = f.cache.mkdir(&f.root, &key(Cnid::ROOT, "docs")).unwrap();
        // Still cached
        let err = f.cache.mkdir(&f.root, &key(Cnid::ROOT, "DOCS")).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists));
        drop(first);

        // Only on disk: the tree refuses the insert and the thread is cleaned up
        f.cache.commit(&f.volume);
        let records = f.tree.len();
        let err = f.cache.mkdir(&f.root, &key(Cnid::ROOT, "docs")).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists));
        assert_eq!(f.tree.len(), records);
        assert_eq!(f.root.with_data(|d| d.dir().unwrap().dirs), 1);
    }

    #[test]
    fn test_refused_create_keeps_next_cnid() {
        let f = fixture();
        let docs = f.cache.mkdir(&f.root, &key(Cnid::ROOT, "docs")).unwrap();
        assert_eq!(docs.cnid(), Cnid::new(16));
        assert_eq!(f.volume.next_cnid(), Cnid::new(17));

        let err = f.cache.mkdir(&f.root, &key(Cnid::ROOT, "Docs")).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists));
        assert_eq!(f.volume.next_cnid(), Cnid::new(17));

        f.root.update(|d| d.dir_mut().unwrap().files = 32_767 - 1);
        let err = f
            .cache
            .create(&f.root, &key(Cnid::ROOT, "extra"), 0, 0, 0)
            .unwrap_err();
        assert!(matches!(err, Error::NoSpace));
        assert_eq!(f.volume.next_cnid(), Cnid::new(17));

        f.root.update(|d| d.dir_mut().unwrap().files = 0);
        let extra = f
            .cache
            .create(&f.root, &key(Cnid::ROOT, "extra"), 0, 0, 0)
            .unwrap();
        assert_eq!(extra.cnid(), Cnid::new(17));
    }

    #[test]
    fn test_create_with_file_thread() {
        let f = fixture();
        let file = f
            .cache
            .create(&f.root, &key(Cnid::ROOT, "t"), FileRecord::FLAG_THREAD, 0, 0)
            .unwrap();
        let thread = f.tree.get(&CatalogKey::thread(file.cnid())).unwrap();
        let CatalogRecord::FileThread(thread) = CatalogRecord::decode(&thread).unwrap() else {
            panic!("expected a file thread");
        };
        assert_eq!(thread.parent, Cnid::ROOT);
        assert_eq!(thread.name.as_bytes(), b"t");

        f.cache.delete(&f.root, &file, true).unwrap();
        assert!(f.tree.get(&CatalogKey::thread(file.cnid())).is_none());
    }

    #[test]
    fn test_delete_updates_counts() {
        let f = fixture();
        let dir = f.cache.mkdir(&f.root, &key(Cnid::ROOT, "docs")).unwrap();
        let inner = f.cache.create(&dir, &key(dir.cnid(), "a"), 0, 0, 0).unwrap();

        let err = f.cache.delete(&f.root, &dir, true).unwrap_err();
        assert!(matches!(err, Error::NotEmpty));

        f.cache.delete(&dir, &inner, false).unwrap();
        assert!(inner.is_deleted());
        assert_eq!(f.cache.delete(&dir, &inner, false).unwrap_err().errno(), 2);

        f.cache.delete(&f.root, &dir, true).unwrap();
        assert!(f.tree.get(&CatalogKey::thread(dir.cnid())).is_none());
        assert_eq!(f.root.with_data(|d| d.dir().unwrap().valence()), 0);
        assert_eq!(f.volume.counts().dirs, 0);
        assert!(!f.cache.contains(f.volume.id(), &key(Cnid::ROOT, "docs")));
    }

    #[test]
    fn test_rename_within_directory() {
        let f = fixture();
        let file = f.cache.create(&f.root, &key(Cnid::ROOT, "old"), 0, 0, 0).unwrap();
        let replaced = f
            .cache
            .rename(&f.root, &f.root, &file, &key(Cnid::ROOT, "new"))
            .unwrap();
        assert!(replaced.is_none());
        assert!(file.key().same_bytes(&key(Cnid::ROOT, "new")));
        assert!(f.tree.get(&key(Cnid::ROOT, "old")).is_none());
        assert!(f.tree.get(&key(Cnid::ROOT, "new")).is_some());
        assert_eq!(f.root.with_data(|d| d.dir().unwrap().files), 1);

        let found = f.cache.get(&f.volume, &key(Cnid::ROOT, "NEW")).unwrap();
        assert!(found.same_entry(&file));
    }

    #[test]
    fn test_case_only_rename_rewrites_key() {
        let f = fixture();
        let dir = f.cache.mkdir(&f.root, &key(Cnid::ROOT, "docs")).unwrap();
        assert!(f
            .cache
            .rename(&f.root, &f.root, &dir, &key(Cnid::ROOT, "Docs"))
            .unwrap()
            .is_none());
        assert!(dir.state().contains(crate::entry::EntryState::KEY_DIRTY));
        f.cache.commit(&f.volume);

        let stored = f.tree.stored_key(&key(Cnid::ROOT, "docs")).unwrap();
        assert!(stored.same_bytes(&key(Cnid::ROOT, "Docs")));
        let thread = f.tree.get(&CatalogKey::thread(dir.cnid())).unwrap();
        let CatalogRecord::Thread(thread) = CatalogRecord::decode(&thread).unwrap() else {
            panic!("expected a thread");
        };
        assert_eq!(thread.name.as_bytes(), b"Docs");
    }

    #[test]
    fn test_rename_rejects_kind_mismatch() {
        let f = fixture();
        let file = f.cache.create(&f.root, &key(Cnid::ROOT, "a"), 0, 0, 0).unwrap();
        let _dir = f.cache.mkdir(&f.root, &key(Cnid::ROOT, "b")).unwrap();
        f.tree.stats().reset();
        let err = f
            .cache
            .rename(&f.root, &f.root, &file, &key(Cnid::ROOT, "b"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(f.tree.stats().mutations(), 0);
    }

    #[test]
    fn test_parent_lookup() {
        let f = fixture();
        let dir = f.cache.mkdir(&f.root, &key(Cnid::ROOT, "docs")).unwrap();
        let file = f.cache.create(&dir, &key(dir.cnid(), "a"), 0, 0, 0).unwrap();
        let parent = f.cache.parent(&file).unwrap();
        assert!(parent.same_entry(&dir));
        let top = f.cache.parent(&dir).unwrap();
        assert!(top.same_entry(&f.root));
        assert!(f.cache.parent(&f.root).unwrap_err().is_not_found());
    }

    #[test]
    fn test_key_must_name_parent() {
        let f = fixture();
        let err = f
            .cache
            .create(&f.root, &key(Cnid::new(99), "x"), 0, 0, 0)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
