#![allow(dead_code, clippy::unwrap_used)]

use hfscat::{
    CacheConfig, CatalogCache, CatalogKey, CatalogName, CatalogRecord, Cnid, Entry, FileRecord,
    Volume, VolumeConfig, VolumeId, format_volume,
};
use hfscat_btree::{
    CatalogTree, FindMode, MemCatalogTree, RecordHandle, TreeError, TreeResult, TreeStats,
};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Find,
    Successor,
    Insert,
    Delete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Keys {
    Any,
    /// Thread keys only (empty name)
    Thread,
    /// File and directory keys only
    Named,
}

/// A one-shot failure armed on a [`FaultyTree`]
#[derive(Clone, Debug)]
pub struct Fault {
    pub op: Op,
    pub keys: Keys,
    pub error: TreeError,
}

impl Fault {
    pub fn io(op: Op, keys: Keys) -> Self {
        Self {
            op,
            keys,
            error: TreeError::Io("injected".to_string()),
        }
    }
}

/// Memory tree that fails armed operations once each
#[derive(Default)]
pub struct FaultyTree {
    inner: MemCatalogTree,
    faults: Mutex<Vec<Fault>>,
}

impl FaultyTree {
    pub fn arm(&self, fault: Fault) {
        self.faults.lock().push(fault);
    }

    pub fn stats(&self) -> &TreeStats {
        self.inner.stats()
    }

    pub fn mem(&self) -> &MemCatalogTree {
        &self.inner
    }

    pub fn get(&self, key: &CatalogKey) -> Option<Vec<u8>> {
        self.inner.get(key)
    }

    pub fn record(&self, key: &CatalogKey) -> Option<CatalogRecord> {
        self.inner
            .get(key)
            .map(|bytes| CatalogRecord::decode(&bytes).unwrap())
    }

    fn check(&self, op: Op, key: &CatalogKey) -> TreeResult<()> {
        let mut faults = self.faults.lock();
        let hit = faults.iter().position(|f| {
            f.op == op
                && match f.keys {
                    Keys::Any => true,
                    Keys::Thread => key.is_thread(),
                    Keys::Named => !key.is_thread(),
                }
        });
        match hit {
            Some(pos) => Err(faults.remove(pos).error),
            None => Ok(()),
        }
    }
}

impl CatalogTree for FaultyTree {
    fn find(&self, key: &CatalogKey, mode: FindMode) -> TreeResult<RecordHandle> {
        self.check(Op::Find, key)?;
        self.inner.find(key, mode)
    }

    fn successor(&self, handle: &mut RecordHandle, n: u16) -> TreeResult<()> {
        self.check(Op::Successor, &handle.key().clone())?;
        self.inner.successor(handle, n)
    }

    fn release(&self, handle: RecordHandle) -> TreeResult<()> {
        self.inner.release(handle)
    }

    fn insert(&self, key: &CatalogKey, record: &[u8]) -> TreeResult<()> {
        self.check(Op::Insert, key)?;
        self.inner.insert(key, record)
    }

    fn delete(&self, key: &CatalogKey) -> TreeResult<()> {
        self.check(Op::Delete, key)?;
        self.inner.delete(key)
    }
}

pub struct Harness {
    pub cache: CatalogCache,
    pub tree: Arc<FaultyTree>,
    pub volume: Arc<Volume>,
    pub root: Entry,
}

pub fn harness() -> Harness {
    harness_with(CacheConfig::default())
}

pub fn harness_with(config: CacheConfig) -> Harness {
    harness_on(CatalogCache::new(config).unwrap(), VolumeId::new(1))
}

/// A freshly formatted volume mounted on an existing cache
pub fn harness_on(cache: CatalogCache, id: VolumeId) -> Harness {
    let tree = Arc::new(FaultyTree::default());
    let config = VolumeConfig::default();
    format_volume(tree.as_ref(), &config).unwrap();
    let volume = Volume::new(id, tree.clone(), &config).unwrap();
    let root = cache.get(&volume, &root_key()).unwrap();
    Harness {
        cache,
        tree,
        volume,
        root,
    }
}

pub fn root_key() -> CatalogKey {
    CatalogKey::new(Cnid::ROOT_PARENT, CatalogName::new("Untitled").unwrap())
}

pub fn key(parent: Cnid, name: &str) -> CatalogKey {
    CatalogKey::new(parent, CatalogName::new(name).unwrap())
}

/// Write a bare file record straight into the tree
pub fn insert_file(tree: &FaultyTree, parent: Cnid, name: &str, cnid: u32) {
    let record = CatalogRecord::File(FileRecord {
        flags: FileRecord::FLAG_USED,
        cnid: Cnid::new(cnid),
        ..FileRecord::default()
    });
    tree.mem()
        .insert(&key(parent, name), &record.encode())
        .unwrap();
}

pub fn valence(dir: &Entry) -> (u32, u32) {
    dir.with_data(|d| {
        let info = d.dir().unwrap();
        (info.files, info.dirs)
    })
}
