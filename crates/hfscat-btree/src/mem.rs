//! In-memory catalog tree with snapshot persistence
//!
//! Uses Rust's BTreeMap for the index, keyed by [`CatalogKey`] so the map's
//! order is the catalog collation. Adds:
//! - Per-operation counters, so callers can prove an operation made no
//!   mutations
//! - An optional record ceiling that turns inserts into `NoSpace`
//! - Checksummed snapshots written through a temp file and atomic rename

use crate::snapshot::SnapshotHeader;
use crate::tree::{CatalogTree, FindMode, RecordHandle, TreeError, TreeResult};
use hfscat_common::CatalogKey;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::ops::Bound;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// In-memory tree configuration
#[derive(Clone, Debug, Default)]
pub struct MemTreeConfig {
    /// Refuse inserts beyond this many records
    pub max_records: Option<usize>,
}

/// Operation counters
#[derive(Debug, Default)]
pub struct TreeStats {
    pub finds: AtomicU64,
    pub successors: AtomicU64,
    pub inserts: AtomicU64,
    pub deletes: AtomicU64,
    pub updates: AtomicU64,
}

impl TreeStats {
    /// Inserts, deletes and in-place updates that reached the tree
    pub fn mutations(&self) -> u64 {
        self.inserts.load(Ordering::Relaxed)
            + self.deletes.load(Ordering::Relaxed)
            + self.updates.load(Ordering::Relaxed)
    }

    /// Reset all counters
    pub fn reset(&self) {
        self.finds.store(0, Ordering::Relaxed);
        self.successors.store(0, Ordering::Relaxed);
        self.inserts.store(0, Ordering::Relaxed);
        self.deletes.store(0, Ordering::Relaxed);
        self.updates.store(0, Ordering::Relaxed);
    }
}

/// In-memory catalog tree
#[derive(Debug)]
pub struct MemCatalogTree {
    /// The actual B-tree
    tree: RwLock<BTreeMap<CatalogKey, Vec<u8>>>,
    /// Operation counters
    stats: TreeStats,
    /// Configuration
    config: MemTreeConfig,
}

impl Default for MemCatalogTree {
    fn default() -> Self {
        Self::new(MemTreeConfig::default())
    }
}

impl MemCatalogTree {
    /// Create a new empty tree
    pub fn new(config: MemTreeConfig) -> Self {
        Self {
            tree: RwLock::new(BTreeMap::new()),
            stats: TreeStats::default(),
            config,
        }
    }

    /// Operation counters
    pub fn stats(&self) -> &TreeStats {
        &self.stats
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.tree.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw bytes stored under `key`, bypassing the counters
    pub fn get(&self, key: &CatalogKey) -> Option<Vec<u8>> {
        self.tree.read().get(key).cloned()
    }

    /// Stored key (with its on-disk case) matching `key`
    pub fn stored_key(&self, key: &CatalogKey) -> Option<CatalogKey> {
        self.tree
            .read()
            .get_key_value(key)
            .map(|(k, _)| k.clone())
    }

    /// All records in key order
    pub fn records(&self) -> Vec<(CatalogKey, Vec<u8>)> {
        self.tree
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Load a tree from a snapshot file, returning it with the stored next CNID
    pub fn load_snapshot(path: &Path, config: MemTreeConfig) -> TreeResult<(Self, u32)> {
        let file = File::open(path)
            .map_err(|e| TreeError::Io(format!("failed to open snapshot: {e}")))?;
        let mut reader = BufReader::new(file);

        let mut header_buf = [0u8; SnapshotHeader::SIZE];
        reader
            .read_exact(&mut header_buf)
            .map_err(|e| TreeError::Io(format!("failed to read snapshot header: {e}")))?;
        let header = SnapshotHeader::from_bytes(&header_buf)
            .ok_or_else(|| TreeError::Io("invalid snapshot header".into()))?;

        let mut data_buf = Vec::new();
        reader
            .read_to_end(&mut data_buf)
            .map_err(|e| TreeError::Io(format!("failed to read snapshot data: {e}")))?;

        if crc32c::crc32c(&data_buf) != header.checksum {
            return Err(TreeError::Io("snapshot checksum mismatch".into()));
        }

        let records: Vec<(Vec<u8>, Vec<u8>)> = bincode::deserialize(&data_buf)
            .map_err(|e| TreeError::Io(format!("failed to deserialize snapshot: {e}")))?;
        if records.len() as u64 != header.record_count {
            return Err(TreeError::Io(format!(
                "snapshot holds {} records, header says {}",
                records.len(),
                header.record_count
            )));
        }

        let mut tree = BTreeMap::new();
        for (key_bytes, data) in records {
            let key = CatalogKey::from_bytes(&key_bytes)
                .map_err(|e| TreeError::Io(format!("bad key in snapshot: {e}")))?;
            tree.insert(key, data);
        }

        info!(
            "Loaded catalog snapshot {:?} ({} records)",
            path, header.record_count
        );
        Ok((
            Self {
                tree: RwLock::new(tree),
                stats: TreeStats::default(),
                config,
            },
            header.next_cnid,
        ))
    }

    /// Write a snapshot to `path`
    pub fn write_snapshot(&self, path: &Path, next_cnid: u32) -> TreeResult<()> {
        let records: Vec<(Vec<u8>, Vec<u8>)> = self
            .tree
            .read()
            .iter()
            .map(|(k, v)| (k.to_bytes(), v.clone()))
            .collect();

        let data = bincode::serialize(&records)
            .map_err(|e| TreeError::Io(format!("failed to serialize snapshot: {e}")))?;

        let mut header = SnapshotHeader::new(records.len() as u64, next_cnid);
        header.checksum = crc32c::crc32c(&data);

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .map_err(|e| TreeError::Io(format!("failed to create snapshot dir: {e}")))?;
        }

        // Write to temporary file first
        let mut temp_path = path.as_os_str().to_owned();
        temp_path.push(".tmp");
        let temp_path = std::path::PathBuf::from(temp_path);
        {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&temp_path)
                .map_err(|e| TreeError::Io(format!("failed to create snapshot file: {e}")))?;
            let mut writer = BufWriter::new(file);
            writer
                .write_all(&header.to_bytes())
                .map_err(|e| TreeError::Io(format!("failed to write snapshot header: {e}")))?;
            writer
                .write_all(&data)
                .map_err(|e| TreeError::Io(format!("failed to write snapshot data: {e}")))?;
            writer
                .flush()
                .map_err(|e| TreeError::Io(format!("failed to flush snapshot: {e}")))?;
            writer
                .get_ref()
                .sync_all()
                .map_err(|e| TreeError::Io(format!("failed to sync snapshot: {e}")))?;
        }

        // Atomic rename
        std::fs::rename(&temp_path, path)
            .map_err(|e| TreeError::Io(format!("failed to rename snapshot: {e}")))?;

        debug!("Wrote catalog snapshot {:?} ({} records)", path, records.len());
        Ok(())
    }
}

impl CatalogTree for MemCatalogTree {
    fn find(&self, key: &CatalogKey, mode: FindMode) -> TreeResult<RecordHandle> {
        self.stats.finds.fetch_add(1, Ordering::Relaxed);
        let tree = self.tree.read();
        tree.get_key_value(key)
            .map(|(k, v)| RecordHandle::new(k.clone(), v.clone(), mode))
            .ok_or(TreeError::NotFound)
    }

    fn successor(&self, handle: &mut RecordHandle, n: u16) -> TreeResult<()> {
        self.stats.successors.fetch_add(1, Ordering::Relaxed);
        if n == 0 {
            return Ok(());
        }
        let tree = self.tree.read();
        let next = tree
            .range((Bound::Excluded(handle.stored_key().clone()), Bound::Unbounded))
            .nth(usize::from(n) - 1)
            .map(|(k, v)| (k.clone(), v.clone()));
        drop(tree);

        match next {
            Some((key, data)) => {
                handle.reposition(key, data);
                Ok(())
            }
            None => Err(TreeError::NotFound),
        }
    }

    fn release(&self, handle: RecordHandle) -> TreeResult<()> {
        if handle.mode() != FindMode::WriteIntent || !handle.is_modified() {
            return Ok(());
        }
        let mut tree = self.tree.write();
        let stored = handle.stored_key();
        if tree.remove(stored).is_none() {
            return Err(TreeError::NotFound);
        }
        // Remove then insert so a case-only key change replaces the stored key.
        tree.insert(handle.key().clone(), handle.data().to_vec());
        self.stats.updates.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn insert(&self, key: &CatalogKey, record: &[u8]) -> TreeResult<()> {
        let mut tree = self.tree.write();
        if tree.contains_key(key) {
            return Err(TreeError::AlreadyExists);
        }
        if let Some(max) = self.config.max_records {
            if tree.len() >= max {
                return Err(TreeError::NoSpace);
            }
        }
        tree.insert(key.clone(), record.to_vec());
        self.stats.inserts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn delete(&self, key: &CatalogKey) -> TreeResult<()> {
        let mut tree = self.tree.write();
        if tree.remove(key).is_none() {
            return Err(TreeError::NotFound);
        }
        self.stats.deletes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
