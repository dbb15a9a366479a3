//! Mounted volume state
//!
//! A [`Volume`] is what the cache needs from a mounted HFS volume: its catalog
//! tree, the CNID allocator, the file and folder counters kept in the master
//! directory block, and the rename lock.

use crate::codec::{CatalogRecord, DirRecord, ThreadRecord};
use crate::sync::SleepLock;
use hfscat_btree::CatalogTree;
use hfscat_common::{
    CatalogKey, CatalogName, Cnid, Error, Result, VolumeConfig, VolumeId, mac_time_now,
};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::info;

/// File and folder counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VolumeCounts {
    /// Files on the volume
    pub files: u32,
    /// Directories on the volume, root excluded
    pub dirs: u32,
    /// Files directly in the root
    pub root_files: u32,
    /// Directories directly in the root
    pub root_dirs: u32,
}

#[derive(Debug, Default)]
struct VolumeHeader {
    counts: VolumeCounts,
    modify_date: u32,
    dirty: bool,
}

pub struct Volume {
    id: VolumeId,
    name: CatalogName,
    tree: Arc<dyn CatalogTree>,
    next_cnid: AtomicU32,
    header: Mutex<VolumeHeader>,
    rename_lock: SleepLock,
    clump_size: u16,
}

impl Volume {
    /// A freshly formatted volume
    pub fn new(id: VolumeId, tree: Arc<dyn CatalogTree>, config: &VolumeConfig) -> Result<Arc<Self>> {
        Self::mount(
            id,
            tree,
            config,
            Cnid::new(config.first_user_cnid),
            VolumeCounts::default(),
        )
    }

    /// A volume whose allocator and counters were saved earlier
    pub fn mount(
        id: VolumeId,
        tree: Arc<dyn CatalogTree>,
        config: &VolumeConfig,
        next_cnid: Cnid,
        counts: VolumeCounts,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        if next_cnid < Cnid::new(config.first_user_cnid) {
            return Err(Error::configuration(format!(
                "next CNID {next_cnid} is below the first user CNID {}",
                config.first_user_cnid
            )));
        }
        Ok(Arc::new(Self {
            id,
            name: CatalogName::new(config.name.as_bytes())?,
            tree,
            next_cnid: AtomicU32::new(next_cnid.get()),
            header: Mutex::new(VolumeHeader {
                counts,
                modify_date: mac_time_now(),
                dirty: false,
            }),
            rename_lock: SleepLock::new(),
            clump_size: config.clump_size,
        }))
    }

    pub const fn id(&self) -> VolumeId {
        self.id
    }

    pub const fn name(&self) -> &CatalogName {
        &self.name
    }

    pub fn tree(&self) -> &dyn CatalogTree {
        self.tree.as_ref()
    }

    pub const fn clump_size(&self) -> u16 {
        self.clump_size
    }

    /// Hand out the next CNID
    pub fn allocate_cnid(&self) -> Cnid {
        Cnid::new(self.next_cnid.fetch_add(1, Ordering::Relaxed))
    }

    /// The CNID the next allocation will return
    pub fn next_cnid(&self) -> Cnid {
        Cnid::new(self.next_cnid.load(Ordering::Relaxed))
    }

    pub fn counts(&self) -> VolumeCounts {
        self.header.lock().counts
    }

    pub fn modify_date(&self) -> u32 {
        self.header.lock().modify_date
    }

    /// Clear and return the header's dirty bit
    pub fn take_dirty(&self) -> bool {
        std::mem::take(&mut self.header.lock().dirty)
    }

    /// Apply a child count change in directory `parent`
    pub(crate) fn adjust_counts(&self, parent: Cnid, is_dir: bool, delta: i32) {
        let mut header = self.header.lock();
        let counts = &mut header.counts;
        let in_root = parent == Cnid::ROOT;
        if is_dir {
            counts.dirs = counts.dirs.saturating_add_signed(delta);
            if in_root {
                counts.root_dirs = counts.root_dirs.saturating_add_signed(delta);
            }
        } else {
            counts.files = counts.files.saturating_add_signed(delta);
            if in_root {
                counts.root_files = counts.root_files.saturating_add_signed(delta);
            }
        }
        header.modify_date = mac_time_now();
        header.dirty = true;
    }

    /// Serialize renames on this volume until the guard drops
    pub(crate) fn lock_renames(&self) -> RenameGuard<'_> {
        self.rename_lock.lock();
        RenameGuard { volume: self }
    }
}

impl fmt::Debug for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Volume")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("next_cnid", &self.next_cnid())
            .finish_non_exhaustive()
    }
}

pub(crate) struct RenameGuard<'a> {
    volume: &'a Volume,
}

impl Drop for RenameGuard<'_> {
    fn drop(&mut self) {
        self.volume.rename_lock.unlock();
    }
}

/// Write the root directory and its thread into an empty tree
pub fn format_volume(tree: &dyn CatalogTree, config: &VolumeConfig) -> Result<()> {
    config.validate()?;
    let name = CatalogName::new(config.name.as_bytes())?;
    let now = mac_time_now();

    let mut root = DirRecord {
        cnid: Cnid::ROOT,
        create_date: now,
        modify_date: now,
        ..DirRecord::default()
    };
    root.user_info[DirRecord::VIEW_OFFSET + 1] = 0xff;

    let thread = ThreadRecord {
        parent: Cnid::ROOT_PARENT,
        name: name.clone(),
        ..ThreadRecord::default()
    };

    tree.insert(
        &CatalogKey::new(Cnid::ROOT_PARENT, name),
        &CatalogRecord::Directory(root).encode(),
    )?;
    tree.insert(
        &CatalogKey::thread(Cnid::ROOT),
        &CatalogRecord::Thread(thread).encode(),
    )?;
    info!(volume = %config.name, "formatted catalog");
    Ok(())
}
