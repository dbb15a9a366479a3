//! A catalog snapshot mounted through the entry cache

use anyhow::{Context, Result, bail};
use hfscat::{
    CatalogCache, CatalogKey, CatalogName, CatalogRecord, Cnid, DirCursor, Entry, Error,
    RecordType, Volume, VolumeCounts, VolumeId, format_volume,
};
use hfscat_btree::{CatalogTree, FindMode, MemCatalogTree, MemTreeConfig};
use hfscat_common::Config;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// One directory listing row
#[derive(Debug, Clone)]
pub struct Child {
    pub name: CatalogName,
    pub cnid: Cnid,
    pub kind: RecordType,
}

impl Child {
    pub fn is_dir(&self) -> bool {
        self.kind == RecordType::Directory
    }
}

/// Write an empty volume to `image`
pub fn format(image: &Path, config: &Config, force: bool) -> Result<()> {
    if image.exists() && !force {
        bail!(
            "{} already exists; pass --force to overwrite it",
            image.display()
        );
    }
    let tree = MemCatalogTree::default();
    format_volume(&tree, &config.volume)?;
    tree.write_snapshot(image, config.volume.first_user_cnid)
        .with_context(|| format!("failed to write {}", image.display()))?;
    info!("Formatted {} as {:?}", image.display(), config.volume.name);
    Ok(())
}

pub struct Session {
    image: PathBuf,
    tree: Arc<MemCatalogTree>,
    cache: CatalogCache,
    volume: Arc<Volume>,
    root: Entry,
}

impl Session {
    /// Load `image` and mount it
    ///
    /// The volume counters are not stored in the snapshot, so they are
    /// recomputed from the records.
    pub fn open(image: &Path, config: &Config) -> Result<Self> {
        let (tree, next_cnid) = MemCatalogTree::load_snapshot(image, MemTreeConfig::default())
            .with_context(|| format!("failed to load {}", image.display()))?;
        let counts = count_records(&tree)?;
        let tree = Arc::new(tree);
        let root_key = root_key(tree.as_ref())?;

        let mut volume_config = config.volume.clone();
        if let Ok(name) = std::str::from_utf8(root_key.name().as_bytes()) {
            volume_config.name = name.to_string();
        }
        let volume = Volume::mount(
            VolumeId::new(1),
            tree.clone(),
            &volume_config,
            Cnid::new(next_cnid),
            counts,
        )?;
        let cache = CatalogCache::new(config.cache.clone())?;
        let root = cache
            .get(&volume, &root_key)
            .context("unable to read the root directory")?;
        debug!(?counts, next_cnid, "mounted {}", image.display());

        Ok(Self {
            image: image.to_path_buf(),
            tree,
            cache,
            volume,
            root,
        })
    }

    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    pub const fn root(&self) -> &Entry {
        &self.root
    }

    /// Look up a `:`-separated path below the root
    pub fn resolve(&self, path: &str) -> Result<Entry> {
        let mut entry = self.root.clone();
        for part in components(path) {
            if !entry.is_dir() {
                bail!("{path}: {} is not a directory", entry.key().name());
            }
            let key = CatalogKey::new(entry.cnid(), CatalogName::new(part)?);
            entry = self
                .cache
                .get(&self.volume, &key)
                .with_context(|| format!("{path}: cannot find {part}"))?;
        }
        Ok(entry)
    }

    /// The directory holding the last path component, and that component's key
    pub fn resolve_parent(&self, path: &str) -> Result<(Entry, CatalogKey)> {
        let parts: Vec<&str> = components(path).collect();
        let Some((leaf, dirs)) = parts.split_last() else {
            bail!("{path:?} names the root directory");
        };
        let parent = self.resolve(&dirs.join(":"))?;
        if !parent.is_dir() {
            bail!("{path}: parent is not a directory");
        }
        let key = CatalogKey::new(parent.cnid(), CatalogName::new(*leaf)?);
        Ok((parent, key))
    }

    /// Children of `dir` in catalog order
    pub fn list(&self, dir: &Entry) -> Result<Vec<Child>> {
        let mut cursor = DirCursor::open(dir)?;
        let mut children = Vec::new();
        loop {
            match cursor.next_entry(1) {
                Ok((cnid, kind)) => {
                    let name = cursor.key().map(|k| k.name().clone()).unwrap_or_default();
                    children.push(Child { name, cnid, kind });
                }
                Err(Error::NotFound) => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(children)
    }

    pub fn child(&self, dir: &Entry, name: &CatalogName) -> Result<Entry> {
        let key = CatalogKey::new(dir.cnid(), name.clone());
        Ok(self.cache.get(&self.volume, &key)?)
    }

    pub fn mkdir(&self, path: &str) -> Result<Entry> {
        let (parent, key) = self.resolve_parent(path)?;
        Ok(self.cache.mkdir(&parent, &key)?)
    }

    pub fn touch(&self, path: &str, flags: u8, file_type: u32, creator: u32) -> Result<Entry> {
        let (parent, key) = self.resolve_parent(path)?;
        Ok(self.cache.create(&parent, &key, flags, file_type, creator)?)
    }

    /// Delete a file, or an empty directory when `dir` is set
    pub fn remove(&self, path: &str, dir: bool) -> Result<()> {
        let (parent, key) = self.resolve_parent(path)?;
        let entry = self.cache.get(&self.volume, &key)?;
        match (dir, entry.is_dir()) {
            (true, false) => bail!("{path}: not a directory"),
            (false, true) => bail!("{path}: is a directory"),
            _ => {}
        }
        self.cache.delete(&parent, &entry, true)?;
        Ok(())
    }

    /// Move `from` to `to`, or into `to` when it is a directory
    ///
    /// Returns the CNID of an entry the move replaced.
    pub fn rename(&self, from: &str, to: &str) -> Result<Option<Cnid>> {
        let (old_dir, old_key) = self.resolve_parent(from)?;
        let entry = self.cache.get(&self.volume, &old_key)?;
        let (new_dir, new_key) = match self.resolve(to) {
            Ok(target) if target.is_dir() && !target.same_entry(&entry) => {
                let key = CatalogKey::new(target.cnid(), entry.key().name().clone());
                (target, key)
            }
            _ => self.resolve_parent(to)?,
        };
        let replaced = self.cache.rename(&old_dir, &new_dir, &entry, &new_key)?;
        Ok(replaced.map(|r| r.cnid()))
    }

    /// Write every change back and save the snapshot
    pub fn close(self) -> Result<()> {
        let Self {
            image,
            tree,
            cache,
            volume,
            root,
        } = self;
        drop(root);
        cache.commit(&volume);
        tree.write_snapshot(&image, volume.next_cnid().get())
            .with_context(|| format!("failed to save {}", image.display()))?;
        let stats = cache.stats();
        debug!(
            hit_ratio = stats.hit_ratio(),
            writebacks = stats.writebacks.load(std::sync::atomic::Ordering::Relaxed),
            "saved {}",
            image.display()
        );
        Ok(())
    }
}

fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split(':').filter(|part| !part.is_empty())
}

/// The root directory's key, read from its thread record
fn root_key(tree: &dyn CatalogTree) -> Result<CatalogKey> {
    let handle = tree.find(&CatalogKey::thread(Cnid::ROOT), FindMode::ReadEqual)?;
    let record = CatalogRecord::decode(handle.data());
    tree.release(handle)?;
    match record? {
        CatalogRecord::Thread(thread) => Ok(CatalogKey::new(thread.parent, thread.name)),
        other => bail!("root thread holds a {:?} record", other.record_type()),
    }
}

fn count_records(tree: &MemCatalogTree) -> Result<VolumeCounts> {
    let mut counts = VolumeCounts::default();
    for (key, data) in tree.records() {
        let in_root = key.parent() == Cnid::ROOT;
        match CatalogRecord::decode(&data)? {
            CatalogRecord::Directory(dir) if dir.cnid != Cnid::ROOT => {
                counts.dirs += 1;
                if in_root {
                    counts.root_dirs += 1;
                }
            }
            CatalogRecord::File(_) => {
                counts.files += 1;
                if in_root {
                    counts.root_files += 1;
                }
            }
            _ => {}
        }
    }
    Ok(counts)
}
