//! Catalog entry cache
//!
//! Entries live in a slot arena that grows in chunks up to
//! [`CacheConfig::max_entries`]. One structural mutex guards the hash index,
//! the slot lists and every slot's reference count, flags and key. Entry
//! contents sit behind a per-slot mutex that may be taken while the
//! structural lock is held, never the other way round.
//!
//! Every slot is on exactly one of:
//! - the unused stack (no volume, no key)
//! - the in-use list, least recently touched first
//! - its volume's dirty list (also mirrored on the global dirty list)
//!
//! or on none while it waits for its last reference after being unhashed.
//!
//! The intent lock is held while an entry is being populated or written
//! back, and by operations that change the entry's record. Lookups that hit
//! an entry wait for it to unlock.

use crate::codec::{CatalogRecord, ExtentDescriptor};
use crate::dir;
use crate::entry::{EntryData, EntryKind, EntryState, ForkKind};
use crate::lists::{SlotId, SlotList};
use crate::sync::SleepLock;
use crate::volume::Volume;
use crate::writeback;
use hfscat_btree::{FindMode, TreeError};
use hfscat_common::{CacheConfig, CatalogKey, Cnid, Error, Result, VolumeId};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace, warn};

/// Callback asking the layer above to drop its references to an entry
///
/// Called without any cache lock held, for entries the cache wants back.
/// Implementations typically remove the entry from their own tables, which
/// drops the [`Entry`] handles they hold.
pub trait EntryPruner: Send + Sync {
    fn prune(&self, volume: VolumeId, key: &CatalogKey, cnid: Cnid);
}

/// Cache statistics
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    /// Arena growth steps
    pub grows: AtomicU64,
    /// Entries unhashed by reclaim
    pub reclaimed: AtomicU64,
    pub writebacks: AtomicU64,
    pub writeback_failures: AtomicU64,
}

impl CacheStats {
    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let misses = self.misses.load(Ordering::Relaxed) as f64;
        let total = hits + misses;
        if total == 0.0 { 0.0 } else { hits / total }
    }
}

/// Per-slot blocking state and contents
#[derive(Debug, Default)]
pub(crate) struct EntrySlot {
    pub(crate) intent: SleepLock,
    /// Directory reader/writer admission
    pub(crate) dir: SleepLock,
    pub(crate) data: Mutex<EntryData>,
}

/// Per-slot bookkeeping guarded by the structural lock
struct SlotMeta {
    volume: Option<Arc<Volume>>,
    key: CatalogKey,
    ref_count: u32,
    /// DIRTY, DELETED and KEY_DIRTY; LOCKED is read from the intent lock
    flags: EntryState,
    hashed: bool,
}

impl SlotMeta {
    const fn vacant() -> Self {
        Self {
            volume: None,
            key: CatalogKey::thread(Cnid::INVALID),
            ref_count: 0,
            flags: EntryState::empty(),
            hashed: false,
        }
    }

    fn volume_id(&self) -> Option<VolumeId> {
        self.volume.as_ref().map(|v| v.id())
    }
}

#[derive(Default)]
struct CacheState {
    slots: Vec<Arc<EntrySlot>>,
    meta: Vec<SlotMeta>,
    index: HashMap<(VolumeId, CatalogKey), SlotId>,
    unused: Vec<SlotId>,
    in_use: SlotList,
    volume_dirty: HashMap<VolumeId, SlotList>,
    dirty: SlotList,
}

impl CacheState {
    fn unhash(&mut self, id: SlotId) {
        let meta = &mut self.meta[id];
        if !meta.hashed {
            return;
        }
        meta.hashed = false;
        if let Some(volume) = meta.volume_id() {
            let lookup = (volume, meta.key.clone());
            if self.index.get(&lookup) == Some(&id) {
                self.index.remove(&lookup);
            }
        }
    }

    fn unlink_dirty(&mut self, id: SlotId) {
        self.dirty.remove(id);
        if let Some(volume) = self.meta[id].volume_id() {
            if let Some(list) = self.volume_dirty.get_mut(&volume) {
                list.remove(id);
            }
        }
    }

    fn unlink(&mut self, id: SlotId) {
        self.in_use.remove(id);
        self.unlink_dirty(id);
    }

    /// Put a hashed slot on the list its flags call for
    fn relink(&mut self, id: SlotId) {
        let meta = &self.meta[id];
        if !meta.hashed {
            return;
        }
        match meta.volume_id() {
            Some(volume) if meta.flags.contains(EntryState::DIRTY) => {
                self.in_use.remove(id);
                self.volume_dirty.entry(volume).or_default().push_recent(id);
                self.dirty.push_recent(id);
            }
            _ => {
                self.unlink_dirty(id);
                self.in_use.push_recent(id);
            }
        }
    }

    fn can_reclaim(&self, id: SlotId, threshold: u32) -> bool {
        let meta = &self.meta[id];
        let mut flags = meta.flags;
        flags.remove(EntryState::DIRTY);
        meta.ref_count < threshold && flags.is_empty() && !self.slots[id].intent.is_locked()
    }

    fn referenced(&self) -> usize {
        self.meta.iter().filter(|m| m.ref_count > 0).count()
    }
}

type PruneRequest = (VolumeId, CatalogKey, Cnid);

pub(crate) struct CacheInner {
    state: Mutex<CacheState>,
    config: CacheConfig,
    stats: CacheStats,
    pruner: RwLock<Option<Arc<dyn EntryPruner>>>,
}

impl CacheInner {
    /// Find or create the entry for `key`
    ///
    /// Without `populate` a miss returns the new entry still locked and with
    /// an invalid CNID; the caller fills it in and unlocks it.
    pub(crate) fn get_entry(
        self: &Arc<Self>,
        volume: &Arc<Volume>,
        key: &CatalogKey,
        populate: bool,
    ) -> Result<Entry> {
        let lookup = (volume.id(), key.clone());
        let mut state = self.state.lock();
        if state.unused.is_empty() && state.slots.len() >= self.config.max_entries {
            state = self.reclaim(state, self.config.restock_goal).0;
        }

        loop {
            if let Some(&id) = state.index.get(&lookup) {
                state.meta[id].ref_count += 1;
                state.in_use.touch(id);
                let slot = Arc::clone(&state.slots[id]);
                drop(state);
                self.stats.hits.fetch_add(1, Ordering::Relaxed);

                slot.intent.wait_unlocked();
                let entry = Entry::new(Arc::clone(self), id, slot, Arc::clone(volume));
                if !entry.is_deleted() {
                    return Ok(entry);
                }
                trace!(?key, "hit a deleted entry, retrying");
                drop(entry);
                state = self.state.lock();
                continue;
            }

            if let Some(id) = state.unused.pop() {
                let slot = Arc::clone(&state.slots[id]);
                let claimed = slot.intent.try_lock();
                debug_assert!(claimed, "unused entry is locked");
                state.meta[id] = SlotMeta {
                    volume: Some(Arc::clone(volume)),
                    key: key.clone(),
                    ref_count: 1,
                    flags: EntryState::empty(),
                    hashed: true,
                };
                state.index.insert(lookup, id);
                state.in_use.push_recent(id);
                drop(state);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);

                let entry = Entry::new(Arc::clone(self), id, slot, Arc::clone(volume));
                if populate {
                    self.populate(&entry)?;
                }
                return Ok(entry);
            }

            state = self.grow(state)?;
        }
    }

    fn populate(&self, entry: &Entry) -> Result<()> {
        match Self::load(entry) {
            Ok(()) => {
                entry.slot.intent.unlock();
                Ok(())
            }
            Err(e) => {
                self.mark_deleted(entry.id);
                entry.slot.intent.unlock();
                Err(e)
            }
        }
    }

    /// Read the entry's record and, for a non-empty directory, recount its
    /// children
    fn load(entry: &Entry) -> Result<()> {
        let tree = entry.volume.tree();
        let key = entry.key();
        let handle = tree
            .find(&key, FindMode::ReadEqual)
            .map_err(|e| match e {
                TreeError::NotFound => Error::NotFound,
                other => Error::io(other.to_string()),
            })?;
        let record = CatalogRecord::decode(handle.data());
        tree.release(handle)
            .map_err(|e| Error::io(e.to_string()))?;
        let record = record?;
        let data = EntryData::from_record(&record)
            .ok_or_else(|| Error::io(format!("{key:?} names a thread record")))?;
        let needs_count = matches!(&record, CatalogRecord::Directory(d) if d.valence != 0);
        *entry.slot.data.lock() = data;

        if needs_count {
            match dir::count_children(entry) {
                Ok((files, dirs)) => {
                    if let Some(info) = entry.slot.data.lock().dir_mut() {
                        info.files = files;
                        info.dirs = dirs;
                    }
                }
                Err(e) => {
                    entry.slot.data.lock().cnid = Cnid::INVALID;
                    return Err(Error::io(format!(
                        "unable to count children of {key:?}: {e}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Add a chunk of slots, or reclaim a quarter of the cache at the ceiling
    fn grow<'a>(
        &'a self,
        mut state: MutexGuard<'a, CacheState>,
    ) -> Result<MutexGuard<'a, CacheState>> {
        let max = self.config.max_entries;
        let len = state.slots.len();
        if len < max {
            let count = self.config.grow_chunk.min(max - len);
            drop(state);
            let chunk = allocate_chunk(count);
            state = self.state.lock();
            match chunk {
                Some(chunk) if state.slots.len() + count <= max => {
                    let start = state.slots.len();
                    state.slots.extend(chunk);
                    state.meta.extend((0..count).map(|_| SlotMeta::vacant()));
                    state.unused.extend((start..start + count).rev());
                    self.stats.grows.fetch_add(1, Ordering::Relaxed);
                    debug!(total = start + count, "grew entry cache");
                    return Ok(state);
                }
                Some(_) if !state.unused.is_empty() => return Ok(state),
                Some(_) => {}
                None => warn!(count, "unable to allocate cache entries"),
            }
        }

        let goal = (state.slots.len() >> 2).max(1);
        let (state, found) = self.reclaim(state, goal);
        if state.unused.is_empty() {
            warn!(found, total = state.slots.len(), "entry cache exhausted");
            return Err(Error::OutOfMemory);
        }
        Ok(state)
    }

    /// Unhash up to `goal` lightly referenced entries and ask the pruner to
    /// let go of them
    ///
    /// Scans at most `2 * goal` entries from the in-use list, oldest first,
    /// then the dirty list. Returns the number of entries unhashed; they only
    /// come back as free slots once their last reference is dropped.
    fn reclaim<'a>(
        &'a self,
        mut guard: MutexGuard<'a, CacheState>,
        goal: usize,
    ) -> (MutexGuard<'a, CacheState>, usize) {
        let threshold = self.config.reclaim_threshold;
        let depth = goal.saturating_mul(2);
        let state = &mut *guard;

        let mut victims = Vec::new();
        let mut busy = Vec::new();
        for id in state.in_use.iter_oldest().take(depth) {
            if victims.len() >= goal {
                break;
            }
            if state.can_reclaim(id, threshold) {
                victims.push(id);
            } else {
                busy.push(id);
            }
        }
        for id in busy {
            state.in_use.touch(id);
        }
        if victims.len() < goal {
            for id in state.dirty.iter_oldest().take(depth) {
                if victims.len() >= goal {
                    break;
                }
                if state.can_reclaim(id, threshold) {
                    victims.push(id);
                }
            }
        }
        if victims.is_empty() {
            return (guard, 0);
        }

        let mut requests: Vec<PruneRequest> = Vec::with_capacity(victims.len());
        for &id in &victims {
            state.unhash(id);
            state.unlink(id);
            let meta = &state.meta[id];
            if let Some(volume) = meta.volume_id() {
                let cnid = state.slots[id].data.lock().cnid;
                requests.push((volume, meta.key.clone(), cnid));
            }
        }
        let found = victims.len();
        self.stats
            .reclaimed
            .fetch_add(found as u64, Ordering::Relaxed);
        debug!(goal, found, "reclaiming cache entries");
        drop(guard);

        self.prune(&requests);
        (self.state.lock(), found)
    }

    fn prune(&self, requests: &[PruneRequest]) {
        let pruner = self.pruner.read().clone();
        if let Some(pruner) = pruner {
            for (volume, key, cnid) in requests {
                pruner.prune(*volume, key, *cnid);
            }
        }
    }

    /// Drop one reference; the last one writes back or truncates and frees
    /// the slot
    fn release(&self, id: SlotId, slot: &Arc<EntrySlot>) {
        let mut guard = loop {
            let mut guard = self.state.lock();
            let meta = &mut guard.meta[id];
            if meta.ref_count == 0 {
                warn!(slot = id, "releasing an unreferenced entry");
                return;
            }
            if meta.ref_count > 1 {
                meta.ref_count -= 1;
                return;
            }
            if !slot.intent.is_locked() {
                meta.ref_count = 0;
                break guard;
            }
            drop(guard);
            slot.intent.wait_unlocked();
        };

        let flags = guard.meta[id].flags;
        if flags.contains(EntryState::DELETED) {
            if let Some(file) = slot.data.lock().file_mut() {
                file.data.truncate();
                file.rsrc.truncate();
            }
        } else {
            if let Some(file) = slot.data.lock().file_mut() {
                file.data.cached_extents.clear();
                file.rsrc.cached_extents.clear();
            }
            if flags.contains(EntryState::DIRTY) {
                let claimed = slot.intent.try_lock();
                debug_assert!(claimed, "unreferenced entry is locked");
                let state = &mut *guard;
                state.meta[id]
                    .flags
                    .remove(EntryState::DIRTY | EntryState::KEY_DIRTY);
                state.unlink_dirty(id);
                if state.meta[id].hashed {
                    state.in_use.push_oldest(id);
                }
                let volume = state.meta[id].volume.clone();
                let key = state.meta[id].key.clone();
                drop(guard);

                if let Some(volume) = volume {
                    let data = slot.data.lock().clone();
                    self.write_back(
                        &volume,
                        &key,
                        flags.contains(EntryState::KEY_DIRTY),
                        &data,
                    );
                }
                slot.intent.unlock();

                guard = self.state.lock();
                let same_slot = guard.slots.get(id).is_some_and(|s| Arc::ptr_eq(s, slot));
                if !same_slot || guard.meta[id].ref_count > 0 {
                    // Revived during writeback, or the cache was torn down
                    return;
                }
            }
        }

        let state = &mut *guard;
        state.unhash(id);
        state.unlink(id);
        state.meta[id] = SlotMeta::vacant();
        *slot.data.lock() = EntryData::default();
        state.unused.push(id);
    }

    fn write_back(&self, volume: &Volume, key: &CatalogKey, key_dirty: bool, data: &EntryData) {
        self.stats.writebacks.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = writeback::write_entry(volume.tree(), key, key_dirty, data) {
            self.stats
                .writeback_failures
                .fetch_add(1, Ordering::Relaxed);
            warn!(cnid = %data.cnid, ?key, error = %e, "unable to write catalog entry");
        }
    }

    pub(crate) fn mark_dirty(&self, id: SlotId) {
        let mut guard = self.state.lock();
        let meta = &mut guard.meta[id];
        if meta.flags.contains(EntryState::DIRTY) {
            return;
        }
        meta.flags.insert(EntryState::DIRTY);
        guard.relink(id);
    }

    /// Flag the entry deleted and take it out of the index
    pub(crate) fn mark_deleted(&self, id: SlotId) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.meta[id].flags.insert(EntryState::DELETED);
        state.unhash(id);
        state.unlink(id);
    }

    /// Give the entry a new key
    ///
    /// Whatever entry was hashed under the new key loses its index slot.
    pub(crate) fn rekey(&self, id: SlotId, key: &CatalogKey) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.unhash(id);
        let Some(volume) = state.meta[id].volume_id() else {
            return;
        };
        if let Some(other) = state.index.insert((volume, key.clone()), id) {
            if other != id {
                state.meta[other].hashed = false;
            }
        }
        let meta = &mut state.meta[id];
        meta.key = key.clone();
        meta.flags.insert(EntryState::KEY_DIRTY);
        meta.hashed = true;
        state.relink(id);
    }

    fn retain(&self, id: SlotId) {
        self.state.lock().meta[id].ref_count += 1;
    }
}

fn allocate_chunk(count: usize) -> Option<Vec<Arc<EntrySlot>>> {
    let mut chunk = Vec::new();
    chunk.try_reserve_exact(count).ok()?;
    chunk.extend((0..count).map(|_| Arc::new(EntrySlot::default())));
    Some(chunk)
}

/// The catalog entry cache
///
/// Cloning is cheap and shares the cache.
#[derive(Clone)]
pub struct CatalogCache {
    pub(crate) inner: Arc<CacheInner>,
}

impl CatalogCache {
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(CacheInner {
                state: Mutex::new(CacheState::default()),
                config,
                stats: CacheStats::default(),
                pruner: RwLock::new(None),
            }),
        })
    }

    /// Install the callback used to drop outside references during reclaim
    pub fn set_pruner(&self, pruner: Arc<dyn EntryPruner>) {
        *self.inner.pruner.write() = Some(pruner);
    }

    /// Look up an entry, reading it from the catalog on a miss
    ///
    /// Fails with `NotFound` when no record exists and `Io` when the record
    /// cannot be read or its directory cannot be counted.
    pub fn get(&self, volume: &Arc<Volume>, key: &CatalogKey) -> Result<Entry> {
        self.inner.get_entry(volume, key, true)
    }

    /// Drop a reference
    pub fn put(&self, entry: Entry) {
        drop(entry);
    }

    /// Write back every dirty entry of `volume`
    pub fn commit(&self, volume: &Volume) {
        let inner = &self.inner;
        loop {
            let mut guard = inner.state.lock();
            let state = &mut *guard;
            let Some(id) = state
                .volume_dirty
                .get(&volume.id())
                .and_then(SlotList::oldest)
            else {
                break;
            };
            let slot = Arc::clone(&state.slots[id]);
            if !slot.intent.try_lock() {
                drop(guard);
                slot.intent.wait_unlocked();
                continue;
            }
            state.unlink_dirty(id);
            state.in_use.push_recent(id);
            let meta = &mut state.meta[id];
            let key_dirty = meta.flags.contains(EntryState::KEY_DIRTY);
            meta.flags.remove(EntryState::DIRTY | EntryState::KEY_DIRTY);
            let key = meta.key.clone();
            drop(guard);

            let data = slot.data.lock().clone();
            inner.write_back(volume, &key, key_dirty, &data);
            slot.intent.unlock();
        }
    }

    /// Evict every entry of `volume`
    ///
    /// Entries are unhashed and offered to the pruner. Any that are still
    /// referenced afterwards are reported as busy.
    pub fn invalidate(&self, volume: &Volume) {
        let inner = &self.inner;
        let vid = volume.id();
        let mut guard = inner.state.lock();
        let state = &mut *guard;

        let ids: Vec<SlotId> = (0..state.meta.len())
            .filter(|&id| state.meta[id].ref_count > 0 && state.meta[id].volume_id() == Some(vid))
            .collect();
        let mut requests = Vec::with_capacity(ids.len());
        for &id in &ids {
            state.unhash(id);
            state.unlink(id);
            let cnid = state.slots[id].data.lock().cnid;
            requests.push((vid, state.meta[id].key.clone(), cnid));
        }
        state.volume_dirty.remove(&vid);
        drop(guard);

        inner.prune(&requests);

        let state = inner.state.lock();
        for (id, meta) in state.meta.iter().enumerate() {
            if meta.ref_count > 0 && meta.volume_id() == Some(vid) && !meta.hashed {
                let cnid = state.slots[id].data.lock().cnid;
                warn!(volume = %vid, %cnid, refs = meta.ref_count, "entry busy on invalidated volume");
            }
        }
    }

    /// Release every slot
    ///
    /// Refuses while any entry is still referenced or locked.
    pub fn free(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        let referenced = state.referenced();
        if referenced > 0 {
            return Err(Error::invalid_argument(format!(
                "{referenced} catalog entries still referenced"
            )));
        }
        if state.slots.iter().any(|s| s.intent.is_locked()) {
            return Err(Error::invalid_argument("catalog entries still locked"));
        }
        *state = CacheState::default();
        debug!("freed entry cache");
        Ok(())
    }

    pub fn stats(&self) -> &CacheStats {
        &self.inner.stats
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Allocated slots
    pub fn capacity(&self) -> usize {
        self.inner.state.lock().slots.len()
    }

    /// Entries reachable through the index
    pub fn len(&self) -> usize {
        self.inner.state.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slots on the unused stack
    pub fn free_slots(&self) -> usize {
        self.inner.state.lock().unused.len()
    }

    /// Entries on `volume`'s dirty list
    pub fn dirty_count(&self, volume: VolumeId) -> usize {
        self.inner
            .state
            .lock()
            .volume_dirty
            .get(&volume)
            .map_or(0, SlotList::len)
    }

    /// Whether `key` is hashed in the cache
    pub fn contains(&self, volume: VolumeId, key: &CatalogKey) -> bool {
        self.inner
            .state
            .lock()
            .index
            .contains_key(&(volume, key.clone()))
    }
}

impl fmt::Debug for CatalogCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("CatalogCache")
            .field("capacity", &state.slots.len())
            .field("hashed", &state.index.len())
            .field("unused", &state.unused.len())
            .field("dirty", &state.dirty.len())
            .finish()
    }
}

/// A counted reference to a cached catalog entry
///
/// Cloning takes another reference; dropping gives one back. The last
/// reference writes a dirty entry back, or truncates a deleted file's forks,
/// and returns the slot to the cache.
pub struct Entry {
    cache: Arc<CacheInner>,
    id: SlotId,
    slot: Arc<EntrySlot>,
    volume: Arc<Volume>,
}

impl Entry {
    fn new(cache: Arc<CacheInner>, id: SlotId, slot: Arc<EntrySlot>, volume: Arc<Volume>) -> Self {
        Self {
            cache,
            id,
            slot,
            volume,
        }
    }

    pub fn cnid(&self) -> Cnid {
        self.slot.data.lock().cnid
    }

    pub fn kind(&self) -> Option<EntryKind> {
        self.slot.data.lock().kind()
    }

    pub fn is_dir(&self) -> bool {
        self.kind() == Some(EntryKind::Directory)
    }

    /// The key the entry is currently known by
    pub fn key(&self) -> CatalogKey {
        self.cache.state.lock().meta[self.id].key.clone()
    }

    pub const fn volume(&self) -> &Arc<Volume> {
        &self.volume
    }

    pub fn state(&self) -> EntryState {
        let mut state = self.cache.state.lock().meta[self.id].flags;
        if self.slot.intent.is_locked() {
            state.insert(EntryState::LOCKED);
        }
        state
    }

    pub fn ref_count(&self) -> u32 {
        self.cache.state.lock().meta[self.id].ref_count
    }

    pub fn is_deleted(&self) -> bool {
        self.cache.state.lock().meta[self.id]
            .flags
            .contains(EntryState::DELETED)
    }

    pub fn is_dirty(&self) -> bool {
        self.cache.state.lock().meta[self.id]
            .flags
            .contains(EntryState::DIRTY)
    }

    /// Whether both handles refer to the same cache slot
    pub fn same_entry(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }

    /// Copy of the cached fields
    pub fn data(&self) -> EntryData {
        self.slot.data.lock().clone()
    }

    /// Read cached fields in place
    ///
    /// `f` runs under the slot's data lock, which the cache takes after its
    /// structural lock. It must not call back into this entry or the cache.
    pub fn with_data<R>(&self, f: impl FnOnce(&EntryData) -> R) -> R {
        f(&self.slot.data.lock())
    }

    /// Change cached fields and mark the entry dirty
    ///
    /// The same restriction as [`Entry::with_data`] applies to `f`.
    pub fn update<R>(&self, f: impl FnOnce(&mut EntryData) -> R) -> R {
        let result = f(&mut self.slot.data.lock());
        self.mark_dirty();
        result
    }

    /// Queue the entry for writeback
    pub fn mark_dirty(&self) {
        self.cache.mark_dirty(self.id);
    }

    /// Remember overflow extents looked up for one of a file's forks
    pub fn cache_extents(&self, fork: ForkKind, extents: Vec<ExtentDescriptor>) -> Result<()> {
        let mut data = self.slot.data.lock();
        let file = data
            .file_mut()
            .ok_or_else(|| Error::invalid_argument("extents cached on a non-file entry"))?;
        file.fork_mut(fork).cached_extents = extents;
        Ok(())
    }

    /// Take the intent lock until the guard drops
    pub fn lock(&self) -> EntryGuard<'_> {
        self.slot.intent.lock();
        EntryGuard { entry: self }
    }

    /// Fill a freshly created entry; the caller holds its intent lock
    pub(crate) fn set_data(&self, data: EntryData) {
        *self.slot.data.lock() = data;
    }

    pub(crate) fn lock_intent(&self) {
        self.slot.intent.lock();
    }

    pub(crate) fn unlock_intent(&self) {
        self.slot.intent.unlock();
    }

    pub(crate) fn cache(&self) -> &Arc<CacheInner> {
        &self.cache
    }

    pub(crate) const fn slot_id(&self) -> SlotId {
        self.id
    }

    /// Join the directory's reader group
    pub fn start_read(&self) {
        self.slot.dir.start_read();
    }

    pub fn end_read(&self) {
        self.slot.dir.end_read();
    }

    /// Join the directory's writer group
    pub fn start_write(&self) {
        self.slot.dir.start_write();
    }

    pub fn end_write(&self) {
        self.slot.dir.end_write();
    }

    /// The directory's reader/writer admission gate
    pub fn admission(&self) -> &SleepLock {
        &self.slot.dir
    }

    /// Threads asleep until this entry's intent lock is free
    pub fn lock_waiters(&self) -> u32 {
        self.slot.intent.lock_waiters()
    }
}

impl Clone for Entry {
    fn clone(&self) -> Self {
        self.cache.retain(self.id);
        Self {
            cache: Arc::clone(&self.cache),
            id: self.id,
            slot: Arc::clone(&self.slot),
            volume: Arc::clone(&self.volume),
        }
    }
}

impl Drop for Entry {
    fn drop(&mut self) {
        self.cache.release(self.id, &self.slot);
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.same_entry(other)
    }
}

impl Eq for Entry {}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("slot", &self.id)
            .field("cnid", &self.cnid())
            .field("volume", &self.volume.id())
            .finish_non_exhaustive()
    }
}

/// Holds an entry's intent lock
pub struct EntryGuard<'a> {
    entry: &'a Entry,
}

impl Drop for EntryGuard<'_> {
    fn drop(&mut self) {
        self.entry.slot.intent.unlock();
    }
}
