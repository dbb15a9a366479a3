//! Ordered slot lists
//!
//! The cache keeps entries on intrusive lists in the classic driver. Here a
//! list is a stamp-ordered map: lower stamps are older. Pushing at either end,
//! removal and membership are all logarithmic.

use std::collections::{BTreeMap, HashMap};

/// Index of an entry slot in the cache arena
pub(crate) type SlotId = usize;

#[derive(Debug, Default)]
pub(crate) struct SlotList {
    order: BTreeMap<i64, SlotId>,
    stamps: HashMap<SlotId, i64>,
    newest: i64,
    oldest: i64,
}

impl SlotList {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add at the most-recent end, moving the slot if already present
    pub(crate) fn push_recent(&mut self, id: SlotId) {
        self.remove(id);
        self.newest += 1;
        self.order.insert(self.newest, id);
        self.stamps.insert(id, self.newest);
    }

    /// Add at the oldest end, moving the slot if already present
    pub(crate) fn push_oldest(&mut self, id: SlotId) {
        self.remove(id);
        self.oldest -= 1;
        self.order.insert(self.oldest, id);
        self.stamps.insert(id, self.oldest);
    }

    /// Move to the most-recent end if present
    pub(crate) fn touch(&mut self, id: SlotId) {
        if self.contains(id) {
            self.push_recent(id);
        }
    }

    pub(crate) fn remove(&mut self, id: SlotId) -> bool {
        match self.stamps.remove(&id) {
            Some(stamp) => {
                self.order.remove(&stamp);
                true
            }
            None => false,
        }
    }

    pub(crate) fn contains(&self, id: SlotId) -> bool {
        self.stamps.contains_key(&id)
    }

    pub(crate) fn oldest(&self) -> Option<SlotId> {
        self.order.values().next().copied()
    }

    /// Slots from oldest to newest
    pub(crate) fn iter_oldest(&self) -> impl Iterator<Item = SlotId> + '_ {
        self.order.values().copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.order.clear();
        self.stamps.clear();
    }
}
