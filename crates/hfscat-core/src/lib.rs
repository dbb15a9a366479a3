//! hfscat - HFS catalog entry cache
//!
//! An in-memory cache of HFS catalog entries over a catalog B-tree:
//! - Reference-counted entries with an intent lock each
//! - Bounded growth with reclaim of lightly held entries
//! - Dirty tracking with writeback on last release or explicit commit
//! - Per-directory reader/writer admission for stable enumeration
//! - Create, delete and a multi-step rename with partial-failure handling
//!
//! The B-tree itself is a collaborator behind [`hfscat_btree::CatalogTree`].

pub mod cache;
pub mod codec;
pub mod dir;
pub mod entry;
mod lists;
mod ops;
pub mod sync;
pub mod volume;
mod writeback;

pub use cache::{CacheStats, CatalogCache, Entry, EntryGuard, EntryPruner};
pub use codec::{CatalogRecord, DirRecord, ExtentDescriptor, ExtentRecord, FileRecord, RecordType, ThreadRecord};
pub use dir::DirCursor;
pub use entry::{DirInfo, EntryData, EntryDetail, EntryKind, EntryState, FileInfo, Fork, ForkKind};
pub use hfscat_common::key::compare;
pub use hfscat_common::{CacheConfig, CatalogKey, CatalogName, Cnid, Error, Result, VolumeConfig, VolumeId};
pub use sync::SleepLock;
pub use volume::{Volume, VolumeCounts, format_volume};
