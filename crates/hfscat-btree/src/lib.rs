//! hfscat B-tree - the catalog tree collaborator
//!
//! The entry cache never touches tree pages directly. It talks to the
//! catalog through [`CatalogTree`]: point lookups that return a record
//! handle, successor walks, inserts and deletes. This crate defines that
//! contract and ships [`MemCatalogTree`], an in-memory implementation with
//! snapshot persistence used by tests and the CLI.

mod mem;
mod snapshot;
mod tree;

pub use mem::{MemCatalogTree, MemTreeConfig, TreeStats};
pub use snapshot::SnapshotHeader;
pub use tree::{CatalogTree, FindMode, RecordHandle, TreeError, TreeResult};
