//! Storing a cached entry back into its catalog record

use crate::codec::CatalogRecord;
use crate::entry::EntryData;
use hfscat_btree::{CatalogTree, FindMode, RecordHandle};
use hfscat_common::{CatalogKey, Error, Result};
use tracing::debug;

/// Overwrite the record stored under `key` with the entry's fields
///
/// With `key_dirty` the stored key bytes are replaced too; the replacement
/// must have the same length. Otherwise the stored record must carry the
/// entry's CNID.
pub(crate) fn write_entry(
    tree: &dyn CatalogTree,
    key: &CatalogKey,
    key_dirty: bool,
    data: &EntryData,
) -> Result<()> {
    let mut handle = tree.find(key, FindMode::WriteIntent)?;
    if let Err(e) = stage(&mut handle, key, key_dirty, data) {
        if let Err(release) = tree.release(handle) {
            debug!(?key, %release, "release after failed writeback");
        }
        return Err(e);
    }
    tree.release(handle).map_err(Error::from)
}

fn stage(
    handle: &mut RecordHandle,
    key: &CatalogKey,
    key_dirty: bool,
    data: &EntryData,
) -> Result<()> {
    let mut record = CatalogRecord::decode(handle.data())?;
    if key_dirty {
        let stored = handle.key().name().len();
        if stored != key.name().len() {
            return Err(Error::io(format!(
                "key length changed from {stored} to {}",
                key.name().len()
            )));
        }
    } else if record.cnid() != Some(data.cnid) {
        return Err(Error::io(format!(
            "CNID changed unexpectedly: stored {:?}, cached {:?}",
            record.cnid(),
            data.cnid
        )));
    }
    if !data.store_into(&mut record) {
        return Err(Error::io(format!(
            "stored {:?} record does not match cached entry",
            record.record_type()
        )));
    }
    if key_dirty {
        handle.set_key(key.clone());
    }
    handle.set_data(record.encode());
    Ok(())
}
