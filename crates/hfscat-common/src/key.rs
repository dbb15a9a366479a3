//! Catalog keys and the catalog collation
//!
//! A catalog key is `(parent CNID, name)`. The parent id is compared
//! numerically; names compare case-insensitively over ASCII with the remaining
//! bytes compared by value. This one ordering drives the cache index (through
//! `Eq`/`Hash`) and the B-tree (through `Ord`), so the two can never disagree.
//!
//! # On-disk layout
//!
//! ```text
//! +--------+--------+-------------+--------+----------------+
//! | KeyLen | Resrv  | ParID (BE)  | NmLen  | name bytes ... |
//! |   u8   |   u8   |    u32      |   u8   |   NmLen bytes  |
//! +--------+--------+-------------+--------+----------------+
//! ```
//!
//! `KeyLen` counts the bytes that follow it, so it is `6 + NmLen`.

use crate::error::{Error, Result};
use crate::types::{CatalogName, Cnid};
use bytes::{Buf, BufMut};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// Bytes of a key that do not depend on the name
pub const KEY_FIXED_LEN: usize = 7;

/// Fold one name byte for collation
#[inline]
#[must_use]
pub const fn fold(byte: u8) -> u8 {
    byte.to_ascii_uppercase()
}

/// Compare two names under the catalog collation
#[must_use]
pub fn collate(a: &[u8], b: &[u8]) -> Ordering {
    a.iter().map(|&c| fold(c)).cmp(b.iter().map(|&c| fold(c)))
}

/// Composite catalog key
#[derive(Clone, Debug)]
pub struct CatalogKey {
    parent: Cnid,
    name: CatalogName,
}

impl CatalogKey {
    #[must_use]
    pub const fn new(parent: Cnid, name: CatalogName) -> Self {
        Self { parent, name }
    }

    /// Key of the thread record for `cnid`
    #[must_use]
    pub const fn thread(cnid: Cnid) -> Self {
        Self {
            parent: cnid,
            name: CatalogName::empty(),
        }
    }

    #[must_use]
    pub const fn parent(&self) -> Cnid {
        self.parent
    }

    #[must_use]
    pub const fn name(&self) -> &CatalogName {
        &self.name
    }

    /// True for a thread key (empty name)
    #[must_use]
    pub fn is_thread(&self) -> bool {
        self.name.is_empty()
    }

    /// Byte-exact comparison (case included), unlike `==`
    #[must_use]
    pub fn same_bytes(&self, other: &Self) -> bool {
        self.parent == other.parent && self.name.as_bytes() == other.name.as_bytes()
    }

    /// Value of the on-disk `KeyLen` byte
    #[must_use]
    pub fn key_len(&self) -> u8 {
        // Names are at most 31 bytes so this cannot overflow.
        (KEY_FIXED_LEN - 1 + self.name.len()) as u8
    }

    /// Total encoded size in bytes
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        KEY_FIXED_LEN + self.name.len()
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.key_len());
        buf.put_u8(0);
        buf.put_u32(self.parent.get());
        buf.put_u8(self.name.len() as u8);
        buf.put_slice(self.name.as_bytes());
    }

    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < KEY_FIXED_LEN {
            return Err(Error::io("truncated catalog key"));
        }
        let key_len = usize::from(buf.get_u8());
        let _reserved = buf.get_u8();
        let parent = Cnid::new(buf.get_u32());
        let name_len = usize::from(buf.get_u8());
        if key_len != KEY_FIXED_LEN - 1 + name_len {
            return Err(Error::io(format!(
                "catalog key length {key_len} does not match name length {name_len}"
            )));
        }
        if buf.remaining() < name_len {
            return Err(Error::io("truncated catalog key name"));
        }
        let mut name = vec![0u8; name_len];
        buf.copy_to_slice(&mut name);
        let name = CatalogName::from_raw(name).map_err(|e| Error::io(e.to_string()))?;
        Ok(Self { parent, name })
    }

    pub fn from_bytes(mut data: &[u8]) -> Result<Self> {
        Self::decode(&mut data)
    }
}

impl PartialEq for CatalogKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CatalogKey {}

impl Ord for CatalogKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parent
            .cmp(&other.parent)
            .then_with(|| collate(self.name.as_bytes(), other.name.as_bytes()))
    }
}

impl PartialOrd for CatalogKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for CatalogKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.parent.hash(state);
        state.write_usize(self.name.len());
        for &b in self.name.as_bytes() {
            state.write_u8(fold(b));
        }
    }
}

/// Compare two keys; the function both the cache and the tree order by
#[must_use]
pub fn compare(a: &CatalogKey, b: &CatalogKey) -> Ordering {
    a.cmp(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;
    use std::collections::hash_map::DefaultHasher;

    fn key(parent: u32, name: &str) -> CatalogKey {
        CatalogKey::new(Cnid::new(parent), CatalogName::new(name).unwrap())
    }

    fn hash_of(k: &CatalogKey) -> u64 {
        let mut h = DefaultHasher::new();
        k.hash(&mut h);
        h.finish()
    }

    #[test]
    fn test_parent_orders_first() {
        assert!(key(2, "zzz") < key(3, "aaa"));
        assert!(CatalogKey::thread(Cnid::new(5)) < key(5, "a"));
    }

    #[test]
    fn test_case_insensitive_equality_and_hash() {
        let a = key(2, "ReadMe");
        let b = key(2, "README");
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert!(!a.same_bytes(&b));
        assert!(a.same_bytes(&a.clone()));
    }

    #[test]
    fn test_prefix_sorts_first() {
        assert!(key(2, "abc") < key(2, "ABCD"));
        assert_eq!(compare(&key(2, "b"), &key(2, "A")), Ordering::Greater);
    }

    #[test]
    fn test_sort_is_stable_under_shuffle() {
        let mut keys: Vec<CatalogKey> = ["delta", "Alpha", "charlie", "Bravo", "echo"]
            .iter()
            .map(|n| key(16, n))
            .collect();
        let mut expected = keys.clone();
        expected.sort();
        keys.shuffle(&mut rand::thread_rng());
        keys.sort();
        let names: Vec<String> = keys.iter().map(|k| k.name().to_string()).collect();
        assert_eq!(names, vec!["Alpha", "Bravo", "charlie", "delta", "echo"]);
        assert!(keys.iter().zip(&expected).all(|(a, b)| a.same_bytes(b)));
    }

    #[test]
    fn test_key_codec() {
        let k = key(0x1234_5678, "Finder");
        let bytes = k.to_bytes();
        assert_eq!(bytes.len(), k.encoded_len());
        assert_eq!(bytes[0], 12);
        assert_eq!(&bytes[2..6], &[0x12, 0x34, 0x56, 0x78]);
        let back = CatalogKey::from_bytes(&bytes).unwrap();
        assert!(back.same_bytes(&k));
    }

    #[test]
    fn test_key_decode_rejects_bad_length() {
        let mut bytes = key(2, "abc").to_bytes();
        bytes[0] = 20;
        assert!(CatalogKey::from_bytes(&bytes).unwrap_err().is_io());
        assert!(CatalogKey::from_bytes(&bytes[..4]).is_err());
    }
}
