//! Core type definitions for the catalog
//!
//! Identifiers, catalog names and the HFS clock.

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Longest catalog name HFS can store (a Str31)
pub const MAX_NAME_LEN: usize = 31;

/// Directory valence ceiling; the on-disk field is a signed 16-bit word
pub const MAX_VALENCE: u32 = 32767;

/// Seconds between the HFS epoch (1904-01-01) and the Unix epoch
pub const MAC_EPOCH_OFFSET: u64 = 2_082_844_800;

/// Catalog node identifier, unique within one volume
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, From, Into,
    Display,
)]
pub struct Cnid(u32);

impl Cnid {
    /// Placeholder for an entry that has not been populated yet
    pub const INVALID: Self = Self(0);
    /// Parent of the root directory
    pub const ROOT_PARENT: Self = Self(1);
    /// The root directory
    pub const ROOT: Self = Self(2);
    /// First identifier handed out to user files and directories
    pub const FIRST_USER: Self = Self(16);

    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Debug for Cnid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cnid({:#010x})", self.0)
    }
}

/// Identifier of a mounted volume
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, From, Into,
    Display,
)]
pub struct VolumeId(u32);

impl VolumeId {
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

/// Errors from catalog name validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("name is {0} bytes, limit is 31")]
    TooLong(usize),
    #[error("name is empty")]
    Empty,
    #[error("name contains the path separator ':'")]
    Separator,
}

/// A catalog name: up to 31 bytes in the volume's 8-bit encoding
///
/// The bytes are kept exactly as given (case included). Comparison under the
/// catalog collation lives on [`crate::CatalogKey`].
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CatalogName(Vec<u8>);

impl CatalogName {
    /// Validate and wrap a name for a file or directory
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, NameError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(NameError::Empty);
        }
        if bytes.contains(&b':') {
            return Err(NameError::Separator);
        }
        Self::from_raw(bytes)
    }

    /// Wrap raw bytes read from disk; only the length is checked
    pub fn from_raw(bytes: impl Into<Vec<u8>>) -> Result<Self, NameError> {
        let bytes = bytes.into();
        if bytes.len() > MAX_NAME_LEN {
            return Err(NameError::TooLong(bytes.len()));
        }
        Ok(Self(bytes))
    }

    /// The empty name used by thread keys
    #[must_use]
    pub const fn empty() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for CatalogName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Display for CatalogName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl TryFrom<&str> for CatalogName {
    type Error = NameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value.as_bytes())
    }
}

/// Current time on the HFS clock (seconds since 1904, wrapping at 32 bits)
#[must_use]
pub fn mac_time_now() -> u32 {
    let unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    ((unix + MAC_EPOCH_OFFSET) & u64::from(u32::MAX)) as u32
}
