//! Configuration types for the catalog cache
//!
//! Every section has a `Default` matching the reference HFS driver, so an
//! empty config file yields a working cache.

use crate::error::{Error, Result};
use crate::types::Cnid;
use serde::{Deserialize, Serialize};

/// Root configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Entry cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Volume configuration
    #[serde(default)]
    pub volume: VolumeConfig,
}

impl Config {
    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.cache.validate()?;
        self.volume.validate()
    }
}

/// Entry cache sizing and reclaim policy
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Ceiling on cached entries across all volumes
    pub max_entries: usize,
    /// Entries added per growth step (one page's worth in the reference driver)
    pub grow_chunk: usize,
    /// Entries reclaimed up front when a lookup finds the cache full
    pub restock_goal: usize,
    /// Entries held by this many references or more are never reclaimed.
    /// Three allows one holder per fork plus the reclaimer's view.
    pub reclaim_threshold: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1024,
            grow_chunk: 127,
            restock_goal: 8,
            reclaim_threshold: 3,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<()> {
        if self.grow_chunk == 0 {
            return Err(Error::configuration("cache.grow_chunk must be at least 1"));
        }
        if self.max_entries < self.grow_chunk {
            return Err(Error::configuration(format!(
                "cache.max_entries ({}) is smaller than cache.grow_chunk ({})",
                self.max_entries, self.grow_chunk
            )));
        }
        if self.reclaim_threshold == 0 {
            return Err(Error::configuration(
                "cache.reclaim_threshold must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Per-volume settings used when formatting and mounting
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    /// Volume name, stored as the root directory's name
    pub name: String,
    /// First CNID handed out to new files and directories
    pub first_user_cnid: u32,
    /// Default clump size recorded in new file records
    pub clump_size: u16,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            name: "Untitled".to_string(),
            first_user_cnid: Cnid::FIRST_USER.get(),
            clump_size: 0,
        }
    }
}

impl VolumeConfig {
    pub fn validate(&self) -> Result<()> {
        crate::types::CatalogName::new(self.name.as_bytes())?;
        if self.first_user_cnid < Cnid::FIRST_USER.get() {
            return Err(Error::configuration(format!(
                "volume.first_user_cnid must be at least {}",
                Cnid::FIRST_USER
            )));
        }
        Ok(())
    }
}
