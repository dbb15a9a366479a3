//! hfscat common - shared types and utilities
//!
//! Error definitions, configuration, identifiers and the catalog key used by
//! the tree collaborator and the entry cache alike.

pub mod config;
pub mod error;
pub mod key;
pub mod types;

pub use config::{CacheConfig, Config, VolumeConfig};
pub use error::{Error, Result};
pub use key::CatalogKey;
pub use types::*;
