//! Error types for the catalog cache
//!
//! Every catalog operation reports one of these. Backing-store failures are
//! folded into the same taxonomy at the crate boundary so callers see a
//! single error type.

use crate::types::NameError;
use thiserror::Error;

/// Common result type for catalog operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for catalog operations
#[derive(Debug, Error)]
pub enum Error {
    #[error("catalog record not found")]
    NotFound,

    #[error("catalog record already exists")]
    AlreadyExists,

    #[error("directory not empty")]
    NotEmpty,

    #[error("no space left in catalog")]
    NoSpace,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("catalog I/O error: {0}")]
    Io(String),

    #[error("catalog cache exhausted")]
    OutOfMemory,

    #[error("invalid catalog name: {0}")]
    InvalidName(#[from] NameError),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create an I/O error
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Check if this is a not found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Check if this is an I/O error
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }

    /// POSIX errno equivalent, for callers bridging into a VFS layer
    #[must_use]
    pub const fn errno(&self) -> i32 {
        match self {
            Self::NotFound => 2,                                   // ENOENT
            Self::Io(_) => 5,                                      // EIO
            Self::OutOfMemory => 12,                               // ENOMEM
            Self::AlreadyExists => 17,                             // EEXIST
            Self::InvalidArgument(_) | Self::Configuration(_) => 22, // EINVAL
            Self::NoSpace => 28,                                   // ENOSPC
            Self::InvalidName(_) => 36,                            // ENAMETOOLONG
            Self::NotEmpty => 39,                                  // ENOTEMPTY
        }
    }
}
