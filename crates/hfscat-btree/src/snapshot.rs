//! Snapshot file header for tree persistence

use std::time::{SystemTime, UNIX_EPOCH};

/// Fixed-size header in front of every snapshot file
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotHeader {
    /// Magic number for validation
    pub magic: u32,
    /// Snapshot version
    pub version: u32,
    /// Number of records in the snapshot
    pub record_count: u64,
    /// CRC32C of the snapshot body (excluding header)
    pub checksum: u32,
    /// Next CNID the volume will allocate
    pub next_cnid: u32,
    /// Creation time (unix seconds, truncated)
    pub created_at: u32,
    /// Reserved for future use
    pub reserved: u32,
}

impl SnapshotHeader {
    pub const MAGIC: u32 = 0x4846_5343; // "HFSC"
    pub const VERSION: u32 = 1;
    pub const SIZE: usize = 32;

    pub fn new(record_count: u64, next_cnid: u32) -> Self {
        Self {
            magic: Self::MAGIC,
            version: Self::VERSION,
            record_count,
            checksum: 0,
            next_cnid,
            created_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs() as u32,
            reserved: 0,
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..8].copy_from_slice(&self.version.to_le_bytes());
        buf[8..16].copy_from_slice(&self.record_count.to_le_bytes());
        buf[16..20].copy_from_slice(&self.checksum.to_le_bytes());
        buf[20..24].copy_from_slice(&self.next_cnid.to_le_bytes());
        buf[24..28].copy_from_slice(&self.created_at.to_le_bytes());
        buf[28..32].copy_from_slice(&self.reserved.to_le_bytes());
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SIZE {
            return None;
        }
        let magic = u32::from_le_bytes(data[0..4].try_into().ok()?);
        if magic != Self::MAGIC {
            return None;
        }
        let version = u32::from_le_bytes(data[4..8].try_into().ok()?);
        if version != Self::VERSION {
            return None;
        }
        Some(Self {
            magic,
            version,
            record_count: u64::from_le_bytes(data[8..16].try_into().ok()?),
            checksum: u32::from_le_bytes(data[16..20].try_into().ok()?),
            next_cnid: u32::from_le_bytes(data[20..24].try_into().ok()?),
            created_at: u32::from_le_bytes(data[24..28].try_into().ok()?),
            reserved: u32::from_le_bytes(data[28..32].try_into().ok()?),
        })
    }
}
