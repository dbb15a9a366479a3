//! Catalog record codec
//!
//! Fixed big-endian layouts of the four catalog record types. Every record
//! starts with a type byte and a reserved byte.
//!
//! ```text
//! directory  (70 bytes): type resrv flags:u16 valence:u16 cnid:u32
//!                        created modified backup (u32 each)
//!                        user_info[16] finder_info[16] reserved[16]
//! file      (102 bytes): type resrv flags:u8 version:u8 user_info[16]
//!                        cnid:u32 start:u16 logical:u32 physical:u32
//!                        rsrc_start:u16 rsrc_logical:u32 rsrc_physical:u32
//!                        created modified backup finder_info[16]
//!                        clump:u16 data_extents[12] rsrc_extents[12]
//!                        reserved:u32
//! thread     (46 bytes): type resrv reserved[8] parent:u32 name_len:u8
//!                        name[31]
//! ```

use bytes::{Buf, BufMut};
use hfscat_common::{CatalogName, Cnid, Error, MAX_NAME_LEN, Result};

pub const DIR_RECORD_LEN: usize = 70;
pub const FILE_RECORD_LEN: usize = 102;
pub const THREAD_RECORD_LEN: usize = 46;

/// Catalog record discriminant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordType {
    Directory = 1,
    File = 2,
    Thread = 3,
    FileThread = 4,
}

impl RecordType {
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Directory),
            2 => Some(Self::File),
            3 => Some(Self::Thread),
            4 => Some(Self::FileThread),
            _ => None,
        }
    }

    /// Read the type byte of an encoded record
    pub fn of(data: &[u8]) -> Result<Self> {
        let byte = *data
            .first()
            .ok_or_else(|| Error::io("empty catalog record"))?;
        Self::from_byte(byte).ok_or_else(|| Error::io(format!("unknown record type {byte}")))
    }

    pub const fn is_thread(self) -> bool {
        matches!(self, Self::Thread | Self::FileThread)
    }

    const fn encoded_len(self) -> usize {
        match self {
            Self::Directory => DIR_RECORD_LEN,
            Self::File => FILE_RECORD_LEN,
            Self::Thread | Self::FileThread => THREAD_RECORD_LEN,
        }
    }
}

/// One contiguous run of allocation blocks
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExtentDescriptor {
    pub start_block: u16,
    pub block_count: u16,
}

/// The three extents stored inline in a file record
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExtentRecord(pub [ExtentDescriptor; 3]);

impl ExtentRecord {
    /// Total blocks covered
    pub fn blocks(&self) -> u32 {
        self.0.iter().map(|e| u32::from(e.block_count)).sum()
    }

    fn encode(&self, buf: &mut impl BufMut) {
        for extent in &self.0 {
            buf.put_u16(extent.start_block);
            buf.put_u16(extent.block_count);
        }
    }

    fn decode(buf: &mut impl Buf) -> Self {
        let mut record = Self::default();
        for extent in &mut record.0 {
            extent.start_block = buf.get_u16();
            extent.block_count = buf.get_u16();
        }
        record
    }
}

/// Directory record
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirRecord {
    pub flags: u16,
    /// Number of children as last written
    pub valence: u16,
    pub cnid: Cnid,
    pub create_date: u32,
    pub modify_date: u32,
    pub backup_date: u32,
    pub user_info: [u8; 16],
    pub finder_info: [u8; 16],
    pub reserved: [u8; 16],
}

impl DirRecord {
    /// Offset of the Finder view field inside `user_info`
    pub const VIEW_OFFSET: usize = 14;
}

/// File record
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileRecord {
    pub flags: u8,
    pub version: u8,
    pub user_info: [u8; 16],
    pub cnid: Cnid,
    pub start_block: u16,
    pub data_logical: u32,
    pub data_physical: u32,
    pub rsrc_start_block: u16,
    pub rsrc_logical: u32,
    pub rsrc_physical: u32,
    pub create_date: u32,
    pub modify_date: u32,
    pub backup_date: u32,
    pub finder_info: [u8; 16],
    pub clump_size: u16,
    pub data_extents: ExtentRecord,
    pub rsrc_extents: ExtentRecord,
    pub reserved: u32,
}

impl FileRecord {
    /// The file is locked against writes
    pub const FLAG_LOCKED: u8 = 0x01;
    /// The file has a file-thread record
    pub const FLAG_THREAD: u8 = 0x02;
    /// The record is in use
    pub const FLAG_USED: u8 = 0x80;

    pub const fn has_thread(&self) -> bool {
        self.flags & Self::FLAG_THREAD != 0
    }
}

/// Thread record: maps a CNID back to its parent and name
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ThreadRecord {
    pub reserved: [u8; 8],
    pub parent: Cnid,
    pub name: CatalogName,
}

/// A decoded catalog record
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CatalogRecord {
    Directory(DirRecord),
    File(FileRecord),
    Thread(ThreadRecord),
    FileThread(ThreadRecord),
}

impl CatalogRecord {
    pub const fn record_type(&self) -> RecordType {
        match self {
            Self::Directory(_) => RecordType::Directory,
            Self::File(_) => RecordType::File,
            Self::Thread(_) => RecordType::Thread,
            Self::FileThread(_) => RecordType::FileThread,
        }
    }

    /// CNID of a file or directory record
    pub const fn cnid(&self) -> Option<Cnid> {
        match self {
            Self::Directory(dir) => Some(dir.cnid),
            Self::File(file) => Some(file.cnid),
            Self::Thread(_) | Self::FileThread(_) => None,
        }
    }

    /// Renumber a file or directory record
    #[must_use]
    pub fn with_cnid(mut self, cnid: Cnid) -> Self {
        match &mut self {
            Self::Directory(dir) => dir.cnid = cnid,
            Self::File(file) => file.cnid = cnid,
            Self::Thread(_) | Self::FileThread(_) => {}
        }
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.record_type().encoded_len());
        buf.put_u8(self.record_type() as u8);
        buf.put_u8(0);
        match self {
            Self::Directory(dir) => {
                buf.put_u16(dir.flags);
                buf.put_u16(dir.valence);
                buf.put_u32(dir.cnid.get());
                buf.put_u32(dir.create_date);
                buf.put_u32(dir.modify_date);
                buf.put_u32(dir.backup_date);
                buf.put_slice(&dir.user_info);
                buf.put_slice(&dir.finder_info);
                buf.put_slice(&dir.reserved);
            }
            Self::File(file) => {
                buf.put_u8(file.flags);
                buf.put_u8(file.version);
                buf.put_slice(&file.user_info);
                buf.put_u32(file.cnid.get());
                buf.put_u16(file.start_block);
                buf.put_u32(file.data_logical);
                buf.put_u32(file.data_physical);
                buf.put_u16(file.rsrc_start_block);
                buf.put_u32(file.rsrc_logical);
                buf.put_u32(file.rsrc_physical);
                buf.put_u32(file.create_date);
                buf.put_u32(file.modify_date);
                buf.put_u32(file.backup_date);
                buf.put_slice(&file.finder_info);
                buf.put_u16(file.clump_size);
                file.data_extents.encode(&mut buf);
                file.rsrc_extents.encode(&mut buf);
                buf.put_u32(file.reserved);
            }
            Self::Thread(thread) | Self::FileThread(thread) => {
                buf.put_slice(&thread.reserved);
                buf.put_u32(thread.parent.get());
                let name = thread.name.as_bytes();
                // CatalogName never exceeds 31 bytes
                buf.put_u8(name.len() as u8);
                buf.put_slice(name);
                buf.put_bytes(0, MAX_NAME_LEN - name.len());
            }
        }
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let kind = RecordType::of(data)?;
        if data.len() < kind.encoded_len() {
            return Err(Error::io(format!(
                "{kind:?} record is {} bytes, expected {}",
                data.len(),
                kind.encoded_len()
            )));
        }
        let mut buf = &data[2..];
        let record = match kind {
            RecordType::Directory => {
                let mut dir = DirRecord {
                    flags: buf.get_u16(),
                    valence: buf.get_u16(),
                    cnid: Cnid::new(buf.get_u32()),
                    create_date: buf.get_u32(),
                    modify_date: buf.get_u32(),
                    backup_date: buf.get_u32(),
                    ..DirRecord::default()
                };
                buf.copy_to_slice(&mut dir.user_info);
                buf.copy_to_slice(&mut dir.finder_info);
                buf.copy_to_slice(&mut dir.reserved);
                Self::Directory(dir)
            }
            RecordType::File => {
                let mut file = FileRecord {
                    flags: buf.get_u8(),
                    version: buf.get_u8(),
                    ..FileRecord::default()
                };
                buf.copy_to_slice(&mut file.user_info);
                file.cnid = Cnid::new(buf.get_u32());
                file.start_block = buf.get_u16();
                file.data_logical = buf.get_u32();
                file.data_physical = buf.get_u32();
                file.rsrc_start_block = buf.get_u16();
                file.rsrc_logical = buf.get_u32();
                file.rsrc_physical = buf.get_u32();
                file.create_date = buf.get_u32();
                file.modify_date = buf.get_u32();
                file.backup_date = buf.get_u32();
                buf.copy_to_slice(&mut file.finder_info);
                file.clump_size = buf.get_u16();
                file.data_extents = ExtentRecord::decode(&mut buf);
                file.rsrc_extents = ExtentRecord::decode(&mut buf);
                file.reserved = buf.get_u32();
                Self::File(file)
            }
            RecordType::Thread | RecordType::FileThread => {
                let mut thread = ThreadRecord::default();
                buf.copy_to_slice(&mut thread.reserved);
                thread.parent = Cnid::new(buf.get_u32());
                let len = usize::from(buf.get_u8());
                if len > MAX_NAME_LEN {
                    return Err(Error::io(format!("thread name length {len} out of range")));
                }
                thread.name = CatalogName::from_raw(&buf[..len])?;
                if kind == RecordType::Thread {
                    Self::Thread(thread)
                } else {
                    Self::FileThread(thread)
                }
            }
        };
        Ok(record)
    }
}
