#![forbid(unsafe_code)]
//! On-disk format parsing for Unix V6 filesystem structures.
//!
//! Pure parsing crate — no I/O, no side effects. Decodes sector buffers into
//! typed structures: the superblock, 32-byte inode records, 16-byte directory
//! records, and 2-byte index-sector entries. Every field is read at a fixed
//! byte offset with little-endian byte order and a bounds check before the
//! access; a sector buffer is never reinterpreted as a typed structure.

use serde::{Deserialize, Serialize};
use v6fs_types::{
    DIR_ENTRY_SIZE, DIR_NAME_LEN, IALLOC, IFBLK, IFCHR, IFDIR, IFMT, ILARG, INODE_ADDR_SLOTS,
    INODE_RECORD_SIZE, ParseError, ensure_slice, read_fixed, read_le_u16, read_le_u32,
};

// ── Superblock ──────────────────────────────────────────────────────────────

/// Byte offset of the modification time within the superblock sector.
///
/// Layout ahead of it: `s_isize` (2) + `s_fsize` (2) + `s_nfree` (2) +
/// `s_free[100]` (200) + `s_ninode` (2) + `s_inode[100]` (200) + four
/// single-byte lock/mod flags.
const SUPERBLOCK_TIME_OFFSET: usize = 412;

/// Decoded V6 superblock.
///
/// Only `inode_area_sectors` is load-bearing for path resolution;
/// `volume_sectors` supports mount-time geometry validation and `mtime` is
/// informational. The free-list fields are skipped: this layer never
/// allocates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Superblock {
    /// `s_isize`: number of sectors occupied by the inode table.
    pub inode_area_sectors: u16,
    /// `s_fsize`: total volume size in sectors.
    pub volume_sectors: u16,
    /// `s_time`: last modification time (seconds), 0 if the sector is too
    /// short to carry it.
    pub mtime: u32,
}

impl Superblock {
    /// Parse the superblock from its sector buffer.
    ///
    /// Requires at least the `s_isize`/`s_fsize` words; the modification
    /// time is read leniently because truncated teaching images exist.
    pub fn parse_from_sector(bytes: &[u8]) -> Result<Self, ParseError> {
        let inode_area_sectors = read_le_u16(bytes, 0)?;
        let volume_sectors = read_le_u16(bytes, 2)?;

        if inode_area_sectors == 0 {
            return Err(ParseError::InvalidField {
                field: "s_isize",
                reason: "inode area sector count must be positive",
            });
        }

        let mtime = if bytes.len() >= SUPERBLOCK_TIME_OFFSET + 4 {
            read_le_u32(bytes, SUPERBLOCK_TIME_OFFSET)?
        } else {
            0
        };

        Ok(Self {
            inode_area_sectors,
            volume_sectors,
            mtime,
        })
    }
}

// ── Inode ───────────────────────────────────────────────────────────────────

/// File type decoded from the inode mode's 2-bit type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    Regular,
    Directory,
    CharDevice,
    BlockDevice,
}

/// A decoded 32-byte V6 inode record.
///
/// `size` is assembled at parse time from the split on-disk fields
/// (`i_size0` high byte, `i_size1` low word) into one 24-bit byte count, so
/// it can never be negative. The interpretation of `addr` depends on
/// [`is_large`](Self::is_large): direct data sectors in the small scheme,
/// index-sector pointers in the large scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inode {
    pub mode: u16,
    pub nlink: u8,
    pub uid: u8,
    pub gid: u8,
    /// File size in bytes (24-bit on disk).
    pub size: u32,
    /// Block-pointer slots; 0 means "no block here".
    pub addr: [u16; INODE_ADDR_SLOTS],
    pub atime: u32,
    pub mtime: u32,
}

impl Inode {
    /// Parse an inode record from raw bytes.
    ///
    /// Requires exactly one 32-byte record's worth of data at offset 0.
    pub fn parse_from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < INODE_RECORD_SIZE {
            return Err(ParseError::InsufficientData {
                needed: INODE_RECORD_SIZE,
                offset: 0,
                actual: bytes.len(),
            });
        }

        let mode = read_le_u16(bytes, 0x00)?;
        let nlink = ensure_slice(bytes, 0x02, 1)?[0];
        let uid = ensure_slice(bytes, 0x03, 1)?[0];
        let gid = ensure_slice(bytes, 0x04, 1)?[0];
        let size0 = ensure_slice(bytes, 0x05, 1)?[0];
        let size1 = read_le_u16(bytes, 0x06)?;

        let mut addr = [0_u16; INODE_ADDR_SLOTS];
        for (slot, value) in addr.iter_mut().enumerate() {
            *value = read_le_u16(bytes, 0x08 + slot * 2)?;
        }

        Ok(Self {
            mode,
            nlink,
            uid,
            gid,
            size: (u32::from(size0) << 16) | u32::from(size1),
            addr,
            atime: read_le_u32(bytes, 0x18)?,
            mtime: read_le_u32(bytes, 0x1C)?,
        })
    }

    /// Whether the allocation bit is set. Callers must never use the block
    /// pointers of an inode that failed this check.
    #[must_use]
    pub fn is_allocated(&self) -> bool {
        (self.mode & IALLOC) != 0
    }

    /// Whether the large-file bit selects the indirect addressing scheme.
    #[must_use]
    pub fn is_large(&self) -> bool {
        (self.mode & ILARG) != 0
    }

    /// Decode the 2-bit type field.
    #[must_use]
    pub fn kind(&self) -> FileKind {
        match self.mode & IFMT {
            IFDIR => FileKind::Directory,
            IFCHR => FileKind::CharDevice,
            IFBLK => FileKind::BlockDevice,
            _ => FileKind::Regular,
        }
    }

    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind() == FileKind::Directory
    }
}

// ── Directory records ───────────────────────────────────────────────────────

/// A 16-byte V6 directory record: `u16` inumber + 14-byte name field.
///
/// The name field is packed, not necessarily NUL-terminated; all comparisons
/// are bounded to the field width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub inumber: u16,
    pub name: [u8; DIR_NAME_LEN],
}

impl DirEntry {
    /// Parse one directory record from raw bytes at offset 0.
    pub fn parse_from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < DIR_ENTRY_SIZE {
            return Err(ParseError::InsufficientData {
                needed: DIR_ENTRY_SIZE,
                offset: 0,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            inumber: read_le_u16(bytes, 0)?,
            name: read_fixed::<DIR_NAME_LEN>(bytes, 2)?,
        })
    }

    /// Whether this slot is free (`inumber == 0`).
    #[must_use]
    pub fn is_free(&self) -> bool {
        self.inumber == 0
    }

    /// Name bytes up to the first NUL, or the full 14-byte field.
    #[must_use]
    pub fn name_bytes(&self) -> &[u8] {
        let end = self
            .name
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(DIR_NAME_LEN);
        &self.name[..end]
    }

    /// Name as a UTF-8 string (lossy).
    #[must_use]
    pub fn name_str(&self) -> String {
        String::from_utf8_lossy(self.name_bytes()).into_owned()
    }

    /// Bounded name comparison with `strncmp(name, target, 14)` semantics:
    /// the entry matches when its field equals `target` for `target.len()`
    /// bytes and is either exactly 14 bytes long or NUL-terminated there.
    ///
    /// Targets longer than the field width never match.
    #[must_use]
    pub fn name_matches(&self, target: &[u8]) -> bool {
        if target.is_empty() || target.len() > DIR_NAME_LEN {
            return false;
        }
        if &self.name[..target.len()] != target {
            return false;
        }
        target.len() == DIR_NAME_LEN || self.name[target.len()] == 0
    }
}

/// Parse consecutive 16-byte directory records from the valid span of a
/// directory sector.
///
/// `bytes` must be an exact multiple of the record size; the caller is
/// responsible for truncating to the sector's valid length first. Free
/// slots are included so callers can count consumed records.
pub fn parse_dir_records(bytes: &[u8]) -> Result<Vec<DirEntry>, ParseError> {
    if bytes.len() % DIR_ENTRY_SIZE != 0 {
        return Err(ParseError::InvalidField {
            field: "dir_records",
            reason: "span is not a multiple of the directory record size",
        });
    }
    bytes
        .chunks_exact(DIR_ENTRY_SIZE)
        .map(DirEntry::parse_from_bytes)
        .collect()
}

// ── Index sectors ───────────────────────────────────────────────────────────

/// Read the `slot`-th 2-byte sector number from an index sector.
pub fn index_entry(bytes: &[u8], slot: usize) -> Result<u16, ParseError> {
    let offset = slot.checked_mul(2).ok_or(ParseError::InvalidField {
        field: "index_slot",
        reason: "overflow",
    })?;
    read_le_u16(bytes, offset)
}
