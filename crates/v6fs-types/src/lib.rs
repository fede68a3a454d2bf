#![forbid(unsafe_code)]
//! Shared newtypes and parse primitives for v6fs.
//!
//! Unit-carrying wrappers (`Inumber`, `SectorNumber`, `LogicalBlock`) prevent
//! mixing inode numbers, device sectors, and file-relative block indexes.
//! The bounds-checked little-endian readers here are the only way on-disk
//! fields are decoded; no buffer is ever aliased as a typed structure.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ── On-disk layout constants ────────────────────────────────────────────────

/// Sector holding the boot block (never read by this layer).
pub const BOOT_SECTOR: u32 = 0;
/// Sector holding the superblock.
pub const SUPERBLOCK_SECTOR: u32 = 1;
/// First sector of the inode table.
pub const INODE_START_SECTOR: u32 = 2;

/// Size of one on-disk inode record in bytes.
pub const INODE_RECORD_SIZE: usize = 32;
/// Size of one on-disk directory record in bytes.
pub const DIR_ENTRY_SIZE: usize = 16;
/// Width of the directory name field in bytes (not NUL-terminated).
pub const DIR_NAME_LEN: usize = 14;

/// Block-pointer slots in an inode.
pub const INODE_ADDR_SLOTS: usize = 8;
/// In the large-file scheme, slots 0..7 are single-indirect pointers.
pub const SINGLE_INDIRECT_SLOTS: usize = 7;
/// Slot 7 is the double-indirect pointer in the large-file scheme.
pub const DOUBLE_INDIRECT_SLOT: usize = 7;

// ── Inode mode flags ────────────────────────────────────────────────────────

/// Allocation bit. An inode with this bit clear does not exist.
pub const IALLOC: u16 = 0o100_000;
/// File type field mask.
pub const IFMT: u16 = 0o060_000;
/// Directory.
pub const IFDIR: u16 = 0o040_000;
/// Character device.
pub const IFCHR: u16 = 0o020_000;
/// Block device.
pub const IFBLK: u16 = 0o060_000;
/// Large-file bit: block pointers hold index-sector numbers.
pub const ILARG: u16 = 0o010_000;

// ── Newtypes ────────────────────────────────────────────────────────────────

/// 1-based inode number. On disk these are 16-bit (directory records store
/// them as `u16`), so the canonical width is `u16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Inumber(pub u16);

impl Inumber {
    /// The root directory is always inode 1.
    pub const ROOT: Self = Self(1);
}

/// Absolute sector number on the underlying device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SectorNumber(pub u32);

/// Zero-based index of a block within a single file's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogicalBlock(pub u32);

/// Validated sector size.
///
/// Must be a power of two in `32..=65536` so inode records (32 bytes),
/// directory records (16 bytes), and 2-byte index entries always pack a
/// sector exactly. The historic format uses 512; smaller synthetic
/// geometries are allowed for testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SectorSize(u32);

impl SectorSize {
    /// The standard V6 sector size.
    pub const V6: Self = Self(512);

    /// Create a `SectorSize` if `value` is a power of two in `[32, 65536]`.
    pub fn new(value: u32) -> Result<Self, ParseError> {
        if !value.is_power_of_two() || !(32..=65536).contains(&value) {
            return Err(ParseError::InvalidField {
                field: "sector_size",
                reason: "must be power of two in 32..=65536",
            });
        }
        Ok(Self(value))
    }

    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // bounded by 65536
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Number of 2-byte entries in one index sector.
    #[must_use]
    pub fn index_entries(self) -> u32 {
        self.0 / 2
    }

    /// Number of inode records in one sector.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // INODE_RECORD_SIZE is 32
    pub fn inode_records(self) -> u32 {
        self.0 / INODE_RECORD_SIZE as u32
    }
}

impl fmt::Display for Inumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SectorNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for LogicalBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SectorSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Parse-layer errors ──────────────────────────────────────────────────────

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("insufficient data: need {needed} bytes at offset {offset}, got {actual}")]
    InsufficientData {
        needed: usize,
        offset: usize,
        actual: usize,
    },
    #[error("invalid field: {field} ({reason})")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
    #[error("integer conversion failed: {field}")]
    IntegerConversion { field: &'static str },
}

// ── Bounds-checked field readers ────────────────────────────────────────────

#[inline]
pub fn ensure_slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8], ParseError> {
    let Some(end) = offset.checked_add(len) else {
        return Err(ParseError::InvalidField {
            field: "offset",
            reason: "overflow",
        });
    };

    if end > data.len() {
        return Err(ParseError::InsufficientData {
            needed: len,
            offset,
            actual: data.len().saturating_sub(offset),
        });
    }

    Ok(&data[offset..end])
}

#[inline]
pub fn read_le_u16(data: &[u8], offset: usize) -> Result<u16, ParseError> {
    let bytes = ensure_slice(data, offset, 2)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

#[inline]
pub fn read_le_u32(data: &[u8], offset: usize) -> Result<u32, ParseError> {
    let bytes = ensure_slice(data, offset, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[inline]
pub fn read_fixed<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N], ParseError> {
    let bytes = ensure_slice(data, offset, N)?;
    let mut out = [0_u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_helpers_decode_little_endian() {
        let bytes = [0x34_u8, 0x12, 0x78, 0x56, 0xEF, 0xCD];
        assert_eq!(read_le_u16(&bytes, 0).expect("u16"), 0x1234);
        assert_eq!(read_le_u32(&bytes, 0).expect("u32"), 0x5678_1234);
        assert_eq!(read_le_u16(&bytes, 4).expect("u16"), 0xCDEF);
    }

    #[test]
    fn ensure_slice_rejects_overrun() {
        let bytes = [0_u8; 4];
        assert!(ensure_slice(&bytes, 0, 4).is_ok());
        assert_eq!(
            ensure_slice(&bytes, 2, 4),
            Err(ParseError::InsufficientData {
                needed: 4,
                offset: 2,
                actual: 2,
            })
        );
        assert!(ensure_slice(&bytes, usize::MAX, 2).is_err());
    }

    #[test]
    fn sector_size_validation() {
        assert!(SectorSize::new(512).is_ok());
        assert!(SectorSize::new(32).is_ok());
        assert!(SectorSize::new(65536).is_ok());

        // Not a power of two
        assert!(SectorSize::new(500).is_err());
        // Too small to hold an inode record
        assert!(SectorSize::new(16).is_err());
        assert!(SectorSize::new(0).is_err());
        assert!(SectorSize::new(131_072).is_err());
    }

    #[test]
    fn sector_size_derived_counts() {
        let ss = SectorSize::V6;
        assert_eq!(ss.get(), 512);
        assert_eq!(ss.index_entries(), 256);
        assert_eq!(ss.inode_records(), 16);

        let tiny = SectorSize::new(64).expect("valid");
        assert_eq!(tiny.index_entries(), 32);
        assert_eq!(tiny.inode_records(), 2);
    }

    #[test]
    fn mode_flag_values_match_v6() {
        assert_eq!(IALLOC, 0x8000);
        assert_eq!(ILARG, 0x1000);
        assert_eq!(IFDIR & IFMT, IFDIR);
        // Block-device type occupies the full type field.
        assert_eq!(IFBLK, IFMT);
    }

    #[test]
    fn root_inumber_is_one() {
        assert_eq!(Inumber::ROOT, Inumber(1));
    }
}
