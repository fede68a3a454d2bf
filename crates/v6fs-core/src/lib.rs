#![forbid(unsafe_code)]
//! Core address translation and path resolution for V6 filesystem images.
//!
//! [`V6Fs`] is the immutable handle over a sector device: it reads and
//! validates the superblock once at open time, precomputes the derived
//! geometry, and exposes the read-only operations — inode lookup, logical
//! block translation (direct / single-indirect / double-indirect), file
//! block reads with partial-trailing-block semantics, directory scanning,
//! and iterative path resolution. Concurrent callers may share one handle
//! freely; correctness reduces to the device's own `read_sector` contract.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, trace};
use v6fs_block::{FileSectorDevice, SectorDevice};
use v6fs_error::{Result, V6Error};
use v6fs_ondisk::{DirEntry, Inode, Superblock, index_entry, parse_dir_records};
use v6fs_types::{
    DIR_ENTRY_SIZE, DIR_NAME_LEN, DOUBLE_INDIRECT_SLOT, INODE_ADDR_SLOTS, INODE_RECORD_SIZE,
    INODE_START_SECTOR, Inumber, LogicalBlock, ParseError, SINGLE_INDIRECT_SLOTS, SUPERBLOCK_SECTOR,
    SectorNumber, SectorSize,
};

/// Convert a decode-layer `ParseError` into the user-facing `V6Error`.
///
/// This is the crate-boundary conversion described in `v6fs-error`:
/// truncated or overflowing data while reading live metadata means the
/// image is corrupt; field-validation failures keep their parse detail.
fn parse_to_v6(err: &ParseError) -> V6Error {
    match err {
        ParseError::InsufficientData { .. } | ParseError::IntegerConversion { .. } => {
            V6Error::corrupt(err.to_string())
        }
        ParseError::InvalidField { .. } => V6Error::Parse(err.to_string()),
    }
}

// ── Geometry ────────────────────────────────────────────────────────────────

/// Derived filesystem geometry, computed once at open time.
///
/// Every bound the translation layer checks against lives here so that
/// downstream code never re-derives capacity arithmetic per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    pub sector_size: SectorSize,
    /// Inode records per sector (`sector_size / 32`).
    pub inodes_per_sector: u32,
    /// Total addressable inodes (`s_isize * inodes_per_sector`).
    pub total_inodes: u32,
    /// First sector past the inode area (`2 + s_isize`).
    pub inode_area_end: u32,
    /// 2-byte entries per index sector (`sector_size / 2`).
    pub index_entries: u32,
    /// Logical blocks addressable by the small scheme (always 8).
    pub small_capacity: u32,
    /// Logical blocks served by single indirection in the large scheme.
    pub single_indirect_capacity: u32,
    /// Total logical blocks addressable by the large scheme.
    pub large_capacity: u32,
}

impl Geometry {
    #[allow(clippy::cast_possible_truncation)] // slot counts are 7 and 8
    fn from_superblock(sector_size: SectorSize, superblock: &Superblock) -> Self {
        let inodes_per_sector = sector_size.inode_records();
        let entries = sector_size.index_entries();
        let single = SINGLE_INDIRECT_SLOTS as u32 * entries;
        Self {
            sector_size,
            inodes_per_sector,
            total_inodes: u32::from(superblock.inode_area_sectors) * inodes_per_sector,
            inode_area_end: INODE_START_SECTOR + u32::from(superblock.inode_area_sectors),
            index_entries: entries,
            small_capacity: INODE_ADDR_SLOTS as u32,
            single_indirect_capacity: single,
            large_capacity: single + entries * entries,
        }
    }

    /// Decompose a logical block number into its addressing route.
    ///
    /// This is the whole of the block-index arithmetic; pointer chasing is
    /// left to [`V6Fs::resolve_block`]. Fails `OutOfRange` past the scheme's
    /// capacity.
    pub fn route(&self, large: bool, block: LogicalBlock) -> Result<BlockRoute> {
        let n = block.0;

        if !large {
            if n >= self.small_capacity {
                return Err(V6Error::OutOfRange {
                    what: "logical block",
                    value: u64::from(n),
                    max: u64::from(self.small_capacity) - 1,
                });
            }
            return Ok(BlockRoute::Direct { slot: n as usize });
        }

        if n >= self.large_capacity {
            return Err(V6Error::OutOfRange {
                what: "logical block",
                value: u64::from(n),
                max: u64::from(self.large_capacity) - 1,
            });
        }

        if n < self.single_indirect_capacity {
            Ok(BlockRoute::SingleIndirect {
                slot: (n / self.index_entries) as usize,
                entry: n % self.index_entries,
            })
        } else {
            let past = n - self.single_indirect_capacity;
            Ok(BlockRoute::DoubleIndirect {
                first: past / self.index_entries,
                second: past % self.index_entries,
            })
        }
    }
}

/// Addressing route for one logical block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRoute {
    /// Small scheme: `addr[slot]` is the data sector.
    Direct { slot: usize },
    /// Large scheme, first seven slots: `addr[slot]` names an index sector
    /// and `entry` selects the data sector within it.
    SingleIndirect { slot: usize, entry: u32 },
    /// Large scheme, slot 7: two index hops, `first` into the first-level
    /// sector and `second` into the second-level one.
    DoubleIndirect { first: u32, second: u32 },
}

// ── File block reads ────────────────────────────────────────────────────────

/// One logical block of file content: the full sector buffer plus the
/// number of leading bytes that are actually file data.
///
/// Bytes past [`valid_len`](Self::valid_len) are disk garbage from the
/// partial trailing block and must not be interpreted; use
/// [`valid`](Self::valid) to stay inside the span. A zero-length result is
/// the canonical end-of-file signal, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRead {
    bytes: Vec<u8>,
    valid_len: usize,
}

impl BlockRead {
    fn eof() -> Self {
        Self {
            bytes: Vec::new(),
            valid_len: 0,
        }
    }

    /// The valid file-content span of this block.
    #[must_use]
    pub fn valid(&self) -> &[u8] {
        &self.bytes[..self.valid_len]
    }

    #[must_use]
    pub fn valid_len(&self) -> usize {
        self.valid_len
    }

    /// Whether the requested block lies at or past end of file.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.valid_len == 0
    }

    /// The full sector buffer, including any trailing garbage.
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.bytes
    }
}

// ── Filesystem handle ───────────────────────────────────────────────────────

/// Read-only handle over a mounted V6 image.
///
/// Immutable after construction: the superblock and geometry are fixed and
/// every operation is a bounded sequence of blocking sector reads with no
/// state carried between calls.
pub struct V6Fs {
    dev: Box<dyn SectorDevice>,
    superblock: Superblock,
    geometry: Geometry,
}

impl std::fmt::Debug for V6Fs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("V6Fs")
            .field("superblock", &self.superblock)
            .field("geometry", &self.geometry)
            .finish_non_exhaustive()
    }
}

impl V6Fs {
    /// Open a disk image at the standard 512-byte sector size.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_sector_size(path, SectorSize::V6)
    }

    /// Open a disk image with an explicit sector size (synthetic geometries).
    pub fn open_with_sector_size(path: impl AsRef<Path>, sector_size: SectorSize) -> Result<Self> {
        let dev = FileSectorDevice::open(path, sector_size)?;
        Self::from_device(Box::new(dev))
    }

    /// Mount an already-constructed device.
    ///
    /// Reads the superblock once, validates that the declared inode area
    /// fits on the device, and precomputes the [`Geometry`].
    pub fn from_device(dev: Box<dyn SectorDevice>) -> Result<Self> {
        let sector_size = dev.sector_size();
        let sb_buf = dev.read_sector(SectorNumber(SUPERBLOCK_SECTOR))?;
        let superblock = Superblock::parse_from_sector(sb_buf.as_slice())
            .map_err(|e| V6Error::Geometry(e.to_string()))?;

        let geometry = Geometry::from_superblock(sector_size, &superblock);

        if u64::from(geometry.inode_area_end) > dev.sector_count() {
            return Err(V6Error::Geometry(format!(
                "inode area ends at sector {} but device has only {} sectors",
                geometry.inode_area_end,
                dev.sector_count()
            )));
        }
        if u64::from(superblock.volume_sectors) > dev.sector_count() {
            debug!(
                declared = superblock.volume_sectors,
                actual = dev.sector_count(),
                "superblock declares more sectors than the device holds"
            );
        }

        debug!(
            sector_size = %sector_size,
            total_inodes = geometry.total_inodes,
            large_capacity = geometry.large_capacity,
            "mounted v6 image"
        );

        Ok(Self {
            dev,
            superblock,
            geometry,
        })
    }

    #[must_use]
    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    #[must_use]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    #[must_use]
    pub fn device(&self) -> &dyn SectorDevice {
        self.dev.as_ref()
    }

    // ── Inode table ───────────────────────────────────────────────────

    /// Read and decode the inode for `inumber`.
    ///
    /// Fails for inumber 0, inumbers past the inode table, short sector
    /// reads, and records whose allocation bit is unset — an unallocated
    /// inode is non-existent, not an empty entity.
    pub fn read_inode(&self, inumber: Inumber) -> Result<Inode> {
        if inumber.0 < 1 {
            return Err(V6Error::InvalidArgument(
                "inumber must be at least 1".to_owned(),
            ));
        }
        let index = u32::from(inumber.0) - 1;
        if u32::from(inumber.0) > self.geometry.total_inodes {
            return Err(V6Error::OutOfRange {
                what: "inumber",
                value: u64::from(inumber.0),
                max: u64::from(self.geometry.total_inodes),
            });
        }

        let sector = INODE_START_SECTOR + index / self.geometry.inodes_per_sector;
        // The capacity check above implies this, but the declared extent is
        // the authoritative bound.
        if sector >= self.geometry.inode_area_end {
            return Err(V6Error::OutOfRange {
                what: "inode sector",
                value: u64::from(sector),
                max: u64::from(self.geometry.inode_area_end) - 1,
            });
        }

        let buf = self.dev.read_sector(SectorNumber(sector))?;
        let offset = (index % self.geometry.inodes_per_sector) as usize * INODE_RECORD_SIZE;
        let end = offset + INODE_RECORD_SIZE;
        if end > buf.as_slice().len() {
            return Err(V6Error::corrupt(format!(
                "inode record for inumber {inumber} overruns sector {sector}"
            )));
        }

        let inode = Inode::parse_from_bytes(&buf.as_slice()[offset..end])
            .map_err(|e| parse_to_v6(&e))?;
        if !inode.is_allocated() {
            return Err(V6Error::NotAllocated { inumber: inumber.0 });
        }
        Ok(inode)
    }

    // ── Block index translation ───────────────────────────────────────

    /// Translate a file-relative logical block to its absolute sector.
    ///
    /// Follows the addressing scheme selected by the inode's large-file
    /// bit. A zero pointer anywhere along the chain is corruption: this
    /// format has no sparse holes, so zero always means "no such block".
    pub fn resolve_block(&self, inode: &Inode, block: LogicalBlock) -> Result<SectorNumber> {
        match self.geometry.route(inode.is_large(), block)? {
            BlockRoute::Direct { slot } => {
                nonzero_sector(inode.addr[slot], "direct pointer", block)
            }
            BlockRoute::SingleIndirect { slot, entry } => {
                let index_sector =
                    nonzero_sector(inode.addr[slot], "single-indirect pointer", block)?;
                let buf = self.dev.read_sector(index_sector)?;
                let target =
                    index_entry(buf.as_slice(), entry as usize).map_err(|e| parse_to_v6(&e))?;
                nonzero_sector(target, "single-indirect entry", block)
            }
            BlockRoute::DoubleIndirect { first, second } => {
                let first_level = nonzero_sector(
                    inode.addr[DOUBLE_INDIRECT_SLOT],
                    "double-indirect pointer",
                    block,
                )?;
                let buf = self.dev.read_sector(first_level)?;
                let second_level =
                    index_entry(buf.as_slice(), first as usize).map_err(|e| parse_to_v6(&e))?;
                let second_level =
                    nonzero_sector(second_level, "first-level indirect entry", block)?;
                let buf = self.dev.read_sector(second_level)?;
                let target =
                    index_entry(buf.as_slice(), second as usize).map_err(|e| parse_to_v6(&e))?;
                nonzero_sector(target, "second-level indirect entry", block)
            }
        }
    }

    // ── File block reads ──────────────────────────────────────────────

    /// Read one logical block of the file identified by `inumber`.
    ///
    /// A block at or past end of file yields a zero-length success so
    /// callers can walk a file without consulting its size separately.
    /// The trailing block of a file whose size is not sector-aligned comes
    /// back with a short [`BlockRead::valid_len`].
    pub fn read_file_block(&self, inumber: Inumber, block: LogicalBlock) -> Result<BlockRead> {
        let inode = self.read_inode(inumber)?;
        self.read_inode_block(&inode, block)
    }

    /// Block read against an already-loaded inode (the loops below reuse
    /// this to avoid re-reading the inode per block).
    fn read_inode_block(&self, inode: &Inode, block: LogicalBlock) -> Result<BlockRead> {
        let sector_size = u64::from(self.geometry.sector_size.get());
        let offset = u64::from(block.0) * sector_size;
        let size = u64::from(inode.size);
        if offset >= size {
            return Ok(BlockRead::eof());
        }

        let sector = self.resolve_block(inode, block)?;
        let buf = self.dev.read_sector(sector)?;

        #[allow(clippy::cast_possible_truncation)] // bounded by sector_size
        let valid_len = (size - offset).min(sector_size) as usize;
        Ok(BlockRead {
            bytes: buf.into_inner(),
            valid_len,
        })
    }

    // ── Directory scanning ────────────────────────────────────────────

    /// Find `name` in the directory identified by `dir`.
    ///
    /// Scans records in on-disk order until the declared entry count is
    /// exhausted, skipping free slots. A matching record whose target inode
    /// is no longer allocated is treated as not found and scanning
    /// continues. First occurrence wins.
    pub fn find_entry(&self, dir: Inumber, name: &[u8]) -> Result<DirEntry> {
        validate_name(name)?;
        let inode = self.read_inode(dir)?;
        let entry_count = dir_entry_count(&inode, dir)?;

        let mut seen = 0_usize;
        let mut block = 0_u32;
        while seen < entry_count {
            let read = self.read_inode_block(&inode, LogicalBlock(block))?;
            if read.is_eof() {
                return Err(V6Error::corrupt(format!(
                    "directory {dir} ended before its declared {entry_count} entries"
                )));
            }

            for entry in parse_dir_records(read.valid()).map_err(|e| parse_to_v6(&e))? {
                if seen >= entry_count {
                    break;
                }
                seen += 1;

                if entry.is_free() || !entry.name_matches(name) {
                    continue;
                }
                match self.read_inode(Inumber(entry.inumber)) {
                    Ok(_) => {
                        trace!(dir = %dir, inumber = entry.inumber, "directory entry matched");
                        return Ok(entry);
                    }
                    // A record naming a freed or impossible inode reads as
                    // absent; the scan continues.
                    Err(V6Error::NotAllocated { .. } | V6Error::OutOfRange { .. }) => {
                        trace!(dir = %dir, inumber = entry.inumber, "skipping stale entry");
                    }
                    // Device failures on the inode table abort the scan.
                    Err(err) => return Err(err),
                }
            }
            block += 1;
        }

        Err(V6Error::NotFound(
            String::from_utf8_lossy(name).into_owned(),
        ))
    }

    /// List the live entries of a directory in on-disk order.
    pub fn read_dir(&self, dir: Inumber) -> Result<Vec<DirEntry>> {
        let inode = self.read_inode(dir)?;
        let entry_count = dir_entry_count(&inode, dir)?;

        let mut entries = Vec::new();
        let mut seen = 0_usize;
        let mut block = 0_u32;
        while seen < entry_count {
            let read = self.read_inode_block(&inode, LogicalBlock(block))?;
            if read.is_eof() {
                return Err(V6Error::corrupt(format!(
                    "directory {dir} ended before its declared {entry_count} entries"
                )));
            }
            for entry in parse_dir_records(read.valid()).map_err(|e| parse_to_v6(&e))? {
                if seen >= entry_count {
                    break;
                }
                seen += 1;
                if !entry.is_free() {
                    entries.push(entry);
                }
            }
            block += 1;
        }
        Ok(entries)
    }

    // ── Path resolution ───────────────────────────────────────────────

    /// Resolve an absolute path to an inumber.
    ///
    /// A fold over the non-empty `/`-separated components starting from the
    /// root inode; repeated slashes collapse, and the first component
    /// failure aborts the whole resolution. `"/"` resolves to the root
    /// without any traversal. The final component is not required to be a
    /// directory.
    pub fn resolve_path(&self, path: &str) -> Result<Inumber> {
        if path.is_empty() {
            return Err(V6Error::InvalidArgument("path is empty".to_owned()));
        }
        if !path.starts_with('/') {
            return Err(V6Error::InvalidArgument(format!(
                "path {path:?} is not absolute"
            )));
        }

        let mut current = Inumber::ROOT;
        for component in path.split('/').filter(|c| !c.is_empty()) {
            let entry = self.find_entry(current, component.as_bytes())?;
            trace!(component, inumber = entry.inumber, "resolved path component");
            current = Inumber(entry.inumber);
        }
        Ok(current)
    }

    /// Resolve an absolute path and load the final inode.
    pub fn resolve_path_to_inode(&self, path: &str) -> Result<(Inumber, Inode)> {
        let inumber = self.resolve_path(path)?;
        let inode = self.read_inode(inumber)?;
        Ok((inumber, inode))
    }

    // ── Whole-file reads ──────────────────────────────────────────────

    /// Read the entire content of a regular file.
    pub fn read_file(&self, inumber: Inumber) -> Result<Vec<u8>> {
        let inode = self.read_inode(inumber)?;
        if inode.is_dir() {
            return Err(V6Error::IsDirectory { inumber: inumber.0 });
        }

        let mut out = Vec::with_capacity(usize::try_from(inode.size).unwrap_or(0));
        let mut block = 0_u32;
        loop {
            let read = self.read_inode_block(&inode, LogicalBlock(block))?;
            if read.is_eof() {
                break;
            }
            out.extend_from_slice(read.valid());
            block += 1;
        }
        Ok(out)
    }

    /// Read up to `len` bytes of a regular file starting at byte `offset`.
    ///
    /// Reads past end of file are clamped; an offset at or past the end
    /// yields an empty buffer.
    pub fn read_file_range(&self, inumber: Inumber, offset: u64, len: usize) -> Result<Vec<u8>> {
        let inode = self.read_inode(inumber)?;
        if inode.is_dir() {
            return Err(V6Error::IsDirectory { inumber: inumber.0 });
        }

        let size = u64::from(inode.size);
        if offset >= size {
            return Ok(Vec::new());
        }
        let end = size.min(offset.saturating_add(u64::try_from(len).unwrap_or(u64::MAX)));

        let sector_size = u64::from(self.geometry.sector_size.get());
        #[allow(clippy::cast_possible_truncation)] // size is 24-bit on disk
        let mut out = Vec::with_capacity((end - offset) as usize);
        let mut position = offset;
        #[allow(clippy::cast_possible_truncation)] // all values bounded by the 24-bit size
        while position < end {
            let block = LogicalBlock((position / sector_size) as u32);
            let read = self.read_inode_block(&inode, block)?;
            let in_block = (position % sector_size) as usize;
            let want = ((end - position) as usize).min(read.valid_len().saturating_sub(in_block));
            if want == 0 {
                break;
            }
            out.extend_from_slice(&read.valid()[in_block..in_block + want]);
            position += want as u64;
        }
        Ok(out)
    }
}

/// Return a nonzero pointer as a sector number, or the corruption error
/// mandated for the zero sentinel.
fn nonzero_sector(raw: u16, what: &str, block: LogicalBlock) -> Result<SectorNumber> {
    if raw == 0 {
        return Err(V6Error::corrupt(format!(
            "zero {what} while resolving logical block {block}"
        )));
    }
    Ok(SectorNumber(u32::from(raw)))
}

fn validate_name(name: &[u8]) -> Result<()> {
    if name.is_empty() {
        return Err(V6Error::InvalidArgument("name is empty".to_owned()));
    }
    if name.len() > DIR_NAME_LEN {
        return Err(V6Error::InvalidArgument(format!(
            "name is {} bytes, limit is {DIR_NAME_LEN}",
            name.len()
        )));
    }
    Ok(())
}

/// Validate that `inode` is a well-formed directory and return its record
/// count.
fn dir_entry_count(inode: &Inode, dir: Inumber) -> Result<usize> {
    if !inode.is_dir() {
        return Err(V6Error::NotDirectory { inumber: dir.0 });
    }
    let size = inode.size as usize;
    if size % DIR_ENTRY_SIZE != 0 {
        return Err(V6Error::corrupt(format!(
            "directory {dir} size {size} is not a multiple of the {DIR_ENTRY_SIZE}-byte record"
        )));
    }
    let count = size / DIR_ENTRY_SIZE;
    if count == 0 {
        return Err(V6Error::corrupt(format!("directory {dir} has no entries")));
    }
    Ok(count)
}
