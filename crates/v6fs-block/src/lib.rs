#![forbid(unsafe_code)]
//! Sector I/O layer.
//!
//! Provides the [`SectorDevice`] trait (the `read_sector` boundary the rest
//! of the filesystem consumes), a file-backed implementation using
//! `pread`-style positional reads, an in-memory device for synthetic images,
//! and an LRU read cache wrapper. Everything here is read-only: the layer
//! has no write path at all.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Arc;
use v6fs_error::{Result, V6Error};
use v6fs_types::{SectorNumber, SectorSize};

/// Owned sector buffer.
///
/// Invariant: length == the sector size of the originating device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectorBuf {
    bytes: Vec<u8>,
}

impl SectorBuf {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.bytes
    }
}

/// Sector-addressed read interface.
///
/// Implementations must be independently safe under concurrent callers:
/// each `read_sector` call is self-contained and returns a fresh buffer.
pub trait SectorDevice: Send + Sync {
    /// Sector size in bytes.
    fn sector_size(&self) -> SectorSize;

    /// Total number of sectors on the device.
    fn sector_count(&self) -> u64;

    /// Read one sector in full.
    ///
    /// Returns exactly `sector_size()` bytes or an error; a partial read is
    /// reported as [`V6Error::ShortRead`], never as truncated data.
    fn read_sector(&self, sector: SectorNumber) -> Result<SectorBuf>;
}

fn check_sector_bounds(sector: SectorNumber, count: u64) -> Result<()> {
    if u64::from(sector.0) >= count {
        return Err(V6Error::OutOfRange {
            what: "sector",
            value: u64::from(sector.0),
            max: count.saturating_sub(1),
        });
    }
    Ok(())
}

/// File-backed sector device over a disk image.
///
/// Uses `std::os::unix::fs::FileExt` positional reads, which are thread-safe
/// and do not share a seek position. The image is opened read-only.
#[derive(Debug, Clone)]
pub struct FileSectorDevice {
    file: Arc<File>,
    sector_size: SectorSize,
    sector_count: u64,
}

impl FileSectorDevice {
    /// Open a disk image.
    ///
    /// The image length must be an exact multiple of the sector size.
    pub fn open(path: impl AsRef<Path>, sector_size: SectorSize) -> Result<Self> {
        let file = OpenOptions::new().read(true).open(path.as_ref())?;
        let len = file.metadata()?.len();
        let sector_count = sector_count_for_len(len, sector_size)?;
        Ok(Self {
            file: Arc::new(file),
            sector_size,
            sector_count,
        })
    }
}

fn sector_count_for_len(len: u64, sector_size: SectorSize) -> Result<u64> {
    let ss = u64::from(sector_size.get());
    if len % ss != 0 {
        return Err(V6Error::Geometry(format!(
            "image length {len} is not a multiple of sector size {sector_size}"
        )));
    }
    Ok(len / ss)
}

impl SectorDevice for FileSectorDevice {
    fn sector_size(&self) -> SectorSize {
        self.sector_size
    }

    fn sector_count(&self) -> u64 {
        self.sector_count
    }

    fn read_sector(&self, sector: SectorNumber) -> Result<SectorBuf> {
        check_sector_bounds(sector, self.sector_count)?;
        let offset = u64::from(sector.0) * u64::from(self.sector_size.get());
        let mut buf = vec![0_u8; self.sector_size.as_usize()];
        self.file
            .read_exact_at(&mut buf, offset)
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::UnexpectedEof => {
                    // Report how much of the sector the file actually holds;
                    // the image may have been truncated behind the handle.
                    let available = self
                        .file
                        .metadata()
                        .map(|meta| meta.len().saturating_sub(offset))
                        .unwrap_or(0);
                    V6Error::ShortRead {
                        sector: u64::from(sector.0),
                        got: usize::try_from(available).unwrap_or(0).min(buf.len()),
                        expected: buf.len(),
                    }
                }
                _ => V6Error::Io(err),
            })?;
        Ok(SectorBuf::new(buf))
    }
}

/// In-memory sector device over an image byte vector.
///
/// Used by integration tests and synthetic-image tooling; the bytes are
/// immutable once the device is constructed.
#[derive(Debug, Clone)]
pub struct MemorySectorDevice {
    bytes: Arc<Vec<u8>>,
    sector_size: SectorSize,
    sector_count: u64,
}

impl MemorySectorDevice {
    /// Wrap an image. The length must be sector-aligned.
    pub fn new(bytes: Vec<u8>, sector_size: SectorSize) -> Result<Self> {
        let len = u64::try_from(bytes.len())
            .map_err(|_| V6Error::Geometry("image length overflows u64".to_owned()))?;
        let sector_count = sector_count_for_len(len, sector_size)?;
        Ok(Self {
            bytes: Arc::new(bytes),
            sector_size,
            sector_count,
        })
    }
}

impl SectorDevice for MemorySectorDevice {
    fn sector_size(&self) -> SectorSize {
        self.sector_size
    }

    fn sector_count(&self) -> u64 {
        self.sector_count
    }

    fn read_sector(&self, sector: SectorNumber) -> Result<SectorBuf> {
        check_sector_bounds(sector, self.sector_count)?;
        let ss = self.sector_size.as_usize();
        let start = usize::try_from(u64::from(sector.0) * u64::from(self.sector_size.get()))
            .map_err(|_| V6Error::Geometry("sector offset overflows usize".to_owned()))?;
        Ok(SectorBuf::new(self.bytes[start..start + ss].to_vec()))
    }
}

// ── LRU read cache ──────────────────────────────────────────────────────────

#[derive(Debug)]
struct LruState {
    capacity: usize,
    resident: HashMap<SectorNumber, Vec<u8>>,
    order: VecDeque<SectorNumber>,
}

impl LruState {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            resident: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&mut self, sector: SectorNumber) -> Option<Vec<u8>> {
        let bytes = self.resident.get(&sector).cloned()?;
        if let Some(pos) = self.order.iter().position(|s| *s == sector) {
            let _ = self.order.remove(pos);
        }
        self.order.push_back(sector);
        Some(bytes)
    }

    fn insert(&mut self, sector: SectorNumber, bytes: Vec<u8>) {
        if self.resident.insert(sector, bytes).is_none() {
            self.order.push_back(sector);
        }
        while self.resident.len() > self.capacity {
            if let Some(victim) = self.order.pop_front() {
                let _ = self.resident.remove(&victim);
            }
        }
    }
}

/// LRU-cached wrapper around a [`SectorDevice`].
///
/// Path resolution re-reads inode-table and directory sectors heavily; a
/// small cache absorbs those repeats. Caching whole sectors cannot change
/// observable results: the underlying image is immutable for the lifetime
/// of the handle.
#[derive(Debug)]
pub struct CachedSectorDevice<D: SectorDevice> {
    inner: D,
    state: Mutex<LruState>,
}

impl<D: SectorDevice> CachedSectorDevice<D> {
    pub fn new(inner: D, capacity_sectors: usize) -> Result<Self> {
        if capacity_sectors == 0 {
            return Err(V6Error::InvalidArgument(
                "cache capacity must be positive".to_owned(),
            ));
        }
        Ok(Self {
            inner,
            state: Mutex::new(LruState::new(capacity_sectors)),
        })
    }

    #[must_use]
    pub fn inner(&self) -> &D {
        &self.inner
    }
}

impl<D: SectorDevice> SectorDevice for CachedSectorDevice<D> {
    fn sector_size(&self) -> SectorSize {
        self.inner.sector_size()
    }

    fn sector_count(&self) -> u64 {
        self.inner.sector_count()
    }

    fn read_sector(&self, sector: SectorNumber) -> Result<SectorBuf> {
        {
            let mut guard = self.state.lock();
            if let Some(bytes) = guard.get(sector) {
                drop(guard);
                return Ok(SectorBuf::new(bytes));
            }
        }

        let buf = self.inner.read_sector(sector)?;

        let mut guard = self.state.lock();
        guard.insert(sector, buf.as_slice().to_vec());
        drop(guard);
        Ok(buf)
    }
}
