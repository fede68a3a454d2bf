#![forbid(unsafe_code)]
//! v6fs public API facade.
//!
//! Re-exports the library surface through one crate so consumers depend on
//! `v6fs` alone: the [`V6Fs`] handle and its read operations from
//! `v6fs-core`, device implementations from `v6fs-block`, decoded on-disk
//! structures from `v6fs-ondisk`, and the shared unit types and error type.

pub use v6fs_core::*;

pub use v6fs_block::{CachedSectorDevice, FileSectorDevice, MemorySectorDevice, SectorBuf, SectorDevice};
pub use v6fs_error::{Result, V6Error};
pub use v6fs_ondisk::{DirEntry, FileKind, Inode, Superblock};
pub use v6fs_types::{Inumber, LogicalBlock, SectorNumber, SectorSize};
