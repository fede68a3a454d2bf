#![forbid(unsafe_code)]
//! Error types for v6fs.
//!
//! # Error Taxonomy
//!
//! v6fs uses a two-layer error model:
//!
//! | Layer | Type | Crate | Purpose |
//! |-------|------|-------|---------|
//! | Parsing | `ParseError` | `v6fs-types` | On-disk format violations detected during byte decode |
//! | Runtime | `V6Error` | `v6fs-error` (this crate) | User-facing errors for API consumers |
//!
//! `v6fs-error` is intentionally independent of `v6fs-types` to avoid cyclic
//! dependencies; the `ParseError` → `V6Error` conversion lives in `v6fs-core`,
//! which depends on both. Payloads here are primitives and owned `String`s.
//!
//! The mapping rules are:
//!
//! | ParseError variant | V6Error variant | Rationale |
//! |--------------------|-----------------|-----------|
//! | `InsufficientData` | `Corrupt` | Truncated metadata indicates corruption or a truncated image |
//! | `InvalidField` | `Parse` / `Geometry` | Mount-time field validation gets geometry context in `v6fs-core` |
//! | `IntegerConversion` | `Corrupt` | Overflow in decoded values suggests corruption |
//!
//! End-of-file by logical block index is NOT an error anywhere in this
//! taxonomy; `read_file_block` reports it as a zero-length success.

use thiserror::Error;

/// Unified error type for all v6fs operations.
///
/// Failures are permanent for the call that produced them: nothing in this
/// layer retries a sector read or re-scans a directory.
#[derive(Debug, Error)]
pub enum V6Error {
    /// Operating system I/O error (wraps `std::io::Error`).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A sector read returned fewer bytes than the sector size.
    #[error("short read at sector {sector}: got {got} of {expected} bytes")]
    ShortRead {
        sector: u64,
        got: usize,
        expected: usize,
    },

    /// Caller-supplied argument is malformed (zero inumber, empty or
    /// oversized path component, non-absolute path).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A value exceeds the filesystem's declared capacity.
    #[error("{what} {value} out of range (max {max})")]
    OutOfRange {
        what: &'static str,
        value: u64,
        max: u64,
    },

    /// The inode's allocation bit is unset; the inode does not exist.
    #[error("inode {inumber} is not allocated")]
    NotAllocated { inumber: u16 },

    /// Operation requires a directory but the inode is not one.
    #[error("inode {inumber} is not a directory")]
    NotDirectory { inumber: u16 },

    /// Attempted a file-content operation on a directory.
    #[error("inode {inumber} is a directory")]
    IsDirectory { inumber: u16 },

    /// On-disk structure is malformed: directory size not a multiple of the
    /// record size, zero-sized directory, or a zero block pointer where a
    /// valid block was expected.
    #[error("corrupt structure: {detail}")]
    Corrupt { detail: String },

    /// Mount-time geometry validation failed (bad superblock fields, image
    /// length not sector-aligned, inode area beyond the device).
    #[error("invalid geometry: {0}")]
    Geometry(String),

    /// Decode-layer error surfaced to the user.
    ///
    /// Carries the string representation of a `ParseError` from `v6fs-types`.
    /// Prefer `Corrupt` or `Geometry` when more context is known.
    #[error("parse error: {0}")]
    Parse(String),

    /// Name absent from a directory, or a path component unresolvable.
    #[error("not found: {0}")]
    NotFound(String),
}

impl V6Error {
    /// Build a `Corrupt` error from any displayable detail.
    pub fn corrupt(detail: impl Into<String>) -> Self {
        Self::Corrupt {
            detail: detail.into(),
        }
    }
}

/// Result alias using `V6Error`.
pub type Result<T> = std::result::Result<T, V6Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formatting() {
        let err = V6Error::ShortRead {
            sector: 9,
            got: 100,
            expected: 512,
        };
        assert_eq!(err.to_string(), "short read at sector 9: got 100 of 512 bytes");

        let err = V6Error::OutOfRange {
            what: "inumber",
            value: 999,
            max: 128,
        };
        assert_eq!(err.to_string(), "inumber 999 out of range (max 128)");

        let err = V6Error::NotAllocated { inumber: 12 };
        assert_eq!(err.to_string(), "inode 12 is not allocated");

        let err = V6Error::corrupt("zero direct pointer");
        assert_eq!(err.to_string(), "corrupt structure: zero direct pointer");
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::other("boom");
        let err: V6Error = io.into();
        assert!(matches!(err, V6Error::Io(_)));
    }
}
