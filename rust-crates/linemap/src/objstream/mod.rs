// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Line-info records in the linker's object stream format.
//!
//! All integers are unsigned LEB128 var-ints. The stream has no framing of
//! its own, so a record can only be decoded by reading its fields in order:
//!
//! ```text
//! line info record:  kind, line, col, file_index
//! line info list:    count, count × index
//! line info table:   count, count × line info record
//! ```
//!
//! `file_index` refers to the module's file table, `index` to the module's
//! line-info table, both by position.

pub mod read;
pub mod write;

// Re-export core types on the main module.
pub use read::{read_line_info, read_line_info_list, read_line_info_table, Reader};
pub use write::Writer;

/// Maximum number of bytes in a var-int (enough for any `u64`).
const MAX_VARINT_LEN: usize = 10;

/// Maximum number of entries to reserve space for up front.
///
/// Counts come from the object file, so we don't trust them for allocation.
const MAX_PREALLOC: usize = 4096;

/// Result type used throughout this module.
pub type Result<T = (), E = Error> = std::result::Result<T, E>;

/// Errors that can occur when reading or writing line-info records.
#[non_exhaustive]
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid line info index {index} in module `{module}` - max is {max}")]
    InvalidLineInfoIndex {
        index: u64,
        module: String,
        max: usize,
    },

    #[error("Invalid file index {index} in module `{module}` - max is {max}")]
    InvalidFileIndex {
        index: u64,
        module: String,
        max: usize,
    },

    #[error("Stream ended prematurely in the middle of a record")]
    TruncatedRecord,

    #[error("Variable-length integer is too big")]
    VarIntTooLong,

    #[error("Value {value} doesn't fit into field `{field}`")]
    ValueTooLarge { field: &'static str, value: u64 },

    #[error("Line info has no file table entry and can't be serialized")]
    SyntheticLineInfo,

    #[error("IO error")]
    IO(#[from] std::io::Error),
}

impl Error {
    /// Whether the error means the object file is corrupt or was produced by
    /// an incompatible toolchain, as opposed to an environmental problem.
    ///
    /// Either way the link run cannot continue, but only corrupt input should
    /// be reported as a problem with the module.
    pub fn is_corrupt_input(&self) -> bool {
        match self {
            Error::InvalidLineInfoIndex { .. }
            | Error::InvalidFileIndex { .. }
            | Error::TruncatedRecord
            | Error::VarIntTooLong
            | Error::ValueTooLarge { .. } => true,
            Error::SyntheticLineInfo | Error::IO(_) => false,
        }
    }
}

/// Narrow a decoded var-int to the width of its field.
fn narrow(field: &'static str, value: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::ValueTooLarge { field, value })
}

/// Capacity to reserve for `count` entries announced by the stream.
fn prealloc(count: u64) -> usize {
    usize::try_from(count).map_or(MAX_PREALLOC, |x| x.min(MAX_PREALLOC))
}
