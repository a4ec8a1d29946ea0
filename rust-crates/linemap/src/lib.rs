// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod dbglog;
pub mod layout;
pub mod lineinfo;
pub mod module;
pub mod objstream;
pub mod reloc;

// Re-export the types that make up the public surface of a link run.
pub use layout::{Fragment, FragmentId, Layout, LayoutBuilder, Section, Segment, SegmentId};
pub use lineinfo::{FilePos, LineInfo, LineInfoId, LineInfoKind, LineInfoStore, LineInfoType, Span};
pub use module::{FileInfo, FileRef, Module};
pub use reloc::{asm_line_info, relocate_all, relocate_line_info};

/// Address in the linker's output address space.
pub type VirtAddr = u64;

/// Opaque handle for a string in the linker's string pool.
///
/// Interning happens outside of this crate. We only pass the identifiers
/// around and never look at the strings behind them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StringId(pub u32);

impl StringId {
    /// Name used for positions that don't originate from a source file.
    pub const INVALID: StringId = StringId(u32::MAX);

    /// Whether this is the [`StringId::INVALID`] sentinel.
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl Default for StringId {
    fn default() -> Self {
        Self::INVALID
    }
}

/// Returns the overlap of two given ranges, or `None` if no overlap.
///
/// # Examples
///
/// ```
/// # use linemap::range_overlap;
/// assert_eq!(range_overlap(&(0..5), &(1..3)), Some(1..3));
/// assert_eq!(range_overlap(&(0..5), &(5..10)), None);
/// assert_eq!(range_overlap(&(4..10), &(0..5)), Some(4..5));
/// assert_eq!(range_overlap(&(0..0), &(0..1)), None);
/// ```
pub fn range_overlap<T: Ord + Copy>(
    a: &std::ops::Range<T>,
    b: &std::ops::Range<T>,
) -> Option<std::ops::Range<T>> {
    let c = std::ops::Range {
        start: a.start.max(b.start),
        end: a.end.min(b.end),
    };

    if c.is_empty() {
        None
    } else {
        Some(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_string_id() {
        assert!(!StringId::INVALID.is_valid());
        assert!(!StringId::default().is_valid());
        assert!(StringId(0).is_valid());
    }
}
