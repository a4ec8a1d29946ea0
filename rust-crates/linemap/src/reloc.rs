// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Map line infos to their final output addresses.
//!
//! Relocation walks a frozen segment from its base address, adding fill bytes
//! before each section and fragment sizes after each fragment. Every line
//! info cited by a fragment receives one [`Span`] per citing fragment:
//!
//! ```text
//! pc = 0x8000
//!  ↓
//!  [fill: 2][ frag: 10, L1 ][ frag: 5, L2 ]
//!  0x8000   0x8002          0x800c         0x8011
//!
//!  L1 → { 0x8002, 10 }
//!  L2 → { 0x800c,  5 }
//! ```
//!
//! Spans are never merged, even if they are adjacent.
//!
//! [`Span`]: crate::lineinfo::Span

use crate::debug;
use crate::layout::{Layout, SegmentId};
use crate::lineinfo::{LineInfoId, LineInfoKind, LineInfoStore};

/// Append the spans of one segment to the line infos cited by its fragments.
///
/// Must run exactly once per segment and link run: spans from a previous
/// call are kept, so a second call duplicates them. Use
/// [`LineInfoStore::clear_spans`] before relocating again.
///
/// # Panics
///
/// If `segment` is not part of `layout`, or a fragment cites a line info
/// that is not live in `store`.
pub fn relocate_line_info(layout: &Layout, segment: SegmentId, store: &mut LineInfoStore) {
    let Some(seg) = layout.segment(segment) else {
        panic!("bug: segment {segment:?} is not part of the layout");
    };

    // Freezing the layout checked that the segment end fits into the
    // address space, so none of the additions below can overflow.
    let mut offs = seg.pc;
    let mut spans = 0usize;

    for sec in &seg.sections {
        offs += sec.fill;

        for frag in &sec.fragments {
            for &li in &frag.line_infos {
                store[li].add_span(segment, offs, frag.size);
            }
            spans += frag.line_infos.len();

            offs += u64::from(frag.size);
        }
    }

    debug!(
        "segment `{}`: {} spans in 0x{:x}..0x{:x}",
        seg.name, spans, seg.pc, offs,
    );
}

/// Relocate the line infos of all segments, in layout order.
pub fn relocate_all(layout: &Layout, store: &mut LineInfoStore) {
    for (id, _) in layout.segments() {
        relocate_line_info(layout, id, store);
    }
}

/// Find the first plain assembler line info in `line_infos`.
///
/// Line infos from macro expansions or external sources are skipped, which
/// yields the location a diagnostic should point to.
pub fn asm_line_info(
    store: &LineInfoStore,
    line_infos: &[LineInfoId],
) -> Option<LineInfoId> {
    line_infos
        .iter()
        .copied()
        .find(|&id| store[id].kind() == LineInfoKind::ASM)
}
