// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Output layout: segments made of sections made of fragments.
//!
//! The layout is assembled with a [`LayoutBuilder`] while modules are loaded
//! and addresses are assigned. Once everything is decided it is frozen into
//! an immutable [`Layout`], which is what relocation operates on.
//!
//! ```text
//!  pc
//!  ↓
//!  [fill][frag][frag][frag][fill][frag][frag]
//!  ┗━━━━━━━━ section 0 ━━━━┛┗━━ section 1 ━━┛
//!  ┗━━━━━━━━━━━━━━━━ segment ━━━━━━━━━━━━━━━┛
//! ```

use crate::lineinfo::{LineInfoId, LineInfoStore};
use crate::VirtAddr;

use smallvec::SmallVec;

/// Result type shorthand.
pub type Result<T = (), E = Error> = std::result::Result<T, E>;

/// Errors that can occur while building the layout.
#[non_exhaustive]
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("segment `{segment}` extends past the end of the address space")]
    AddressOverflow { segment: String },

    #[error("segment {0:?} does not exist")]
    UnknownSegment(SegmentId),

    #[error("section {0:?} does not exist")]
    UnknownSection(SectionId),
}

/// Handle of a segment in a layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentId(pub(crate) u32);

impl SegmentId {
    /// Position of the segment in the layout.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle of a section in a layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SectionId {
    /// Owning segment.
    pub segment: SegmentId,
    /// Position within the segment.
    pub index: u32,
}

/// Handle of a fragment in a layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FragmentId {
    /// Owning segment.
    pub segment: SegmentId,
    /// Position of the owning section within the segment.
    pub section: u32,
    /// Position within the section.
    pub index: u32,
}

/// Smallest sized unit of code or data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Size in bytes.
    pub size: u32,
    /// Line infos the fragment was generated from.
    pub line_infos: SmallVec<[LineInfoId; 2]>,
}

/// Sequence of fragments, preceded by fill bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    /// Padding placed before the first fragment, e.g. for alignment.
    pub fill: u64,
    /// Fragments in address order.
    pub fragments: Vec<Fragment>,
}

impl Section {
    /// Total size including fill bytes, `None` on overflow.
    pub fn size(&self) -> Option<u64> {
        self.fragments
            .iter()
            .try_fold(self.fill, |acc, frag| acc.checked_add(u64::from(frag.size)))
    }
}

/// Contiguous output region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Segment name, used in diagnostics.
    pub name: String,
    /// Address of the first byte of the segment.
    pub pc: VirtAddr,
    /// Sections in address order.
    pub sections: Vec<Section>,
}

impl Segment {
    /// Total size of all sections, `None` on overflow.
    pub fn size(&self) -> Option<u64> {
        self.sections
            .iter()
            .try_fold(0u64, |acc, sec| acc.checked_add(sec.size()?))
    }

    /// Iterate over all fragments with their handles, in address order.
    pub fn fragments(&self, id: SegmentId) -> impl Iterator<Item = (FragmentId, &Fragment)> + '_ {
        self.sections.iter().zip(0u32..).flat_map(move |(sec, section)| {
            sec.fragments
                .iter()
                .zip(0u32..)
                .map(move |(frag, index)| {
                    let id = FragmentId {
                        segment: id,
                        section,
                        index,
                    };
                    (id, frag)
                })
        })
    }
}

/// Mutable layout under construction.
#[derive(Debug, Default)]
pub struct LayoutBuilder {
    segments: Vec<Segment>,
}

impl LayoutBuilder {
    /// Create an empty layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a segment starting at `pc`.
    pub fn add_segment(&mut self, name: impl Into<String>, pc: VirtAddr) -> SegmentId {
        let id = SegmentId(next_index(self.segments.len(), "segment"));
        self.segments.push(Segment {
            name: name.into(),
            pc,
            sections: Vec::new(),
        });
        id
    }

    /// Move a segment to a different base address.
    pub fn set_pc(&mut self, segment: SegmentId, pc: VirtAddr) -> Result {
        self.segment_mut(segment)?.pc = pc;
        Ok(())
    }

    /// Append a section to the end of `segment`.
    pub fn add_section(&mut self, segment: SegmentId, fill: u64) -> Result<SectionId> {
        let seg = self.segment_mut(segment)?;
        let id = SectionId {
            segment,
            index: next_index(seg.sections.len(), "section"),
        };
        seg.sections.push(Section {
            fill,
            fragments: Vec::new(),
        });
        Ok(id)
    }

    /// Change the number of fill bytes in front of a section.
    pub fn set_fill(&mut self, section: SectionId, fill: u64) -> Result {
        self.section_mut(section)?.fill = fill;
        Ok(())
    }

    /// Append a fragment to the end of `section`.
    ///
    /// The fragment is recorded as citing each of `line_infos`, which must be
    /// live in `store`.
    pub fn add_fragment(
        &mut self,
        store: &mut LineInfoStore,
        section: SectionId,
        size: u32,
        line_infos: impl IntoIterator<Item = LineInfoId>,
    ) -> Result<FragmentId> {
        let sec = self.section_mut(section)?;
        let id = FragmentId {
            segment: section.segment,
            section: section.index,
            index: next_index(sec.fragments.len(), "fragment"),
        };
        let line_infos: SmallVec<[LineInfoId; 2]> = line_infos.into_iter().collect();

        for &li in &line_infos {
            store.add_fragment_ref(li, id);
        }

        sec.fragments.push(Fragment { size, line_infos });
        Ok(id)
    }

    /// Freeze the layout.
    ///
    /// Fails if a segment doesn't fit into the address space, which
    /// guarantees that address calculations on the frozen layout can't
    /// overflow.
    pub fn freeze(self) -> Result<Layout> {
        for seg in &self.segments {
            let end = seg.size().and_then(|size| seg.pc.checked_add(size));
            if end.is_none() {
                return Err(Error::AddressOverflow {
                    segment: seg.name.clone(),
                });
            }
        }

        Ok(Layout {
            segments: self.segments,
        })
    }

    /// Drop the layout, removing its fragments from the line infos' citing
    /// fragment sets.
    pub fn release(self, store: &mut LineInfoStore) {
        release_segments(&self.segments, store);
    }

    fn segment_mut(&mut self, id: SegmentId) -> Result<&mut Segment> {
        self.segments
            .get_mut(id.index())
            .ok_or(Error::UnknownSegment(id))
    }

    fn section_mut(&mut self, id: SectionId) -> Result<&mut Section> {
        self.segment_mut(id.segment)?
            .sections
            .get_mut(id.index as usize)
            .ok_or(Error::UnknownSection(id))
    }
}

/// Frozen layout with final addresses and sizes.
#[derive(Debug)]
pub struct Layout {
    segments: Vec<Segment>,
}

impl Layout {
    /// Iterate over all segments with their handles.
    pub fn segments(&self) -> impl Iterator<Item = (SegmentId, &Segment)> + '_ {
        self.segments
            .iter()
            .zip(0u32..)
            .map(|(seg, idx)| (SegmentId(idx), seg))
    }

    /// Look up a segment.
    pub fn segment(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.get(id.index())
    }

    /// Look up a fragment.
    pub fn fragment(&self, id: FragmentId) -> Option<&Fragment> {
        self.segment(id.segment)?
            .sections
            .get(id.section as usize)?
            .fragments
            .get(id.index as usize)
    }

    /// Drop the layout, removing its fragments from the line infos' citing
    /// fragment sets.
    pub fn release(self, store: &mut LineInfoStore) {
        release_segments(&self.segments, store);
    }
}

/// Index for the next entry of a list that currently holds `len` entries.
///
/// Handles are 32 bits wide. A wrapped index would alias an earlier handle.
fn next_index(len: usize, what: &str) -> u32 {
    let Ok(idx) = u32::try_from(len) else {
        panic!("bug: more than 2^32 {what}s in one layout list");
    };
    idx
}

fn release_segments(segments: &[Segment], store: &mut LineInfoStore) {
    for (seg, idx) in segments.iter().zip(0u32..) {
        for (frag_id, frag) in seg.fragments(SegmentId(idx)) {
            for &li in &frag.line_infos {
                store.remove_fragment_ref(li, frag_id);
            }
        }
    }
}
