// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Source line information and the address spans attributed to it.
//!
//! Line infos live in a [`LineInfoStore`] arena and are referenced through
//! [`LineInfoId`] handles. Modules refer to them by table position, fragments
//! by handle, and each line info keeps a multiset of the fragments citing it
//! so that teardown can tell whether a handle is still in use.

use crate::layout::{FragmentId, SegmentId};
use crate::module::FileRef;
use crate::{range_overlap, StringId, VirtAddr};

use smallvec::SmallVec;
use std::ops;

/// A position in a source file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FilePos {
    /// Interned file name, [`StringId::INVALID`] for synthesized positions.
    pub name: StringId,
    /// Line number, 1-based. Zero if unknown.
    pub line: u32,
    /// Column number. Zero if unknown.
    pub col: u32,
}

/// Origin of a line info.
///
/// Stored in the low two bits of [`LineInfoKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineInfoType {
    /// Assembler source.
    Asm,
    /// External source, e.g. the C file the assembler input was compiled from.
    External,
    /// Macro expansion.
    Macro,
    /// Macro parameter expansion.
    MacroParam,
}

/// Raw kind tag of a line info, exactly as it was read from the object file.
///
/// The value packs a [`LineInfoType`] into the two low bits and a nesting
/// count (how many macro expansions deep the line is) into the rest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LineInfoKind(pub u32);

impl LineInfoKind {
    /// Plain assembler line outside of any macro.
    pub const ASM: LineInfoKind = LineInfoKind(0);

    const TYPE_MASK: u32 = 0x03;
    const COUNT_SHIFT: u32 = 2;

    /// Build a kind tag from type and nesting count.
    ///
    /// Count bits that don't fit next to the type are dropped.
    pub fn new(ty: LineInfoType, count: u32) -> Self {
        let ty = match ty {
            LineInfoType::Asm => 0,
            LineInfoType::External => 1,
            LineInfoType::Macro => 2,
            LineInfoType::MacroParam => 3,
        };
        Self(ty | (count << Self::COUNT_SHIFT))
    }

    /// Decoded origin of the line info.
    pub fn ty(self) -> LineInfoType {
        match self.0 & Self::TYPE_MASK {
            0 => LineInfoType::Asm,
            1 => LineInfoType::External,
            2 => LineInfoType::Macro,
            3 => LineInfoType::MacroParam,
            _ => unreachable!("bug: type mask wider than two bits"),
        }
    }

    /// Macro nesting count.
    pub fn count(self) -> u32 {
        self.0 >> Self::COUNT_SHIFT
    }
}

/// Contiguous address range in one segment attributed to a line info.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    /// Segment whose address space the offset refers to.
    pub segment: SegmentId,
    /// Start address.
    pub offset: VirtAddr,
    /// Number of bytes, equal to the size of the fragment that produced it.
    pub length: u32,
}

impl Span {
    /// End address of the span (exclusive), saturating at the top of the
    /// address space.
    pub fn end(&self) -> VirtAddr {
        self.offset.saturating_add(u64::from(self.length))
    }

    /// Address range covered by the span.
    pub fn range(&self) -> ops::Range<VirtAddr> {
        self.offset..self.end()
    }

    /// Part of `range` that this span covers, if any.
    pub fn overlap(&self, range: &ops::Range<VirtAddr>) -> Option<ops::Range<VirtAddr>> {
        range_overlap(&self.range(), range)
    }
}

/// Handle of a [`LineInfo`] in a [`LineInfoStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LineInfoId(pub(crate) u32);

impl LineInfoId {
    /// Position of the line info in its store.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Source position together with the output addresses generated for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineInfo {
    pub(crate) file: Option<FileRef>,
    pub(crate) kind: LineInfoKind,
    pub(crate) pos: FilePos,
    pub(crate) fragments: SmallVec<[FragmentId; 2]>,
    pub(crate) spans: Vec<Span>,
}

impl LineInfo {
    /// Create a line info for code the linker generates itself.
    ///
    /// The result is an assembler-kind line info without a file table entry.
    pub fn synthetic(pos: FilePos) -> Self {
        Self::with_kind(None, LineInfoKind::ASM, pos)
    }

    pub(crate) fn with_kind(file: Option<FileRef>, kind: LineInfoKind, pos: FilePos) -> Self {
        Self {
            file,
            kind,
            pos,
            fragments: SmallVec::new(),
            spans: Vec::new(),
        }
    }

    /// Raw kind tag.
    pub fn kind(&self) -> LineInfoKind {
        self.kind
    }

    /// Source position.
    pub fn pos(&self) -> &FilePos {
        &self.pos
    }

    /// File table entry in the owning module, `None` for synthesized infos.
    pub fn file(&self) -> Option<FileRef> {
        self.file
    }

    /// Address spans, in the order relocation produced them.
    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    /// Fragments citing this line info. The same fragment may occur more
    /// than once.
    pub fn fragments(&self) -> &[FragmentId] {
        &self.fragments
    }

    /// Whether any span of this line info contains `addr` in `segment`.
    pub fn covers(&self, segment: SegmentId, addr: VirtAddr) -> bool {
        self.spans
            .iter()
            .any(|span| span.segment == segment && span.range().contains(&addr))
    }

    pub(crate) fn add_span(&mut self, segment: SegmentId, offset: VirtAddr, length: u32) {
        self.spans.push(Span {
            segment,
            offset,
            length,
        });
    }
}

/// Arena owning all line infos of a link run.
///
/// Handles stay valid until [`LineInfoStore::destroy`] is called on them and
/// are never handed out twice.
#[derive(Debug, Default)]
pub struct LineInfoStore {
    slots: Vec<Option<LineInfo>>,
}

impl LineInfoStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a line info and return its handle.
    pub fn insert(&mut self, info: LineInfo) -> LineInfoId {
        let Ok(idx) = u32::try_from(self.slots.len()) else {
            panic!("bug: more than 2^32 line infos in one link run");
        };
        self.slots.push(Some(info));
        LineInfoId(idx)
    }

    /// Number of live line infos.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|x| x.is_some()).count()
    }

    /// Whether the store holds no live line infos.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a line info. `None` if it was destroyed or the handle belongs
    /// to another store.
    pub fn get(&self, id: LineInfoId) -> Option<&LineInfo> {
        self.slots.get(id.index())?.as_ref()
    }

    /// Iterate over all live line infos with their handles.
    pub fn iter(&self) -> impl Iterator<Item = (LineInfoId, &LineInfo)> + '_ {
        self.slots
            .iter()
            .zip(0u32..)
            .filter_map(|(slot, idx)| Some((LineInfoId(idx), slot.as_ref()?)))
    }

    /// Destroy a line info, releasing its spans.
    ///
    /// # Panics
    ///
    /// If any fragment still cites the line info, or if it was already
    /// destroyed. Both indicate a bug in the caller, not bad input.
    pub fn destroy(&mut self, id: LineInfoId) {
        let Some(slot) = self.slots.get_mut(id.index()) else {
            panic!("bug: line info {id:?} does not belong to this store");
        };
        let Some(info) = slot.as_ref() else {
            panic!("bug: line info {id:?} destroyed twice");
        };
        assert!(
            info.fragments.is_empty(),
            "bug: destroying line info {id:?} still cited by {} fragment(s)",
            info.fragments.len(),
        );
        *slot = None;
    }

    /// Drop the spans of all line infos, e.g. before relocating again.
    pub fn clear_spans(&mut self) {
        for info in self.slots.iter_mut().flatten() {
            info.spans.clear();
        }
    }

    pub(crate) fn add_fragment_ref(&mut self, id: LineInfoId, frag: FragmentId) {
        self[id].fragments.push(frag);
    }

    pub(crate) fn remove_fragment_ref(&mut self, id: LineInfoId, frag: FragmentId) {
        let refs = &mut self[id].fragments;
        let Some(pos) = refs.iter().position(|x| *x == frag) else {
            panic!("bug: fragment {frag:?} does not cite line info {id:?}");
        };
        refs.remove(pos);
    }
}

/// Access a live line info.
///
/// # Panics
///
/// If the line info was destroyed. Handles reachable from fragments or module
/// tables are always live, so this is a bug in the caller.
impl ops::Index<LineInfoId> for LineInfoStore {
    type Output = LineInfo;

    fn index(&self, id: LineInfoId) -> &LineInfo {
        match self.slots.get(id.index()) {
            Some(Some(info)) => info,
            _ => panic!("bug: access to dead line info {id:?}"),
        }
    }
}

impl ops::IndexMut<LineInfoId> for LineInfoStore {
    fn index_mut(&mut self, id: LineInfoId) -> &mut LineInfo {
        match self.slots.get_mut(id.index()) {
            Some(Some(info)) => info,
            _ => panic!("bug: access to dead line info {id:?}"),
        }
    }
}
