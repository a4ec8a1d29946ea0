// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Per-module tables that line infos are resolved against.

use crate::lineinfo::{LineInfoId, LineInfoStore};
use crate::StringId;

/// Entry in a module's file table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Interned file name.
    pub name: StringId,
    /// Modification time as recorded by the assembler.
    pub mtime: u64,
    /// File size as recorded by the assembler.
    pub size: u64,
}

/// Weak reference to an entry in the owning module's file table.
///
/// Only meaningful together with the [`Module`] it was resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileRef(pub(crate) u32);

impl FileRef {
    /// Position in the module's file table.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One object module's worth of line information.
#[derive(Debug, Default)]
pub struct Module {
    /// Display name used in diagnostics, usually the object file name.
    pub name: String,
    /// File table, loaded before any line infos.
    pub files: Vec<FileInfo>,
    /// Line infos of this module in object file order.
    ///
    /// Line-info lists in the object file refer to entries by position in
    /// this table.
    pub line_infos: Vec<LineInfoId>,
}

impl Module {
    /// Create a module without any tables.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Look up a file table entry.
    pub fn file(&self, file: FileRef) -> Option<&FileInfo> {
        self.files.get(file.index())
    }

    /// Tear down the module's line-info table.
    ///
    /// # Panics
    ///
    /// If any of the line infos is still cited by a fragment. Release the
    /// layout's references first.
    pub fn free_line_infos(&mut self, store: &mut LineInfoStore) {
        for id in self.line_infos.drain(..) {
            store.destroy(id);
        }
    }
}
