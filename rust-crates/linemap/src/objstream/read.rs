// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Decoding of line-info records from an object stream.

use super::*;
use crate::debug;
use crate::lineinfo::{FilePos, LineInfo, LineInfoId, LineInfoKind, LineInfoStore};
use crate::module::{FileRef, Module};
use fallible_iterator::FallibleIterator;
use smallvec::SmallVec;
use std::io;

/// Read a single line-info record.
///
/// The file index is resolved against `module`'s file table, which must be
/// loaded already. The returned line info has no spans and is not cited by
/// any fragment yet.
pub fn read_line_info(mut read: impl io::Read, module: &Module) -> Result<LineInfo> {
    let kind = read_var(&mut read)?;
    let line = read_var(&mut read)?;
    let col = read_var(&mut read)?;
    let file_index = read_var(&mut read)?;

    let Some(file) = usize::try_from(file_index)
        .ok()
        .and_then(|idx| module.files.get(idx))
    else {
        return Err(Error::InvalidFileIndex {
            index: file_index,
            module: module.name.clone(),
            max: module.files.len(),
        });
    };

    // The table lookup above bounds the index by the table length.
    let file_ref = FileRef(file_index as u32);

    Ok(LineInfo::with_kind(
        Some(file_ref),
        LineInfoKind(narrow("kind", kind)?),
        FilePos {
            name: file.name,
            line: narrow("line", line)?,
            col: narrow("col", col)?,
        },
    ))
}

/// Read a list of line-info indices and resolve them against `module`'s
/// line-info table.
///
/// The resolved handles are appended to `out` in stream order. Every index is
/// validated before anything is appended: on error, `out` is left unchanged.
///
/// An index outside of the table means that the object file was not written
/// by a toolchain consistent with ours. Nothing after that point in the
/// stream can be trusted, so the caller must abort the link.
pub fn read_line_info_list(
    mut read: impl io::Read,
    module: &Module,
    out: &mut impl Extend<LineInfoId>,
) -> Result {
    let count = read_var(&mut read)?;
    let max = module.line_infos.len();

    let mut resolved = SmallVec::<[LineInfoId; 8]>::with_capacity(prealloc(count));
    for _ in 0..count {
        let index = read_var(&mut read)?;

        let Some(&id) = usize::try_from(index)
            .ok()
            .and_then(|idx| module.line_infos.get(idx))
        else {
            return Err(Error::InvalidLineInfoIndex {
                index,
                module: module.name.clone(),
                max,
            });
        };

        resolved.push(id);
    }

    out.extend(resolved);
    Ok(())
}

/// Read a module's line-info table section.
///
/// Each record is moved into `store` and its handle appended to
/// `module.line_infos`, so that table positions match record order.
pub fn read_line_info_table(
    read: impl io::Read,
    module: &mut Module,
    store: &mut LineInfoStore,
) -> Result {
    let infos: Vec<LineInfo> = Reader::new(read, module)?.collect()?;

    debug!(
        "module `{}`: read {} line infos",
        module.name,
        infos.len(),
    );

    module.line_infos.reserve(infos.len());
    for info in infos {
        module.line_infos.push(store.insert(info));
    }

    Ok(())
}

/// Reader for the records of a line-info table section.
#[derive(Debug)]
pub struct Reader<'m, I: io::Read> {
    inner: I,
    module: &'m Module,
    remaining: u64,
}

impl<'m, I: io::Read> Reader<'m, I> {
    /// Create a new reader, consuming the record count.
    ///
    /// `module` is used to resolve file indices.
    pub fn new(mut inner: I, module: &'m Module) -> Result<Self> {
        let remaining = read_var(&mut inner)?;
        Ok(Self {
            inner,
            module,
            remaining,
        })
    }

    /// Number of records not read yet.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Read the next record, `None` after the last one.
    pub fn read(&mut self) -> Result<Option<LineInfo>> {
        if self.remaining == 0 {
            return Ok(None);
        }

        let info = read_line_info(&mut self.inner, self.module)?;
        self.remaining -= 1;
        Ok(Some(info))
    }
}

/// Allow using the reader as an iterator.
impl<I: io::Read> FallibleIterator for Reader<'_, I> {
    type Item = LineInfo;
    type Error = Error;

    fn next(&mut self) -> Result<Option<Self::Item>, Self::Error> {
        self.read()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, usize::try_from(self.remaining).ok())
    }
}

/// Read a var-int that is required to be present.
pub(super) fn read_var(read: impl io::Read) -> Result<u64> {
    read_leb128(read)?.ok_or(Error::TruncatedRecord)
}

/// Read an ULEB-128 encoded variable-length integer.
///
/// If EOF is reached before reading the first byte, `Ok(None)` is returned.
/// If EOF is encountered in the middle of an incomplete var-int sequence,
/// [`Error::TruncatedRecord`] is returned.
fn read_leb128(mut read: impl io::Read) -> Result<Option<u64>> {
    let mut result = 0;
    let mut shift = 0;
    let mut buf = [0u8];

    for i in 0..MAX_VARINT_LEN {
        match read.read_exact(&mut buf) {
            Ok(_) => (),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return if i == 0 {
                    Ok(None)
                } else {
                    Err(Error::TruncatedRecord)
                };
            }
            Err(e) => return Err(Error::IO(e)),
        }

        // The last byte only has room for bit 63.
        if i == MAX_VARINT_LEN - 1 && buf[0] > 0x01 {
            return Err(Error::VarIntTooLong);
        }

        result |= ((buf[0] & 0x7F) as u64) << shift;

        if buf[0] & 0x80 == 0 {
            return Ok(Some(result));
        }

        shift += 7;
    }

    Err(Error::VarIntTooLong)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lineinfo::LineInfoType;
    use crate::module::FileInfo;
    use crate::StringId;

    fn module(line_infos: usize, store: &mut LineInfoStore) -> Module {
        let mut module = Module::new("main.o");
        module.files.push(FileInfo {
            name: StringId(40),
            mtime: 1,
            size: 2,
        });
        module.files.push(FileInfo {
            name: StringId(41),
            mtime: 3,
            size: 4,
        });
        for line in 0..line_infos as u32 {
            let id = store.insert(LineInfo::synthetic(FilePos {
                line,
                ..FilePos::default()
            }));
            module.line_infos.push(id);
        }
        module
    }

    #[test]
    fn leb128() {
        assert!(matches!(
            read_leb128(&[0xE5, 0x8E, 0xA6][..]),
            Err(Error::TruncatedRecord),
        ));
        assert!(matches!(read_leb128(&[][..]), Ok(None)));
        assert!(matches!(
            read_leb128(&[0x95, 0x9a, 0xef, 0x3a][..]),
            Ok(Some(123456789)),
        ));
        assert!(matches!(
            read_leb128(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01][..]),
            Ok(Some(u64::MAX)),
        ));
        assert!(matches!(read_leb128(&[0x00][..]), Ok(Some(0))));
        assert!(matches!(read_leb128(&[0x7f][..]), Ok(Some(127))));
        assert!(matches!(read_leb128(&[0x80, 0x01][..]), Ok(Some(128))));
        assert!(matches!(read_leb128(&[0xff, 0x01][..]), Ok(Some(255))));
        assert!(matches!(read_leb128(&[0x80, 0x02][..]), Ok(Some(256))));
        assert!(matches!(
            read_leb128(&[0x80; 11][..]),
            Err(Error::VarIntTooLong),
        ));

        // Payload bits beyond 64 in the last byte.
        assert!(matches!(
            read_leb128(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x02][..]),
            Err(Error::VarIntTooLong),
        ));
        assert!(matches!(
            read_leb128(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x7f][..]),
            Err(Error::VarIntTooLong),
        ));
    }

    #[test]
    fn line_info_list_index_wider_than_u64() {
        let mut store = LineInfoStore::new();
        let module = module(1, &mut store);

        let buf = [0x01, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x02];
        let mut out: Vec<LineInfoId> = Vec::new();
        let err = read_line_info_list(&buf[..], &module, &mut out).unwrap_err();

        assert!(matches!(err, Error::VarIntTooLong));
        assert!(err.is_corrupt_input());
        assert!(out.is_empty());
    }

    #[test]
    fn required_var() {
        assert!(matches!(read_var(&[][..]), Err(Error::TruncatedRecord)));
        assert!(matches!(read_var(&[0x05][..]), Ok(5)));
    }

    #[test]
    fn line_info_record() {
        let mut store = LineInfoStore::new();
        let module = module(0, &mut store);

        // kind = macro with count 1, line 300, col 4, file 1
        let buf = [0x06, 0xAC, 0x02, 0x04, 0x01];
        let li = read_line_info(&buf[..], &module).unwrap();

        assert_eq!(li.kind().ty(), LineInfoType::Macro);
        assert_eq!(li.kind().count(), 1);
        assert_eq!(
            li.pos(),
            &FilePos {
                name: StringId(41),
                line: 300,
                col: 4,
            }
        );
        assert_eq!(li.file().map(FileRef::index), Some(1));
        assert!(li.spans().is_empty());
        assert!(li.fragments().is_empty());
    }

    #[test]
    fn line_info_record_errors() {
        let mut store = LineInfoStore::new();
        let module = module(0, &mut store);

        assert!(matches!(
            read_line_info(&[0x00, 0x01, 0x02][..], &module),
            Err(Error::TruncatedRecord),
        ));
        assert!(matches!(
            read_line_info(&[0x00, 0x01, 0x02, 0x02][..], &module),
            Err(Error::InvalidFileIndex { index: 2, max: 2, .. }),
        ));
        assert!(matches!(
            read_line_info(&[0x00, 0x80, 0x80, 0x80, 0x80, 0x10, 0x00, 0x00][..], &module),
            Err(Error::ValueTooLarge { field: "line", .. }),
        ));
    }

    #[test]
    fn line_info_list() {
        let mut store = LineInfoStore::new();
        let module = module(4, &mut store);

        let mut out = vec![module.line_infos[3]];
        read_line_info_list(&[0x03, 0x02, 0x00, 0x02][..], &module, &mut out).unwrap();

        assert_eq!(
            out,
            [
                module.line_infos[3],
                module.line_infos[2],
                module.line_infos[0],
                module.line_infos[2],
            ],
        );
    }

    #[test]
    fn empty_line_info_list() {
        let mut store = LineInfoStore::new();
        let module = module(0, &mut store);

        let mut out: SmallVec<[LineInfoId; 2]> = SmallVec::new();
        read_line_info_list(&[0x00][..], &module, &mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn line_info_list_index_out_of_range() {
        let mut store = LineInfoStore::new();
        let module = module(4, &mut store);

        for bad in [0x04u8, 0x7f] {
            let mut out = vec![module.line_infos[1]];
            let err = read_line_info_list(&[0x03, 0x00, 0x01, bad][..], &module, &mut out)
                .unwrap_err();

            assert!(err.is_corrupt_input());
            assert!(matches!(
                &err,
                Error::InvalidLineInfoIndex { index, module, max: 4 }
                    if *index == u64::from(bad) && module == "main.o",
            ));
            assert_eq!(out, [module.line_infos[1]]);
        }
    }

    #[test]
    fn line_info_list_truncated() {
        let mut store = LineInfoStore::new();
        let module = module(4, &mut store);

        let mut out: Vec<LineInfoId> = Vec::new();
        assert!(matches!(
            read_line_info_list(&[0x03, 0x00, 0x01][..], &module, &mut out),
            Err(Error::TruncatedRecord),
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn table_reader() {
        let mut store = LineInfoStore::new();
        let module = module(0, &mut store);

        let buf = [0x02, 0x00, 0x01, 0x00, 0x00, 0x01, 0x02, 0x00, 0x01];
        let mut reader = Reader::new(&buf[..], &module).unwrap();
        assert_eq!(reader.remaining(), 2);

        let first = reader.next().unwrap().unwrap();
        assert_eq!(first.kind(), LineInfoKind::ASM);
        assert_eq!(first.pos().line, 1);
        assert_eq!(first.pos().name, StringId(40));

        let second = reader.next().unwrap().unwrap();
        assert_eq!(second.kind().ty(), LineInfoType::External);
        assert_eq!(second.pos().line, 2);
        assert_eq!(second.pos().name, StringId(41));

        assert!(reader.next().unwrap().is_none());
    }

    #[test]
    fn table_appends_to_module() {
        let mut store = LineInfoStore::new();
        let mut module = module(1, &mut store);
        let existing = module.line_infos[0];

        let buf = [0x01, 0x00, 0x09, 0x03, 0x00];
        read_line_info_table(&buf[..], &mut module, &mut store).unwrap();

        assert_eq!(module.line_infos.len(), 2);
        assert_eq!(module.line_infos[0], existing);
        assert_eq!(store[module.line_infos[1]].pos().line, 9);
        assert_eq!(store[module.line_infos[1]].pos().col, 3);
    }
}
