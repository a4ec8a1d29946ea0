// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Encoding of line-info records into the object stream format.
//!
//! The linker itself only reads this format. The writer exists for tools
//! that produce or rewrite object files and for building test inputs.

use super::*;
use crate::lineinfo::LineInfo;
use std::io;

/// Writer for line-info records.
#[derive(Debug)]
pub struct Writer<O: io::Write> {
    out: O,
    write_buf: Vec<u8>,
}

impl<O: io::Write> Writer<O> {
    /// Create a new writer that outputs into `out`.
    pub fn new(out: O) -> Self {
        Writer {
            out,
            write_buf: Vec::with_capacity(MAX_VARINT_LEN * 4),
        }
    }

    /// Write a single line-info record.
    ///
    /// Synthesized line infos have no file table entry and are rejected.
    pub fn write_line_info(&mut self, info: &LineInfo) -> Result {
        let file = info.file().ok_or(Error::SyntheticLineInfo)?;

        self.write_buf.clear();
        for value in [
            u64::from(info.kind().0),
            u64::from(info.pos().line),
            u64::from(info.pos().col),
            file.index() as u64,
        ] {
            prost::encoding::encode_varint(value, &mut self.write_buf);
        }

        self.flush_buf()
    }

    /// Write a line-info list referring to table positions.
    pub fn write_line_info_list(&mut self, indices: &[u32]) -> Result {
        self.write_var(indices.len() as u64)?;
        for &index in indices {
            self.write_var(u64::from(index))?;
        }
        Ok(())
    }

    /// Write a complete line-info table section.
    pub fn write_line_info_table(&mut self, infos: &[LineInfo]) -> Result {
        self.write_var(infos.len() as u64)?;
        for info in infos {
            self.write_line_info(info)?;
        }
        Ok(())
    }

    /// Write a bare var-int.
    pub fn write_var(&mut self, value: u64) -> Result {
        self.write_buf.clear();
        prost::encoding::encode_varint(value, &mut self.write_buf);
        self.flush_buf()
    }

    /// Flush the underlying stream and return it.
    pub fn finalize(mut self) -> Result<O> {
        self.out.flush()?;
        Ok(self.out)
    }

    /// Gets an immutable reference to the underlying stream.
    pub fn stream_ref(&self) -> &O {
        &self.out
    }

    fn flush_buf(&mut self) -> Result {
        self.out.write_all(&self.write_buf)?;
        Ok(())
    }
}
