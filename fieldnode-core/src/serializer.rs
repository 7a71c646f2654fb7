//! Resumable, size-bounded serialization of store contents
//!
//! HTTP chunked responses hand the firmware a small buffer again and again
//! until it reports zero bytes. [`ChunkSerializer::fill`] writes as many whole
//! lines as fit into each buffer and leaves the cursor on the first line that
//! did not, so the next call picks up exactly there.
//!
//! ## Per-call contract
//!
//! - unset or evicted cursor: returns 0, the stream is finished
//! - a line is never split across calls
//! - if not even the first line fits, a single placeholder byte is written
//!   and the cursor stays put; the transport retries with a fresh buffer
//! - after each line the cursor advances; once it runs past the newest item
//!   the call ends and the next call returns 0
//! - the call also ends early when the next line would probably not fit,
//!   estimated as 1.2 times the line just written

use alloc::string::String;

use crate::format::{CsvFormat, LineFormat};
use crate::record::Record;
use crate::store::{Cursor, RecordStore};

/// Byte written when the buffer cannot hold a single line
pub const PLACEHOLDER: u8 = b' ';

/// Fills caller buffers with whole lines rendered by `F`
#[derive(Debug, Clone)]
pub struct ChunkSerializer<F> {
    format: F,
    line: String,
}

impl<F> ChunkSerializer<F> {
    /// Serializer rendering lines with `format`
    pub fn new(format: F) -> Self {
        Self { format, line: String::new() }
    }

    /// Active line format
    pub fn format(&self) -> &F {
        &self.format
    }

    /// Replace the line format, e.g. after a matrix setting change
    pub fn set_format(&mut self, format: F) {
        self.format = format;
    }

    /// Write whole lines starting at `cursor` into `buf`
    ///
    /// Returns the number of bytes written; 0 means the traversal is done.
    pub fn fill<T>(&mut self, store: &RecordStore<T>, cursor: &mut Cursor, buf: &mut [u8]) -> usize
    where
        F: LineFormat<T>,
    {
        let limit = buf.len();
        let mut written = 0;

        while let Some(item) = store.current(cursor) {
            self.line.clear();
            if self.format.write_line(item, &mut self.line).is_err() {
                log_warn!("line formatting failed, ending chunk");
                break;
            }
            self.line.push('\n');
            let len = self.line.len();

            if written + len > limit {
                if written == 0 && limit > 0 {
                    buf[0] = PLACEHOLDER;
                    written = 1;
                }
                break;
            }

            buf[written..written + len].copy_from_slice(self.line.as_bytes());
            written += len;

            if !store.advance(cursor) {
                break;
            }
            if written + len * 6 / 5 > limit {
                break;
            }
        }

        written
    }
}

/// What an export session streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportMode {
    /// Newest record only, re-read on every request
    Latest,
    /// Whole history, oldest first
    History,
}

/// One reader of the record store with its own cursor
///
/// Each HTTP endpoint owns a session. Sessions never share cursors, so a
/// live poll in the middle of a CSV download does not disturb the download.
#[derive(Debug, Clone)]
pub struct ExportSession {
    mode: ExportMode,
    cursor: Cursor,
    serializer: ChunkSerializer<CsvFormat>,
}

impl ExportSession {
    /// Session in `mode` writing CSV lines with `matrix_columns` per row
    pub fn new(mode: ExportMode, matrix_columns: u8) -> Self {
        let cursor = match mode {
            ExportMode::Latest => Cursor::latest(),
            ExportMode::History => Cursor::oldest_first(),
        };
        Self { mode, cursor, serializer: ChunkSerializer::new(CsvFormat::new(matrix_columns)) }
    }

    /// Streaming mode
    pub fn mode(&self) -> ExportMode {
        self.mode
    }

    /// Update the matrix row width for later lines
    pub fn set_matrix_columns(&mut self, matrix_columns: u8) {
        self.serializer.set_format(CsvFormat::new(matrix_columns));
    }

    /// Fill `buf` with the next chunk of response body
    ///
    /// `index` is the transport's running byte offset into the response; 0
    /// starts a new response and repositions the cursor.
    pub fn fill(&mut self, store: &RecordStore<Record>, buf: &mut [u8], index: usize) -> usize {
        if index == 0 {
            store.reset_cursor(&mut self.cursor);
        }
        self.serializer.fill(store, &mut self.cursor, buf)
    }
}
