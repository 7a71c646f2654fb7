//! Line formats for streamed output
//!
//! A format renders one stored item as one line of text, without the
//! trailing newline. The chunk serializer appends the newline and decides
//! whether the line fits.

use core::fmt;

use crate::record::Record;

/// Renders one item as a single line
pub trait LineFormat<T> {
    /// Write `item` to `out` without a trailing newline
    fn write_line<W: fmt::Write>(&self, item: &T, out: &mut W) -> fmt::Result;
}

/// Write values as CSV with matrix row breaks
///
/// Values are joined by `,`. A `;` follows every `matrix_columns`-th value and
/// the last value. `matrix_columns == 0` means no intermediate breaks.
///
/// ```
/// use fieldnode_core::format::write_csv_values;
///
/// let mut out = String::new();
/// write_csv_values(&mut out, &[1, 2, 3, 4, 5], 2).unwrap();
/// assert_eq!(out, "1,2;3,4;5;");
/// ```
pub fn write_csv_values<W: fmt::Write>(out: &mut W, values: &[i32], matrix_columns: u8) -> fmt::Result {
    let columns = usize::from(matrix_columns);
    for (i, value) in values.iter().enumerate() {
        let last = i + 1 == values.len();
        let row_end = columns != 0 && (i + 1) % columns == 0;
        let separator = if last || row_end { ';' } else { ',' };
        write!(out, "{}{}", value, separator)?;
    }
    Ok(())
}

/// Plain CSV record line: channel values only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvFormat {
    /// Values per matrix row
    pub matrix_columns: u8,
}

impl CsvFormat {
    /// Format with `matrix_columns` values per row
    pub const fn new(matrix_columns: u8) -> Self {
        Self { matrix_columns }
    }
}

impl LineFormat<Record> for CsvFormat {
    fn write_line<W: fmt::Write>(&self, record: &Record, out: &mut W) -> fmt::Result {
        write_csv_values(out, record.channels(), self.matrix_columns)
    }
}
