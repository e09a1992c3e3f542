//! Rectangular cell ranges and A1-style addresses.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::source::SheetId;

/// Highest 1-based column index a grid can address (`XFD`).
pub const MAX_COLUMNS: usize = 16_384;

/// Highest 1-based row index a grid can address.
pub const MAX_ROWS: usize = 1_048_576;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("rows {first}..{last} are inverted")]
    InvertedRows { first: usize, last: usize },
    #[error("columns {first}..{last} are inverted")]
    InvertedColumns { first: usize, last: usize },
    #[error("column index {0} is outside 1..=16384")]
    ColumnOutOfRange(usize),
}

/// Inclusive, 0-based bounds of a rectangular block of cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridRange {
    pub row_first: usize,
    pub row_last: usize,
    pub col_first: usize,
    pub col_last: usize,
}

impl GridRange {
    pub fn new(row_first: usize, row_last: usize, col_first: usize, col_last: usize) -> Result<Self, RangeError> {
        if row_first > row_last {
            return Err(RangeError::InvertedRows { first: row_first, last: row_last });
        }
        if col_first > col_last {
            return Err(RangeError::InvertedColumns { first: col_first, last: col_last });
        }
        Ok(Self { row_first, row_last, col_first, col_last })
    }

    /// A single-cell range.
    pub fn cell(row: usize, col: usize) -> Self {
        Self { row_first: row, row_last: row, col_first: col, col_last: col }
    }

    pub fn rows(&self) -> usize {
        1 + self.row_last - self.row_first
    }

    pub fn cols(&self) -> usize {
        1 + self.col_last - self.col_first
    }

    pub fn is_single_cell(&self) -> bool {
        self.row_first == self.row_last && self.col_first == self.col_last
    }

    /// The first row of the range on its own.
    pub fn first_row(&self) -> GridRange {
        GridRange { row_last: self.row_first, ..*self }
    }

    /// The range with its first row removed, if anything remains.
    pub fn without_first_row(&self) -> Option<GridRange> {
        (self.row_last > self.row_first).then(|| GridRange { row_first: self.row_first + 1, ..*self })
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        (self.row_first..=self.row_last).contains(&row) && (self.col_first..=self.col_last).contains(&col)
    }

    /// Absolute A1 address, optionally qualified with a sheet name:
    /// `Sheet1!$A$1` or `'My Sheet'!$A$1:$B$3`.
    pub fn address(&self, sheet: Option<&str>) -> String {
        let mut out = String::new();
        if let Some(sheet) = sheet {
            out.push_str(&quote_sheet_name(sheet));
            out.push('!');
        }
        push_absolute_cell(&mut out, self.row_first, self.col_first);
        if !self.is_single_cell() {
            out.push(':');
            push_absolute_cell(&mut out, self.row_last, self.col_last);
        }
        out
    }
}

impl fmt::Display for GridRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address(None))
    }
}

/// A range on a specific sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridRef {
    pub sheet: SheetId,
    pub range: GridRange,
}

impl GridRef {
    pub fn new(sheet: SheetId, range: GridRange) -> Self {
        Self { sheet, range }
    }
}

/// Convert a 1-based column index to letters: 1=A, 26=Z, 27=AA, 16384=XFD.
pub fn column_letters(index: usize) -> Result<String, RangeError> {
    if !(1..=MAX_COLUMNS).contains(&index) {
        return Err(RangeError::ColumnOutOfRange(index));
    }

    // MAX_COLUMNS fits in three letters
    let mut letters = [0u8; 3];
    let mut pos = letters.len();
    let mut n = index;
    while n > 0 {
        let rem = (n - 1) % 26;
        pos -= 1;
        letters[pos] = b'A' + rem as u8;
        n = (n - rem) / 26;
    }

    Ok(String::from_utf8_lossy(&letters[pos..]).into_owned())
}

fn push_absolute_cell(out: &mut String, row: usize, col: usize) {
    out.push('$');
    match column_letters(col + 1) {
        Ok(letters) => out.push_str(&letters),
        // Past XFD: fall back to R1C1-ish column numbering
        Err(_) => out.push_str(&format!("C{}", col + 1)),
    }
    out.push('$');
    out.push_str(&(row + 1).to_string());
}

/// Quote a sheet name for use in an address when it is not a plain identifier.
fn quote_sheet_name(name: &str) -> Cow<'_, str> {
    let plain = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.');
    if plain {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("'{}'", name.replace('\'', "''")))
    }
}
