//! The external grid a table binds to.

use std::fmt;
use std::ops::Index;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cell::CellValue;
use crate::range::GridRange;

/// Stable identity of a sheet inside a grid source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SheetId(pub u64);

impl SheetId {
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SheetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("sheet {0} does not exist")]
    UnknownSheet(SheetId),
    #[error("range {range} is outside sheet {sheet}")]
    OutOfBounds { sheet: SheetId, range: GridRange },
    #[error("grid source unavailable: {0}")]
    Unavailable(String),
}

/// A rectangular, row-major block of cell values.
///
/// Cloning a block is cheap: all clones share the same rows, and the rows are
/// never mutated once the block exists.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    rows: Arc<[Vec<CellValue>]>,
    width: usize,
}

impl Block {
    /// Build a block from rows. Short rows are padded with blanks so that every
    /// row has the width of the widest one.
    pub fn from_rows(mut rows: Vec<Vec<CellValue>>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        for row in &mut rows {
            row.resize(width, CellValue::Blank);
        }
        Self { rows: rows.into(), width }
    }

    /// A 1x1 block.
    pub fn single(value: CellValue) -> Self {
        Self::from_rows(vec![vec![value]])
    }

    pub fn empty() -> Self {
        Self::from_rows(Vec::new())
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, row: usize) -> Option<&[CellValue]> {
        self.rows.get(row).map(Vec::as_slice)
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&CellValue> {
        self.rows.get(row).and_then(|r| r.get(col))
    }

    pub fn rows(&self) -> impl Iterator<Item = &[CellValue]> {
        self.rows.iter().map(Vec::as_slice)
    }

    /// True when both blocks share the same storage.
    pub fn shares_storage(&self, other: &Block) -> bool {
        Arc::ptr_eq(&self.rows, &other.rows)
    }
}

impl Index<(usize, usize)> for Block {
    type Output = CellValue;

    fn index(&self, (row, col): (usize, usize)) -> &CellValue {
        &self.rows[row][col]
    }
}

/// A live grid owned by the host.
///
/// Reads observe whatever the grid holds at call time; nothing here promises
/// that two reads of the same range agree.
pub trait GridSource: Send + Sync {
    /// Read the current contents of `range` on `sheet`. The block has exactly
    /// `range.rows()` rows of `range.cols()` values.
    fn read(&self, sheet: SheetId, range: GridRange) -> Result<Block, SourceError>;

    /// Display name of a sheet, or `None` if the sheet no longer exists.
    fn sheet_name(&self, sheet: SheetId) -> Option<String>;
}
