use gridsql_core::{Block, CellValue};

use crate::error::{Error, Result};

/// Row-by-row position over one fetched block.
///
/// The block is fixed for as long as the cursor holds it: a binding that is
/// frozen, refreshed or unfrozen mid-scan does not change what the cursor
/// returns until it is rebound.
#[derive(Debug, Clone)]
pub struct TableCursor {
    block: Block,
    row_id: i64,
    closed: bool,
}

impl TableCursor {
    /// A cursor positioned before the first row.
    pub fn new(block: Block) -> Self {
        Self { block, row_id: -1, closed: false }
    }

    /// Swap in a new block and move before its first row.
    pub fn rebind(&mut self, block: Block) {
        self.block = block;
        self.closed = false;
        self.reset();
    }

    pub fn reset(&mut self) {
        self.row_id = -1;
    }

    pub fn len(&self) -> usize {
        self.block.height()
    }

    pub fn is_empty(&self) -> bool {
        self.block.is_empty()
    }

    pub fn eof(&self) -> bool {
        self.closed || self.row_id >= self.len() as i64
    }

    pub fn next(&mut self) -> Result<()> {
        if self.eof() {
            return Err(past_end());
        }
        self.row_id += 1;
        Ok(())
    }

    pub fn row_id(&self) -> Result<i64> {
        if self.eof() || self.row_id < 0 {
            return Err(past_end());
        }
        Ok(self.row_id)
    }

    /// Value of column `idx` in the current row.
    pub fn current(&self, idx: usize) -> Result<&CellValue> {
        let row = usize::try_from(self.row_id()?).map_err(|_| past_end())?;
        self.block
            .get(row, idx)
            .ok_or_else(|| Error::Internal(format!("column {idx} is outside a {}-column table", self.block.width())))
    }

    /// Release the block. A closed cursor reports end of data.
    pub fn close(&mut self) {
        self.closed = true;
        self.block = Block::empty();
    }
}

fn past_end() -> Error {
    Error::Internal("cursor is not on a row".into())
}
