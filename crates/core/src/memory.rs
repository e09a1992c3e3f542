//! An in-process grid source.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::cell::CellValue;
use crate::range::{GridRange, MAX_COLUMNS, MAX_ROWS};
use crate::source::{Block, GridSource, SheetId, SourceError};

#[derive(Debug, Default)]
struct Sheet {
    name: String,
    cells: HashMap<(usize, usize), CellValue>,
}

#[derive(Debug, Default)]
struct Sheets {
    next_id: u64,
    by_id: HashMap<SheetId, Sheet>,
}

/// Named sheets of sparse cells behind a lock, so a host can keep editing
/// while tables read from it.
#[derive(Debug, Default)]
pub struct MemoryGrid {
    sheets: RwLock<Sheets>,
}

impl MemoryGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an empty sheet and return its id. Ids are never reused.
    pub fn add_sheet(&self, name: impl Into<String>) -> SheetId {
        let mut sheets = self.sheets.write();
        sheets.next_id += 1;
        let id = SheetId(sheets.next_id);
        sheets.by_id.insert(id, Sheet { name: name.into(), cells: HashMap::new() });
        id
    }

    /// Find a sheet by name (case-insensitive).
    pub fn sheet_id(&self, name: &str) -> Option<SheetId> {
        let sheets = self.sheets.read();
        let mut ids: Vec<_> = sheets
            .by_id
            .iter()
            .filter(|(_, sheet)| sheet.name.eq_ignore_ascii_case(name))
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids.first().copied()
    }

    pub fn remove_sheet(&self, sheet: SheetId) -> bool {
        self.sheets.write().by_id.remove(&sheet).is_some()
    }

    pub fn set(&self, sheet: SheetId, row: usize, col: usize, value: CellValue) -> Result<(), SourceError> {
        if row >= MAX_ROWS || col >= MAX_COLUMNS {
            return Err(SourceError::OutOfBounds { sheet, range: GridRange::cell(row, col) });
        }
        let mut sheets = self.sheets.write();
        let target = sheets.by_id.get_mut(&sheet).ok_or(SourceError::UnknownSheet(sheet))?;
        if value.is_blank() {
            target.cells.remove(&(row, col));
        } else {
            target.cells.insert((row, col), value);
        }
        Ok(())
    }

    /// Set a cell from typed text, see [`CellValue::from_input`].
    pub fn set_input(&self, sheet: SheetId, row: usize, col: usize, input: &str) -> Result<(), SourceError> {
        self.set(sheet, row, col, CellValue::from_input(input))
    }

    pub fn get(&self, sheet: SheetId, row: usize, col: usize) -> CellValue {
        self.sheets
            .read()
            .by_id
            .get(&sheet)
            .and_then(|s| s.cells.get(&(row, col)).cloned())
            .unwrap_or_default()
    }

    /// Write a block of rows with its top-left corner at `(origin_row, origin_col)`.
    pub fn load_rows<I, R>(&self, sheet: SheetId, origin_row: usize, origin_col: usize, rows: I) -> Result<(), SourceError>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = CellValue>,
    {
        for (r, row) in rows.into_iter().enumerate() {
            for (c, value) in row.into_iter().enumerate() {
                self.set(sheet, origin_row + r, origin_col + c, value)?;
            }
        }
        Ok(())
    }

    /// Smallest range covering every non-blank cell, anchored at A1.
    pub fn used_range(&self, sheet: SheetId) -> Option<GridRange> {
        let sheets = self.sheets.read();
        let cells = &sheets.by_id.get(&sheet)?.cells;
        let row_last = cells.keys().map(|(r, _)| *r).max()?;
        let col_last = cells.keys().map(|(_, c)| *c).max()?;
        Some(GridRange { row_first: 0, row_last, col_first: 0, col_last })
    }
}

impl GridSource for MemoryGrid {
    fn read(&self, sheet: SheetId, range: GridRange) -> Result<Block, SourceError> {
        if range.row_last >= MAX_ROWS || range.col_last >= MAX_COLUMNS {
            return Err(SourceError::OutOfBounds { sheet, range });
        }
        let sheets = self.sheets.read();
        let target = sheets.by_id.get(&sheet).ok_or(SourceError::UnknownSheet(sheet))?;
        let rows = (range.row_first..=range.row_last)
            .map(|row| {
                (range.col_first..=range.col_last)
                    .map(|col| target.cells.get(&(row, col)).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();
        Ok(Block::from_rows(rows))
    }

    fn sheet_name(&self, sheet: SheetId) -> Option<String> {
        self.sheets.read().by_id.get(&sheet).map(|s| s.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_fills_blanks() {
        let grid = MemoryGrid::new();
        let sheet = grid.add_sheet("Sheet1");
        grid.set_input(sheet, 0, 0, "A").unwrap();
        grid.set_input(sheet, 1, 1, "2").unwrap();

        let block = grid.read(sheet, GridRange::new(0, 2, 0, 1).unwrap()).unwrap();
        assert_eq!(block.height(), 3);
        assert_eq!(block.width(), 2);
        assert_eq!(block[(0, 0)], CellValue::from("A"));
        assert_eq!(block[(0, 1)], CellValue::Blank);
        assert_eq!(block[(1, 1)], CellValue::Number(2.0));
        assert_eq!(block[(2, 0)], CellValue::Blank);
    }

    #[test]
    fn test_reads_observe_later_writes() {
        let grid = MemoryGrid::new();
        let sheet = grid.add_sheet("Data");
        let range = GridRange::cell(0, 0);
        grid.set(sheet, 0, 0, CellValue::Number(1.0)).unwrap();
        let before = grid.read(sheet, range).unwrap();
        grid.set(sheet, 0, 0, CellValue::Number(99.0)).unwrap();
        let after = grid.read(sheet, range).unwrap();

        assert_eq!(before[(0, 0)], CellValue::Number(1.0));
        assert_eq!(after[(0, 0)], CellValue::Number(99.0));
    }

    #[test]
    fn test_unknown_sheet() {
        let grid = MemoryGrid::new();
        let sheet = grid.add_sheet("Gone");
        assert!(grid.remove_sheet(sheet));
        assert_eq!(grid.read(sheet, GridRange::cell(0, 0)), Err(SourceError::UnknownSheet(sheet)));
        assert_eq!(grid.sheet_name(sheet), None);
        assert!(matches!(grid.set(sheet, 0, 0, CellValue::Blank), Err(SourceError::UnknownSheet(_))));
    }

    #[test]
    fn test_sheet_lookup_and_used_range() {
        let grid = MemoryGrid::new();
        let first = grid.add_sheet("Sales");
        let second = grid.add_sheet("Costs");
        assert_ne!(first, second);
        assert_eq!(grid.sheet_id("sales"), Some(first));
        assert_eq!(grid.sheet_id("missing"), None);

        assert_eq!(grid.used_range(second), None);
        grid.load_rows(
            second,
            1,
            2,
            vec![
                vec![CellValue::from("x"), CellValue::from("y")],
                vec![CellValue::Number(1.0), CellValue::Number(2.0)],
            ],
        )
        .unwrap();
        assert_eq!(grid.used_range(second), Some(GridRange::new(0, 2, 0, 3).unwrap()));
        assert_eq!(grid.get(second, 2, 3), CellValue::Number(2.0));
    }

    #[test]
    fn test_blank_clears_cell() {
        let grid = MemoryGrid::new();
        let sheet = grid.add_sheet("S");
        grid.set_input(sheet, 4, 4, "x").unwrap();
        grid.set(sheet, 4, 4, CellValue::Blank).unwrap();
        assert_eq!(grid.used_range(sheet), None);
    }
}
