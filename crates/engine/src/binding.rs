//! Grid bindings: a bound region of the host grid plus its freeze state.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use gridsql_core::{column_letters, Block, CellValue, GridRange, GridRef, GridSource, SheetId, MAX_COLUMNS, MAX_ROWS};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Invalid, Result};
use crate::module::MODULE_NAME;

static DECLARATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)USING\s+GRIDREF\s*\(\s*(\d+)\s*,\s*(\d+)\s*,\s*(\d+)\s*,\s*(\d+)\s*,\s*(\d+)\s*,\s*(\w+)\s*,\s*(\w+)\s*\)")
        .expect("valid declaration pattern")
});

/// Arguments of a `GRIDREF` table declaration, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDeclaration {
    /// The declared region, header row included.
    pub target: GridRef,
    pub headers: bool,
    pub freeze: bool,
}

impl TableDeclaration {
    pub fn new(target: GridRef, headers: bool, freeze: bool) -> Self {
        Self { target, headers, freeze }
    }

    pub fn validate(&self) -> Result<()> {
        let r = self.target.range;
        if r.row_first > r.row_last || r.col_first > r.col_last {
            return Err(Invalid::Data(format!("inverted bounds {r:?}")).into());
        }
        if r.row_last >= MAX_ROWS {
            return Err(Invalid::Data(format!("row {} is past the last grid row", r.row_last + 1)).into());
        }
        if r.col_last >= MAX_COLUMNS {
            return Err(Invalid::Data(format!("column {} is past the last grid column", r.col_last + 1)).into());
        }
        if self.headers && r.row_last == r.row_first {
            return Err(Invalid::Data("a range with headers needs at least one data row".into()).into());
        }
        Ok(())
    }

    /// `CREATE VIRTUAL TABLE` statement declaring `table` in the temp schema.
    /// `table` must already be a validated table name.
    pub fn to_sql(&self, table: &str) -> String {
        let r = self.target.range;
        format!(
            "CREATE VIRTUAL TABLE temp.\"{table}\" USING {MODULE_NAME}({},{},{},{},{},{},{})",
            r.row_first, r.row_last, r.col_first, r.col_last, self.target.sheet, self.headers, self.freeze
        )
    }

    /// Parse the seven module arguments SQLite hands to the module.
    pub fn from_module_args(args: &[&str]) -> Result<Self> {
        let [row_first, row_last, col_first, col_last, sheet, headers, freeze] = args else {
            return Err(Invalid::Data(format!("expected 7 module arguments, got {}", args.len())).into());
        };
        let range = GridRange::new(
            parse_index(row_first)?,
            parse_index(row_last)?,
            parse_index(col_first)?,
            parse_index(col_last)?,
        )?;
        let sheet = sheet
            .trim()
            .parse::<u64>()
            .map(SheetId::from_raw)
            .map_err(|_| Invalid::Data(format!("bad sheet id {sheet:?}")))?;
        let decl = Self::new(GridRef::new(sheet, range), parse_flag(headers)?, parse_flag(freeze)?);
        decl.validate()?;
        Ok(decl)
    }

    /// Recover the declaration from the SQL stored in the schema table.
    pub fn parse_sql(sql: &str) -> Option<Self> {
        let caps = DECLARATION.captures(sql)?;
        let args: Vec<&str> = (1..=7).filter_map(|i| caps.get(i).map(|m| m.as_str())).collect();
        Self::from_module_args(&args).ok()
    }
}

fn parse_index(arg: &str) -> Result<usize> {
    arg.trim()
        .parse::<usize>()
        .map_err(|_| Invalid::Data(format!("bad bound {arg:?}")).into())
}

fn parse_flag(arg: &str) -> Result<bool> {
    match arg.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(Invalid::Data(format!("bad flag {arg:?}")).into()),
    }
}

/// Commands carried by the snapshot-control write channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotCommand {
    Freeze = -1,
    Unfreeze = -2,
    Refresh = -3,
}

impl SnapshotCommand {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            -1 => Some(Self::Freeze),
            -2 => Some(Self::Unfreeze),
            -3 => Some(Self::Refresh),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        self as i64
    }
}

impl fmt::Display for SnapshotCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Freeze => "freeze",
            Self::Unfreeze => "unfreeze",
            Self::Refresh => "refresh",
        })
    }
}

/// A bound grid region.
///
/// Live bindings read the source on every [`fetch`](Self::fetch). Frozen
/// bindings hold a snapshot taken at a single instant and never touch the
/// source until unfrozen or refreshed.
pub struct GridBinding {
    source: Arc<dyn GridSource>,
    declaration: TableDeclaration,
    /// Region the rows come from; excludes the header row.
    data: GridRef,
    header: Option<Vec<CellValue>>,
    snapshot: Option<Block>,
}

impl GridBinding {
    pub fn new(source: Arc<dyn GridSource>, declaration: TableDeclaration) -> Result<Self> {
        declaration.validate()?;
        let target = declaration.target;

        let (header, data) = if declaration.headers {
            let block = source.read(target.sheet, target.range.first_row())?;
            let header = block.row(0).map(<[CellValue]>::to_vec).unwrap_or_default();
            let rows = target
                .range
                .without_first_row()
                .ok_or_else(|| Invalid::Data("a range with headers needs at least one data row".into()))?;
            (Some(header), GridRef::new(target.sheet, rows))
        } else {
            (None, target)
        };

        let mut binding = Self { source, declaration, data, header, snapshot: None };
        if declaration.freeze {
            binding.snapshot = Some(binding.read_live()?);
        }
        Ok(binding)
    }

    pub fn declaration(&self) -> &TableDeclaration {
        &self.declaration
    }

    pub fn data_range(&self) -> GridRef {
        self.data
    }

    pub fn is_frozen(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Current rows: the snapshot when frozen, a fresh read otherwise.
    pub fn fetch(&self) -> Result<Block> {
        match &self.snapshot {
            Some(snapshot) => Ok(snapshot.clone()),
            None => self.read_live(),
        }
    }

    pub fn apply_command(&mut self, command: SnapshotCommand) -> Result<()> {
        match (command, self.is_frozen()) {
            (SnapshotCommand::Freeze, false) | (SnapshotCommand::Refresh, true) => {
                self.snapshot = Some(self.read_live()?);
            }
            (SnapshotCommand::Unfreeze, true) => self.snapshot = None,
            (SnapshotCommand::Freeze, true) | (SnapshotCommand::Unfreeze, false) | (SnapshotCommand::Refresh, false) => {}
        }
        log::debug!("{command} on {}: frozen={}", self.data.range, self.is_frozen());
        Ok(())
    }

    pub fn column_count(&self) -> usize {
        self.header.as_ref().map_or(self.data.range.cols(), Vec::len)
    }

    pub fn column_names(&self) -> Result<Vec<String>> {
        derive_column_names(self.header.as_deref(), self.data.range.col_first, self.column_count())
    }

    fn read_live(&self) -> Result<Block> {
        let block = self.source.read(self.data.sheet, self.data.range)?;
        if block.height() != self.data.range.rows() || block.width() != self.column_count() {
            return Err(Error::Internal(format!(
                "grid source returned {}x{} for {}",
                block.height(),
                block.width(),
                self.data.range
            )));
        }
        Ok(block)
    }
}

impl fmt::Debug for GridBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GridBinding")
            .field("declaration", &self.declaration)
            .field("data", &self.data)
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

/// Column names for a table whose first column is the 0-based grid column
/// `col_first`.
///
/// A header cell with text names its column; anything else gets the column
/// letters. SQLite compares column names case-insensitively, so a repeat of
/// an earlier name falls back to the letters and then to a numeric suffix.
pub fn derive_column_names(header: Option<&[CellValue]>, col_first: usize, count: usize) -> Result<Vec<String>> {
    let mut names = Vec::with_capacity(count);
    let mut seen = HashSet::with_capacity(count);

    for i in 0..count {
        let letters = column_letters(col_first + i + 1)?;
        let heading = header.and_then(|h| h.get(i)).and_then(CellValue::heading);

        let mut name = heading.unwrap_or_else(|| letters.clone());
        if seen.contains(&name.to_lowercase()) {
            name = letters;
        }
        let base = name.clone();
        let mut n = 2;
        while seen.contains(&name.to_lowercase()) {
            name = format!("{base}_{n}");
            n += 1;
        }

        seen.insert(name.to_lowercase());
        names.push(name);
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridsql_core::MemoryGrid;

    fn grid_with(rows: Vec<Vec<CellValue>>) -> (Arc<MemoryGrid>, SheetId) {
        let grid = Arc::new(MemoryGrid::new());
        let sheet = grid.add_sheet("Sheet1");
        grid.load_rows(sheet, 0, 0, rows).unwrap();
        (grid, sheet)
    }

    fn sample() -> (Arc<MemoryGrid>, SheetId) {
        grid_with(vec![
            vec!["A".into(), "B".into()],
            vec![1.0.into(), 2.0.into()],
            vec![3.0.into(), 4.0.into()],
        ])
    }

    fn decl(sheet: SheetId, range: GridRange, headers: bool, freeze: bool) -> TableDeclaration {
        TableDeclaration::new(GridRef::new(sheet, range), headers, freeze)
    }

    #[test]
    fn test_declaration_sql_round_trip() {
        let d = decl(SheetId(3), GridRange::new(0, 9, 2, 4).unwrap(), true, false);
        let sql = d.to_sql("orders");
        assert_eq!(sql, "CREATE VIRTUAL TABLE temp.\"orders\" USING GRIDREF(0,9,2,4,3,true,false)");
        assert_eq!(TableDeclaration::parse_sql(&sql), Some(d));
        assert_eq!(TableDeclaration::parse_sql("CREATE TABLE x(a)"), None);
    }

    #[test]
    fn test_module_args() {
        let d = TableDeclaration::from_module_args(&["1", "4", "0", "2", "7", "TRUE", "0"]).unwrap();
        assert_eq!(d.target.range, GridRange::new(1, 4, 0, 2).unwrap());
        assert_eq!(d.target.sheet, SheetId(7));
        assert!(d.headers);
        assert!(!d.freeze);

        assert!(TableDeclaration::from_module_args(&["1", "4", "0", "2", "7", "true"]).is_err());
        assert!(TableDeclaration::from_module_args(&["4", "1", "0", "2", "7", "true", "false"]).is_err());
        assert!(TableDeclaration::from_module_args(&["x", "1", "0", "2", "7", "true", "false"]).is_err());
        assert!(TableDeclaration::from_module_args(&["1", "4", "0", "2", "7", "yes", "false"]).is_err());
        // header row only
        assert!(TableDeclaration::from_module_args(&["1", "1", "0", "2", "7", "true", "false"]).is_err());
    }

    #[test]
    fn test_validate_column_limit() {
        let d = decl(SheetId(1), GridRange::new(0, 1, 0, MAX_COLUMNS).unwrap(), false, false);
        assert!(d.validate().is_err());
        let d = decl(SheetId(1), GridRange::new(0, 1, 0, MAX_COLUMNS - 1).unwrap(), false, false);
        assert!(d.validate().is_ok());
    }

    #[test]
    fn test_snapshot_codes() {
        for cmd in [SnapshotCommand::Freeze, SnapshotCommand::Unfreeze, SnapshotCommand::Refresh] {
            assert_eq!(SnapshotCommand::from_code(cmd.code()), Some(cmd));
        }
        assert_eq!(SnapshotCommand::Freeze.code(), -1);
        assert_eq!(SnapshotCommand::from_code(0), None);
        assert_eq!(SnapshotCommand::from_code(-4), None);
    }

    #[test]
    fn test_headers_consume_first_row() {
        let (grid, sheet) = sample();
        let binding = GridBinding::new(grid, decl(sheet, GridRange::new(0, 2, 0, 1).unwrap(), true, false)).unwrap();
        assert_eq!(binding.column_names().unwrap(), vec!["A", "B"]);
        assert_eq!(binding.data_range().range, GridRange::new(1, 2, 0, 1).unwrap());

        let block = binding.fetch().unwrap();
        assert_eq!(block.height(), 2);
        assert_eq!(block[(0, 0)], CellValue::Number(1.0));
        assert_eq!(block[(1, 1)], CellValue::Number(4.0));
    }

    #[test]
    fn test_without_headers_uses_letters() {
        let (grid, sheet) = sample();
        let binding = GridBinding::new(grid, decl(sheet, GridRange::new(0, 2, 25, 27).unwrap(), false, false)).unwrap();
        assert_eq!(binding.column_names().unwrap(), vec!["Z", "AA", "AB"]);
        assert_eq!(binding.fetch().unwrap().height(), 3);
    }

    #[test]
    fn test_single_cell_is_one_by_one() {
        let (grid, sheet) = sample();
        let binding = GridBinding::new(grid, decl(sheet, GridRange::cell(1, 1), false, false)).unwrap();
        let block = binding.fetch().unwrap();
        assert_eq!((block.height(), block.width()), (1, 1));
        assert_eq!(block[(0, 0)], CellValue::Number(2.0));
    }

    #[test]
    fn test_live_reads_follow_source() {
        let (grid, sheet) = sample();
        let binding = GridBinding::new(grid.clone(), decl(sheet, GridRange::new(0, 2, 0, 1).unwrap(), true, false)).unwrap();
        grid.set(sheet, 1, 0, 99.0.into()).unwrap();
        assert_eq!(binding.fetch().unwrap()[(0, 0)], CellValue::Number(99.0));
    }

    #[test]
    fn test_transition_table() {
        let (grid, sheet) = sample();
        let mut binding =
            GridBinding::new(grid.clone(), decl(sheet, GridRange::new(0, 2, 0, 1).unwrap(), true, false)).unwrap();

        // Live: unfreeze and refresh do nothing
        binding.apply_command(SnapshotCommand::Unfreeze).unwrap();
        binding.apply_command(SnapshotCommand::Refresh).unwrap();
        assert!(!binding.is_frozen());

        binding.apply_command(SnapshotCommand::Freeze).unwrap();
        assert!(binding.is_frozen());
        grid.set(sheet, 1, 0, 100.0.into()).unwrap();
        assert_eq!(binding.fetch().unwrap()[(0, 0)], CellValue::Number(1.0));

        // Frozen: freeze keeps the existing snapshot
        binding.apply_command(SnapshotCommand::Freeze).unwrap();
        assert_eq!(binding.fetch().unwrap()[(0, 0)], CellValue::Number(1.0));

        binding.apply_command(SnapshotCommand::Refresh).unwrap();
        assert!(binding.is_frozen());
        assert_eq!(binding.fetch().unwrap()[(0, 0)], CellValue::Number(100.0));

        grid.set(sheet, 1, 0, 5.0.into()).unwrap();
        binding.apply_command(SnapshotCommand::Unfreeze).unwrap();
        assert!(!binding.is_frozen());
        assert_eq!(binding.fetch().unwrap()[(0, 0)], CellValue::Number(5.0));
    }

    #[test]
    fn test_frozen_fetches_share_snapshot() {
        let (grid, sheet) = sample();
        let binding = GridBinding::new(grid, decl(sheet, GridRange::new(0, 2, 0, 1).unwrap(), false, true)).unwrap();
        assert!(binding.is_frozen());
        assert!(binding.fetch().unwrap().shares_storage(&binding.fetch().unwrap()));
    }

    #[test]
    fn test_missing_sheet_is_invalid_data() {
        let (grid, sheet) = sample();
        grid.remove_sheet(sheet);
        let err = GridBinding::new(grid, decl(sheet, GridRange::new(0, 2, 0, 1).unwrap(), true, false)).unwrap_err();
        assert!(err.to_string().starts_with("#INVALID_DATA{"));
    }

    #[test]
    fn test_derive_column_names() {
        let header = vec![CellValue::from("Name"), CellValue::Blank, CellValue::from("  "), CellValue::Number(2024.0)];
        assert_eq!(derive_column_names(Some(&header), 0, 4).unwrap(), vec!["Name", "B", "C", "D"]);

        // only text names a column, and it is kept as written
        let header = vec![CellValue::Number(2024.0), CellValue::Boolean(true), CellValue::from(" qty ")];
        assert_eq!(derive_column_names(Some(&header), 0, 3).unwrap(), vec!["A", "B", " qty "]);

        // duplicates fall back to letters, then to suffixes
        let header = vec![CellValue::from("x"), CellValue::from("X")];
        assert_eq!(derive_column_names(Some(&header), 0, 2).unwrap(), vec!["x", "B"]);
        let header = vec![CellValue::from("C"), CellValue::from("x"), CellValue::from("X")];
        assert_eq!(derive_column_names(Some(&header), 0, 3).unwrap(), vec!["C", "x", "C_2"]);

        assert_eq!(derive_column_names(None, 16_382, 2).unwrap(), vec!["XFC", "XFD"]);
        assert!(derive_column_names(None, 16_383, 2).is_err());
    }
}
