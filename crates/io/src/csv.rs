// CSV/TSV import into grid sheets, and delimited output of result rows

use std::io::{Read, Write};
use std::path::Path;

use gridsql_core::{CellValue, GridRange, MemoryGrid, SheetId, SourceError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CsvError {
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Grid(#[from] SourceError),
}

/// Where an import landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetImport {
    pub sheet: SheetId,
    /// Range covering the imported rows, anchored at A1. `None` for an empty file.
    pub range: Option<GridRange>,
}

/// Import a delimited file as a new sheet, guessing the delimiter.
pub fn import(grid: &MemoryGrid, sheet_name: &str, path: &Path) -> Result<SheetImport, CsvError> {
    let content = read_file_as_utf8(path)?;
    let delimiter = sniff_delimiter(&content);
    import_from_string(grid, sheet_name, &content, delimiter)
}

pub fn import_with_delimiter(
    grid: &MemoryGrid,
    sheet_name: &str,
    path: &Path,
    delimiter: u8,
) -> Result<SheetImport, CsvError> {
    let content = read_file_as_utf8(path)?;
    import_from_string(grid, sheet_name, &content, delimiter)
}

/// Detect the most likely field delimiter by checking consistency across the first few lines.
///
/// For each candidate (tab, semicolon, comma, pipe), count fields per line. The delimiter
/// that produces the most consistent field count (>1 field) wins.
pub fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b'\t', b';', b',', b'|'];
    let sample_lines: Vec<&str> = content.lines().take(10).collect();

    let mut best = b',';
    let mut best_score = 0u64;

    for &delim in candidates {
        let counts: Vec<usize> = sample_lines.iter().map(|line| field_count(line, delim)).collect();

        // Must split the first line to be viable
        let Some(&target) = counts.first().filter(|&&c| c > 1) else {
            continue;
        };

        // More columns breaks ties
        let consistent = counts.iter().filter(|&&c| c == target).count() as u64;
        let score = consistent * target as u64;
        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}

fn field_count(line: &str, delimiter: u8) -> usize {
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes())
        .records()
        .next()
        .and_then(|r| r.ok())
        .map_or(1, |r| r.len())
}

/// Read file and convert to UTF-8 if needed (Windows-1252 fallback for Excel exports)
pub fn read_file_as_utf8(path: &Path) -> Result<String, CsvError> {
    let io_err = |source| CsvError::Io { path: path.display().to_string(), source };
    let mut bytes = Vec::new();
    std::fs::File::open(path)
        .and_then(|mut f| f.read_to_end(&mut bytes))
        .map_err(io_err)?;

    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            log::debug!("{} is not UTF-8, decoding as Windows-1252", path.display());
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(e.as_bytes());
            Ok(decoded.into_owned())
        }
    }
}

/// Load delimited text into a new sheet named `sheet_name`. Fields are typed
/// the way a cell would type them (numbers, booleans, error literals).
pub fn import_from_string(
    grid: &MemoryGrid,
    sheet_name: &str,
    content: &str,
    delimiter: u8,
) -> Result<SheetImport, CsvError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let sheet = grid.add_sheet(sheet_name);
    let mut rows = 0usize;
    let mut max_cols = 0usize;

    for (row_idx, result) in reader.records().enumerate() {
        let record = result?;
        for (col_idx, field) in record.iter().enumerate() {
            let value = CellValue::from_input(field);
            if !value.is_blank() {
                grid.set(sheet, row_idx, col_idx, value)?;
            }
        }
        rows = row_idx + 1;
        max_cols = max_cols.max(record.len());
    }

    let range = (rows > 0 && max_cols > 0).then(|| GridRange {
        row_first: 0,
        row_last: rows - 1,
        col_first: 0,
        col_last: max_cols - 1,
    });
    log::debug!("imported {rows} rows into sheet {sheet_name}");
    Ok(SheetImport { sheet, range })
}

/// Write rows of already-rendered fields as delimited text.
pub fn write_rows<W, I, R>(out: W, rows: I, delimiter: u8) -> Result<(), CsvError>
where
    W: Write,
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = String>,
{
    // Rows may differ in width (a headings row over an empty result, for one)
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_writer(out);
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush().map_err(|source| CsvError::Io { path: "<output>".into(), source })?;
    Ok(())
}
