//! One-shot queries over grid ranges.

use std::sync::Arc;

use gridsql_config::Settings;
use gridsql_core::{GridRef, GridSource};
use rusqlite::types::Value;

use crate::binding::TableDeclaration;
use crate::error::{Invalid, Result};
use crate::session::{DataSource, Session};

/// Ranges exposed to a one-shot query, as tables `t1`..`t9`.
pub const MAX_RANGE_TABLES: usize = 9;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeQueryOptions {
    /// Each range's first row names its columns.
    pub headers: bool,
    /// Prepend a row of column names to the result.
    pub headings: bool,
}

/// Run `sql` over `ranges` on a private in-memory session.
///
/// The range at position `i` is visible as table `t{i+1}`, frozen at the
/// moment it is declared; `None` entries leave their table undeclared.
pub fn query_ranges(
    grid: Arc<dyn GridSource>,
    settings: &Settings,
    sql: &str,
    values: &[Value],
    names: Option<&[String]>,
    ranges: &[Option<GridRef>],
    options: RangeQueryOptions,
) -> Result<Vec<Vec<Value>>> {
    if ranges.len() > MAX_RANGE_TABLES {
        return Err(Invalid::Data(format!("at most {MAX_RANGE_TABLES} ranges, got {}", ranges.len())).into());
    }

    let mut session = Session::open(&DataSource::Memory, grid, settings)?;
    for (i, target) in ranges.iter().enumerate() {
        if let Some(target) = target {
            let declaration = TableDeclaration::new(*target, options.headers, true);
            session.create_table(&format!("t{}", i + 1), &declaration, false)?;
        }
    }
    let rows = session.query(sql, values, names, options.headings);
    session.dispose();
    rows
}
