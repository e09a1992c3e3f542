//! One owned SQLite connection with its cached queries and grid tables.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use gridsql_config::Settings;
use gridsql_core::{CellError, GridSource};
use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags, Statement};

use crate::binding::{SnapshotCommand, TableDeclaration};
use crate::error::{Error, Invalid, Object, Result};
use crate::module;
use crate::names::{self, StatementRef};
use crate::params::{self, ParamSlots, ParamSpec};

/// Where a session's database lives.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DataSource {
    #[default]
    Memory,
    /// An existing database file; the path must be absolute.
    File { path: PathBuf, read_only: bool },
}

/// Result of [`Session::execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteOutcome {
    /// A mutating statement ran and changed this many rows.
    Changed(usize),
    /// The statement ran; it does not report affected rows.
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryInfo {
    pub name: String,
    pub text: String,
}

#[derive(Debug, Clone)]
struct CachedQuery {
    text: String,
    slots: ParamSlots,
}

const MUTATING_KEYWORDS: [&str; 4] = ["DELETE", "INSERT", "REPLACE", "UPDATE"];

pub struct Session {
    conn: Option<Connection>,
    grid: Arc<dyn GridSource>,
    queries: HashMap<String, CachedQuery>,
}

impl Session {
    pub fn open(source: &DataSource, grid: Arc<dyn GridSource>, settings: &Settings) -> Result<Self> {
        let conn = match source {
            DataSource::Memory => Connection::open_in_memory()?,
            DataSource::File { path, read_only } => {
                if !path.is_absolute() || !path.is_file() {
                    return Err(Invalid::DbFile(path.display().to_string()).into());
                }
                let mode = if *read_only { OpenFlags::SQLITE_OPEN_READ_ONLY } else { OpenFlags::SQLITE_OPEN_READ_WRITE };
                let flags = mode | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
                Connection::open_with_flags(path, flags)
                    .map_err(|e| Invalid::DbFile(format!("{}: {e}", path.display())))?
            }
        };
        conn.set_prepared_statement_cache_capacity(settings.sqlite.statement_cache_capacity);
        module::register(&conn, Arc::clone(&grid))?;
        log::debug!("session opened on {source:?}");

        Ok(Self { conn: Some(conn), grid, queries: HashMap::new() })
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    /// The underlying connection, for callers that need plain rusqlite access.
    pub fn connection(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or_else(|| Error::Internal("session is closed".into()))
    }

    pub fn create_table(&mut self, name: &str, declaration: &TableDeclaration, overwrite: bool) -> Result<()> {
        let name = names::table_name(name)?;
        declaration.validate()?;
        let conn = self.connection()?;

        if overwrite {
            conn.execute_batch(&format!("DROP TABLE IF EXISTS temp.\"{name}\""))?;
        } else if temp_object_exists(conn, &name)? {
            return Err(Error::already_exists(Object::Table, name));
        }
        conn.execute_batch(&declaration.to_sql(&name))?;
        log::debug!("created table {name} over {:?}", declaration.target);
        Ok(())
    }

    /// True iff `name` is a grid-backed table on this session.
    pub fn exists_table(&self, name: &str) -> Result<bool> {
        let name = names::table_name(name)?;
        let conn = self.connection()?;
        let mut stmt = conn.prepare_cached(
            "SELECT count(*) FROM temp.sqlite_master \
             WHERE type = 'table' AND lower(name) = ?1 AND sql LIKE '%USING%GRIDREF%'",
        )?;
        let count: i64 = stmt.query_row([&name], |row| row.get(0))?;
        Ok(count > 0)
    }

    pub fn update_table(&mut self, name: &str, command: SnapshotCommand) -> Result<()> {
        let name = names::table_name(name)?;
        if !self.exists_table(&name)? {
            return Err(Invalid::UnknownTable(name).into());
        }
        self.connection()?
            .execute(&format!("INSERT INTO temp.\"{name}\" (rowid) VALUES (?1)"), [command.code()])?;
        Ok(())
    }

    /// Grid-backed tables ordered by name, with the address each was declared over.
    pub fn list_tables(&self, name_filter: Option<&str>) -> Result<Vec<TableInfo>> {
        let filter = names::name_filter(name_filter)?;
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT name, sql FROM temp.sqlite_master \
             WHERE type = 'table' AND sql LIKE '%USING%GRIDREF%' ORDER BY name",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        let mut tables = Vec::new();
        for row in rows {
            let (name, sql) = row?;
            if !filter.is_match(&name) {
                continue;
            }
            let address = TableDeclaration::parse_sql(&sql)
                .and_then(|d| {
                    let sheet = self.grid.sheet_name(d.target.sheet)?;
                    Some(d.target.range.address(Some(&sheet)))
                })
                .unwrap_or_else(|| CellError::Ref.to_string());
            tables.push(TableInfo { name, address });
        }
        Ok(tables)
    }

    pub fn create_query(&mut self, name: &str, text: &str, spec: ParamSpec, overwrite: bool) -> Result<()> {
        let name = names::query_name(name)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(Invalid::QueryText.into());
        }
        let slots = ParamSlots::from_spec(spec)?;

        if self.queries.contains_key(&name) {
            if !overwrite {
                return Err(Error::already_exists(Object::Query, name));
            }
            self.connection()?.flush_prepared_statement_cache();
        }
        log::debug!("cached query {name} ({} slots)", slots.len());
        self.queries.insert(name, CachedQuery { text: text.to_string(), slots });
        Ok(())
    }

    pub fn delete_query(&mut self, name: &str) -> Result<()> {
        let name = names::query_name(name)?;
        if self.queries.remove(&name).is_none() {
            return Err(Error::not_found(Object::Query, name));
        }
        self.connection()?.flush_prepared_statement_cache();
        Ok(())
    }

    pub fn list_queries(&self, name_filter: Option<&str>, text_filter: Option<&str>) -> Result<Vec<QueryInfo>> {
        let by_name = names::name_filter(name_filter)?;
        let by_text = names::name_filter(text_filter)?;
        let mut queries: Vec<QueryInfo> = self
            .queries
            .iter()
            .filter(|(name, q)| by_name.is_match(name) && by_text.is_match(&q.text))
            .map(|(name, q)| QueryInfo { name: name.clone(), text: q.text.clone() })
            .collect();
        queries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(queries)
    }

    /// Run a statement to completion.
    ///
    /// `text_or_name` is either a `$name` of a cached query or SQL text.
    pub fn execute(&self, text_or_name: &str, values: &[Value], names: Option<&[String]>) -> Result<ExecuteOutcome> {
        self.with_statement(text_or_name, values, names, |conn, stmt, text| {
            let mut rows = stmt.raw_query();
            while rows.next()?.is_some() {}
            drop(rows);

            if is_mutating(text) {
                Ok(ExecuteOutcome::Changed(usize::try_from(conn.changes()).unwrap_or(usize::MAX)))
            } else {
                Ok(ExecuteOutcome::Completed)
            }
        })
    }

    /// Run a statement and collect every row, optionally preceded by a row of
    /// column names.
    pub fn query(
        &self,
        text_or_name: &str,
        values: &[Value],
        names: Option<&[String]>,
        headings: bool,
    ) -> Result<Vec<Vec<Value>>> {
        self.with_statement(text_or_name, values, names, |_, stmt, _| {
            let width = stmt.column_count();
            let mut out: Vec<Vec<Value>> = Vec::new();
            if headings {
                out.push(stmt.column_names().into_iter().map(|n| Value::Text(n.to_string())).collect());
            }
            let mut rows = stmt.raw_query();
            while let Some(row) = rows.next()? {
                out.push((0..width).map(|i| row.get::<_, Value>(i)).collect::<rusqlite::Result<Vec<_>>>()?);
            }
            Ok(out)
        })
    }

    /// Resolve, prepare and bind a statement, then hand it to `run`.
    fn with_statement<T>(
        &self,
        text_or_name: &str,
        values: &[Value],
        names: Option<&[String]>,
        run: impl FnOnce(&Connection, &mut Statement<'_>, &str) -> Result<T>,
    ) -> Result<T> {
        let conn = self.connection()?;
        match names::statement_ref(text_or_name)? {
            StatementRef::Cached(name) => {
                let query = self.queries.get(&name).ok_or_else(|| Error::not_found(Object::Query, name.clone()))?;
                let mut stmt = conn.prepare_cached(&query.text)?;
                params::bind_cached(&mut stmt, &query.slots, values, names)?;
                run(conn, &mut *stmt, &query.text)
            }
            StatementRef::AdHoc(text) => {
                let mut stmt = conn.prepare(text)?;
                params::bind_ad_hoc(&mut stmt, values, names)?;
                run(conn, &mut stmt, text)
            }
        }
    }

    /// Release every cached statement, then the connection. Safe to call
    /// more than once.
    pub fn dispose(&mut self) {
        self.queries.clear();
        if let Some(conn) = self.conn.take() {
            conn.flush_prepared_statement_cache();
            match conn.close() {
                Ok(()) => log::debug!("session closed"),
                Err((_conn, e)) => log::warn!("closing session failed: {e}"),
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn temp_object_exists(conn: &Connection, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT count(*) FROM temp.sqlite_master WHERE lower(name) = ?1",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn is_mutating(text: &str) -> bool {
    let upper = text.to_uppercase();
    MUTATING_KEYWORDS.iter().any(|k| upper.contains(k))
}
