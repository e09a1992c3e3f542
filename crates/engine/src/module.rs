//! The `GRIDREF` SQLite module.
//!
//! [`TableModule`] and [`CursorModule`] name the capability set of a
//! grid-backed table in engine-neutral terms; the rusqlite `VTab` impls at
//! the bottom of this file only translate arguments and errors.

use std::cell::RefCell;
use std::os::raw::c_int;
use std::rc::Rc;
use std::str;
use std::sync::Arc;

use gridsql_core::{Block, CellValue, GridSource};
use rusqlite::ffi;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::vtab::{
    update_module, Context, CreateVTab, IndexInfo, UpdateVTab, VTab, VTabConnection, VTabCursor, VTabKind, Values,
};
use rusqlite::Connection;

use crate::binding::{GridBinding, SnapshotCommand, TableDeclaration};
use crate::cursor::TableCursor;
use crate::error::{Error, Invalid, Result};
use crate::names;

/// Module identifier used in `CREATE VIRTUAL TABLE ... USING GRIDREF(...)`.
pub const MODULE_NAME: &str = "GRIDREF";

/// Table-level callbacks of a grid-backed table.
pub trait TableModule: Sized {
    type Cursor: CursorModule;

    /// Build a table from its declaration arguments. Returns the
    /// `CREATE TABLE` statement describing its columns.
    fn connect(source: &Arc<dyn GridSource>, table: &str, args: &[&str]) -> Result<(String, Self)>;

    fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    /// Every scan is a full scan, so the engine's default plan stands.
    fn best_index(&self) -> Result<()> {
        Ok(())
    }

    fn open(&mut self) -> Result<Self::Cursor>;

    fn rename(&mut self, new_name: &str) -> Result<()>;

    /// Row-write entry point. `values` is SQLite's xUpdate argument vector.
    fn update(&mut self, values: &[ValueRef<'_>]) -> Result<()>;

    fn begin(&mut self) -> Result<()> {
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        Ok(())
    }

    fn savepoint(&mut self, _level: i32) -> Result<()> {
        Ok(())
    }

    fn release(&mut self, _level: i32) -> Result<()> {
        Ok(())
    }

    fn rollback_to(&mut self, _level: i32) -> Result<()> {
        Ok(())
    }
}

/// Cursor-level callbacks of a grid-backed table.
pub trait CursorModule {
    /// Start (or restart) a scan.
    fn filter(&mut self) -> Result<()>;
    fn next(&mut self) -> Result<()>;
    fn eof(&self) -> bool;
    fn column(&self, idx: usize) -> Result<ValueRef<'_>>;
    fn row_id(&self) -> Result<i64>;
    fn close(&mut self);
}

/// Decode a row write into a snapshot command.
///
/// SQLite hands an `INSERT INTO t (rowid) VALUES (code)` over as
/// `[NULL, code, NULL, ...]`. That is the only shape accepted; anything else
/// is a real insert, update or delete against a read-only table.
pub fn decode_write(values: &[ValueRef<'_>]) -> Result<SnapshotCommand> {
    let read_only = || Error::PermissionDenied("grid table is read-only".into());

    let [old_rowid, code, rest @ ..] = values else {
        return Err(read_only());
    };
    if !matches!(old_rowid, ValueRef::Null) || rest.iter().any(|v| !matches!(v, ValueRef::Null)) {
        return Err(read_only());
    }
    match code {
        ValueRef::Integer(code) => SnapshotCommand::from_code(*code)
            .ok_or_else(|| Error::TypeMismatch(format!("unknown snapshot command {code}"))),
        _ => Err(read_only()),
    }
}

/// Engine-visible form of a cell.
pub fn project(value: &CellValue) -> Result<ValueRef<'_>> {
    match value {
        CellValue::Text(s) => Ok(ValueRef::Text(s.as_bytes())),
        CellValue::Number(n) => Ok(ValueRef::Real(*n)),
        CellValue::Boolean(b) => Ok(ValueRef::Integer(i64::from(*b))),
        CellValue::Blank | CellValue::Error(_) | CellValue::Missing => Ok(ValueRef::Null),
        other => Err(Error::Internal(format!("unmapped cell value {other:?}"))),
    }
}

/// Register the module on `conn`; tables declared on it read from `source`.
pub fn register(conn: &Connection, source: Arc<dyn GridSource>) -> Result<()> {
    conn.create_module(MODULE_NAME, update_module::<GridTable>(), Some(source))?;
    Ok(())
}

fn schema_sql(columns: &[String]) -> String {
    let columns: Vec<String> = columns.iter().map(|c| format!("\"{}\"", c.replace('"', "\"\""))).collect();
    format!("CREATE TABLE x({})", columns.join(", "))
}

#[repr(C)]
pub struct GridTable {
    /// Must be first
    base: ffi::sqlite3_vtab,
    name: String,
    binding: Rc<RefCell<GridBinding>>,
}

impl GridTable {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl TableModule for GridTable {
    type Cursor = GridTableCursor;

    fn connect(source: &Arc<dyn GridSource>, table: &str, args: &[&str]) -> Result<(String, Self)> {
        let declaration = TableDeclaration::from_module_args(args)?;
        let binding = GridBinding::new(Arc::clone(source), declaration)?;
        let schema = schema_sql(&binding.column_names()?);
        log::debug!("connect {table}: {schema}");
        let table = GridTable {
            base: ffi::sqlite3_vtab::default(),
            name: table.to_string(),
            binding: Rc::new(RefCell::new(binding)),
        };
        Ok((schema, table))
    }

    fn disconnect(&self) -> Result<()> {
        log::debug!("drop {}", self.name);
        Ok(())
    }

    /// The cursor holds no rows until its first `filter`.
    fn open(&mut self) -> Result<GridTableCursor> {
        Ok(GridTableCursor {
            base: ffi::sqlite3_vtab_cursor::default(),
            binding: Rc::clone(&self.binding),
            cursor: TableCursor::new(Block::empty()),
        })
    }

    fn rename(&mut self, new_name: &str) -> Result<()> {
        self.name = names::table_name(new_name).map_err(|e| Error::Internal(format!("rename failed: {e}")))?;
        Ok(())
    }

    fn update(&mut self, values: &[ValueRef<'_>]) -> Result<()> {
        let command = decode_write(values)?;
        self.binding.borrow_mut().apply_command(command)
    }
}

#[repr(C)]
pub struct GridTableCursor {
    /// Must be first
    base: ffi::sqlite3_vtab_cursor,
    binding: Rc<RefCell<GridBinding>>,
    cursor: TableCursor,
}

impl CursorModule for GridTableCursor {
    fn filter(&mut self) -> Result<()> {
        let block = self.binding.borrow().fetch()?;
        self.cursor.rebind(block);
        self.cursor.next()
    }

    fn next(&mut self) -> Result<()> {
        self.cursor.next()
    }

    fn eof(&self) -> bool {
        self.cursor.eof()
    }

    fn column(&self, idx: usize) -> Result<ValueRef<'_>> {
        project(self.cursor.current(idx)?)
    }

    fn row_id(&self) -> Result<i64> {
        self.cursor.row_id()
    }

    fn close(&mut self) {
        self.cursor.close();
    }
}

impl Drop for GridTableCursor {
    fn drop(&mut self) {
        CursorModule::close(self);
    }
}

/// Split SQLite's xCreate/xConnect arguments into the table name and the
/// declaration arguments.
fn module_args<'a>(args: &'a [&'a [u8]]) -> Result<(&'a str, Vec<&'a str>)> {
    let text = args
        .iter()
        .map(|a| str::from_utf8(a).map(str::trim))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Invalid::Data(e.to_string()))?;
    match text.as_slice() {
        [_module, _schema, table, rest @ ..] => Ok((*table, rest.to_vec())),
        _ => Err(Invalid::Data("missing table name".into()).into()),
    }
}

unsafe impl<'vtab> VTab<'vtab> for GridTable {
    type Aux = Arc<dyn GridSource>;
    type Cursor = GridTableCursor;

    fn connect(
        _db: &mut VTabConnection,
        aux: Option<&Self::Aux>,
        args: &[&[u8]],
    ) -> rusqlite::Result<(String, Self)> {
        let source = aux.ok_or_else(|| Error::Internal(format!("{MODULE_NAME} has no grid source")).into_sqlite())?;
        let (table, args) = module_args(args).map_err(Error::into_sqlite)?;
        <Self as TableModule>::connect(source, table, &args).map_err(Error::into_sqlite)
    }

    fn best_index(&self, _info: &mut IndexInfo) -> rusqlite::Result<()> {
        TableModule::best_index(self).map_err(Error::into_sqlite)
    }

    fn open(&'vtab mut self) -> rusqlite::Result<GridTableCursor> {
        TableModule::open(self).map_err(Error::into_sqlite)
    }
}

impl<'vtab> CreateVTab<'vtab> for GridTable {
    const KIND: VTabKind = VTabKind::Default;

    fn destroy(&self) -> rusqlite::Result<()> {
        TableModule::disconnect(self).map_err(Error::into_sqlite)
    }
}

impl<'vtab> UpdateVTab<'vtab> for GridTable {
    fn delete(&mut self, arg: ValueRef<'_>) -> rusqlite::Result<()> {
        TableModule::update(self, &[arg]).map_err(Error::into_sqlite)
    }

    fn insert(&mut self, args: &Values<'_>) -> rusqlite::Result<i64> {
        let values: Vec<ValueRef<'_>> = args.iter().collect();
        TableModule::update(self, &values).map_err(Error::into_sqlite)?;
        Ok(values.get(1).and_then(|v| v.as_i64().ok()).unwrap_or_default())
    }

    fn update(&mut self, args: &Values<'_>) -> rusqlite::Result<()> {
        let values: Vec<ValueRef<'_>> = args.iter().collect();
        TableModule::update(self, &values).map_err(Error::into_sqlite)
    }
}

unsafe impl VTabCursor for GridTableCursor {
    fn filter(&mut self, _idx_num: c_int, _idx_str: Option<&str>, _args: &Values<'_>) -> rusqlite::Result<()> {
        CursorModule::filter(self).map_err(Error::into_sqlite)
    }

    fn next(&mut self) -> rusqlite::Result<()> {
        CursorModule::next(self).map_err(Error::into_sqlite)
    }

    fn eof(&self) -> bool {
        CursorModule::eof(self)
    }

    fn column(&self, ctx: &mut Context, i: c_int) -> rusqlite::Result<()> {
        let idx = usize::try_from(i).map_err(|_| Error::Internal(format!("column {i}")).into_sqlite())?;
        let value = CursorModule::column(self, idx).map_err(Error::into_sqlite)?;
        ctx.set_result(&ToSqlOutput::Borrowed(value))
    }

    fn rowid(&self) -> rusqlite::Result<i64> {
        CursorModule::row_id(self).map_err(Error::into_sqlite)
    }
}
