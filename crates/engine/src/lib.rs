//! `gridsql-engine` - SQL over live grids.
//!
//! A [`ConnectionRegistry`] owns named [`Session`]s. Each session is one
//! SQLite connection with the `GRIDREF` module registered, so a region of
//! the host grid can be declared as a table and queried like any other.

pub mod binding;
pub mod cursor;
pub mod error;
pub mod module;
pub mod names;
pub mod params;
pub mod range_query;
pub mod registry;
pub mod session;

pub use binding::{derive_column_names, GridBinding, SnapshotCommand, TableDeclaration};
pub use cursor::TableCursor;
pub use error::{Error, ErrorKind, Invalid, Object, Result};
pub use module::{CursorModule, TableModule, MODULE_NAME};
pub use params::ParamSpec;
pub use range_query::{query_ranges, RangeQueryOptions, MAX_RANGE_TABLES};
pub use registry::ConnectionRegistry;
pub use session::{DataSource, ExecuteOutcome, QueryInfo, Session, TableInfo};

/// Values bound to and returned from statements.
pub use rusqlite::types::Value as SqlValue;
