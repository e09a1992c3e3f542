//! `gridsql-core` - grid primitives shared by the SQL engine and its hosts.
//!
//! Nothing here knows about SQL: a [`GridSource`] hands out rectangular
//! [`Block`]s of [`CellValue`]s for a sheet and a [`GridRange`].

pub mod cell;
pub mod memory;
pub mod range;
pub mod source;

pub use cell::{CellError, CellValue};
pub use memory::MemoryGrid;
pub use range::{column_letters, GridRange, GridRef, RangeError, MAX_COLUMNS, MAX_ROWS};
pub use source::{Block, GridSource, SheetId, SourceError};
