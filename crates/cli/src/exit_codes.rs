//! CLI Exit Code Registry
//!
//! Single source of truth for `gsql` exit codes. Scripts rely on them.
//!
//! | Code | Meaning                                           |
//! |------|---------------------------------------------------|
//! | 0    | Success                                           |
//! | 1    | General error (internal failure)                  |
//! | 2    | Usage error (bad args, bad names, missing file)   |
//! | 3    | SQL error reported by the engine                  |
//! | 4    | Write rejected by a read-only grid table          |
//! | 5    | Input file could not be read or imported          |
//!
//! New codes go in this table first, then into [`engine_exit_code`] or the
//! command that raises them.

use gridsql_engine::{Error, ErrorKind};

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - an internal failure that is not the caller's fault.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, invalid or unknown names, missing files.
pub const EXIT_USAGE: u8 = 2;

/// The statement failed inside SQLite (syntax, constraint, type).
pub const EXIT_SQL: u8 = 3;

/// A statement tried to change rows of a grid table.
pub const EXIT_READ_ONLY: u8 = 4;

/// A CSV input could not be read or loaded into the grid.
pub const EXIT_INPUT: u8 = 5;

/// Map an engine error to its exit code.
pub fn engine_exit_code(err: &Error) -> u8 {
    match err.kind() {
        ErrorKind::NotFound | ErrorKind::AlreadyExists | ErrorKind::InvalidArgument => EXIT_USAGE,
        ErrorKind::Engine | ErrorKind::TypeMismatch => EXIT_SQL,
        ErrorKind::PermissionDenied => EXIT_READ_ONLY,
        ErrorKind::Internal => EXIT_ERROR,
    }
}
