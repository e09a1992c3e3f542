//! Error taxonomy shared by every engine operation.
//!
//! `Display` output is a short tag plus optional context in braces
//! (`#QRY_NOT_FOUND{$q1}`), stable enough for a host to match on.

use std::fmt;

use gridsql_core::{RangeError, SourceError};
use rusqlite::ffi;
use rusqlite::ErrorCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidArgument,
    PermissionDenied,
    TypeMismatch,
    Internal,
    Engine,
}

/// The kind of named object an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Object {
    Connection,
    Query,
    Table,
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Object::Connection => "DB",
            Object::Query => "QRY",
            Object::Table => "TBL",
        })
    }
}

/// Reasons an argument is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Invalid {
    #[error("#CNX_NAME!{{{0}}}")]
    ConnectionName(String),
    #[error("#TBL_NAME!{{{0}}}")]
    TableName(String),
    #[error("#QRY_NAME!{{{0}}}")]
    QueryName(String),
    #[error("#INVALID_QUERY")]
    QueryText,
    #[error("#INVALID_DBFILE{{{0}}}")]
    DbFile(String),
    #[error("#INVALID_DATA{{{0}}}")]
    Data(String),
    #[error("#INVALID_PARAMS{{{0}}}")]
    Params(String),
    #[error("#INVALID_FILTER{{{0}}}")]
    Filter(String),
    /// The name is not a grid-backed table on this session.
    #[error("#TBL_NOT_FOUND{{{0}}}")]
    UnknownTable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("#{object}_NOT_FOUND{{{name}}}")]
    NotFound { object: Object, name: String },

    #[error("#ALREADY_EXISTS{{{name}}}")]
    AlreadyExists { object: Object, name: String },

    #[error(transparent)]
    InvalidArgument(#[from] Invalid),

    #[error("#READ_ONLY{{{0}}}")]
    PermissionDenied(String),

    #[error("#TYPE_MISMATCH{{{0}}}")]
    TypeMismatch(String),

    #[error("#INTERNAL{{{0}}}")]
    Internal(String),

    #[error("#ERR{{{0}}}")]
    Engine(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Error::TypeMismatch(_) => ErrorKind::TypeMismatch,
            Error::Internal(_) => ErrorKind::Internal,
            Error::Engine(_) => ErrorKind::Engine,
        }
    }

    pub(crate) fn not_found(object: Object, name: impl Into<String>) -> Self {
        Error::NotFound { object, name: name.into() }
    }

    pub(crate) fn already_exists(object: Object, name: impl Into<String>) -> Self {
        Error::AlreadyExists { object, name: name.into() }
    }

    /// Convert to an error SQLite can carry out of a virtual table callback.
    ///
    /// The primary result code encodes the kind, so `From<rusqlite::Error>`
    /// recovers it once the statement fails.
    pub(crate) fn into_sqlite(self) -> rusqlite::Error {
        let code = match self.kind() {
            ErrorKind::PermissionDenied => ffi::SQLITE_PERM,
            ErrorKind::TypeMismatch => ffi::SQLITE_MISMATCH,
            ErrorKind::Internal => ffi::SQLITE_INTERNAL,
            _ => ffi::SQLITE_ERROR,
        };
        let message = match self {
            Error::PermissionDenied(detail) | Error::TypeMismatch(detail) | Error::Internal(detail) => detail,
            other => other.to_string(),
        };
        rusqlite::Error::SqliteFailure(ffi::Error::new(code), Some(message))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(code, message) => {
                let detail = message.unwrap_or_else(|| code.to_string());
                match code.code {
                    ErrorCode::PermissionDenied => Error::PermissionDenied(detail),
                    ErrorCode::TypeMismatch => Error::TypeMismatch(detail),
                    ErrorCode::InternalMalfunction => Error::Internal(detail),
                    _ => Error::Engine(normalize_engine_message(&detail)),
                }
            }
            other => Error::Engine(normalize_engine_message(&other.to_string())),
        }
    }
}

impl From<SourceError> for Error {
    fn from(err: SourceError) -> Self {
        Invalid::Data(err.to_string()).into()
    }
}

impl From<RangeError> for Error {
    fn from(err: RangeError) -> Self {
        Invalid::Data(err.to_string()).into()
    }
}

/// Upper-case the first character and collapse line breaks to `". "`.
pub fn normalize_engine_message(message: &str) -> String {
    let collapsed = message.trim().replace("\r\n", ". ").replace(['\n', '\r'], ". ");
    let mut chars = collapsed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_tags() {
        assert_eq!(Error::not_found(Object::Connection, "main").to_string(), "#DB_NOT_FOUND{main}");
        assert_eq!(Error::not_found(Object::Query, "$q").to_string(), "#QRY_NOT_FOUND{$q}");
        assert_eq!(Error::already_exists(Object::Table, "t").to_string(), "#ALREADY_EXISTS{t}");
        assert_eq!(Error::from(Invalid::QueryText).to_string(), "#INVALID_QUERY");
        assert_eq!(Error::from(Invalid::ConnectionName("a b".into())).to_string(), "#CNX_NAME!{a b}");
        assert_eq!(Error::Engine("Boom".into()).to_string(), "#ERR{Boom}");
    }

    #[test]
    fn test_kind() {
        assert_eq!(Error::from(Invalid::Params("x".into())).kind(), ErrorKind::InvalidArgument);
        assert_eq!(Error::PermissionDenied("x".into()).kind(), ErrorKind::PermissionDenied);
        assert_eq!(Error::not_found(Object::Query, "x").kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_normalize_engine_message() {
        assert_eq!(normalize_engine_message("no such table: t"), "No such table: t");
        assert_eq!(normalize_engine_message("near \"x\"\nsyntax error"), "Near \"x\". syntax error");
        assert_eq!(normalize_engine_message("a\r\nb"), "A. b");
        assert_eq!(normalize_engine_message(""), "");
    }

    #[test]
    fn test_sqlite_round_trip_keeps_kind() {
        for err in [
            Error::PermissionDenied("table is read-only".into()),
            Error::TypeMismatch("bad code".into()),
            Error::Internal("bad shape".into()),
        ] {
            let kind = err.kind();
            let back = Error::from(err.clone().into_sqlite());
            assert_eq!(back.kind(), kind);
            assert_eq!(back, err);
        }
    }

    #[test]
    fn test_plain_sqlite_failure_is_engine_error() {
        let err = rusqlite::Error::SqliteFailure(ffi::Error::new(ffi::SQLITE_ERROR), Some("no such table: x".into()));
        assert_eq!(Error::from(err), Error::Engine("No such table: x".into()));
    }
}
