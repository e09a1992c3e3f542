//! Name validators for connections, tables and cached queries.
//!
//! Each validator trims, normalizes and returns the name it accepted, so
//! callers key their maps with the returned value only.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

use crate::error::{Invalid, Result};

/// Marks a cached query name as opposed to ad hoc SQL text.
pub const QUERY_SIGIL: char = '$';

static OBJECT_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w{1,31}$").expect("valid object name pattern"));
static QUERY_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\$\w{1,30}$").expect("valid query name pattern"));

pub fn connection_name(name: &str) -> Result<String> {
    let normalized = name.trim().to_lowercase();
    if OBJECT_NAME.is_match(&normalized) {
        Ok(normalized)
    } else {
        Err(Invalid::ConnectionName(name.trim().to_string()).into())
    }
}

pub fn table_name(name: &str) -> Result<String> {
    let normalized = name.trim().to_lowercase();
    if OBJECT_NAME.is_match(&normalized) {
        Ok(normalized)
    } else {
        Err(Invalid::TableName(name.trim().to_string()).into())
    }
}

pub fn query_name(name: &str) -> Result<String> {
    let normalized = name.trim().to_lowercase();
    if QUERY_NAME.is_match(&normalized) {
        Ok(normalized)
    } else {
        Err(Invalid::QueryName(name.trim().to_string()).into())
    }
}

/// What the first argument of Execute/Query refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementRef<'a> {
    /// A cached query, by normalized name.
    Cached(String),
    /// SQL text to prepare once and discard.
    AdHoc(&'a str),
}

pub fn statement_ref(text_or_name: &str) -> Result<StatementRef<'_>> {
    let trimmed = text_or_name.trim();
    if trimmed.is_empty() {
        return Err(Invalid::QueryText.into());
    }
    if trimmed.starts_with(QUERY_SIGIL) {
        query_name(trimmed).map(StatementRef::Cached)
    } else {
        Ok(StatementRef::AdHoc(trimmed))
    }
}

/// Case-insensitive filter; a missing or blank pattern matches everything.
pub fn name_filter(pattern: Option<&str>) -> Result<Regex> {
    let pattern = match pattern.map(str::trim) {
        Some(p) if !p.is_empty() => p,
        _ => ".*",
    };
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| Invalid::Filter(e.to_string()).into())
}
