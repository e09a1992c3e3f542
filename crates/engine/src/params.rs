//! Parameter slots of cached queries and binding values to statements.

use rusqlite::types::Value;
use rusqlite::Statement;

use crate::error::{Invalid, Result};

/// How a cached query declares its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ParamSpec {
    #[default]
    None,
    /// N anonymous slots, bound to `?1`..`?N`.
    Positional(usize),
    /// One slot per name, bound by parameter name.
    Named(Vec<String>),
}

impl From<usize> for ParamSpec {
    fn from(n: usize) -> Self {
        ParamSpec::Positional(n)
    }
}

impl From<Vec<String>> for ParamSpec {
    fn from(names: Vec<String>) -> Self {
        ParamSpec::Named(names)
    }
}

/// Validated parameter slots of a cached query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamSlots {
    Positional(usize),
    Named(Vec<String>),
}

impl ParamSlots {
    pub fn from_spec(spec: ParamSpec) -> Result<Self> {
        match spec {
            ParamSpec::None => Ok(ParamSlots::Positional(0)),
            ParamSpec::Positional(0) => Err(Invalid::Params("parameter count must be positive".into()).into()),
            ParamSpec::Positional(n) => Ok(ParamSlots::Positional(n)),
            ParamSpec::Named(names) if names.is_empty() => Err(Invalid::Params("no parameter names".into()).into()),
            ParamSpec::Named(names) => names
                .iter()
                .map(|n| non_blank(n))
                .collect::<Result<Vec<_>>>()
                .map(ParamSlots::Named),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ParamSlots::Positional(n) => *n,
            ParamSlots::Named(names) => names.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn names(&self) -> Option<&[String]> {
        match self {
            ParamSlots::Positional(_) => None,
            ParamSlots::Named(names) => Some(names),
        }
    }
}

fn non_blank(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        Err(Invalid::Params("blank parameter name".into()).into())
    } else {
        Ok(trimmed.to_string())
    }
}

/// Bind `values` to a cached query's slots. The value count must equal the
/// slot count; slots the statement never references are skipped.
///
/// Without `names` the values fill the slots in declaration order. With
/// `names`, each value goes to the declared slot of that name.
pub fn bind_cached(
    stmt: &mut Statement<'_>,
    slots: &ParamSlots,
    values: &[Value],
    names: Option<&[String]>,
) -> Result<()> {
    if values.len() != slots.len() {
        return Err(Invalid::Params(format!("expected {} values, got {}", slots.len(), values.len())).into());
    }
    match (slots, names) {
        (ParamSlots::Positional(_), None) => {
            let count = stmt.parameter_count();
            for (i, value) in values.iter().enumerate().take(count) {
                stmt.raw_bind_parameter(i + 1, value)?;
            }
        }
        (ParamSlots::Positional(_), Some(_)) => {
            return Err(Invalid::Params("query takes positional parameters, not names".into()).into());
        }
        (ParamSlots::Named(declared), None) => {
            for (slot, value) in declared.iter().zip(values) {
                if let Some(idx) = parameter_index(stmt, slot) {
                    stmt.raw_bind_parameter(idx, value)?;
                }
            }
        }
        (ParamSlots::Named(declared), Some(names)) => {
            if names.len() != values.len() {
                return Err(Invalid::Params(format!("{} names for {} values", names.len(), values.len())).into());
            }
            for (name, value) in names.iter().zip(values) {
                let name = non_blank(name)?;
                let slot = declared
                    .iter()
                    .find(|slot| strip_prefix(slot).eq_ignore_ascii_case(strip_prefix(&name)))
                    .ok_or_else(|| Invalid::Params(format!("query declares no parameter named {name}")))?;
                if let Some(idx) = parameter_index(stmt, slot) {
                    stmt.raw_bind_parameter(idx, value)?;
                }
            }
        }
    }
    Ok(())
}

/// Bind `values` to a one-off statement, by position unless `names` is given.
pub fn bind_ad_hoc(stmt: &mut Statement<'_>, values: &[Value], names: Option<&[String]>) -> Result<()> {
    match names {
        None => {
            let count = stmt.parameter_count();
            for (i, value) in values.iter().enumerate().take(count) {
                stmt.raw_bind_parameter(i + 1, value)?;
            }
        }
        Some(names) => {
            if names.len() != values.len() {
                return Err(Invalid::Params(format!("{} names for {} values", names.len(), values.len())).into());
            }
            for (name, value) in names.iter().zip(values) {
                let name = non_blank(name)?;
                let idx = parameter_index(stmt, &name)
                    .ok_or_else(|| Invalid::Params(format!("no parameter named {name}")))?;
                stmt.raw_bind_parameter(idx, value)?;
            }
        }
    }
    Ok(())
}

/// 1-based index of the parameter called `name`, ignoring case and the
/// `:`, `@`, `$` or `?` prefix on either side.
pub fn parameter_index(stmt: &Statement<'_>, name: &str) -> Option<usize> {
    let wanted = strip_prefix(name);
    (1..=stmt.parameter_count()).find(|&i| {
        stmt.parameter_name(i)
            .is_some_and(|candidate| strip_prefix(candidate).eq_ignore_ascii_case(wanted))
    })
}

fn strip_prefix(name: &str) -> &str {
    name.trim().trim_start_matches([':', '@', '$', '?'])
}
