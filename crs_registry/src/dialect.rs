//! Rewriting of registry SQL for the syntax of a specific backend.
//!
//! Registry queries are written once against ANSI table names. A [`Dialect`]
//! is chosen when the factory is built and every statement goes through
//! [`Dialect::adapt`] before it reaches the connection.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::CrsError;

/// ANSI table names paired with their MS-Access spelling.
pub const TABLE_NAMES: &[(&str, &str)] = &[
    ("epsg_alias", "[Alias]"),
    ("epsg_coordinateaxis", "[Coordinate Axis]"),
    ("epsg_coordinatereferencesystem", "[Coordinate Reference System]"),
    ("epsg_coordinatesystem", "[Coordinate System]"),
    ("epsg_coordoperation", "[Coordinate_Operation]"),
    ("epsg_coordoperationmethod", "[Coordinate_Operation Method]"),
    ("epsg_coordoperationparam", "[Coordinate_Operation Parameter]"),
    ("epsg_coordoperationparamvalue", "[Coordinate_Operation Parameter Value]"),
    ("epsg_coordoperationpath", "[Coordinate_Operation Path]"),
    ("epsg_datum", "[Datum]"),
    ("epsg_ellipsoid", "[Ellipsoid]"),
    ("epsg_primemeridian", "[Prime Meridian]"),
    ("epsg_unitofmeasure", "[Unit of Measure]"),
];

static FROM_PAREN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bFROM\s*\(").unwrap());
static SUBSELECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*SELECT\b").unwrap());
static TABLE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bepsg_[a-z]+\b").unwrap());

/// Soft failure of the adapter: the caller passes the statement through and
/// lets the backend report the syntax error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdaptError {
    #[error("no closing parenthesis for the FROM clause opened at offset {offset}")]
    UnbalancedParentheses { offset: usize },
}

/// Backend syntax variants understood by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Baseline: statements are used as written.
    #[default]
    Ansi,
    /// Backends that cannot parse parenthesized joins in a FROM clause.
    Hsql,
    /// MS-Access table naming (`[Coordinate Reference System]`).
    Access,
}

impl Dialect {
    /// Adapts `query` for this backend, falling back to the original text when
    /// the rewrite cannot be done confidently.
    pub fn adapt(&self, query: &str) -> String {
        match self.try_adapt(query) {
            Ok(adapted) => adapted,
            Err(e) => {
                log::warn!("passing query through unchanged ({}): {}", self, e);
                query.to_string()
            }
        }
    }

    pub fn try_adapt(&self, query: &str) -> Result<String, AdaptError> {
        match self {
            Dialect::Ansi => Ok(query.to_string()),
            Dialect::Hsql => remove_from_parentheses(query),
            Dialect::Access => Ok(rename_tables(query)),
        }
    }

    /// Name of `ansi_table` as it appears in this backend's schema.
    pub fn table_name(&self, ansi_table: &str) -> String {
        match self {
            Dialect::Access => rename_tables(ansi_table),
            _ => ansi_table.to_string(),
        }
    }
}

/// Deletes the outer parenthesis pair of every `FROM (<join>)` clause.
/// Parenthesized sub-selects are derived tables and are kept.
fn remove_from_parentheses(query: &str) -> Result<String, AdaptError> {
    let mut out = query.to_string();
    let mut search_from = 0;
    while let Some(m) = FROM_PAREN.find_at(&out, search_from) {
        let open = m.end() - 1;
        let close = matching_parenthesis(&out, open)
            .ok_or(AdaptError::UnbalancedParentheses { offset: open })?;
        if SUBSELECT.is_match(&out[open + 1..close]) {
            search_from = close + 1;
            continue;
        }
        out = format!("{}{}{}", &out[..open], &out[open + 1..close], &out[close + 1..]);
        // continue after the unwrapped content; it is left untouched
        search_from = close - 1;
    }
    Ok(out)
}

/// Byte offset of the parenthesis closing the one at `open`.
fn matching_parenthesis(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text[open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

fn rename_tables(query: &str) -> String {
    TABLE_NAME
        .replace_all(query, |caps: &Captures| {
            let name = caps[0].to_ascii_lowercase();
            TABLE_NAMES
                .iter()
                .find(|(ansi, _)| *ansi == name)
                .map(|(_, access)| access.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dialect::Ansi => "ansi",
            Dialect::Hsql => "hsql",
            Dialect::Access => "access",
        };
        f.write_str(name)
    }
}

impl FromStr for Dialect {
    type Err = CrsError;

    fn from_str(s: &str) -> Result<Self, CrsError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ansi" => Ok(Dialect::Ansi),
            "hsql" => Ok(Dialect::Hsql),
            "access" => Ok(Dialect::Access),
            _ => Err(CrsError::InvalidHint {
                key: "dialect".into(),
                value: s.to_string(),
            }),
        }
    }
}
