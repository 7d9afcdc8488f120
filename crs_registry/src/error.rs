//! Error taxonomy shared by the registry, factory and resolver.

use thiserror::Error;

/// Errors raised while resolving reference systems or transforming positions.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CrsError {
    /// More than one registry row matched a primary key lookup.
    #[error("duplicated records for key {key} in table {table} (column {column})")]
    DuplicatedRecord {
        table: String,
        column: usize,
        key: String,
    },
    /// A row exists but its content cannot be turned into an object.
    #[error("illegal record {key} in table {table}: {reason}")]
    IllegalRecord {
        table: String,
        key: String,
        reason: String,
    },
    #[error("no object found for code {authority}:{code}")]
    NoSuchCode { authority: String, code: String },
    #[error("invalid authority code: {0}")]
    InvalidCode(String),
    /// No transform path exists between two reference systems.
    #[error("no operation available from {source_crs} to {target_crs}")]
    UnsupportedOperation {
        source_crs: String,
        target_crs: String,
    },
    /// A grid-based correction was requested outside the grid's coverage.
    #[error("position ({longitude}, {latitude}) is outside the domain of grid {grid}")]
    OutOfDomain {
        grid: String,
        longitude: f64,
        latitude: f64,
    },
    #[error("datum shift grid {0} is not installed")]
    MissingGrid(String),
    #[error("expected {expected} ordinates, found {found}")]
    MismatchedDimension { expected: usize, found: usize },
    /// An envelope sampling would produce more points than can be counted.
    #[error("cannot sample {steps} intervals along each of {dimension} axes")]
    TooManyPoints { steps: usize, dimension: usize },
    #[error("position has no coordinate reference system")]
    MissingCrs,
    #[error("position is expressed in {found}, expected {expected}")]
    MismatchedCrs { expected: String, found: String },
    #[error("invalid value {value:?} for hint {key}")]
    InvalidHint { key: String, value: String },
    #[error("position ({longitude}, {latitude}) cannot be projected with {method}")]
    OutsideProjection {
        method: String,
        longitude: f64,
        latitude: f64,
    },
    #[error("invalid datum shift grid {name}: {reason}")]
    InvalidGrid { name: String, reason: String },
    #[error("registry query failed: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CrsError {
    pub(crate) fn illegal(table: &str, key: impl ToString, reason: impl Into<String>) -> Self {
        CrsError::IllegalRecord {
            table: table.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(source: impl ToString, target: impl ToString) -> Self {
        CrsError::UnsupportedOperation {
            source_crs: source.to_string(),
            target_crs: target.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CrsError>;
