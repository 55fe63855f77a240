//! Error types for collection operations.

use thiserror::Error;

/// Errors raised by collections, the query builder and the database handle.
///
/// Nothing in this crate recovers from these internally; every failure surfaces
/// to the caller that triggered it.
#[derive(Error, Debug)]
pub enum Error {
    /// A collection was requested for a table the schema registry does not know.
    #[error("Table \"{0}\" does not exist")]
    TableNotFound(String),

    /// The field is neither a column of the row nor an inferable relation.
    #[error("No relation '{field}' in '{table}'")]
    UnknownRelation { field: String, table: String },

    /// A row was accessed while the cursor had no current row.
    #[error("Collection over '{table}' is empty")]
    EmptyResult { table: String },

    /// SQLite rejected a statement or its execution.
    #[error("Statement error: {0}")]
    Statement(#[from] rusqlite::Error),

    /// A filter could not be rendered (e.g. BETWEEN without a range).
    #[error("Invalid filter on '{field}': {reason}")]
    InvalidFilter { field: String, reason: String },

    /// An un-iterated save would have touched a number of rows other than one.
    #[error("Refusing to save '{table}': current filters match {matched} rows, expected exactly 1")]
    AmbiguousSave { table: String, matched: i64 },

    /// Configuration error (missing database file, bad settings)
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn unknown_relation(field: impl Into<String>, table: impl Into<String>) -> Self {
        Error::UnknownRelation {
            field: field.into(),
            table: table.into(),
        }
    }

    pub(crate) fn empty(table: impl Into<String>) -> Self {
        Error::EmptyResult {
            table: table.into(),
        }
    }

    pub(crate) fn invalid_filter(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidFilter {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
