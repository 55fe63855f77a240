//! Known table names, read once from the SQLite catalog.

use crate::error::Result;
use rusqlite::Connection;
use std::collections::BTreeSet;

const CATALOG_QUERY: &str = "SELECT name FROM sqlite_master WHERE type = 'table';";

/// Set of table names used for existence checks and relation inference.
///
/// Populated once per [`Database`](crate::Database) and never refreshed, so tables
/// created after the first collection was built are invisible to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaRegistry {
    tables: BTreeSet<String>,
}

impl SchemaRegistry {
    /// Read every table name from the catalog.
    pub fn load(conn: &Connection) -> Result<Self> {
        let mut stmt = conn.prepare(CATALOG_QUERY)?;
        let tables = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<BTreeSet<_>>>()?;
        tracing::debug!(tables = tables.len(), "schema registry loaded");
        Ok(Self { tables })
    }

    pub fn from_tables<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: tables.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains(table)
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
