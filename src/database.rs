//! The SQLite handle shared by every collection.

use crate::collection::Collection;
use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::query::SqlQuery;
use crate::registry::SchemaRegistry;
use crate::row::Row;
use crate::value::Value;
use rusqlite::{Connection, ToSql};
use std::cell::OnceCell;
use std::path::Path;
use std::time::Duration;

/// Connection plus the lazily-read schema registry.
///
/// Collections borrow the database, so it must outlive them. It is not `Sync`:
/// one database, one thread.
#[derive(Debug)]
pub struct Database {
    conn: Connection,
    registry: OnceCell<SchemaRegistry>,
}

impl Database {
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        if !config.is_in_memory()
            && !config.create_if_missing
            && !Path::new(&config.db_path).exists()
        {
            return Err(Error::Config(format!(
                "database file '{}' does not exist",
                config.db_path
            )));
        }
        let conn = if config.is_in_memory() {
            Connection::open_in_memory()?
        } else {
            Connection::open(&config.db_path)?
        };
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        tracing::debug!(path = %config.db_path, "opened database");
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(&DatabaseConfig::in_memory())
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            registry: OnceCell::new(),
        }
    }

    /// Raw connection, for fixtures and DDL. Tables created after the registry
    /// was loaded stay unknown to collections.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// The schema registry, read from the catalog on first call.
    pub fn registry(&self) -> Result<&SchemaRegistry> {
        if let Some(registry) = self.registry.get() {
            return Ok(registry);
        }
        let loaded = SchemaRegistry::load(&self.conn)?;
        Ok(self.registry.get_or_init(|| loaded))
    }

    /// Collection over every row of `table`.
    pub fn collection(&self, table: &str) -> Result<Collection<'_>> {
        Collection::new(self, table)
    }

    pub fn fetch_all(&self, query: &SqlQuery) -> Result<Vec<Row>> {
        tracing::debug!(sql = %query.statement, params = query.params.len(), "fetching rows");
        let mut stmt = self.conn.prepare(&query.statement)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let bindings = bindings(query);
        let mut rows = stmt.query(bindings.as_slice())?;

        let mut fetched = Vec::new();
        while let Some(row) = rows.next()? {
            let mut out = Row::new();
            for (i, name) in names.iter().enumerate() {
                out.insert(name.as_str(), row.get::<_, Value>(i)?);
            }
            fetched.push(out);
        }
        Ok(fetched)
    }

    /// First column of the first row.
    pub fn fetch_scalar(&self, query: &SqlQuery) -> Result<Value> {
        tracing::debug!(sql = %query.statement, params = query.params.len(), "fetching scalar");
        let bindings = bindings(query);
        let value = self
            .conn
            .query_row(&query.statement, bindings.as_slice(), |row| {
                row.get::<_, Value>(0)
            })?;
        Ok(value)
    }

    /// Run a write statement, returning the number of affected rows.
    pub fn execute(&self, query: &SqlQuery) -> Result<usize> {
        tracing::debug!(sql = %query.statement, params = query.params.len(), "executing statement");
        let bindings = bindings(query);
        Ok(self.conn.execute(&query.statement, bindings.as_slice())?)
    }

    pub fn last_insert_id(&self) -> i64 {
        self.conn.last_insert_rowid()
    }
}

fn bindings(query: &SqlQuery) -> Vec<(&str, &dyn ToSql)> {
    query
        .params
        .values
        .iter()
        .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
        .collect()
}
