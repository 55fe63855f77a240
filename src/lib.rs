//! Convention-driven collections over SQLite tables.
//!
//! # Intention
//!
//! - Expose a table as a [`Collection`]: a chainable, lazily-executed query that
//!   is also a cursor over its rows and a proxy for its current row.
//! - Infer one-to-many and many-to-many relations from table and column names
//!   instead of declared schema.
//! - Stage field writes and flush them on [`Collection::save`].
//!
//! # Architectural Boundaries
//!
//! - SQLite only, through `rusqlite`.
//! - No migrations, no connection pooling, no cross-statement transactions.
//! - A [`Database`] and its collections belong to one thread.
//!
//! ```rust,ignore
//! let db = Database::open(&DatabaseConfig::new("app.sqlite"))?;
//! let mut ann = all(&db, "Users")?.filter("name", "=", "Ann");
//! let mut tasks = ann.get("tasks")?.into_collection().expect("link");
//! println!("Ann has {} tasks", tasks.count()?);
//! ```

pub mod collection;
pub mod config;
pub mod cursor;
pub mod database;
pub mod error;
pub mod mutation;
pub mod query;
pub mod registry;
pub mod relation;
pub mod row;
pub mod value;

pub use collection::{Collection, RowView, Rows};
pub use config::DatabaseConfig;
pub use database::Database;
pub use error::{Error, Result};
pub use query::{Direction, FieldMap, Filter, Operand, Ordering, Params, QueryShape, Source, SqlQuery};
pub use registry::SchemaRegistry;
pub use relation::{Field, RelationKind};
pub use row::Row;
pub use value::Value;

/// Collection over every row of `table`.
pub fn all<'db>(db: &'db Database, table: &str) -> Result<Collection<'db>> {
    Collection::new(db, table)
}
