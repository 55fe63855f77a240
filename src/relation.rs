//! Relations inferred from naming conventions.
//!
//! Tables are capitalized and every table has an `id` column. A column named
//! `<field>Id` links the row to one row of table `<Field>`: `countriesId = 3`
//! points at `Countries` row 3. Many-to-many links live in a junction table
//! named by concatenating both tables (`TasksUsers` or `UsersTasks`) holding a
//! `<table>Id` column for each side, lowercased: `tasksId`, `usersId`.

use crate::collection::Collection;
use crate::database::Database;
use crate::error::{Error, Result};
use crate::query::Source;
use crate::registry::SchemaRegistry;
use crate::row::Row;
use crate::value::Value;

/// What a field name resolves to on a given row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationKind {
    /// A plain column of the row.
    Column,
    /// The row's `column` holds the id of one row in `table`.
    Singular { table: String, column: String },
    /// Rows of `table` linked through `junction`.
    Multiple { junction: String, table: String },
}

/// A field read from a row.
#[derive(Debug)]
pub enum Field<'db> {
    Scalar(Value),
    SingularLink(Collection<'db>),
    MultipleLink(Collection<'db>),
}

impl<'db> Field<'db> {
    pub fn into_value(self) -> Option<Value> {
        match self {
            Field::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_collection(self) -> Option<Collection<'db>> {
        match self {
            Field::SingularLink(collection) | Field::MultipleLink(collection) => Some(collection),
            Field::Scalar(_) => None,
        }
    }

    pub fn is_link(&self) -> bool {
        !matches!(self, Field::Scalar(_))
    }
}

/// Upper-cases the first character only: `tasks` becomes `Tasks`.
pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Foreign key column pointing at `table`: `Tasks` becomes `tasksId`.
pub fn link_column(table: &str) -> String {
    format!("{}Id", table.to_lowercase())
}

/// Resolve `field` on a row of `current_table`, columns first.
pub fn resolve(
    current_table: &str,
    field: &str,
    row: &Row,
    registry: &SchemaRegistry,
) -> Result<RelationKind> {
    if row.contains(field) {
        return Ok(RelationKind::Column);
    }
    resolve_relation(current_table, field, row, registry)
}

/// Resolve `field` as a link only: a `<field>Id` column, then a junction table in
/// either name order.
pub fn resolve_relation(
    current_table: &str,
    field: &str,
    row: &Row,
    registry: &SchemaRegistry,
) -> Result<RelationKind> {
    let table = capitalize(field);
    let column = format!("{field}Id");
    if row.contains(&column) {
        tracing::trace!(%current_table, %field, %table, "singular link");
        return Ok(RelationKind::Singular { table, column });
    }

    [
        format!("{table}{current_table}"),
        format!("{current_table}{table}"),
    ]
    .into_iter()
    .find(|junction| registry.contains(junction))
    .map(|junction| {
        tracing::trace!(%current_table, %field, %junction, "multiple link");
        RelationKind::Multiple { junction, table }
    })
    .ok_or_else(|| Error::unknown_relation(field, current_table))
}

pub(crate) fn row_id(row: &Row, table: &str) -> Result<Value> {
    row.get("id")
        .cloned()
        .ok_or_else(|| Error::unknown_relation("id", table))
}

/// Read `field` from `row`, following links into new collections.
pub(crate) fn traverse<'db>(
    db: &'db Database,
    source: &Source,
    field: &str,
    row: &Row,
) -> Result<Field<'db>> {
    let current = source.target();
    match resolve(current, field, row, db.registry()?)? {
        RelationKind::Column => Ok(Field::Scalar(
            row.get(field).cloned().unwrap_or(Value::Null),
        )),
        RelationKind::Singular { table, column } => {
            let id = row.get(&column).cloned().unwrap_or(Value::Null);
            let related = Collection::new(db, &table)?.filter("id", "=", id);
            Ok(Field::SingularLink(related))
        }
        RelationKind::Multiple { junction, table } => {
            let id = row_id(row, current)?;
            let related = Collection::join(db, &junction, &table)
                .filter(format!("{junction}.{}", link_column(current)), "=", id)
                .filter_raw(
                    format!("{junction}.{field}Id"),
                    "=",
                    format!("{table}.id"),
                );
            Ok(Field::MultipleLink(related))
        }
    }
}
