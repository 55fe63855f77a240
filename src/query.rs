//! Query shapes and the SQL they compile to.
//!
//! A [`QueryShape`] is the query-shaping half of a collection: its source, filters,
//! orderings and bounds. Compiling a shape never touches the database; it yields a
//! [`SqlQuery`] whose parameters are bound by name at execution time.

use crate::error::{Error, Result};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Field assignments for INSERT and UPDATE, keyed by column name.
pub type FieldMap = BTreeMap<String, Value>;

/// Named parameter bindings for SQL queries
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Params {
    pub values: Vec<(String, Value)>,
}

impl Params {
    /// Create a new Params object
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named value
    pub fn with_value(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: &str, value: impl Into<Value>) {
        self.values.push((name.to_string(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// SQL statement with named parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub statement: String,
    pub params: Params,
}

impl SqlQuery {
    pub fn new(statement: &str) -> Self {
        Self {
            statement: statement.to_string(),
            params: Params::new(),
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }
}

/// Right-hand side of a filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    /// Bound as a named parameter.
    Bind(Value),
    /// Two bound parameters, only valid with `BETWEEN`.
    Range(Value, Value),
    /// Inlined verbatim. Used for column-to-column comparisons; never pass user input.
    Raw(String),
}

/// One `field operator operand` condition. Conditions are ANDed together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub operator: String,
    pub operand: Operand,
}

impl Filter {
    pub fn new(field: impl Into<String>, operator: impl Into<String>, operand: Operand) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            operand,
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self.operand, Operand::Raw(_))
    }

    fn is_between(&self) -> bool {
        self.operator.trim().eq_ignore_ascii_case("BETWEEN")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ASC" => Ok(Direction::Asc),
            "DESC" => Ok(Direction::Desc),
            other => Err(Error::invalid_filter(
                other,
                "sort direction must be ASC or DESC",
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ordering {
    pub field: String,
    pub direction: Direction,
}

/// Where a collection's rows come from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    Table(String),
    /// Implicit join through a junction table; rows are those of `target`.
    Join { junction: String, target: String },
}

impl Source {
    /// The table rows belong to and writes go to.
    pub fn target(&self) -> &str {
        match self {
            Source::Table(table) => table,
            Source::Join { target, .. } => target,
        }
    }

    fn from_clause(&self) -> String {
        match self {
            Source::Table(table) => table.clone(),
            Source::Join { junction, target } => format!("{junction}, {target}"),
        }
    }

    fn projection(&self) -> String {
        match self {
            Source::Table(_) => "*".to_string(),
            Source::Join { target, .. } => format!("{target}.*"),
        }
    }

    /// Unqualified columns of a join refer to the target table.
    fn qualify(&self, field: &str) -> String {
        match self {
            Source::Join { target, .. } if !field.contains('.') => format!("{target}.{field}"),
            _ => field.to_string(),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.from_clause())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Select,
    Count,
    Insert,
    Update,
    Delete,
}

/// Source, filters, orderings and bounds of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryShape {
    pub source: Source,
    pub filters: Vec<Filter>,
    pub orderings: Vec<Ordering>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl QueryShape {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            filters: Vec::new(),
            orderings: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn table(table: impl Into<String>) -> Self {
        Self::new(Source::Table(table.into()))
    }

    pub fn select(&self) -> Result<SqlQuery> {
        self.build(QueryKind::Select, None)
    }

    pub fn count(&self) -> Result<SqlQuery> {
        self.build(QueryKind::Count, None)
    }

    pub fn insert(&self, fields: &FieldMap) -> Result<SqlQuery> {
        self.build(QueryKind::Insert, Some(fields))
    }

    pub fn update(&self, fields: &FieldMap) -> Result<SqlQuery> {
        self.build(QueryKind::Update, Some(fields))
    }

    pub fn delete(&self) -> Result<SqlQuery> {
        self.build(QueryKind::Delete, None)
    }

    /// Compile the shape into SQL for `kind`. `fields` is read by INSERT and UPDATE only.
    pub fn build(&self, kind: QueryKind, fields: Option<&FieldMap>) -> Result<SqlQuery> {
        let mut params = Params::new();
        let mut parts = Vec::new();
        let target = self.source.target();

        match kind {
            QueryKind::Select => {
                parts.push(format!(
                    "SELECT {} FROM {}",
                    self.source.projection(),
                    self.source.from_clause()
                ));
                parts.extend(self.where_clause(&mut params)?);
                parts.extend(self.bounds(&mut params));
            }
            QueryKind::Count => {
                parts.push(format!("SELECT COUNT(*) FROM {}", self.source.from_clause()));
                parts.extend(self.where_clause(&mut params)?);
            }
            QueryKind::Insert => {
                let fields = fields.cloned().unwrap_or_default();
                if fields.is_empty() {
                    return Ok(SqlQuery::new(&format!("INSERT INTO {target} DEFAULT VALUES;")));
                }
                let mut columns = Vec::with_capacity(fields.len());
                let mut placeholders = Vec::with_capacity(fields.len());
                for (j, (column, value)) in fields.into_iter().enumerate() {
                    let name = format!(":insert{j}");
                    placeholders.push(name.clone());
                    params.push(&name, value);
                    columns.push(column);
                }
                let statement = format!(
                    "INSERT INTO {target} ({}) VALUES ({});",
                    columns.join(", "),
                    placeholders.join(", ")
                );
                return Ok(SqlQuery::new(&statement).with_params(params));
            }
            QueryKind::Update => {
                let fields = match fields {
                    Some(fields) if !fields.is_empty() => fields,
                    _ => return Err(Error::invalid_filter(target, "UPDATE without fields")),
                };
                let assignments: Vec<String> = fields
                    .iter()
                    .enumerate()
                    .map(|(j, (column, value))| {
                        let name = format!(":set{j}");
                        params.push(&name, value.clone());
                        format!("{column} = {name}")
                    })
                    .collect();
                parts.push(format!("UPDATE {target} SET {}", assignments.join(", ")));
                parts.extend(self.write_selection(&mut params)?);
            }
            QueryKind::Delete => {
                parts.push(format!("DELETE FROM {target}"));
                parts.extend(self.write_selection(&mut params)?);
            }
        }

        let statement = format!("{};", parts.join(" "));
        Ok(SqlQuery::new(&statement).with_params(params))
    }

    fn where_clause(&self, params: &mut Params) -> Result<Option<String>> {
        if self.filters.is_empty() {
            return Ok(None);
        }
        let mut conditions = Vec::with_capacity(self.filters.len());
        for (i, filter) in self.filters.iter().enumerate() {
            let field = self.source.qualify(&filter.field);
            let operator = filter.operator.trim();
            let condition = match &filter.operand {
                Operand::Range(lo, hi) if filter.is_between() => {
                    let lo_name = format!(":filter{i}_lo");
                    let hi_name = format!(":filter{i}_hi");
                    params.push(&lo_name, lo.clone());
                    params.push(&hi_name, hi.clone());
                    format!("{field} BETWEEN {lo_name} AND {hi_name}")
                }
                Operand::Range(..) => {
                    return Err(Error::invalid_filter(
                        &filter.field,
                        format!("a range operand needs BETWEEN, got '{operator}'"),
                    ));
                }
                _ if filter.is_between() => {
                    return Err(Error::invalid_filter(
                        &filter.field,
                        "BETWEEN needs a two-value range",
                    ));
                }
                Operand::Bind(value) => {
                    let name = format!(":filter{i}");
                    params.push(&name, value.clone());
                    format!("{field} {operator} {name}")
                }
                Operand::Raw(fragment) => format!("{field} {operator} {fragment}"),
            };
            conditions.push(condition);
        }
        Ok(Some(format!("WHERE {}", conditions.join(" AND "))))
    }

    /// ORDER BY, LIMIT and OFFSET, in SQLite's required order.
    fn bounds(&self, params: &mut Params) -> Vec<String> {
        let mut parts = Vec::new();
        if !self.orderings.is_empty() {
            let orderings: Vec<String> = self
                .orderings
                .iter()
                .map(|o| format!("{} {}", self.source.qualify(&o.field), o.direction.as_sql()))
                .collect();
            parts.push(format!("ORDER BY {}", orderings.join(", ")));
        }
        match (self.limit, self.offset) {
            (Some(limit), offset) => {
                parts.push("LIMIT :limit".to_string());
                params.push(":limit", clamp_bound(limit));
                if let Some(offset) = offset {
                    parts.push("OFFSET :offset".to_string());
                    params.push(":offset", clamp_bound(offset));
                }
            }
            (None, Some(offset)) => {
                parts.push("LIMIT -1 OFFSET :offset".to_string());
                params.push(":offset", clamp_bound(offset));
            }
            (None, None) => {}
        }
        parts
    }

    fn has_bounds(&self) -> bool {
        self.limit.is_some() || self.offset.is_some() || !self.orderings.is_empty()
    }

    /// Row selection for UPDATE/DELETE. SQLite has no ORDER BY/LIMIT on those, and
    /// cannot join in them either, so both cases select ids through a subquery.
    fn write_selection(&self, params: &mut Params) -> Result<Option<String>> {
        let joined = matches!(self.source, Source::Join { .. });
        if !self.has_bounds() && !joined {
            return self.where_clause(params);
        }
        let mut inner = vec![format!(
            "SELECT {}.id FROM {}",
            self.source.target(),
            self.source.from_clause()
        )];
        inner.extend(self.where_clause(params)?);
        inner.extend(self.bounds(params));
        Ok(Some(format!("WHERE id IN ({})", inner.join(" "))))
    }
}

/// SQLite binds bounds as signed integers; anything larger means "no bound".
fn clamp_bound(bound: u64) -> i64 {
    i64::try_from(bound).unwrap_or(i64::MAX)
}
