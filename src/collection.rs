//! Chainable, lazily-executed collections of rows.

use crate::cursor::{Cursor, UNPOSITIONED};
use crate::database::Database;
use crate::error::{Error, Result};
use crate::mutation::MutationBuffer;
use crate::query::{Direction, FieldMap, Filter, Operand, Ordering, QueryShape, Source};
use crate::relation::{self, link_column, resolve_relation, row_id, Field, RelationKind};
use crate::row::Row;
use crate::value::Value;

/// A deferred query over one table, doubling as a cursor over its rows.
///
/// Chaining (`filter`, `order`, `limit`, `offset`) never changes the receiver;
/// it returns a new collection with the extra clause and a fresh cursor. Cursor
/// state, the cached count and staged writes are per instance.
///
/// ```rust,ignore
/// let db = Database::open_in_memory()?;
/// let mut adults = db.collection("Users")?.filter("age", ">=", 18).order("name", Direction::Asc);
/// println!("{} adults", adults.count()?);
/// for user in adults.iter() {
///     let user = user?;
///     println!("{}", user.value("name")?);
/// }
/// ```
#[derive(Debug)]
pub struct Collection<'db> {
    db: &'db Database,
    shape: QueryShape,
    cursor: Cursor,
    count: Option<i64>,
    mutations: MutationBuffer,
}

impl<'db> Collection<'db> {
    /// Collection over every row of `table`, which must be a known table.
    pub fn new(db: &'db Database, table: &str) -> Result<Self> {
        if !db.registry()?.contains(table) {
            return Err(Error::TableNotFound(table.to_string()));
        }
        Ok(Self::unchecked(db, Source::Table(table.to_string())))
    }

    /// Collection over `source` without an existence check.
    pub(crate) fn unchecked(db: &'db Database, source: Source) -> Self {
        Self::from_shape(db, QueryShape::new(source))
    }

    /// Rows of `target` reachable through `junction`.
    pub(crate) fn join(db: &'db Database, junction: &str, target: &str) -> Self {
        Self::unchecked(
            db,
            Source::Join {
                junction: junction.to_string(),
                target: target.to_string(),
            },
        )
    }

    fn from_shape(db: &'db Database, shape: QueryShape) -> Self {
        Self {
            db,
            shape,
            cursor: Cursor::new(),
            count: None,
            mutations: MutationBuffer::new(),
        }
    }

    fn derive(&self, change: impl FnOnce(&mut QueryShape)) -> Self {
        let mut shape = self.shape.clone();
        change(&mut shape);
        Self::from_shape(self.db, shape)
    }

    /// Table the rows belong to.
    pub fn table(&self) -> &str {
        self.shape.source.target()
    }

    pub fn source(&self) -> &Source {
        &self.shape.source
    }

    pub fn shape(&self) -> &QueryShape {
        &self.shape
    }

    pub fn filter(&self, field: impl Into<String>, operator: &str, value: impl Into<Value>) -> Self {
        self.with_filter(Filter::new(field, operator, Operand::Bind(value.into())))
    }

    /// Filter whose right-hand side is inlined as SQL, e.g. `Tasks.id`.
    pub fn filter_raw(
        &self,
        field: impl Into<String>,
        operator: &str,
        fragment: impl Into<String>,
    ) -> Self {
        self.with_filter(Filter::new(field, operator, Operand::Raw(fragment.into())))
    }

    pub fn between(
        &self,
        field: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.with_filter(Filter::new(
            field,
            "BETWEEN",
            Operand::Range(low.into(), high.into()),
        ))
    }

    pub fn with_filter(&self, filter: Filter) -> Self {
        self.derive(|shape| shape.filters.push(filter))
    }

    pub fn order(&self, field: impl Into<String>, direction: Direction) -> Self {
        let field = field.into();
        self.derive(|shape| shape.orderings.push(Ordering { field, direction }))
    }

    pub fn limit(&self, limit: u64) -> Self {
        self.derive(|shape| shape.limit = Some(limit))
    }

    pub fn offset(&self, offset: u64) -> Self {
        self.derive(|shape| shape.offset = Some(offset))
    }

    /// Number of rows the collection yields. Computed once per collection.
    pub fn count(&mut self) -> Result<i64> {
        if let Some(count) = self.count {
            return Ok(count);
        }
        let total = self
            .db
            .fetch_scalar(&self.shape.count()?)?
            .as_i64()
            .unwrap_or(0);
        let skipped = self
            .shape
            .offset
            .map_or(0, |offset| i64::try_from(offset).unwrap_or(i64::MAX));
        let mut count = (total - skipped).max(0);
        if let Some(limit) = self.shape.limit {
            count = count.min(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        self.count = Some(count);
        Ok(count)
    }

    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.count()? == 0)
    }

    /// Start a pass: execute the SELECT if no result is open, then move to the
    /// first row. Rewinding mid-pass keeps reading the open result.
    pub fn rewind(&mut self) -> Result<()> {
        if self.cursor.needs_execution() {
            let rows = self.db.fetch_all(&self.shape.select()?)?;
            self.cursor.load(rows);
        }
        self.cursor.reset_position();
        self.cursor.advance();
        Ok(())
    }

    pub fn advance(&mut self) -> Result<()> {
        if self.cursor.needs_execution() && !self.cursor.is_exhausted() {
            return self.rewind();
        }
        self.cursor.advance();
        Ok(())
    }

    pub fn has_current(&self) -> bool {
        self.cursor.current().is_some()
    }

    /// Position of the current row in this pass, `-1` before the first rewind.
    pub fn position(&self) -> i64 {
        self.cursor.position()
    }

    /// Snapshot of the current row.
    pub fn current(&self) -> Option<RowView<'db>> {
        self.cursor.current().map(|row| RowView {
            db: self.db,
            source: self.shape.source.clone(),
            position: self.cursor.position(),
            row: row.clone(),
        })
    }

    /// Iterate over the rows of a pass, starting with a `rewind`. If a pass is
    /// already open (e.g. after `value` or `get`), iteration continues it and
    /// rows already read are skipped. Use `rewind`/`advance` directly when
    /// writing fields during the pass.
    pub fn iter(&mut self) -> Rows<'_, 'db> {
        Rows {
            collection: self,
            started: false,
            done: false,
        }
    }

    fn materialize(&mut self) -> Result<()> {
        if self.cursor.needs_execution() {
            self.rewind()?;
        }
        Ok(())
    }

    fn current_row(&self) -> Result<&Row> {
        self.cursor
            .current()
            .ok_or_else(|| Error::empty(self.table()))
    }

    /// Read a column or follow a relation on the current row, executing the
    /// query first if needed.
    pub fn get(&mut self, field: &str) -> Result<Field<'db>> {
        self.materialize()?;
        let row = self.current_row()?;
        relation::traverse(self.db, &self.shape.source, field, row)
    }

    /// Column value of the current row.
    pub fn value(&mut self, field: &str) -> Result<Value> {
        self.materialize()?;
        self.current_row()?
            .get(field)
            .cloned()
            .ok_or_else(|| Error::unknown_relation(field, self.table()))
    }

    pub fn id(&mut self) -> Result<Value> {
        self.materialize()?;
        row_id(self.current_row()?, self.table())
    }

    /// Stage a write for the current row. Nothing reaches the database until
    /// [`save`](Self::save).
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.mutations
            .set(self.cursor.position(), field, value.into());
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.mutations.is_empty()
    }

    /// Drop every staged write without touching the database.
    pub fn discard_changes(&mut self) {
        self.mutations.clear();
    }

    /// Flush staged writes, one UPDATE per buffered row.
    ///
    /// Writes staged during a pass are applied by row id. Writes staged before
    /// any pass target the current filters, which must match exactly one row;
    /// otherwise [`Error::AmbiguousSave`] is returned and nothing is written.
    /// Each statement commits on its own: on failure, already flushed rows stay
    /// written and the rest stay buffered. Writes staged during a pass flush
    /// before writes staged ahead of it.
    pub fn save(&mut self) -> Result<()> {
        let (unpositioned, positioned): (Vec<i64>, Vec<i64>) = self
            .mutations
            .positions()
            .into_iter()
            .partition(|position| *position == UNPOSITIONED);
        for position in positioned.into_iter().chain(unpositioned) {
            let Some(fields) = self.mutations.get(position).cloned() else {
                continue;
            };
            if !fields.is_empty() {
                if position == UNPOSITIONED {
                    self.save_unpositioned(&fields)?;
                } else {
                    self.save_position(position, &fields)?;
                }
            }
            self.mutations.remove(position);
        }
        self.count = None;
        Ok(())
    }

    fn save_unpositioned(&mut self, fields: &FieldMap) -> Result<()> {
        self.count = None;
        let matched = self.count()?;
        if matched != 1 {
            return Err(Error::AmbiguousSave {
                table: self.table().to_string(),
                matched,
            });
        }
        self.db.execute(&self.shape.update(fields)?)?;
        Ok(())
    }

    fn save_position(&self, position: i64, fields: &FieldMap) -> Result<()> {
        let id = self
            .cursor
            .id_at(position)
            .cloned()
            .ok_or_else(|| Error::empty(self.table()))?;
        let target = self.by_id(id);
        self.db.execute(&target.shape.update(fields)?)?;
        Ok(())
    }

    /// Single-row collection over the target table.
    fn by_id(&self, id: Value) -> Self {
        Self::unchecked(self.db, Source::Table(self.table().to_string())).filter("id", "=", id)
    }

    /// Apply `fields` to every row the collection selects in one statement.
    pub fn update_all<I, K, V>(&mut self, fields: I) -> Result<usize>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let fields = field_map(fields);
        let affected = self.db.execute(&self.shape.update(&fields)?)?;
        self.count = None;
        Ok(affected)
    }

    /// Insert a row into the table and return a collection selecting it.
    pub fn create_new<I, K, V>(&self, fields: I) -> Result<Collection<'db>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let table = QueryShape::table(self.table());
        self.db.execute(&table.insert(&field_map(fields))?)?;
        let id = self.db.last_insert_id();
        tracing::debug!(table = %self.table(), id, "inserted row");
        Ok(self.by_id(Value::Integer(id)))
    }

    /// Resolve the relation from the current row to `other`'s table.
    fn relation_to(&mut self, other: &Collection<'db>) -> Result<(Row, RelationKind)> {
        self.materialize()?;
        let row = self.current_row()?.clone();
        let field = other.table().to_lowercase();
        let kind = resolve_relation(self.table(), &field, &row, self.db.registry()?)?;
        Ok((row, kind))
    }

    /// Link the current row to `other`'s current row.
    ///
    /// A singular link sets the foreign key column and saves it; a multiple link
    /// inserts a junction row, so linking twice yields two junction rows.
    pub fn link(&mut self, other: &mut Collection<'db>) -> Result<()> {
        let (row, kind) = self.relation_to(other)?;
        let other_id = other.id()?;
        let id = row_id(&row, self.table())?;
        match kind {
            RelationKind::Singular { column, .. } => {
                let mut target = self.by_id(id);
                target.set(column, other_id);
                target.save()
            }
            RelationKind::Multiple { junction, .. } => {
                let junction = Collection::new(self.db, &junction)?;
                junction.create_new([
                    (link_column(self.table()), id),
                    (link_column(other.table()), other_id),
                ])?;
                Ok(())
            }
            RelationKind::Column => Err(Error::unknown_relation(other.table(), self.table())),
        }
    }

    /// Undo [`link`](Self::link): null the foreign key, or delete every matching
    /// junction row.
    pub fn unlink(&mut self, other: &mut Collection<'db>) -> Result<()> {
        let (row, kind) = self.relation_to(other)?;
        let other_id = other.id()?;
        let id = row_id(&row, self.table())?;
        match kind {
            RelationKind::Singular { column, .. } => {
                let mut target = self.by_id(id);
                target.set(column, Value::Null);
                target.save()
            }
            RelationKind::Multiple { junction, .. } => {
                Collection::new(self.db, &junction)?
                    .filter(link_column(self.table()), "=", id)
                    .filter(link_column(other.table()), "=", other_id)
                    .delete()?;
                Ok(())
            }
            RelationKind::Column => Err(Error::unknown_relation(other.table(), self.table())),
        }
    }

    /// Delete every selected row, one statement per row id. Returns the number
    /// of rows removed.
    pub fn delete(&mut self) -> Result<usize> {
        self.cursor = Cursor::new();
        let mut ids = Vec::new();
        self.rewind()?;
        while let Some(row) = self.cursor.current() {
            ids.push(row_id(row, self.table())?);
            self.advance()?;
        }

        let mut deleted = 0;
        for id in ids {
            deleted += self.db.execute(&self.by_id(id).shape.delete()?)?;
        }
        self.count = None;
        tracing::debug!(table = %self.table(), deleted, "deleted rows");
        Ok(deleted)
    }
}

fn field_map<I, K, V>(fields: I) -> FieldMap
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    fields
        .into_iter()
        .map(|(field, value)| (field.into(), value.into()))
        .collect()
}

/// Snapshot of one row, able to follow relations on its own.
#[derive(Debug, Clone)]
pub struct RowView<'db> {
    db: &'db Database,
    source: Source,
    position: i64,
    row: Row,
}

impl<'db> RowView<'db> {
    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn table(&self) -> &str {
        self.source.target()
    }

    pub fn row(&self) -> &Row {
        &self.row
    }

    pub fn get(&self, field: &str) -> Result<Field<'db>> {
        relation::traverse(self.db, &self.source, field, &self.row)
    }

    pub fn value(&self, field: &str) -> Result<Value> {
        self.row
            .get(field)
            .cloned()
            .ok_or_else(|| Error::unknown_relation(field, self.table()))
    }

    pub fn id(&self) -> Result<Value> {
        row_id(&self.row, self.table())
    }
}

/// Iterator returned by [`Collection::iter`].
pub struct Rows<'c, 'db> {
    collection: &'c mut Collection<'db>,
    started: bool,
    done: bool,
}

impl<'c, 'db> Iterator for Rows<'c, 'db> {
    type Item = Result<RowView<'db>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let step = if self.started {
            self.collection.advance()
        } else {
            self.started = true;
            self.collection.rewind()
        };
        if let Err(err) = step {
            self.done = true;
            return Some(Err(err));
        }
        let current = self.collection.current();
        if current.is_none() {
            self.done = true;
        }
        current.map(Ok)
    }
}
