use crate::row::Row;
use crate::value::Value;
use std::collections::{BTreeMap, VecDeque};

/// Position of a collection that has never been iterated.
pub const UNPOSITIONED: i64 = -1;

#[derive(Debug, Default)]
enum State {
    #[default]
    Unexecuted,
    Active(VecDeque<Row>),
    Exhausted,
}

/// Forward-only, single-pass view over a SELECT result.
///
/// The result set is fetched when the collection executes and then handed out
/// one row at a time. Ids are remembered per position so buffered writes can be
/// flushed after the pass.
#[derive(Debug)]
pub struct Cursor {
    state: State,
    position: i64,
    current: Option<Row>,
    ids: BTreeMap<i64, Value>,
}

impl Default for Cursor {
    fn default() -> Self {
        Self {
            state: State::Unexecuted,
            position: UNPOSITIONED,
            current: None,
            ids: BTreeMap::new(),
        }
    }
}

impl Cursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// True until rows are loaded, and again once the pass is exhausted.
    pub fn needs_execution(&self) -> bool {
        !matches!(self.state, State::Active(_))
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, State::Exhausted)
    }

    pub fn load(&mut self, rows: Vec<Row>) {
        self.state = State::Active(rows.into());
    }

    pub fn reset_position(&mut self) {
        self.position = UNPOSITIONED;
    }

    pub fn advance(&mut self) {
        let State::Active(pending) = &mut self.state else {
            return;
        };
        self.position += 1;
        self.current = pending.pop_front();
        match &self.current {
            Some(row) => {
                let id = row.get("id").cloned().unwrap_or(Value::Null);
                self.ids.insert(self.position, id);
            }
            None => self.state = State::Exhausted,
        }
    }

    pub fn current(&self) -> Option<&Row> {
        self.current.as_ref()
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn id_at(&self, position: i64) -> Option<&Value> {
        self.ids.get(&position)
    }
}
