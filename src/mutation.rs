use crate::query::FieldMap;
use crate::value::Value;
use std::collections::BTreeMap;

/// Field writes staged per cursor position until the next save.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MutationBuffer {
    pending: BTreeMap<i64, FieldMap>,
}

impl MutationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `field = value` for the row at `position`; a later write to the same
    /// field replaces the earlier one.
    pub fn set(&mut self, position: i64, field: impl Into<String>, value: Value) {
        self.pending
            .entry(position)
            .or_default()
            .insert(field.into(), value);
    }

    pub fn get(&self, position: i64) -> Option<&FieldMap> {
        self.pending.get(&position)
    }

    /// Buffered positions in ascending order.
    pub fn positions(&self) -> Vec<i64> {
        self.pending.keys().copied().collect()
    }

    pub fn remove(&mut self, position: i64) -> Option<FieldMap> {
        self.pending.remove(&position)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
