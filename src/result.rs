//! Query results assembled from backend messages.
use std::sync::Arc;

use crate::{
    common::ByteStr,
    protocol::{Oid, PgFormat, ServerError},
    types::Value,
};

/// Description of a single result column.
#[derive(Clone, Debug)]
pub struct FieldDescriptor {
    pub name: ByteStr,
    pub table_oid: Oid,
    pub column_attr: i16,
    pub type_oid: Oid,
    pub type_size: i16,
    pub type_modifier: i32,
    pub format: PgFormat,
}

/// A single decoded row.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub(crate) fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl std::ops::Index<usize> for Row {
    type Output = Value;

    fn index(&self, index: usize) -> &Self::Output {
        &self.values[index]
    }
}

/// Result of one statement within a query cycle.
///
/// A simple query string may contain multiple statements, each yields
/// its own result.
#[derive(Clone, Debug)]
pub struct StatementResult {
    pub(crate) fields: Option<Arc<[FieldDescriptor]>>,
    pub(crate) rows: Option<Vec<Row>>,
    pub(crate) tag: ByteStr,
}

impl StatementResult {
    /// Column descriptions, `None` for statements which return no rows.
    pub fn fields(&self) -> Option<&[FieldDescriptor]> {
        self.fields.as_deref()
    }

    pub fn rows(&self) -> &[Row] {
        self.rows.as_deref().unwrap_or(&[])
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows.unwrap_or_default()
    }

    /// Command tag reported by `CommandComplete`, e.g `INSERT 0 1`.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Rows affected as reported by the command tag, if any.
    pub fn rows_affected(&self) -> Option<u64> {
        let (_, count) = self.tag.rsplit_once(' ')?;
        count.parse().ok()
    }
}

/// Outcome of a query cycle, delivered at `ReadyForQuery`.
#[derive(Debug)]
pub enum QueryOutcome {
    Complete(Vec<StatementResult>),
    Failed(ServerError),
}

impl QueryOutcome {
    pub fn into_result(self) -> Result<Vec<StatementResult>, ServerError> {
        match self {
            Self::Complete(results) => Ok(results),
            Self::Failed(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn result(tag: &'static str) -> StatementResult {
        StatementResult { fields: None, rows: None, tag: ByteStr::from_static(tag) }
    }

    #[test]
    fn rows_affected_from_tag() {
        assert_eq!(result("INSERT 0 4").rows_affected(), Some(4));
        assert_eq!(result("UPDATE 12").rows_affected(), Some(12));
        assert_eq!(result("SELECT 3").rows_affected(), Some(3));
        assert_eq!(result("BEGIN").rows_affected(), None);
        assert_eq!(result("CREATE TABLE").rows_affected(), None);
    }
}
