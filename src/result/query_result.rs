use crate::core::{Row, Value};
use serde::{Deserialize, Serialize};

/// Rows returned by one statement execution, as produced by the driver and
/// as stored in a cache model.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Case-insensitive column lookup.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// First column of the first row, if any.
    pub fn first_value(&self) -> Option<&Value> {
        self.rows.first().and_then(|r| r.first())
    }

    /// Keeps at most `max` rows after skipping `skip`.
    pub fn page(mut self, skip: usize, max: Option<usize>) -> Self {
        let rows: Vec<Row> = self.rows.drain(..).skip(skip).collect();
        self.rows = match max {
            Some(max) => rows.into_iter().take(max).collect(),
            None => rows,
        };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> QueryResult {
        QueryResult::new(
            vec!["ID".into(), "name".into()],
            vec![
                vec![Value::Integer(1), Value::from("a")],
                vec![Value::Integer(2), Value::from("b")],
                vec![Value::Integer(3), Value::from("c")],
            ],
        )
    }

    #[test]
    fn test_column_lookup_ignores_case() {
        let result = sample();
        assert_eq!(result.column_index("id"), Some(0));
        assert_eq!(result.value(1, "NAME"), Some(&Value::from("b")));
        assert_eq!(result.first_value(), Some(&Value::Integer(1)));
    }

    #[test]
    fn test_page() {
        let paged = sample().page(1, Some(1));
        assert_eq!(paged.row_count(), 1);
        assert_eq!(paged.rows[0][0], Value::Integer(2));
        assert_eq!(sample().page(2, None).row_count(), 1);
    }
}
