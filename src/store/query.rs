//! Store-neutral filters, ordering and pagination.

use std::cmp::Ordering;

use serde_json::Value;

use super::Row;

/// A row predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
  Eq(String, Value),
  Neq(String, Value),
  Gt(String, Value),
  Gte(String, Value),
  Lt(String, Value),
  Lte(String, Value),
  /// Column value is one of the listed values
  In(String, Vec<Value>),
  /// Array column shares at least one element with the list
  Overlaps(String, Vec<Value>),
  IsNull(String),
  NotNull(String),
  /// Case-insensitive substring match on a string column
  ILike(String, String),
  /// At least one of the nested filters matches
  Any(Vec<Filter>),
}

impl Filter {
  pub fn eq(column: &str, value: impl Into<Value>) -> Self {
    Self::Eq(column.to_string(), value.into())
  }

  pub fn matches(&self, row: &Row) -> bool {
    match self {
      Self::Eq(col, v) => field(row, col).is_some_and(|f| values_equal(f, v)),
      Self::Neq(col, v) => !field(row, col).is_some_and(|f| values_equal(f, v)),
      Self::Gt(col, v) => cmp_field(row, col, v) == Some(Ordering::Greater),
      Self::Gte(col, v) => matches!(
        cmp_field(row, col, v),
        Some(Ordering::Greater | Ordering::Equal)
      ),
      Self::Lt(col, v) => cmp_field(row, col, v) == Some(Ordering::Less),
      Self::Lte(col, v) => matches!(
        cmp_field(row, col, v),
        Some(Ordering::Less | Ordering::Equal)
      ),
      Self::In(col, values) => {
        field(row, col).is_some_and(|f| values.iter().any(|v| values_equal(f, v)))
      }
      Self::Overlaps(col, values) => match field(row, col) {
        Some(Value::Array(items)) => items
          .iter()
          .any(|item| values.iter().any(|v| values_equal(item, v))),
        _ => false,
      },
      Self::IsNull(col) => field(row, col).is_none(),
      Self::NotNull(col) => field(row, col).is_some(),
      Self::ILike(col, needle) => match field(row, col) {
        Some(Value::String(s)) => s.to_lowercase().contains(&needle.to_lowercase()),
        _ => false,
      },
      Self::Any(filters) => filters.iter().any(|f| f.matches(row)),
    }
  }
}

/// Sort direction for [`Query::order`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
  Asc,
  Desc,
}

/// A select: filters, ordering and limit/offset pagination.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
  pub filters: Vec<Filter>,
  pub order: Vec<(String, Direction)>,
  pub limit: Option<usize>,
  pub offset: Option<usize>,
}

impl Query {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn filter(mut self, filter: Filter) -> Self {
    self.filters.push(filter);
    self
  }

  pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
    self.filter(Filter::Eq(column.to_string(), value.into()))
  }

  pub fn in_list(self, column: &str, values: Vec<Value>) -> Self {
    self.filter(Filter::In(column.to_string(), values))
  }

  pub fn overlaps(self, column: &str, values: Vec<Value>) -> Self {
    self.filter(Filter::Overlaps(column.to_string(), values))
  }

  pub fn not_null(self, column: &str) -> Self {
    self.filter(Filter::NotNull(column.to_string()))
  }

  pub fn order(mut self, column: &str, direction: Direction) -> Self {
    self.order.push((column.to_string(), direction));
    self
  }

  pub fn limit(mut self, limit: usize) -> Self {
    self.limit = Some(limit);
    self
  }

  pub fn offset(mut self, offset: usize) -> Self {
    self.offset = Some(offset);
    self
  }

  pub fn matches(&self, row: &Row) -> bool {
    self.filters.iter().all(|f| f.matches(row))
  }

  /// Evaluate the query against an unordered set of rows.
  pub fn apply(&self, rows: impl IntoIterator<Item = Row>) -> Vec<Row> {
    let mut rows: Vec<Row> = rows.into_iter().filter(|r| self.matches(r)).collect();

    if !self.order.is_empty() {
      rows.sort_by(|a, b| {
        for (col, direction) in &self.order {
          let ord = compare_optional(field(a, col), field(b, col));
          let ord = match direction {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
          };
          if ord != Ordering::Equal {
            return ord;
          }
        }
        Ordering::Equal
      });
    }

    let offset = self.offset.unwrap_or(0);
    let limit = self.limit.unwrap_or(usize::MAX);
    rows.into_iter().skip(offset).take(limit).collect()
  }
}

/// Non-null field value.
fn field<'a>(row: &'a Row, column: &str) -> Option<&'a Value> {
  row.get(column).filter(|v| !v.is_null())
}

fn cmp_field(row: &Row, column: &str, value: &Value) -> Option<Ordering> {
  compare_values(field(row, column)?, value)
}

fn values_equal(a: &Value, b: &Value) -> bool {
  match (a, b) {
    (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Some(Ordering::Equal),
    // Ids may be stored as numbers and queried as strings
    (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
      n.to_string() == *s
    }
    _ => a == b,
  }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
  match (a, b) {
    (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
    (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
    (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
    _ => None,
  }
}

/// Nulls sort first in ascending order.
fn compare_optional(a: Option<&Value>, b: Option<&Value>) -> Ordering {
  match (a, b) {
    (None, None) => Ordering::Equal,
    (None, Some(_)) => Ordering::Less,
    (Some(_), None) => Ordering::Greater,
    (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn row(value: Value) -> Row {
    match value {
      Value::Object(map) => map,
      _ => unreachable!(),
    }
  }

  fn sample() -> Vec<Row> {
    vec![
      row(json!({"id": "1", "kind": "question", "likes": 3, "tags": ["rust", "async"], "created_at": "2024-01-01"})),
      row(json!({"id": "2", "kind": "showcase", "likes": 10, "tags": ["vue"], "created_at": "2024-03-01"})),
      row(json!({"id": "3", "kind": "question", "likes": 0, "tags": [], "created_at": "2024-02-01", "repo": null})),
    ]
  }

  fn ids(rows: &[Row]) -> Vec<&str> {
    rows.iter().filter_map(|r| r["id"].as_str()).collect()
  }

  #[test]
  fn test_eq_and_order_desc() {
    let rows = Query::new()
      .eq("kind", "question")
      .order("created_at", Direction::Desc)
      .apply(sample());
    assert_eq!(ids(&rows), vec!["3", "1"]);
  }

  #[test]
  fn test_overlaps_matches_any_shared_tag() {
    let rows = Query::new()
      .overlaps("tags", vec![json!("vue"), json!("rust")])
      .apply(sample());
    assert_eq!(ids(&rows), vec!["1", "2"]);
  }

  #[test]
  fn test_range_and_in() {
    let rows = Query::new()
      .filter(Filter::Gte("likes".into(), json!(3)))
      .in_list("id", vec![json!("1"), json!("3")])
      .apply(sample());
    assert_eq!(ids(&rows), vec!["1"]);
  }

  #[test]
  fn test_null_checks_treat_json_null_as_missing() {
    let rows = Query::new().filter(Filter::IsNull("repo".into())).apply(sample());
    assert_eq!(rows.len(), 3);
  }

  #[test]
  fn test_limit_offset() {
    let rows = Query::new()
      .order("likes", Direction::Desc)
      .offset(1)
      .limit(1)
      .apply(sample());
    assert_eq!(ids(&rows), vec!["1"]);
  }

  #[test]
  fn test_any_with_ilike() {
    let rows = Query::new()
      .filter(Filter::Any(vec![
        Filter::ILike("kind".into(), "SHOW".into()),
        Filter::Eq("id".into(), json!(3)),
      ]))
      .apply(sample());
    assert_eq!(ids(&rows), vec!["2", "3"]);
  }
}
