//! Row store seam.
//!
//! The hosted database is consumed only through the [`Store`] trait: filtered
//! selects, insert, update and delete by filter, an atomic counter procedure
//! and a count aggregate. Two adapters live here, an in-memory store used by
//! tests and demos and a local SQLite store that keeps rows as JSON documents.

mod memory;
mod query;
mod sqlite;

use async_trait::async_trait;

use crate::error::{Error, Result};

pub use memory::{MemoryStore, Op};
pub use query::{Direction, Filter, Query};
pub use sqlite::SqliteStore;

/// A row as returned by the store: a JSON object.
pub type Row = serde_json::Map<String, serde_json::Value>;

#[async_trait]
pub trait Store: Send + Sync {
  /// Rows of `table` matching the query, ordered and sliced.
  async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>>;

  /// Insert a row. An `id` is assigned when the row has none.
  async fn insert(&self, table: &str, row: Row) -> Result<Row>;

  /// Merge `patch` into every matching row, returning the updated rows.
  async fn update(&self, table: &str, filters: &[Filter], patch: Row) -> Result<Vec<Row>>;

  /// Delete every matching row, returning how many were removed.
  async fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize>;

  /// Atomically add `delta` to a numeric column of the row with `id`.
  ///
  /// The counter never drops below zero. Returns the new value.
  async fn adjust_counter(&self, table: &str, id: &str, column: &str, delta: i64) -> Result<i64>;

  async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64>;

  /// First matching row, or `NotFound`.
  async fn select_one(&self, table: &str, query: &Query) -> Result<Row> {
    let query = query.clone().limit(1);
    self
      .select(table, &query)
      .await?
      .into_iter()
      .next()
      .ok_or_else(|| Error::NotFound(format!("no matching row in {}", table)))
  }
}

/// Read a string field from a row.
pub fn row_str<'a>(row: &'a Row, column: &str) -> Option<&'a str> {
  row.get(column).and_then(|v| v.as_str())
}

/// Value of the `id` column as a string (ids may be stored as numbers).
pub fn row_id(row: &Row) -> Option<String> {
  match row.get("id")? {
    serde_json::Value::String(s) => Some(s.clone()),
    serde_json::Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

/// Decode a row into a typed record.
pub fn decode<T: serde::de::DeserializeOwned>(row: Row) -> Result<T> {
  serde_json::from_value(serde_json::Value::Object(row)).map_err(Error::from)
}

/// Encode a typed record into a row.
pub fn encode<T: serde::Serialize>(value: &T) -> Result<Row> {
  match serde_json::to_value(value)? {
    serde_json::Value::Object(row) => Ok(row),
    other => Err(Error::Decode(format!("expected an object, got {}", other))),
  }
}

/// Apply a counter delta with the store-wide floor at zero.
pub(crate) fn bump_counter(row: &mut Row, column: &str, delta: i64) -> i64 {
  let current = row.get(column).and_then(|v| v.as_i64()).unwrap_or(0);
  let next = (current + delta).max(0);
  row.insert(column.to_string(), serde_json::Value::from(next));
  next
}
