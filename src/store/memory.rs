//! In-memory store adapter.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{bump_counter, row_id, Filter, Query, Row, Store};
use crate::error::{Error, Result};

/// Store operations, used to inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
  Select,
  Insert,
  Update,
  Delete,
  AdjustCounter,
  Count,
}

/// Tables held in memory.
///
/// Failures can be scheduled per `(Op, table)` to exercise the error paths of
/// callers; every call is counted.
#[derive(Default)]
pub struct MemoryStore {
  tables: RwLock<HashMap<String, Vec<Row>>>,
  next_id: AtomicU64,
  calls: AtomicUsize,
  failures: Mutex<HashSet<(Op, String)>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Seed a table with rows as-is.
  pub async fn seed(&self, table: &str, rows: Vec<Row>) {
    let mut tables = self.tables.write().await;
    tables.entry(table.to_string()).or_default().extend(rows);
  }

  /// Make every subsequent `op` on `table` fail.
  pub fn fail_on(&self, op: Op, table: &str) {
    self.failures().insert((op, table.to_string()));
  }

  pub fn clear_failures(&self) {
    self.failures().clear();
  }

  /// Number of store calls made so far.
  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  fn failures(&self) -> std::sync::MutexGuard<'_, HashSet<(Op, String)>> {
    self.failures.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn enter(&self, op: Op, table: &str) -> Result<()> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    if self.failures().contains(&(op, table.to_string())) {
      return Err(Error::remote(format!("{:?} on {} rejected", op, table)));
    }
    Ok(())
  }
}

#[async_trait]
impl Store for MemoryStore {
  async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>> {
    self.enter(Op::Select, table)?;
    let tables = self.tables.read().await;
    let rows = tables.get(table).cloned().unwrap_or_default();
    Ok(query.apply(rows))
  }

  async fn insert(&self, table: &str, mut row: Row) -> Result<Row> {
    self.enter(Op::Insert, table)?;
    let mut tables = self.tables.write().await;
    let rows = tables.entry(table.to_string()).or_default();
    let taken = |id: &str| rows.iter().any(|r| row_id(r).as_deref() == Some(id));

    match row_id(&row) {
      Some(id) if taken(&id) => {
        return Err(Error::remote(format!("{} {} already exists", table, id)));
      }
      Some(_) => {}
      None => {
        let id = loop {
          let next = (self.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string();
          if !taken(&next) {
            break next;
          }
        };
        row.insert("id".to_string(), Value::String(id));
      }
    }

    rows.push(row.clone());
    Ok(row)
  }

  async fn update(&self, table: &str, filters: &[Filter], patch: Row) -> Result<Vec<Row>> {
    self.enter(Op::Update, table)?;
    let mut tables = self.tables.write().await;
    let mut updated = Vec::new();
    for row in tables.entry(table.to_string()).or_default().iter_mut() {
      if filters.iter().all(|f| f.matches(row)) {
        row.extend(patch.clone());
        updated.push(row.clone());
      }
    }
    Ok(updated)
  }

  async fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize> {
    self.enter(Op::Delete, table)?;
    let mut tables = self.tables.write().await;
    let rows = tables.entry(table.to_string()).or_default();
    let before = rows.len();
    rows.retain(|row| !filters.iter().all(|f| f.matches(row)));
    Ok(before - rows.len())
  }

  async fn adjust_counter(&self, table: &str, id: &str, column: &str, delta: i64) -> Result<i64> {
    self.enter(Op::AdjustCounter, table)?;
    let mut tables = self.tables.write().await;
    let row = tables
      .get_mut(table)
      .and_then(|rows| {
        rows
          .iter_mut()
          .find(|row| row_id(row).as_deref() == Some(id))
      })
      .ok_or_else(|| Error::NotFound(format!("{} {}", table, id)))?;
    Ok(bump_counter(row, column, delta))
  }

  async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64> {
    self.enter(Op::Count, table)?;
    let tables = self.tables.read().await;
    let count = tables
      .get(table)
      .map(|rows| {
        rows
          .iter()
          .filter(|row| filters.iter().all(|f| f.matches(row)))
          .count()
      })
      .unwrap_or(0);
    Ok(count as u64)
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

  #[tokio::test]
  async fn test_insert_assigns_ids() {
    let store = MemoryStore::new();
    let a = store.insert("t", row(json!({"n": 1}))).await.unwrap();
    let b = store.insert("t", row(json!({"n": 2}))).await.unwrap();
    assert_ne!(a["id"], b["id"]);
    assert_eq!(store.count("t", &[]).await.unwrap(), 2);
  }

  #[tokio::test]
  async fn test_insert_skips_seeded_ids() {
    let store = MemoryStore::new();
    store.seed("t", vec![row(json!({"id": "1", "n": 0}))]).await;

    let next = store.insert("t", row(json!({"n": 1}))).await.unwrap();
    assert_eq!(next["id"], "2");

    let duplicate = store.insert("t", row(json!({"id": "1", "n": 2}))).await;
    assert!(matches!(duplicate, Err(Error::RemoteFailure(_))));
    assert_eq!(store.count("t", &[]).await.unwrap(), 2);
  }

  #[tokio::test]
  async fn test_update_and_delete_by_filter() {
    let store = MemoryStore::new();
    store
      .seed("t", vec![row(json!({"id": "1", "owner": "a"})), row(json!({"id": "2", "owner": "b"}))])
      .await;

    let updated = store
      .update("t", &[Filter::eq("owner", "a")], row(json!({"title": "x"})))
      .await
      .unwrap();
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0]["title"], "x");

    let removed = store.delete("t", &[Filter::eq("owner", "b")]).await.unwrap();
    assert_eq!(removed, 1);
    assert_eq!(store.count("t", &[]).await.unwrap(), 1);
  }

  #[tokio::test]
  async fn test_adjust_counter_floors_at_zero() {
    let store = MemoryStore::new();
    store.seed("t", vec![row(json!({"id": "1", "likes": 1}))]).await;

    assert_eq!(store.adjust_counter("t", "1", "likes", 1).await.unwrap(), 2);
    assert_eq!(store.adjust_counter("t", "1", "likes", -5).await.unwrap(), 0);
    assert!(matches!(
      store.adjust_counter("t", "9", "likes", 1).await,
      Err(Error::NotFound(_))
    ));
  }

  #[tokio::test]
  async fn test_injected_failure() {
    let store = MemoryStore::new();
    store.fail_on(Op::Insert, "t");
    assert!(matches!(
      store.insert("t", Row::new()).await,
      Err(Error::RemoteFailure(_))
    ));
    store.clear_failures();
    assert!(store.insert("t", Row::new()).await.is_ok());
    assert_eq!(store.calls(), 2);
  }

  #[tokio::test]
  async fn test_select_one_not_found() {
    let store = MemoryStore::new();
    let result = store.select_one("t", &Query::new().eq("id", "x")).await;
    assert!(matches!(result, Err(Error::NotFound(_))));
  }
}
