//! SQLite store adapter.
//!
//! Rows are kept as JSON documents keyed by `(table, id)`. Filtering and
//! ordering reuse [`Query::apply`], so the adapter only needs document reads
//! and writes. Every statement runs on the blocking pool.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use color_eyre::eyre::eyre;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde_json::Value;

use super::{bump_counter, row_id, Filter, Query, Row, Store};
use crate::error::{Error, Result};

/// Schema for the document tables.
const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    tbl TEXT NOT NULL,
    id TEXT NOT NULL,
    data TEXT NOT NULL,
    PRIMARY KEY (tbl, id)
);

CREATE TABLE IF NOT EXISTS sequences (
    tbl TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);
"#;

/// SQLite-backed implementation of [`Store`].
#[derive(Clone)]
pub struct SqliteStore {
  conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
  /// Open (or create) the store at `path`.
  pub fn open(path: &Path) -> color_eyre::Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create store directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open store at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  pub fn open_in_memory() -> color_eyre::Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory store: {}", e))?;
    Self::from_connection(conn)
  }

  /// Get the default database path.
  pub fn default_path() -> color_eyre::Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("devhub").join("store.db"))
  }

  fn from_connection(conn: Connection) -> color_eyre::Result<Self> {
    conn
      .execute_batch(STORE_SCHEMA)
      .map_err(|e| eyre!("Failed to run store migrations: {}", e))?;

    Ok(Self {
      conn: Arc::new(Mutex::new(conn)),
    })
  }

  /// Run `f` against the connection on the blocking pool.
  async fn with_conn<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
  {
    let conn = Arc::clone(&self.conn);
    tokio::task::spawn_blocking(move || {
      let mut conn = conn
        .lock()
        .map_err(|e| Error::remote(format!("Lock poisoned: {}", e)))?;
      f(&mut conn)
    })
    .await?
  }
}

fn load_rows(conn: &Connection, table: &str) -> Result<Vec<Row>> {
  let mut stmt = conn.prepare("SELECT data FROM documents WHERE tbl = ?")?;
  let rows = stmt
    .query_map(params![table], |row| row.get::<_, String>(0))?
    .collect::<rusqlite::Result<Vec<String>>>()?;

  rows
    .iter()
    .map(|data| match serde_json::from_str::<Value>(data)? {
      Value::Object(row) => Ok(row),
      other => Err(Error::Decode(format!("stored document is not an object: {}", other))),
    })
    .collect()
}

fn insert_row(conn: &Connection, table: &str, id: &str, row: &Row) -> Result<()> {
  let data = serde_json::to_string(row)?;
  conn
    .execute(
      "INSERT INTO documents (tbl, id, data) VALUES (?, ?, ?)",
      params![table, id, data],
    )
    .map_err(|e| match e {
      rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
        Error::remote(format!("{} {} already exists", table, id))
      }
      other => other.into(),
    })?;
  Ok(())
}

fn replace_row(conn: &Connection, table: &str, id: &str, row: &Row) -> Result<()> {
  let data = serde_json::to_string(row)?;
  conn.execute(
    "UPDATE documents SET data = ? WHERE tbl = ? AND id = ?",
    params![data, table, id],
  )?;
  Ok(())
}

/// Next sequence value for `table` that no stored row uses yet.
fn next_free_id(conn: &Connection, table: &str) -> Result<String> {
  loop {
    let next: i64 = conn.query_row(
      "INSERT INTO sequences (tbl, value) VALUES (?, 1)
       ON CONFLICT(tbl) DO UPDATE SET value = value + 1
       RETURNING value",
      params![table],
      |r| r.get(0),
    )?;
    let id = next.to_string();
    let taken = conn
      .query_row(
        "SELECT 1 FROM documents WHERE tbl = ? AND id = ?",
        params![table, id],
        |_| Ok(()),
      )
      .optional()?
      .is_some();
    if !taken {
      return Ok(id);
    }
  }
}

fn matching(rows: Vec<Row>, filters: &[Filter]) -> Vec<Row> {
  rows
    .into_iter()
    .filter(|row| filters.iter().all(|f| f.matches(row)))
    .collect()
}

#[async_trait]
impl Store for SqliteStore {
  async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>> {
    let table = table.to_string();
    let query = query.clone();
    self
      .with_conn(move |conn| Ok(query.apply(load_rows(conn, &table)?)))
      .await
  }

  async fn insert(&self, table: &str, row: Row) -> Result<Row> {
    let table = table.to_string();
    self
      .with_conn(move |conn| {
        let tx = conn.transaction()?;
        let mut row = row;
        let id = match row_id(&row) {
          Some(id) => id,
          None => {
            let id = next_free_id(&tx, &table)?;
            row.insert("id".to_string(), Value::String(id.clone()));
            id
          }
        };
        insert_row(&tx, &table, &id, &row)?;
        tx.commit()?;
        Ok(row)
      })
      .await
  }

  async fn update(&self, table: &str, filters: &[Filter], patch: Row) -> Result<Vec<Row>> {
    let table = table.to_string();
    let filters = filters.to_vec();
    self
      .with_conn(move |conn| {
        let tx = conn.transaction()?;
        let mut updated = Vec::new();
        for mut row in matching(load_rows(&tx, &table)?, &filters) {
          let Some(id) = row_id(&row) else { continue };
          row.extend(patch.clone());
          replace_row(&tx, &table, &id, &row)?;
          updated.push(row);
        }
        tx.commit()?;
        Ok(updated)
      })
      .await
  }

  async fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize> {
    let table = table.to_string();
    let filters = filters.to_vec();
    self
      .with_conn(move |conn| {
        let tx = conn.transaction()?;
        let mut removed = 0;
        for row in matching(load_rows(&tx, &table)?, &filters) {
          if let Some(id) = row_id(&row) {
            removed += tx.execute(
              "DELETE FROM documents WHERE tbl = ? AND id = ?",
              params![table, id],
            )?;
          }
        }
        tx.commit()?;
        Ok(removed)
      })
      .await
  }

  async fn adjust_counter(&self, table: &str, id: &str, column: &str, delta: i64) -> Result<i64> {
    let table = table.to_string();
    let id = id.to_string();
    let column = column.to_string();
    self
      .with_conn(move |conn| {
        let tx = conn.transaction()?;
        let data: Option<String> = tx
          .query_row(
            "SELECT data FROM documents WHERE tbl = ? AND id = ?",
            params![table, id],
            |r| r.get(0),
          )
          .optional()?;
        let data = data.ok_or_else(|| Error::NotFound(format!("{} {}", table, id)))?;
        let mut row: Row = serde_json::from_str(&data)?;
        let next = bump_counter(&mut row, &column, delta);
        replace_row(&tx, &table, &id, &row)?;
        tx.commit()?;
        Ok(next)
      })
      .await
  }

  async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64> {
    let table = table.to_string();
    let filters = filters.to_vec();
    self
      .with_conn(move |conn| Ok(matching(load_rows(conn, &table)?, &filters).len() as u64))
      .await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::Direction;
  use serde_json::json;

  fn row(value: Value) -> Row {
    match value {
      Value::Object(map) => map,
      _ => unreachable!(),
    }
  }

  #[tokio::test]
  async fn test_round_trip_through_documents() {
    let store = SqliteStore::open_in_memory().unwrap();
    let first = store
      .insert("posts", row(json!({"title": "a", "likes": 2})))
      .await
      .unwrap();
    store
      .insert("posts", row(json!({"title": "b", "likes": 5})))
      .await
      .unwrap();

    assert_eq!(first["id"], "1");

    let rows = store
      .select("posts", &Query::new().order("likes", Direction::Desc))
      .await
      .unwrap();
    assert_eq!(rows[0]["title"], "b");
    assert_eq!(rows.len(), 2);
  }

  #[tokio::test]
  async fn test_counter_and_delete() {
    let store = SqliteStore::open_in_memory().unwrap();
    store
      .insert("posts", row(json!({"id": "p1", "likes": 0})))
      .await
      .unwrap();

    assert_eq!(store.adjust_counter("posts", "p1", "likes", 1).await.unwrap(), 1);
    assert_eq!(store.adjust_counter("posts", "p1", "likes", -3).await.unwrap(), 0);

    let updated = store
      .update("posts", &[Filter::eq("id", "p1")], row(json!({"title": "t"})))
      .await
      .unwrap();
    assert_eq!(updated[0]["likes"], 0);

    assert_eq!(store.delete("posts", &[Filter::eq("id", "p1")]).await.unwrap(), 1);
    assert_eq!(store.count("posts", &[]).await.unwrap(), 0);
  }

  #[tokio::test]
  async fn test_insert_never_replaces_existing_rows() {
    let store = SqliteStore::open_in_memory().unwrap();
    store
      .insert("posts", row(json!({"id": "1", "title": "keep me"})))
      .await
      .unwrap();

    let auto = store
      .insert("posts", row(json!({"title": "auto id"})))
      .await
      .unwrap();
    assert_eq!(auto["id"], "2");

    let duplicate = store
      .insert("posts", row(json!({"id": "1", "title": "clobber"})))
      .await;
    assert!(matches!(duplicate, Err(Error::RemoteFailure(_))));

    let kept = store
      .select_one("posts", &Query::new().eq("id", "1"))
      .await
      .unwrap();
    assert_eq!(kept["title"], "keep me");
    assert_eq!(store.count("posts", &[]).await.unwrap(), 2);
  }

  #[tokio::test]
  async fn test_missing_counter_row() {
    let store = SqliteStore::open_in_memory().unwrap();
    let result = store.adjust_counter("posts", "nope", "likes", 1).await;
    assert!(matches!(result, Err(Error::NotFound(_))));
  }
}
