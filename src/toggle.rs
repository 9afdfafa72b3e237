//! Like/unlike as an idempotent toggle paired with a counter on the subject.
//!
//! The source of truth is one existence row per `(subject, actor)` in a likes
//! table. The subject row carries a denormalized counter that must equal the
//! number of existence rows. The coordinator never reads the counter and
//! writes it back; it either rewrites it from a live count (`Recount`) or asks
//! the store for an atomic adjustment (`Atomic`).

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::Invalidate;
use crate::error::{Error, Result};
use crate::store::{Filter, Query, Row, Store};

/// Identifier of the signed-in user performing an action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ActorId(pub String);

impl ActorId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl std::fmt::Display for ActorId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

/// Where likes and their counter live.
#[derive(Debug, Clone)]
pub struct LikeTarget {
  /// Table holding one row per (subject, actor)
  pub likes_table: String,
  /// Column of the likes table referencing the subject
  pub subject_column: String,
  /// Column of the likes table referencing the actor
  pub actor_column: String,
  /// Table holding the subject rows
  pub subject_table: String,
  /// Counter column on the subject row
  pub counter_column: String,
}

impl LikeTarget {
  pub fn new(
    likes_table: &str,
    subject_column: &str,
    subject_table: &str,
    counter_column: &str,
  ) -> Self {
    Self {
      likes_table: likes_table.to_string(),
      subject_column: subject_column.to_string(),
      actor_column: "user_id".to_string(),
      subject_table: subject_table.to_string(),
      counter_column: counter_column.to_string(),
    }
  }

  fn existence_filters(&self, subject_id: &str, actor: &ActorId) -> Vec<Filter> {
    vec![
      Filter::eq(&self.subject_column, subject_id),
      Filter::eq(&self.actor_column, actor.as_str()),
    ]
  }
}

/// How the subject's counter is maintained after the existence row changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CounterStrategy {
  /// Rewrite the counter from a count of existence rows
  #[default]
  Recount,
  /// Adjust the counter by one through the store's atomic procedure
  Atomic,
}

/// Which cache entries a toggle evicts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationPolicy {
  /// Only entries under these scopes
  Scopes(Vec<String>),
  /// Everything held by the attached caches
  All,
}

/// State after a toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ToggleOutcome {
  pub liked: bool,
  pub count: i64,
}

/// Coordinates like/unlike against a [`Store`].
pub struct ToggleCoordinator<S: ?Sized> {
  store: Arc<S>,
  target: LikeTarget,
  strategy: CounterStrategy,
  policy: InvalidationPolicy,
  caches: Vec<Arc<dyn Invalidate>>,
}

impl<S: Store + ?Sized> ToggleCoordinator<S> {
  pub fn new(store: Arc<S>, target: LikeTarget) -> Self {
    Self {
      store,
      target,
      strategy: CounterStrategy::default(),
      policy: InvalidationPolicy::All,
      caches: Vec::new(),
    }
  }

  pub fn with_strategy(mut self, strategy: CounterStrategy) -> Self {
    self.strategy = strategy;
    self
  }

  pub fn with_policy(mut self, policy: InvalidationPolicy) -> Self {
    self.policy = policy;
    self
  }

  /// Attach a cache to invalidate after every toggle.
  pub fn invalidates(mut self, cache: Arc<dyn Invalidate>) -> Self {
    self.caches.push(cache);
    self
  }

  /// Whether `actor` currently likes `subject_id`.
  pub async fn is_liked(&self, subject_id: &str, actor: &ActorId) -> Result<bool> {
    let query = Query {
      filters: self.target.existence_filters(subject_id, actor),
      ..Query::default()
    }
    .limit(1);
    Ok(!self.store.select(&self.target.likes_table, &query).await?.is_empty())
  }

  /// Subset of `subject_ids` liked by `actor`.
  pub async fn liked_among(&self, subject_ids: &[String], actor: &ActorId) -> Result<Vec<String>> {
    if subject_ids.is_empty() {
      return Ok(Vec::new());
    }

    let query = Query::new()
      .eq(&self.target.actor_column, actor.as_str())
      .in_list(
        &self.target.subject_column,
        subject_ids.iter().cloned().map(Value::String).collect(),
      );
    let rows = self.store.select(&self.target.likes_table, &query).await?;

    Ok(
      rows
        .iter()
        .filter_map(|row| crate::store::row_str(row, &self.target.subject_column))
        .map(String::from)
        .collect(),
    )
  }

  /// Flip the like state of `subject_id` for `actor`.
  ///
  /// 1. No actor - `Unauthenticated`, nothing touched
  /// 2. No subject row - `NotFound`, likes table untouched
  /// 3. Look up the existence row
  /// 4. Delete or insert it, then maintain the counter
  /// 5. Invalidate attached caches
  ///
  /// A failed row write stops before the counter. A failed counter write is
  /// returned without undoing the row write; under `Recount` the next toggle
  /// on the subject restores the counter.
  pub async fn toggle(&self, subject_id: &str, actor: Option<&ActorId>) -> Result<ToggleOutcome> {
    let actor = actor.ok_or(Error::Unauthenticated)?;
    self.require_subject(subject_id).await?;
    let filters = self.target.existence_filters(subject_id, actor);

    let liked = if self.is_liked(subject_id, actor).await? {
      self.store.delete(&self.target.likes_table, &filters).await?;
      false
    } else {
      let mut row = Row::new();
      row.insert(
        self.target.subject_column.clone(),
        Value::String(subject_id.to_string()),
      );
      row.insert(
        self.target.actor_column.clone(),
        Value::String(actor.to_string()),
      );
      self.store.insert(&self.target.likes_table, row).await?;
      true
    };

    let count = match self.update_counter(subject_id, liked).await {
      Ok(count) => count,
      Err(e) => {
        warn!(
          subject = subject_id,
          table = %self.target.subject_table,
          error = %e,
          "like row written but counter update failed"
        );
        self.invalidate();
        return Err(e);
      }
    };

    self.invalidate();
    debug!(subject = subject_id, actor = %actor, liked, count, "like toggled");

    Ok(ToggleOutcome { liked, count })
  }

  async fn require_subject(&self, subject_id: &str) -> Result<()> {
    let query = Query::new().eq("id", subject_id);
    match self.store.select_one(&self.target.subject_table, &query).await {
      Ok(_) => Ok(()),
      Err(Error::NotFound(_)) => Err(Error::NotFound(format!(
        "{} {}",
        self.target.subject_table, subject_id
      ))),
      Err(e) => Err(e),
    }
  }

  async fn update_counter(&self, subject_id: &str, liked: bool) -> Result<i64> {
    match self.strategy {
      CounterStrategy::Atomic => {
        let delta = if liked { 1 } else { -1 };
        self
          .store
          .adjust_counter(
            &self.target.subject_table,
            subject_id,
            &self.target.counter_column,
            delta,
          )
          .await
      }
      CounterStrategy::Recount => {
        let count = self
          .store
          .count(
            &self.target.likes_table,
            &[Filter::eq(&self.target.subject_column, subject_id)],
          )
          .await? as i64;

        let mut patch = Row::new();
        patch.insert(self.target.counter_column.clone(), Value::from(count));
        let updated = self
          .store
          .update(
            &self.target.subject_table,
            &[Filter::eq("id", subject_id)],
            patch,
          )
          .await?;

        if updated.is_empty() {
          return Err(Error::NotFound(format!(
            "{} {}",
            self.target.subject_table, subject_id
          )));
        }
        Ok(count)
      }
    }
  }

  fn invalidate(&self) {
    for cache in &self.caches {
      match &self.policy {
        InvalidationPolicy::All => cache.invalidate_all(),
        InvalidationPolicy::Scopes(scopes) => {
          let scopes: Vec<&str> = scopes.iter().map(String::as_str).collect();
          cache.invalidate_scopes(&scopes);
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::CacheLayer;
  use crate::store::{MemoryStore, Op};
  use serde_json::json;
  use std::time::Duration;

  fn row(value: Value) -> Row {
    match value {
      Value::Object(map) => map,
      _ => unreachable!(),
    }
  }

  fn target() -> LikeTarget {
    LikeTarget::new("post_likes", "post_id", "community_posts", "likes_count")
  }

  async fn store_with_post(likes: i64) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
      .seed(
        "community_posts",
        vec![row(json!({"id": "s", "likes_count": likes}))],
      )
      .await;
    store
  }

  async fn counter(store: &MemoryStore) -> i64 {
    let post = store
      .select_one("community_posts", &Query::new().eq("id", "s"))
      .await
      .unwrap();
    post["likes_count"].as_i64().unwrap()
  }

  #[tokio::test]
  async fn test_double_toggle_is_identity() {
    for strategy in [CounterStrategy::Recount, CounterStrategy::Atomic] {
      let store = store_with_post(0).await;
      let coordinator = ToggleCoordinator::new(store.clone(), target()).with_strategy(strategy);
      let actor = ActorId::new("a");

      let first = coordinator.toggle("s", Some(&actor)).await.unwrap();
      assert_eq!(first, ToggleOutcome { liked: true, count: 1 });
      assert_eq!(counter(&store).await, 1);
      assert!(coordinator.is_liked("s", &actor).await.unwrap());

      let second = coordinator.toggle("s", Some(&actor)).await.unwrap();
      assert_eq!(second, ToggleOutcome { liked: false, count: 0 });
      assert_eq!(counter(&store).await, 0);
      assert!(!coordinator.is_liked("s", &actor).await.unwrap());
      assert_eq!(store.count("post_likes", &[]).await.unwrap(), 0);
    }
  }

  #[tokio::test]
  async fn test_two_actors_accumulate() {
    let store = store_with_post(0).await;
    let coordinator = ToggleCoordinator::new(store.clone(), target());

    coordinator.toggle("s", Some(&ActorId::new("a"))).await.unwrap();
    let outcome = coordinator.toggle("s", Some(&ActorId::new("b"))).await.unwrap();

    assert_eq!(outcome.count, 2);
    assert_eq!(counter(&store).await, 2);
  }

  #[tokio::test]
  async fn test_unauthenticated_touches_nothing() {
    let store = store_with_post(0).await;
    let coordinator = ToggleCoordinator::new(store.clone(), target());
    let before = store.calls();

    let result = coordinator.toggle("s", None).await;

    assert_eq!(result, Err(Error::Unauthenticated));
    assert_eq!(store.calls(), before);
  }

  #[tokio::test]
  async fn test_recount_heals_drifted_counter() {
    // Counter says 5 but no like rows exist
    let store = store_with_post(5).await;
    let coordinator = ToggleCoordinator::new(store.clone(), target());

    let outcome = coordinator.toggle("s", Some(&ActorId::new("a"))).await.unwrap();

    assert_eq!(outcome.count, 1);
    assert_eq!(counter(&store).await, 1);
  }

  #[tokio::test]
  async fn test_counter_failure_keeps_row_and_next_toggle_repairs() {
    let store = store_with_post(0).await;
    let coordinator = ToggleCoordinator::new(store.clone(), target());
    let actor = ActorId::new("a");

    store.fail_on(Op::Update, "community_posts");
    let result = coordinator.toggle("s", Some(&actor)).await;
    assert!(matches!(result, Err(Error::RemoteFailure(_))));
    // Row written, counter stale
    assert!(coordinator.is_liked("s", &actor).await.unwrap());
    assert_eq!(counter(&store).await, 0);

    store.clear_failures();
    let outcome = coordinator.toggle("s", Some(&actor)).await.unwrap();
    assert_eq!(outcome, ToggleOutcome { liked: false, count: 0 });
    assert_eq!(counter(&store).await, 0);
  }

  #[tokio::test]
  async fn test_row_failure_skips_counter() {
    let store = store_with_post(0).await;
    let coordinator = ToggleCoordinator::new(store.clone(), target());

    store.fail_on(Op::Insert, "post_likes");
    let result = coordinator.toggle("s", Some(&ActorId::new("a"))).await;

    assert!(matches!(result, Err(Error::RemoteFailure(_))));
    assert_eq!(counter(&store).await, 0);
  }

  #[tokio::test]
  async fn test_missing_subject_is_not_found() {
    for strategy in [CounterStrategy::Recount, CounterStrategy::Atomic] {
      let store = store_with_post(0).await;
      let coordinator = ToggleCoordinator::new(store.clone(), target()).with_strategy(strategy);

      let result = coordinator.toggle("ghost", Some(&ActorId::new("a"))).await;

      assert_eq!(
        result,
        Err(Error::NotFound("community_posts ghost".to_string()))
      );
      assert_eq!(store.count("post_likes", &[]).await.unwrap(), 0);
    }
  }

  #[tokio::test]
  async fn test_toggle_invalidates_scoped_entries() {
    let store = store_with_post(0).await;
    let cache: Arc<CacheLayer<u32>> = Arc::new(CacheLayer::in_memory(Duration::from_secs(60)));
    cache.set("posts:page1", 1);
    cache.set("content:faq", 2);

    let coordinator = ToggleCoordinator::new(store, target())
      .with_policy(InvalidationPolicy::Scopes(vec!["posts".to_string()]))
      .invalidates(cache.clone());

    coordinator.toggle("s", Some(&ActorId::new("a"))).await.unwrap();

    assert_eq!(cache.get("posts:page1"), None);
    assert_eq!(cache.get("content:faq"), Some(2));
  }

  #[tokio::test]
  async fn test_liked_among() {
    let store = store_with_post(0).await;
    let coordinator = ToggleCoordinator::new(store, target());
    let actor = ActorId::new("a");
    coordinator.toggle("s", Some(&actor)).await.unwrap();

    let liked = coordinator
      .liked_among(&["s".to_string(), "t".to_string()], &actor)
      .await
      .unwrap();
    assert_eq!(liked, vec!["s".to_string()]);
  }
}
