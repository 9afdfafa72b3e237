//! Cache layer that orchestrates read-through caching over a storage backend.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::storage::{CacheStorage, MemoryStorage, NoopStorage};
use crate::config::CacheConfig;
use super::traits::{CacheResult, Invalidate, QueryKey};

type Gate = Arc<tokio::sync::Mutex<()>>;

/// Cache whose storage backend is chosen at runtime.
pub type DynCache<V> = CacheLayer<V, Box<dyn CacheStorage<V>>>;

/// Cache layer that manages TTL checks and producer calls.
///
/// This layer sits between a facade and the store, returning cached values
/// while they are younger than the TTL and falling through to the producer
/// otherwise.
pub struct CacheLayer<V, S = MemoryStorage<V>> {
  storage: Arc<S>,
  /// How long a stored value stays valid
  ttl: Duration,
  /// Upper bound on stored entries (None = unbounded)
  max_entries: Option<usize>,
  /// Coalesce concurrent misses for the same key into one producer call
  single_flight: bool,
  in_flight: Arc<Mutex<HashMap<String, Gate>>>,
  /// Bumped by every invalidation; a producer that started under an older
  /// generation returns its value without storing it
  generation: Arc<AtomicU64>,
  _value: PhantomData<fn() -> V>,
}

impl<V> CacheLayer<V>
where
  V: Clone + Send + 'static,
{
  /// In-memory cache with the given TTL.
  pub fn in_memory(ttl: Duration) -> Self {
    Self::new(MemoryStorage::new()).with_ttl(ttl)
  }
}

impl<V> DynCache<V>
where
  V: Clone + Send + 'static,
{
  /// Build a cache from settings: in-memory when enabled, no-op otherwise.
  pub fn from_config(config: &CacheConfig, ttl: Duration) -> Self {
    let storage: Box<dyn CacheStorage<V>> = if config.enabled {
      Box::new(MemoryStorage::new())
    } else {
      Box::new(NoopStorage)
    };

    Self::new(storage)
      .with_ttl(ttl)
      .with_max_entries(config.max_entries)
      .with_single_flight(config.single_flight)
  }
}

impl<V, S> CacheLayer<V, S>
where
  V: Clone,
  S: CacheStorage<V>,
{
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: S) -> Self {
    Self {
      storage: Arc::new(storage),
      ttl: Duration::from_secs(5 * 60),
      max_entries: None,
      single_flight: true,
      in_flight: Arc::new(Mutex::new(HashMap::new())),
      generation: Arc::new(AtomicU64::new(0)),
      _value: PhantomData,
    }
  }

  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.ttl = ttl;
    self
  }

  pub fn with_max_entries(mut self, max_entries: Option<usize>) -> Self {
    self.max_entries = max_entries;
    self
  }

  pub fn with_single_flight(mut self, single_flight: bool) -> Self {
    self.single_flight = single_flight;
    self
  }

  pub fn ttl(&self) -> Duration {
    self.ttl
  }

  pub fn len(&self) -> usize {
    self.storage.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Return the stored value if it is still fresh.
  ///
  /// Stale entries are left in place; they are overwritten by the next
  /// write-through or purged when the entry cap is reached.
  pub fn get<K: QueryKey + ?Sized>(&self, key: &K) -> Option<V> {
    self.lookup(&key.cache_key()).map(|hit| hit.data)
  }

  /// Store a value unconditionally, stamped with the current time.
  pub fn set<K: QueryKey + ?Sized>(&self, key: &K, value: V) {
    self.store(&key.cache_key(), value);
  }

  pub fn invalidate<K: QueryKey + ?Sized>(&self, key: &K) -> bool {
    self.bump_generation();
    self.storage.remove(&key.cache_key())
  }

  /// Drop every entry stored under `scope`.
  pub fn invalidate_scope(&self, scope: &str) -> usize {
    self.bump_generation();
    let removed = self.storage.remove_prefix(&format!("{}:", scope));
    debug!(scope, removed, "cache scope invalidated");
    removed
  }

  pub fn invalidate_all(&self) {
    self.bump_generation();
    self.storage.clear();
  }

  fn bump_generation(&self) {
    self.generation.fetch_add(1, Ordering::SeqCst);
  }

  /// Read-through helper returning only the value.
  ///
  /// A failing producer propagates its error and nothing is cached.
  pub async fn with_cache<K, F, Fut, E>(&self, key: &K, producer: F) -> Result<V, E>
  where
    K: QueryKey + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V, E>>,
  {
    self.fetch(key, producer).await.map(|result| result.data)
  }

  /// Fetch with cache-first strategy.
  ///
  /// 1. Check cache - if fresh, return immediately
  /// 2. On a miss, wait for any in-flight producer for the same key and re-check
  /// 3. Otherwise run the producer and store its value
  pub async fn fetch<K, F, Fut, E>(&self, key: &K, producer: F) -> Result<CacheResult<V>, E>
  where
    K: QueryKey + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V, E>>,
  {
    let key = key.cache_key();

    if let Some(hit) = self.lookup(&key) {
      return Ok(hit);
    }

    if !self.single_flight {
      return self.produce(&key, producer).await;
    }

    let gate = self.gate(&key);
    let _guard = gate.lock().await;

    // Another caller may have filled the entry while we waited
    if let Some(hit) = self.lookup(&key) {
      debug!(key = %key, "cache miss coalesced");
      return Ok(hit);
    }

    let result = self.produce(&key, producer).await;
    self.release(&key, &gate);
    result
  }

  fn lookup(&self, key: &str) -> Option<CacheResult<V>> {
    let entry = self.storage.get(key)?;
    if entry.is_fresh(self.ttl, Instant::now()) {
      Some(CacheResult::from_cache(entry.value, entry.stored_at))
    } else {
      None
    }
  }

  async fn produce<F, Fut, E>(&self, key: &str, producer: F) -> Result<CacheResult<V>, E>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V, E>>,
  {
    debug!(key = %key, "cache miss");
    let started = self.generation.load(Ordering::SeqCst);
    let data = producer().await?;
    if self.generation.load(Ordering::SeqCst) == started {
      self.store(key, data.clone());
    } else {
      debug!(key = %key, "invalidated while producing, value not stored");
    }
    Ok(CacheResult::from_producer(data))
  }

  fn store(&self, key: &str, value: V) {
    let now = Instant::now();

    if let Some(max) = self.max_entries {
      if !self.storage.contains(key) && self.storage.len() >= max {
        let purged = self.storage.purge_expired(self.ttl, now);
        if self.storage.len() >= max {
          if let Some(evicted) = self.storage.evict_oldest() {
            debug!(key = %evicted, purged, "cache entry evicted");
          }
        }
      }
    }

    self.storage.put(key, value, now);
  }

  fn gate(&self, key: &str) -> Gate {
    let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
    Arc::clone(in_flight.entry(key.to_string()).or_default())
  }

  fn release(&self, key: &str, gate: &Gate) {
    let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
    if in_flight.get(key).is_some_and(|g| Arc::ptr_eq(g, gate)) {
      in_flight.remove(key);
    }
  }
}

impl<V, S> Invalidate for CacheLayer<V, S>
where
  V: Clone,
  S: CacheStorage<V>,
{
  fn invalidate_scopes(&self, scopes: &[&str]) {
    for scope in scopes {
      self.invalidate_scope(scope);
    }
  }

  fn invalidate_all(&self) {
    CacheLayer::invalidate_all(self);
  }
}

impl<V, S> Clone for CacheLayer<V, S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      ttl: self.ttl,
      max_entries: self.max_entries,
      single_flight: self.single_flight,
      in_flight: Arc::clone(&self.in_flight),
      generation: Arc::clone(&self.generation),
      _value: PhantomData,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};

  async fn counted(calls: &AtomicUsize, value: &str) -> Result<String, String> {
    calls.fetch_add(1, Ordering::SeqCst);
    Ok(value.to_string())
  }

  #[tokio::test(start_paused = true)]
  async fn test_ttl_scenario_two_minutes() {
    let cache: CacheLayer<String> = CacheLayer::in_memory(Duration::from_secs(120));
    let calls = AtomicUsize::new(0);

    let first = cache
      .with_cache("posts_all", || counted(&calls, "L1"))
      .await
      .unwrap();
    assert_eq!(first, "L1");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(90)).await;
    let second = cache
      .with_cache("posts_all", || counted(&calls, "L2"))
      .await
      .unwrap();
    assert_eq!(second, "L1");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(40)).await;
    let third = cache
      .with_cache("posts_all", || counted(&calls, "L2"))
      .await
      .unwrap();
    assert_eq!(third, "L2");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_invalidate_forces_producer() {
    let cache: CacheLayer<String> = CacheLayer::in_memory(Duration::from_secs(300));
    let calls = AtomicUsize::new(0);

    cache.with_cache("k", || counted(&calls, "a")).await.unwrap();
    assert!(cache.invalidate("k"));
    let value = cache.with_cache("k", || counted(&calls, "b")).await.unwrap();

    assert_eq!(value, "b");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_invalidation_during_produce_discards_value() {
    for single_flight in [true, false] {
      let cache: CacheLayer<String> =
        CacheLayer::in_memory(Duration::from_secs(300)).with_single_flight(single_flight);

      let slow_read = cache.with_cache("k", || async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok::<_, String>("old".to_string())
      });
      let mutation = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cache.invalidate_all();
        cache
          .with_cache("k", || async { Ok::<_, String>("new".to_string()) })
          .await
      };

      let (old, new) = tokio::join!(slow_read, mutation);

      // The in-flight read still answers its own caller
      assert_eq!(old.unwrap(), "old");
      assert_eq!(new.unwrap(), "new");
      assert_eq!(cache.get("k").as_deref(), Some("new"));
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_failed_producer_is_not_cached() {
    let cache: CacheLayer<String> = CacheLayer::in_memory(Duration::from_secs(300));

    let err = cache
      .with_cache("k", || async { Err::<String, _>("boom".to_string()) })
      .await
      .unwrap_err();
    assert_eq!(err, "boom");
    assert!(cache.get("k").is_none());

    let calls = AtomicUsize::new(0);
    let value = cache.with_cache("k", || counted(&calls, "ok")).await.unwrap();
    assert_eq!(value, "ok");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_stale_entry_reads_as_absent() {
    let cache: CacheLayer<u32> = CacheLayer::in_memory(Duration::from_secs(10));
    cache.set("k", 7);
    assert_eq!(cache.get("k"), Some(7));

    tokio::time::advance(Duration::from_secs(10)).await;
    assert_eq!(cache.get("k"), None);
    // Not deleted on read
    assert_eq!(cache.len(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_concurrent_misses_share_one_producer() {
    let cache: CacheLayer<String> = CacheLayer::in_memory(Duration::from_secs(60));
    let counter = AtomicUsize::new(0);
    let calls = &counter;

    let slow = move || async move {
      calls.fetch_add(1, Ordering::SeqCst);
      tokio::time::sleep(Duration::from_millis(100)).await;
      Ok::<_, String>("value".to_string())
    };

    let results =
      futures::future::join_all((0..5).map(|_| cache.with_cache("shared", slow))).await;

    assert!(results.iter().all(|r| r.as_deref() == Ok("value")));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_concurrent_misses_without_single_flight() {
    let cache: CacheLayer<String> =
      CacheLayer::in_memory(Duration::from_secs(60)).with_single_flight(false);
    let counter = AtomicUsize::new(0);
    let calls = &counter;

    let slow = move || async move {
      calls.fetch_add(1, Ordering::SeqCst);
      tokio::time::sleep(Duration::from_millis(100)).await;
      Ok::<_, String>("value".to_string())
    };

    futures::future::join_all((0..3).map(|_| cache.with_cache("shared", slow))).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test(start_paused = true)]
  async fn test_entry_cap_evicts_oldest() {
    let cache: CacheLayer<u32> =
      CacheLayer::in_memory(Duration::from_secs(60)).with_max_entries(Some(2));

    cache.set("a", 1);
    tokio::time::advance(Duration::from_secs(1)).await;
    cache.set("b", 2);
    tokio::time::advance(Duration::from_secs(1)).await;
    cache.set("c", 3);

    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get("a"), None);
    assert_eq!(cache.get("b"), Some(2));
    assert_eq!(cache.get("c"), Some(3));
  }

  #[tokio::test(start_paused = true)]
  async fn test_entry_cap_prefers_expired_entries() {
    let cache: CacheLayer<u32> =
      CacheLayer::in_memory(Duration::from_secs(10)).with_max_entries(Some(2));

    cache.set("expired", 1);
    tokio::time::advance(Duration::from_secs(20)).await;
    cache.set("fresh", 2);
    cache.set("newest", 3);

    assert_eq!(cache.get("fresh"), Some(2));
    assert_eq!(cache.get("newest"), Some(3));
  }

  #[tokio::test]
  async fn test_scope_invalidation_is_precise() {
    struct Scoped(&'static str, &'static str);
    impl QueryKey for Scoped {
      fn scope(&self) -> &'static str {
        self.0
      }
      fn identity(&self) -> String {
        self.1.to_string()
      }
    }

    let cache: CacheLayer<u32> = CacheLayer::in_memory(Duration::from_secs(60));
    cache.set(&Scoped("posts", "page1"), 1);
    cache.set(&Scoped("posts", "page2"), 2);
    cache.set(&Scoped("content", "faq"), 3);

    Invalidate::invalidate_scopes(&cache, &["posts"]);

    assert_eq!(cache.get(&Scoped("posts", "page1")), None);
    assert_eq!(cache.get(&Scoped("posts", "page2")), None);
    assert_eq!(cache.get(&Scoped("content", "faq")), Some(3));
  }

  #[tokio::test]
  async fn test_disabled_config_never_caches() {
    let config = CacheConfig {
      enabled: false,
      ..CacheConfig::default()
    };
    let cache: DynCache<u32> = DynCache::from_config(&config, Duration::from_secs(60));
    cache.set("k", 1);
    assert_eq!(cache.get("k"), None);

    let enabled: DynCache<u32> = DynCache::from_config(&CacheConfig::default(), Duration::from_secs(60));
    enabled.set("k", 1);
    assert_eq!(enabled.get("k"), Some(1));
  }

  #[tokio::test]
  async fn test_noop_storage_always_calls_producer() {
    let cache: CacheLayer<String, NoopStorage> = CacheLayer::new(NoopStorage);
    let calls = AtomicUsize::new(0);

    cache.with_cache("k", || counted(&calls, "a")).await.unwrap();
    cache.with_cache("k", || counted(&calls, "a")).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }
}
