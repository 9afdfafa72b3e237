//! Cache storage trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// A single cached value.
#[derive(Debug, Clone)]
pub struct CachedEntry<V> {
  /// The cached value
  pub value: V,
  /// When the value was stored
  pub stored_at: Instant,
}

impl<V> CachedEntry<V> {
  pub fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
    now.saturating_duration_since(self.stored_at) < ttl
  }
}

/// Trait for cache storage backends.
pub trait CacheStorage<V>: Send + Sync {
  /// Get an entry regardless of age. Freshness is decided by the layer.
  fn get(&self, key: &str) -> Option<CachedEntry<V>>;

  /// Store a value, replacing any previous entry.
  fn put(&self, key: &str, value: V, stored_at: Instant);

  fn contains(&self, key: &str) -> bool;

  /// Remove one entry. Returns whether it existed.
  fn remove(&self, key: &str) -> bool;

  /// Remove every entry whose key starts with `prefix`.
  fn remove_prefix(&self, prefix: &str) -> usize;

  fn clear(&self);

  fn len(&self) -> usize;

  /// Drop entries older than `ttl`.
  fn purge_expired(&self, ttl: Duration, now: Instant) -> usize;

  /// Drop the entry with the oldest `stored_at`.
  fn evict_oldest(&self) -> Option<String>;
}

impl<V, T: CacheStorage<V> + ?Sized> CacheStorage<V> for Box<T> {
  fn get(&self, key: &str) -> Option<CachedEntry<V>> {
    (**self).get(key)
  }

  fn put(&self, key: &str, value: V, stored_at: Instant) {
    (**self).put(key, value, stored_at)
  }

  fn contains(&self, key: &str) -> bool {
    (**self).contains(key)
  }

  fn remove(&self, key: &str) -> bool {
    (**self).remove(key)
  }

  fn remove_prefix(&self, prefix: &str) -> usize {
    (**self).remove_prefix(prefix)
  }

  fn clear(&self) {
    (**self).clear()
  }

  fn len(&self) -> usize {
    (**self).len()
  }

  fn purge_expired(&self, ttl: Duration, now: Instant) -> usize {
    (**self).purge_expired(ttl, now)
  }

  fn evict_oldest(&self) -> Option<String> {
    (**self).evict_oldest()
  }
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl<V> CacheStorage<V> for NoopStorage {
  fn get(&self, _key: &str) -> Option<CachedEntry<V>> {
    None // Always miss
  }

  fn put(&self, _key: &str, _value: V, _stored_at: Instant) {}

  fn contains(&self, _key: &str) -> bool {
    false
  }

  fn remove(&self, _key: &str) -> bool {
    false
  }

  fn remove_prefix(&self, _prefix: &str) -> usize {
    0
  }

  fn clear(&self) {}

  fn len(&self) -> usize {
    0
  }

  fn purge_expired(&self, _ttl: Duration, _now: Instant) -> usize {
    0
  }

  fn evict_oldest(&self) -> Option<String> {
    None
  }
}

/// Process-local storage backed by a mutex-guarded map.
pub struct MemoryStorage<V> {
  entries: Mutex<HashMap<String, CachedEntry<V>>>,
}

impl<V> MemoryStorage<V> {
  pub fn new() -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
    }
  }

  fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, CachedEntry<V>>> {
    // Every mutation is a single map operation, so a poisoned map is still consistent
    self.entries.lock().unwrap_or_else(|e| e.into_inner())
  }
}

impl<V> Default for MemoryStorage<V> {
  fn default() -> Self {
    Self::new()
  }
}

impl<V: Clone + Send> CacheStorage<V> for MemoryStorage<V> {
  fn get(&self, key: &str) -> Option<CachedEntry<V>> {
    self.entries().get(key).cloned()
  }

  fn put(&self, key: &str, value: V, stored_at: Instant) {
    self
      .entries()
      .insert(key.to_string(), CachedEntry { value, stored_at });
  }

  fn contains(&self, key: &str) -> bool {
    self.entries().contains_key(key)
  }

  fn remove(&self, key: &str) -> bool {
    self.entries().remove(key).is_some()
  }

  fn remove_prefix(&self, prefix: &str) -> usize {
    let mut entries = self.entries();
    let before = entries.len();
    entries.retain(|key, _| !key.starts_with(prefix));
    before - entries.len()
  }

  fn clear(&self) {
    self.entries().clear();
  }

  fn len(&self) -> usize {
    self.entries().len()
  }

  fn purge_expired(&self, ttl: Duration, now: Instant) -> usize {
    let mut entries = self.entries();
    let before = entries.len();
    entries.retain(|_, entry| entry.is_fresh(ttl, now));
    before - entries.len()
  }

  fn evict_oldest(&self) -> Option<String> {
    let mut entries = self.entries();
    let oldest = entries
      .iter()
      .min_by_key(|(_, entry)| entry.stored_at)
      .map(|(key, _)| key.clone())?;
    entries.remove(&oldest);
    Some(oldest)
  }
}
