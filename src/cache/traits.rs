//! Core traits and types for the caching system.

use sha2::{Digest, Sha256};
use tokio::time::Instant;

/// Structured cache key.
///
/// The `scope` groups keys that are invalidated together (e.g. every listing
/// page of posts), the `identity` distinguishes entries inside the scope.
pub trait QueryKey {
  /// Invalidation group for this key (e.g. "posts", "project")
  fn scope(&self) -> &'static str;

  /// Stable identity inside the scope, before hashing
  fn identity(&self) -> String;

  /// Storage key: scope prefix plus SHA256 of the identity.
  fn cache_key(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.identity().as_bytes());
    format!("{}:{}", self.scope(), hex::encode(hasher.finalize()))
  }
}

/// Plain string keys live in the empty scope and are stored verbatim.
impl QueryKey for str {
  fn scope(&self) -> &'static str {
    ""
  }

  fn identity(&self) -> String {
    self.to_string()
  }

  fn cache_key(&self) -> String {
    self.to_string()
  }
}

impl QueryKey for String {
  fn scope(&self) -> &'static str {
    ""
  }

  fn identity(&self) -> String {
    self.clone()
  }

  fn cache_key(&self) -> String {
    self.clone()
  }
}

/// Something that holds cached state derived from store rows.
///
/// Mutating operations call this after a write so later reads go back to the
/// store.
pub trait Invalidate: Send + Sync {
  /// Drop every entry whose key starts with one of the given scopes.
  fn invalidate_scopes(&self, scopes: &[&str]);

  /// Drop everything.
  fn invalidate_all(&self);
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was stored (if served from cache)
  pub stored_at: Option<Instant>,
}

impl<T> CacheResult<T> {
  pub fn from_producer(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Producer,
      stored_at: None,
    }
  }

  pub fn from_cache(data: T, stored_at: Instant) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      stored_at: Some(stored_at),
    }
  }
}

/// Indicates where a value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Freshly computed by the producer (store read)
  Producer,
  /// Served from a still-valid cache entry
  Cache,
}

#[cfg(test)]
mod tests {
  use super::*;

  struct Posts(&'static str);

  impl QueryKey for Posts {
    fn scope(&self) -> &'static str {
      "posts"
    }

    fn identity(&self) -> String {
      self.0.to_string()
    }
  }

  #[test]
  fn test_scoped_key_is_prefixed_and_hashed() {
    let key = Posts("{\"limit\":10}").cache_key();
    assert!(key.starts_with("posts:"));
    assert_eq!(key.len(), "posts:".len() + 64);
  }

  #[test]
  fn test_identical_identities_share_a_key() {
    assert_eq!(Posts("a").cache_key(), Posts("a").cache_key());
    assert_ne!(Posts("a").cache_key(), Posts("b").cache_key());
  }

  #[test]
  fn test_string_keys_are_verbatim() {
    assert_eq!("posts_all".cache_key(), "posts_all");
  }
}
