//! Generic read-through caching layer.
//!
//! This module provides a store-agnostic caching mechanism that:
//! - Keeps values for a fixed TTL per cache instance
//! - Groups keys into scopes so a mutation evicts only what it could affect
//! - Coalesces concurrent misses for the same key into one producer call
//! - Optionally caps the number of stored entries

mod layer;
mod storage;
mod traits;

pub use layer::{CacheLayer, DynCache};
pub use storage::{CacheStorage, CachedEntry, MemoryStorage, NoopStorage};
pub use traits::{CacheResult, CacheSource, Invalidate, QueryKey};
