//! Generic caching layer for read-side data.
//!
//! This module provides a domain-agnostic caching mechanism that:
//! - Caches entities and keyed query results in memory
//! - Tracks a staleness window per cache layer
//! - Serves stale data when the network is unavailable
//! - Supports invalidation after mutations

mod layer;
mod storage;
mod traits;

pub use layer::CacheLayer;
pub use storage::{CacheStorage, MemoryStorage, NoopStorage};
pub use traits::{is_fresh, CacheResult, CacheSource, Cacheable, QueryKey};
