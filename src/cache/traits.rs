//! Core traits and types for the caching system.

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};

/// Trait for entities that can be cached.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned {
  /// Unique identifier for this entity within its type (e.g. issue id).
  fn cache_key(&self) -> String;

  /// Entity type name for storage organization (e.g. "issue").
  fn entity_type() -> &'static str;
}

/// Trait for query descriptors that can address a cached result set.
pub trait QueryKey {
  /// Stable, fixed-length key for storage lookup.
  fn cache_hash(&self) -> String;

  /// Human-readable form for logging.
  fn description(&self) -> String;
}

/// Freshness predicate: data cached at `cached_at` is still fresh at `now`
/// if the staleness window has not elapsed. A caller observing fresh data
/// must not trigger a redundant network fetch.
pub fn is_fresh(cached_at: DateTime<Utc>, now: DateTime<Utc>, stale_time: Duration) -> bool {
  now - cached_at <= stale_time
}

/// Result from a cache operation, including data and metadata about the
/// source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from cached data inside the staleness window.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::CacheFresh,
      cached_at: Some(cached_at),
    }
  }

  /// Create a new cache result for offline mode.
  pub fn offline(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: Some(cached_at),
    }
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, still inside the staleness window
  CacheFresh,
  /// Network unavailable, serving stale cached data
  Offline,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_is_fresh_boundary() {
    let cached_at = Utc::now();
    let window = Duration::seconds(30);

    assert!(is_fresh(cached_at, cached_at, window));
    assert!(is_fresh(cached_at, cached_at + Duration::seconds(30), window));
    assert!(!is_fresh(
      cached_at,
      cached_at + Duration::seconds(31),
      window
    ));
  }

  #[test]
  fn test_zero_window_is_immediately_stale() {
    let cached_at = Utc::now();
    assert!(!is_fresh(
      cached_at,
      cached_at + Duration::milliseconds(1),
      Duration::zero()
    ));
  }
}
