//! Cache layer that orchestrates caching logic with network fetching.

use chrono::{Duration, Utc};
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use super::storage::CacheStorage;
use super::traits::{is_fresh, CacheResult, Cacheable, QueryKey};

/// Cache layer that manages caching logic and network fetching.
///
/// This layer sits between the application and the network client: fresh
/// cache hits are served without touching the network, stale entries are
/// refetched, and a failed refetch falls back to the stale copy so reads
/// keep working while the server is unreachable.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
  /// How long before cached data is considered stale
  stale_time: Duration,
}

impl<S: CacheStorage> CacheLayer<S> {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: S) -> Self {
    Self {
      storage: Arc::new(storage),
      stale_time: Duration::seconds(30),
    }
  }

  /// Set the stale time for cached data.
  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  /// Fetch a list with cache-first strategy.
  ///
  /// 1. Check cache - if fresh, return immediately
  /// 2. If stale/missing, fetch from network
  /// 3. On network failure, return stale cache (offline mode)
  /// 4. Update cache with new data
  pub async fn fetch_list<T, K, F, Fut, E>(
    &self,
    key: &K,
    fetcher: F,
  ) -> Result<CacheResult<Vec<T>>, E>
  where
    T: Cacheable,
    K: QueryKey,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<T>, E>>,
  {
    let hash = key.cache_hash();

    let cached = self
      .storage
      .get_query_result::<T>(&hash)
      .unwrap_or_default();

    if let Some(cached) = cached {
      if is_fresh(cached.cached_at, Utc::now(), self.stale_time) {
        debug!(query = %key.description(), "cache fresh, skipping fetch");
        return Ok(CacheResult::from_cache(cached.entities, cached.cached_at));
      }

      // Cache is stale, try to fetch from network
      match fetcher().await {
        Ok(data) => {
          let _ = self.storage.store_query_result(&hash, &data);
          Ok(CacheResult::from_network(data))
        }
        Err(_) => {
          // Network failed, return stale cache (offline mode)
          debug!(query = %key.description(), "fetch failed, serving stale cache");
          Ok(CacheResult::offline(cached.entities, cached.cached_at))
        }
      }
    } else {
      // No cache, must fetch from network
      let data = fetcher().await?;
      let _ = self.storage.store_query_result(&hash, &data);
      Ok(CacheResult::from_network(data))
    }
  }

  /// Fetch a single entity with caching.
  pub async fn fetch_one<T, F, Fut, E>(
    &self,
    entity_key: &str,
    fetcher: F,
  ) -> Result<CacheResult<T>, E>
  where
    T: Cacheable,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
  {
    let cached = self.storage.get_entity::<T>(entity_key).unwrap_or_default();

    if let Some(cached) = cached {
      if is_fresh(cached.cached_at, Utc::now(), self.stale_time) {
        return Ok(CacheResult::from_cache(cached.entity, cached.cached_at));
      }

      match fetcher().await {
        Ok(data) => {
          let _ = self.storage.store_entity(&data);
          Ok(CacheResult::from_network(data))
        }
        Err(_) => Ok(CacheResult::offline(cached.entity, cached.cached_at)),
      }
    } else {
      let data = fetcher().await?;
      let _ = self.storage.store_entity(&data);
      Ok(CacheResult::from_network(data))
    }
  }

  /// Drop everything cached. Called after a mutation commits so every
  /// dependent read recomputes from server truth.
  pub fn invalidate_all(&self) {
    let _ = self.storage.clear();
  }
}

impl<S: CacheStorage> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      stale_time: self.stale_time,
    }
  }
}
