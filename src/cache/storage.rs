//! Cache storage trait and in-memory implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::Mutex;

use super::traits::Cacheable;

/// Result of a cached query lookup.
#[derive(Debug, Clone)]
pub struct CachedQueryResult<T> {
  /// The cached entities in order
  pub entities: Vec<T>,
  /// When the query result was cached
  pub cached_at: DateTime<Utc>,
}

/// A single cached entity.
#[derive(Debug, Clone)]
pub struct CachedEntity<T> {
  /// The cached entity
  pub entity: T,
  /// When the entity was cached
  pub cached_at: DateTime<Utc>,
}

/// Trait for cache storage backends.
pub trait CacheStorage: Send + Sync {
  /// Store entities from a query result, replacing any previous result for
  /// the same key.
  fn store_query_result<T: Cacheable>(&self, key: &str, entities: &[T]) -> Result<()>;

  /// Get cached entities for a query.
  fn get_query_result<T: Cacheable>(&self, key: &str) -> Result<Option<CachedQueryResult<T>>>;

  /// Get a single entity by key.
  fn get_entity<T: Cacheable>(&self, entity_key: &str) -> Result<Option<CachedEntity<T>>>;

  /// Store a single entity.
  fn store_entity<T: Cacheable>(&self, entity: &T) -> Result<()>;

  /// Drop a single query result.
  fn remove_query_result(&self, key: &str) -> Result<()>;

  /// Drop everything. Used after mutations to force refetches.
  fn clear(&self) -> Result<()>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn store_query_result<T: Cacheable>(&self, _key: &str, _entities: &[T]) -> Result<()> {
    Ok(()) // Discard
  }

  fn get_query_result<T: Cacheable>(&self, _key: &str) -> Result<Option<CachedQueryResult<T>>> {
    Ok(None) // Always miss
  }

  fn get_entity<T: Cacheable>(&self, _entity_key: &str) -> Result<Option<CachedEntity<T>>> {
    Ok(None) // Always miss
  }

  fn store_entity<T: Cacheable>(&self, _entity: &T) -> Result<()> {
    Ok(()) // Discard
  }

  fn remove_query_result(&self, _key: &str) -> Result<()> {
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    Ok(())
  }
}

#[derive(Debug, Clone)]
struct StoredEntity {
  data: Vec<u8>,
  cached_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct StoredQuery {
  entity_type: &'static str,
  /// Entity keys in result order.
  entity_keys: Vec<String>,
  cached_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryInner {
  /// (entity_type, entity_key) -> serialized entity
  entities: HashMap<(&'static str, String), StoredEntity>,
  /// query hash -> ordered entity keys
  queries: HashMap<String, StoredQuery>,
}

/// In-memory cache storage, keyed the same way as a relational layout
/// would be: an entity table plus a query-to-keys mapping that preserves
/// result order.
#[derive(Default)]
pub struct MemoryStorage {
  inner: Mutex<MemoryInner>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>> {
    self.inner.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

impl CacheStorage for MemoryStorage {
  fn store_query_result<T: Cacheable>(&self, key: &str, entities: &[T]) -> Result<()> {
    let mut inner = self.lock()?;
    let entity_type = T::entity_type();
    let now = Utc::now();

    let mut entity_keys = Vec::with_capacity(entities.len());
    for entity in entities {
      let entity_key = entity.cache_key();
      let data =
        serde_json::to_vec(entity).map_err(|e| eyre!("Failed to serialize entity: {}", e))?;
      inner.entities.insert(
        (entity_type, entity_key.clone()),
        StoredEntity {
          data,
          cached_at: now,
        },
      );
      entity_keys.push(entity_key);
    }

    inner.queries.insert(
      key.to_string(),
      StoredQuery {
        entity_type,
        entity_keys,
        cached_at: now,
      },
    );

    Ok(())
  }

  fn get_query_result<T: Cacheable>(&self, key: &str) -> Result<Option<CachedQueryResult<T>>> {
    let inner = self.lock()?;
    let entity_type = T::entity_type();

    let query = match inner.queries.get(key) {
      Some(q) if q.entity_type == entity_type => q,
      _ => return Ok(None),
    };

    let mut entities = Vec::with_capacity(query.entity_keys.len());
    for entity_key in &query.entity_keys {
      let stored = match inner.entities.get(&(entity_type, entity_key.clone())) {
        Some(s) => s,
        // An entity referenced by the query vanished; treat the whole
        // result as a miss rather than returning a partial list.
        None => return Ok(None),
      };
      let entity: T = serde_json::from_slice(&stored.data)
        .map_err(|e| eyre!("Failed to deserialize entity: {}", e))?;
      entities.push(entity);
    }

    Ok(Some(CachedQueryResult {
      entities,
      cached_at: query.cached_at,
    }))
  }

  fn get_entity<T: Cacheable>(&self, entity_key: &str) -> Result<Option<CachedEntity<T>>> {
    let inner = self.lock()?;
    let entity_type = T::entity_type();

    match inner.entities.get(&(entity_type, entity_key.to_string())) {
      Some(stored) => {
        let entity: T = serde_json::from_slice(&stored.data)
          .map_err(|e| eyre!("Failed to deserialize entity: {}", e))?;
        Ok(Some(CachedEntity {
          entity,
          cached_at: stored.cached_at,
        }))
      }
      None => Ok(None),
    }
  }

  fn store_entity<T: Cacheable>(&self, entity: &T) -> Result<()> {
    let mut inner = self.lock()?;
    let data =
      serde_json::to_vec(entity).map_err(|e| eyre!("Failed to serialize entity: {}", e))?;
    inner.entities.insert(
      (T::entity_type(), entity.cache_key()),
      StoredEntity {
        data,
        cached_at: Utc::now(),
      },
    );
    Ok(())
  }

  fn remove_query_result(&self, key: &str) -> Result<()> {
    let mut inner = self.lock()?;
    inner.queries.remove(key);
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    let mut inner = self.lock()?;
    inner.entities.clear();
    inner.queries.clear();
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde::{Deserialize, Serialize};

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct Widget {
    id: u32,
    name: String,
  }

  impl Cacheable for Widget {
    fn cache_key(&self) -> String {
      self.id.to_string()
    }

    fn entity_type() -> &'static str {
      "widget"
    }
  }

  #[test]
  fn test_query_result_round_trip_preserves_order() {
    let storage = MemoryStorage::new();
    let widgets = vec![
      Widget {
        id: 2,
        name: "b".into(),
      },
      Widget {
        id: 1,
        name: "a".into(),
      },
    ];

    storage.store_query_result("q1", &widgets).unwrap();
    let cached = storage.get_query_result::<Widget>("q1").unwrap().unwrap();
    assert_eq!(cached.entities, widgets);
  }

  #[test]
  fn test_miss_on_unknown_key() {
    let storage = MemoryStorage::new();
    assert!(storage.get_query_result::<Widget>("nope").unwrap().is_none());
    assert!(storage.get_entity::<Widget>("1").unwrap().is_none());
  }

  #[test]
  fn test_store_entity_and_fetch() {
    let storage = MemoryStorage::new();
    let widget = Widget {
      id: 7,
      name: "seven".into(),
    };
    storage.store_entity(&widget).unwrap();

    let cached = storage.get_entity::<Widget>("7").unwrap().unwrap();
    assert_eq!(cached.entity, widget);
  }

  #[test]
  fn test_clear_and_remove() {
    let storage = MemoryStorage::new();
    let widgets = vec![Widget {
      id: 1,
      name: "a".into(),
    }];
    storage.store_query_result("q1", &widgets).unwrap();

    storage.remove_query_result("q1").unwrap();
    assert!(storage.get_query_result::<Widget>("q1").unwrap().is_none());
    // The entity itself survives a query removal.
    assert!(storage.get_entity::<Widget>("1").unwrap().is_some());

    storage.clear().unwrap();
    assert!(storage.get_entity::<Widget>("1").unwrap().is_none());
  }

  #[test]
  fn test_noop_storage_always_misses() {
    let storage = NoopStorage;
    let widgets = vec![Widget {
      id: 1,
      name: "a".into(),
    }];
    storage.store_query_result("q1", &widgets).unwrap();
    assert!(storage.get_query_result::<Widget>("q1").unwrap().is_none());
  }
}
