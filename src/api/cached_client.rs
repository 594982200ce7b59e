//! Cached API client that wraps ApiClient with transparent read caching.

use chrono::Duration;

use crate::cache::{CacheLayer, MemoryStorage};
use crate::model::{AnalyticsData, CreateIssue, HealthBody, Issue, IssueFilters, UpdateIssue};

use super::client::ApiClient;
use super::error::ApiError;
use super::keys::IssueQueryKey;

/// API client with transparent caching support.
///
/// Reads go through the cache layer keyed by filter combination, so a
/// fresh result is served without a network call and a failed refetch
/// falls back to stale data. Writes always hit the network; the mutation
/// orchestrator invalidates the cache once they commit.
#[derive(Clone)]
pub struct CachedApiClient {
  inner: ApiClient,
  cache: CacheLayer<MemoryStorage>,
}

impl CachedApiClient {
  /// Wrap a client with a cache using the given staleness window.
  pub fn new(inner: ApiClient, stale_time: Duration) -> Self {
    let cache = CacheLayer::new(MemoryStorage::new()).with_stale_time(stale_time);
    Self { inner, cache }
  }

  /// List issues for a filter combination, cache-first.
  pub async fn list_issues(&self, filters: &IssueFilters) -> Result<Vec<Issue>, ApiError> {
    let key = IssueQueryKey::List {
      filters: filters.clone(),
    };

    let result = self
      .cache
      .fetch_list(&key, || {
        let inner = self.inner.clone();
        let filters = filters.clone();
        async move { inner.list_issues(&filters).await }
      })
      .await?;

    Ok(result.data)
  }

  /// Get a single issue by id, cache-first.
  pub async fn get_issue(&self, id: i64) -> Result<Issue, ApiError> {
    let result = self
      .cache
      .fetch_one(&id.to_string(), || {
        let inner = self.inner.clone();
        async move { inner.get_issue(id).await }
      })
      .await?;

    Ok(result.data)
  }

  /// Get the analytics snapshot, cache-first.
  pub async fn get_analytics(&self) -> Result<AnalyticsData, ApiError> {
    let result = self
      .cache
      .fetch_one("analytics", || {
        let inner = self.inner.clone();
        async move { inner.get_analytics().await }
      })
      .await?;

    Ok(result.data)
  }

  /// Create an issue (not cached - write operation).
  pub async fn create_issue(&self, input: &CreateIssue) -> Result<Issue, ApiError> {
    self.inner.create_issue(input).await
  }

  /// Update an issue (not cached - write operation).
  pub async fn update_issue(&self, id: i64, input: &UpdateIssue) -> Result<Issue, ApiError> {
    self.inner.update_issue(id, input).await
  }

  /// Delete an issue (not cached - write operation).
  pub async fn delete_issue(&self, id: i64) -> Result<Issue, ApiError> {
    self.inner.delete_issue(id).await
  }

  /// Liveness check (never cached).
  pub async fn health(&self) -> Result<HealthBody, ApiError> {
    self.inner.health().await
  }

  /// Drop every cached read so the next one refetches. Called after a
  /// mutation commits; analytics and filtered lists all depend on the
  /// mutated collection.
  pub fn invalidate_all(&self) {
    self.cache.invalidate_all();
  }
}
