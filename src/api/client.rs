//! HTTP client for the issue API.

use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::error::ApiError;
use crate::model::{
  AnalyticsData, ApiEnvelope, ApiErrorBody, CreateIssue, HealthBody, Issue, IssueFilters,
  UpdateIssue,
};

/// Read operations retry transient failures twice, mutations once. Client
/// errors are never retried.
const READ_RETRIES: u32 = 2;
const MUTATION_RETRIES: u32 = 1;

/// Exponential backoff delay before retry `attempt` (0-based), capped at 30s.
fn retry_delay(attempt: u32) -> Duration {
  let millis = 1000u64.saturating_mul(2u64.saturating_pow(attempt));
  Duration::from_millis(millis.min(30_000))
}

/// Typed client for the issue API.
///
/// Every operation normalizes transport and status-code failures into
/// [`ApiError`] before returning.
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base_url: Url,
}

impl ApiClient {
  /// Create a client for the given API base URL, e.g.
  /// `http://127.0.0.1:3001/api`.
  pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
    // A trailing slash makes Url::join treat the base as a directory.
    let normalized = if base_url.ends_with('/') {
      base_url.to_string()
    } else {
      format!("{}/", base_url)
    };
    let base_url =
      Url::parse(&normalized).map_err(|e| eyre!("Invalid API base URL {}: {}", base_url, e))?;

    let http = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { http, base_url })
  }

  /// List issues, optionally filtered by status and search term.
  pub async fn list_issues(&self, filters: &IssueFilters) -> Result<Vec<Issue>, ApiError> {
    let mut url = self.endpoint("issues")?;
    {
      let mut pairs = url.query_pairs_mut();
      if let Some(status) = filters.status {
        pairs.append_pair("status", status.as_str());
      }
      if let Some(search) = &filters.search {
        pairs.append_pair("search", search);
      }
    }

    let envelope: ApiEnvelope<Vec<Issue>> = self
      .request(Method::GET, url, None, READ_RETRIES)
      .await?;
    Ok(envelope.data)
  }

  /// Get a single issue by id.
  pub async fn get_issue(&self, id: i64) -> Result<Issue, ApiError> {
    let url = self.endpoint(&format!("issues/{}", id))?;
    let envelope: ApiEnvelope<Issue> = self.request(Method::GET, url, None, READ_RETRIES).await?;
    Ok(envelope.data)
  }

  /// Create a new issue.
  pub async fn create_issue(&self, input: &CreateIssue) -> Result<Issue, ApiError> {
    let url = self.endpoint("issues")?;
    let body = serde_json::to_value(input)
      .map_err(|e| ApiError::Unexpected(format!("failed to encode request: {}", e)))?;
    let envelope: ApiEnvelope<Issue> = self
      .request(Method::POST, url, Some(body), MUTATION_RETRIES)
      .await?;
    Ok(envelope.data)
  }

  /// Update an existing issue. An empty payload is a no-op read.
  pub async fn update_issue(&self, id: i64, input: &UpdateIssue) -> Result<Issue, ApiError> {
    let url = self.endpoint(&format!("issues/{}", id))?;
    let body = serde_json::to_value(input)
      .map_err(|e| ApiError::Unexpected(format!("failed to encode request: {}", e)))?;
    let envelope: ApiEnvelope<Issue> = self
      .request(Method::PUT, url, Some(body), MUTATION_RETRIES)
      .await?;
    Ok(envelope.data)
  }

  /// Delete an issue, returning the deleted snapshot.
  pub async fn delete_issue(&self, id: i64) -> Result<Issue, ApiError> {
    let url = self.endpoint(&format!("issues/{}", id))?;
    let envelope: ApiEnvelope<Issue> = self
      .request(Method::DELETE, url, None, MUTATION_RETRIES)
      .await?;
    Ok(envelope.data)
  }

  /// Get the analytics snapshot.
  pub async fn get_analytics(&self) -> Result<AnalyticsData, ApiError> {
    let url = self.endpoint("issues/analytics")?;
    let envelope: ApiEnvelope<AnalyticsData> =
      self.request(Method::GET, url, None, READ_RETRIES).await?;
    Ok(envelope.data)
  }

  /// Liveness check. Not retried.
  pub async fn health(&self) -> Result<HealthBody, ApiError> {
    let url = self.endpoint("health")?;
    self.request(Method::GET, url, None, 0).await
  }

  fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
    self
      .base_url
      .join(path)
      .map_err(|e| ApiError::Unexpected(format!("invalid endpoint {}: {}", path, e)))
  }

  /// Issue a request, normalizing failures and retrying transient ones
  /// with exponential backoff.
  async fn request<T: DeserializeOwned>(
    &self,
    method: Method,
    url: Url,
    body: Option<serde_json::Value>,
    max_retries: u32,
  ) -> Result<T, ApiError> {
    let mut attempt = 0;
    loop {
      let result = self.request_once(method.clone(), url.clone(), body.as_ref()).await;

      match result {
        Ok(value) => return Ok(value),
        Err(err) if err.is_retryable() && attempt < max_retries => {
          let delay = retry_delay(attempt);
          warn!(%url, %err, attempt, "request failed, retrying in {:?}", delay);
          tokio::time::sleep(delay).await;
          attempt += 1;
        }
        Err(err) => return Err(err),
      }
    }
  }

  async fn request_once<T: DeserializeOwned>(
    &self,
    method: Method,
    url: Url,
    body: Option<&serde_json::Value>,
  ) -> Result<T, ApiError> {
    debug!(%method, %url, "request");

    let mut request = self.http.request(method, url);
    if let Some(body) = body {
      request = request.json(body);
    }

    let response = request.send().await.map_err(ApiError::from)?;
    let status = response.status();

    if status.is_success() {
      return response.json::<T>().await.map_err(ApiError::from);
    }

    // Failure: pull the message out of the error envelope when there is
    // one, fall back to the status line otherwise.
    let message = match response.json::<ApiErrorBody>().await {
      Ok(body) => body.error,
      Err(_) => status
        .canonical_reason()
        .unwrap_or("Request failed")
        .to_string(),
    };

    Err(ApiError::from_status(status.as_u16(), message))
  }
}
