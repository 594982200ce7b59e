//! HTTP handlers for the issue API.
//!
//! Bodies are validated field-by-field from untyped JSON so that error
//! messages stay stable regardless of how the payload is malformed, and
//! every failure leaves through the `{success: false, error}` envelope.

use axum::extract::{Path, Query, State};
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::error;

use super::repo::{IssueRepo, RepoError};
use crate::api::error::ApiError;
use crate::model::{
  AnalyticsData, ApiEnvelope, ApiErrorBody, CreateIssue, HealthBody, Issue, IssueFilters,
  IssueStatus, UpdateIssue,
};
use crate::validate;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
  pub repo: Arc<IssueRepo>,
  pub started_at: Instant,
}

/// Failure response: status code plus the error envelope.
#[derive(Debug)]
pub enum ApiFailure {
  BadRequest(String),
  NotFound(String),
  Internal,
}

impl IntoResponse for ApiFailure {
  fn into_response(self) -> Response {
    let (status, message) = match self {
      ApiFailure::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
      ApiFailure::NotFound(message) => (StatusCode::NOT_FOUND, message),
      ApiFailure::Internal => (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
      ),
    };
    (status, Json(ApiErrorBody::new(message))).into_response()
  }
}

impl From<RepoError> for ApiFailure {
  fn from(err: RepoError) -> Self {
    match err {
      RepoError::NotFound(_) => ApiFailure::NotFound(err.to_string()),
      other => {
        error!("repository error: {}", other);
        ApiFailure::Internal
      }
    }
  }
}

impl From<ApiError> for ApiFailure {
  fn from(err: ApiError) -> Self {
    match err {
      ApiError::InvalidInput(message) => ApiFailure::BadRequest(message),
      other => {
        error!("unexpected validation error: {}", other);
        ApiFailure::Internal
      }
    }
  }
}

const INVALID_STATUS: &str =
  "Invalid status. Must be one of: not-started, in-progress, completed";

#[derive(Debug, Deserialize)]
pub struct ListQuery {
  status: Option<String>,
  search: Option<String>,
}

/// GET /api/issues
pub async fn list_issues(
  State(state): State<AppState>,
  Query(query): Query<ListQuery>,
) -> Result<Json<ApiEnvelope<Vec<Issue>>>, ApiFailure> {
  let status = match query.status.as_deref() {
    Some(s) => Some(
      IssueStatus::parse(s).ok_or_else(|| ApiFailure::BadRequest(INVALID_STATUS.to_string()))?,
    ),
    None => None,
  };

  let filters = IssueFilters {
    status,
    search: query.search,
  };
  let issues = state.repo.find_all(&filters)?;
  let count = issues.len();

  Ok(Json(ApiEnvelope::new(issues).with_count(count)))
}

/// GET /api/issues/:id
pub async fn get_issue(
  State(state): State<AppState>,
  Path(id): Path<String>,
) -> Result<Json<ApiEnvelope<Issue>>, ApiFailure> {
  let id = parse_id(&id)?;
  let issue = state.repo.find_by_id(id)?;
  Ok(Json(ApiEnvelope::new(issue)))
}

/// POST /api/issues
pub async fn create_issue(
  State(state): State<AppState>,
  Json(body): Json<Value>,
) -> Result<(StatusCode, Json<ApiEnvelope<Issue>>), ApiFailure> {
  let input = parse_create_body(&body)?;
  let input = validate::validate_create(input)?;
  let issue = state.repo.create(&input)?;

  Ok((
    StatusCode::CREATED,
    Json(ApiEnvelope::new(issue).with_message("Issue created successfully")),
  ))
}

/// PUT /api/issues/:id
pub async fn update_issue(
  State(state): State<AppState>,
  Path(id): Path<String>,
  Json(body): Json<Value>,
) -> Result<Json<ApiEnvelope<Issue>>, ApiFailure> {
  let id = parse_id(&id)?;
  let input = parse_update_body(&body)?;
  let input = validate::validate_update(input)?;
  let issue = state.repo.update(id, &input)?;

  Ok(Json(
    ApiEnvelope::new(issue).with_message("Issue updated successfully"),
  ))
}

/// DELETE /api/issues/:id
pub async fn delete_issue(
  State(state): State<AppState>,
  Path(id): Path<String>,
) -> Result<Json<ApiEnvelope<Issue>>, ApiFailure> {
  let id = parse_id(&id)?;
  let issue = state.repo.delete(id)?;

  Ok(Json(
    ApiEnvelope::new(issue).with_message("Issue deleted successfully"),
  ))
}

/// GET /api/issues/analytics
pub async fn get_analytics(
  State(state): State<AppState>,
) -> Result<Json<ApiEnvelope<AnalyticsData>>, ApiFailure> {
  let analytics = state.repo.analytics()?;
  Ok(Json(ApiEnvelope::new(analytics)))
}

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Json<HealthBody> {
  Json(HealthBody {
    status: "ok".to_string(),
    timestamp: Utc::now(),
    uptime: state.started_at.elapsed().as_secs(),
  })
}

/// Fallback for unknown routes.
pub async fn not_found(method: Method, uri: Uri) -> Response {
  (
    StatusCode::NOT_FOUND,
    Json(ApiErrorBody::new(format!("Cannot {} {}", method, uri.path()))),
  )
    .into_response()
}

fn parse_id(raw: &str) -> Result<i64, ApiFailure> {
  raw
    .parse::<i64>()
    .map_err(|_| ApiFailure::BadRequest("Invalid issue ID".to_string()))
}

fn parse_status_field(body: &Value) -> Result<Option<IssueStatus>, ApiFailure> {
  match body.get("status") {
    None | Some(Value::Null) => Ok(None),
    Some(value) => {
      let status = value
        .as_str()
        .and_then(IssueStatus::parse)
        .ok_or_else(|| ApiFailure::BadRequest(INVALID_STATUS.to_string()))?;
      Ok(Some(status))
    }
  }
}

fn parse_progress_field(body: &Value) -> Result<Option<i64>, ApiFailure> {
  match body.get("progress") {
    None | Some(Value::Null) => Ok(None),
    Some(value) => {
      let progress = value.as_i64().ok_or_else(|| {
        ApiFailure::BadRequest("Progress must be between 0 and 100".to_string())
      })?;
      Ok(Some(progress))
    }
  }
}

fn parse_string_field(body: &Value, field: &str) -> Option<String> {
  body.get(field).and_then(Value::as_str).map(String::from)
}

fn parse_create_body(body: &Value) -> Result<CreateIssue, ApiFailure> {
  let title = parse_string_field(body, "title")
    .ok_or_else(|| ApiFailure::BadRequest("Title is required".to_string()))?;

  Ok(CreateIssue {
    title,
    description: parse_string_field(body, "description"),
    status: parse_status_field(body)?,
    progress: parse_progress_field(body)?,
  })
}

fn parse_update_body(body: &Value) -> Result<UpdateIssue, ApiFailure> {
  Ok(UpdateIssue {
    title: parse_string_field(body, "title"),
    description: parse_string_field(body, "description"),
    status: parse_status_field(body)?,
    progress: parse_progress_field(body)?,
  })
}
