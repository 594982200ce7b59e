//! Domain types and wire shapes for the issue API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Workflow state of an issue.
///
/// Ordering follows the workflow: not-started < in-progress < completed.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum IssueStatus {
  #[default]
  NotStarted,
  InProgress,
  Completed,
}

impl IssueStatus {
  pub const ALL: [IssueStatus; 3] = [
    IssueStatus::NotStarted,
    IssueStatus::InProgress,
    IssueStatus::Completed,
  ];

  /// Wire form, e.g. "in-progress".
  pub fn as_str(&self) -> &'static str {
    match self {
      IssueStatus::NotStarted => "not-started",
      IssueStatus::InProgress => "in-progress",
      IssueStatus::Completed => "completed",
    }
  }

  /// Parse the wire form. Returns None for anything outside the enum.
  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "not-started" => Some(IssueStatus::NotStarted),
      "in-progress" => Some(IssueStatus::InProgress),
      "completed" => Some(IssueStatus::Completed),
      _ => None,
    }
  }
}

impl std::fmt::Display for IssueStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A tracked issue as returned by the server.
///
/// `id`, `created_at` and `updated_at` are server-assigned; they never
/// appear on the create/update DTOs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
  pub id: i64,
  pub title: String,
  pub description: Option<String>,
  pub status: IssueStatus,
  pub progress: i64,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Payload for creating an issue. Only `title` is required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateIssue {
  pub title: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<IssueStatus>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub progress: Option<i64>,
}

/// Payload for updating an issue. Omitted fields are left unchanged
/// server-side, so serialization must skip unset fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateIssue {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<IssueStatus>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub progress: Option<i64>,
}

impl UpdateIssue {
  /// True when no field is set; the server treats this as a no-op read.
  pub fn is_empty(&self) -> bool {
    self.title.is_none()
      && self.description.is_none()
      && self.status.is_none()
      && self.progress.is_none()
  }
}

/// List filters. Both fields optional, combined with AND semantics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueFilters {
  pub status: Option<IssueStatus>,
  pub search: Option<String>,
}

impl IssueFilters {
  pub fn is_empty(&self) -> bool {
    self.status.is_none() && self.search.is_none()
  }
}

/// Issue count for a single status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCount {
  pub status: IssueStatus,
  pub count: i64,
}

/// Creations on a single day, used for the recent-activity series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityDay {
  /// Day in "YYYY-MM-DD" form.
  pub date: String,
  pub count: i64,
}

/// Aggregated analytics, derived from the full issue collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsData {
  pub status_distribution: Vec<StatusCount>,
  pub average_progress: i64,
  pub recent_activity: Vec<ActivityDay>,
  pub completion_rate: i64,
  pub total_issues: i64,
}

impl AnalyticsData {
  /// The all-zero analytics for an empty dataset.
  pub fn empty() -> Self {
    Self {
      status_distribution: Vec::new(),
      average_progress: 0,
      recent_activity: Vec::new(),
      completion_rate: 0,
      total_issues: 0,
    }
  }
}

// ============================================================================
// Wire envelopes
// ============================================================================

/// Success envelope: `{success: true, data, count?, message?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
  pub success: bool,
  pub data: T,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub count: Option<usize>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
}

impl<T> ApiEnvelope<T> {
  pub fn new(data: T) -> Self {
    Self {
      success: true,
      data,
      count: None,
      message: None,
    }
  }

  pub fn with_count(mut self, count: usize) -> Self {
    self.count = Some(count);
    self
  }

  pub fn with_message(mut self, message: impl Into<String>) -> Self {
    self.message = Some(message.into());
    self
  }
}

/// Error envelope: `{success: false, error}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
  pub success: bool,
  pub error: String,
}

impl ApiErrorBody {
  pub fn new(error: impl Into<String>) -> Self {
    Self {
      success: false,
      error: error.into(),
    }
  }
}

/// Liveness response for `/api/health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthBody {
  pub status: String,
  pub timestamp: DateTime<Utc>,
  /// Seconds since the server started.
  pub uptime: u64,
}
