//! Derived views over the issue collection.
//!
//! Everything here is pure and synchronous: filtering, grouping, sorting
//! and analytics are computed on demand from a snapshot, never cached and
//! never touching I/O. Analytics always aggregate the full unfiltered
//! collection.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

use crate::model::{ActivityDay, AnalyticsData, Issue, IssueFilters, IssueStatus, StatusCount};

/// Keep issues whose status matches exactly (when set) and whose title or
/// description contains the search term case-insensitively (when set).
/// Both conditions combine with AND.
pub fn filter_issues<'a>(issues: &'a [Issue], filters: &IssueFilters) -> Vec<&'a Issue> {
  let search = filters.search.as_deref().map(str::to_lowercase);

  issues
    .iter()
    .filter(|issue| match filters.status {
      Some(status) => issue.status == status,
      None => true,
    })
    .filter(|issue| match &search {
      Some(term) => {
        issue.title.to_lowercase().contains(term)
          || issue
            .description
            .as_deref()
            .is_some_and(|d| d.to_lowercase().contains(term))
      }
      None => true,
    })
    .collect()
}

/// Issues partitioned by status, relative order preserved.
#[derive(Debug, Default)]
pub struct GroupedIssues<'a> {
  pub not_started: Vec<&'a Issue>,
  pub in_progress: Vec<&'a Issue>,
  pub completed: Vec<&'a Issue>,
}

pub fn group_by_status(issues: &[Issue]) -> GroupedIssues<'_> {
  let mut grouped = GroupedIssues::default();
  for issue in issues {
    match issue.status {
      IssueStatus::NotStarted => grouped.not_started.push(issue),
      IssueStatus::InProgress => grouped.in_progress.push(issue),
      IssueStatus::Completed => grouped.completed.push(issue),
    }
  }
  grouped
}

// ============================================================================
// Sorting
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
  Title,
  Description,
  Progress,
  Status,
  CreatedAt,
  UpdatedAt,
}

impl std::str::FromStr for SortField {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "title" => Ok(SortField::Title),
      "description" => Ok(SortField::Description),
      "progress" => Ok(SortField::Progress),
      "status" => Ok(SortField::Status),
      "created_at" => Ok(SortField::CreatedAt),
      "updated_at" => Ok(SortField::UpdatedAt),
      _ => Err(format!(
        "Unknown sort field '{}'. Expected one of: title, description, progress, status, created_at, updated_at",
        s
      )),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
  Asc,
  Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortConfig {
  pub field: SortField,
  pub direction: SortDirection,
}

/// Advance the sort state for a column activation: unsorted goes
/// ascending, ascending flips to descending, descending clears back to
/// the original order. Activating a different column starts ascending.
pub fn cycle_sort(prev: Option<SortConfig>, field: SortField) -> Option<SortConfig> {
  match prev {
    Some(config) if config.field == field => match config.direction {
      SortDirection::Asc => Some(SortConfig {
        field,
        direction: SortDirection::Desc,
      }),
      SortDirection::Desc => None,
    },
    _ => Some(SortConfig {
      field,
      direction: SortDirection::Asc,
    }),
  }
}

/// Stable sort by the configured field; `None` returns the original order.
/// Text fields compare case-insensitively, status uses the workflow order,
/// timestamps compare chronologically.
pub fn sort_issues(issues: &[Issue], config: Option<&SortConfig>) -> Vec<Issue> {
  let mut sorted: Vec<Issue> = issues.to_vec();
  let config = match config {
    Some(c) => c,
    None => return sorted,
  };

  sorted.sort_by(|a, b| {
    let ordering = match config.field {
      SortField::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
      SortField::Description => {
        let a_val = a.description.as_deref().unwrap_or("").to_lowercase();
        let b_val = b.description.as_deref().unwrap_or("").to_lowercase();
        a_val.cmp(&b_val)
      }
      SortField::Progress => a.progress.cmp(&b.progress),
      SortField::Status => a.status.cmp(&b.status),
      SortField::CreatedAt => a.created_at.cmp(&b.created_at),
      SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
    };
    match config.direction {
      SortDirection::Asc => ordering,
      SortDirection::Desc => ordering.reverse(),
    }
  });

  sorted
}

// ============================================================================
// Analytics
// ============================================================================

/// Aggregate analytics from the full collection: per-status counts,
/// average progress (rounded), completion rate (rounded percent, 0 when
/// empty), and daily creation counts over the trailing 7 days.
pub fn compute_analytics(issues: &[Issue], now: DateTime<Utc>) -> AnalyticsData {
  if issues.is_empty() {
    return AnalyticsData::empty();
  }

  let total = issues.len() as i64;

  let status_distribution: Vec<StatusCount> = IssueStatus::ALL
    .iter()
    .filter_map(|&status| {
      let count = issues.iter().filter(|i| i.status == status).count() as i64;
      (count > 0).then_some(StatusCount { status, count })
    })
    .collect();

  let progress_sum: i64 = issues.iter().map(|i| i.progress).sum();
  let average_progress = (progress_sum as f64 / total as f64).round() as i64;

  let completed = issues
    .iter()
    .filter(|i| i.status == IssueStatus::Completed)
    .count() as i64;
  let completion_rate = (completed as f64 * 100.0 / total as f64).round() as i64;

  let cutoff = now - Duration::days(7);
  let mut by_day: BTreeMap<String, i64> = BTreeMap::new();
  for issue in issues {
    if issue.created_at > cutoff {
      *by_day
        .entry(issue.created_at.date_naive().to_string())
        .or_insert(0) += 1;
    }
  }
  let recent_activity = by_day
    .into_iter()
    .map(|(date, count)| ActivityDay { date, count })
    .collect();

  AnalyticsData {
    status_distribution,
    average_progress,
    recent_activity,
    completion_rate,
    total_issues: total,
  }
}
