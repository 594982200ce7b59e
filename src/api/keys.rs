//! Cache keys and cacheable implementations for API results.

use sha2::{Digest, Sha256};

use crate::cache::{Cacheable, QueryKey};
use crate::model::{AnalyticsData, Issue, IssueFilters};

impl Cacheable for Issue {
  fn cache_key(&self) -> String {
    self.id.to_string()
  }

  fn entity_type() -> &'static str {
    "issue"
  }
}

impl Cacheable for AnalyticsData {
  fn cache_key(&self) -> String {
    // There is exactly one analytics snapshot.
    "analytics".to_string()
  }

  fn entity_type() -> &'static str {
    "analytics"
  }
}

/// Query key types for API calls.
#[derive(Clone, Debug)]
pub enum IssueQueryKey {
  /// List issues for a filter combination
  List { filters: IssueFilters },
  /// Get a single issue by id
  Detail { id: i64 },
  /// The analytics snapshot
  Analytics,
}

impl QueryKey for IssueQueryKey {
  fn cache_hash(&self) -> String {
    let input = match self {
      Self::List { filters } => {
        format!(
          "issue_list:{}:{}",
          filters.status.map(|s| s.as_str()).unwrap_or(""),
          filters
            .search
            .as_deref()
            .map(normalize_search)
            .unwrap_or_default()
        )
      }
      Self::Detail { id } => format!("issue_detail:{}", id),
      Self::Analytics => "analytics".to_string(),
    };

    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let result = hasher.finalize();
    hex::encode(result)
  }

  fn description(&self) -> String {
    match self {
      Self::List { filters } if filters.is_empty() => "all issues".to_string(),
      Self::List { filters } => {
        let mut parts = Vec::new();
        if let Some(status) = filters.status {
          parts.push(format!("status={}", status));
        }
        if let Some(search) = &filters.search {
          parts.push(format!("search={}", search));
        }
        format!("issues: {}", parts.join(" "))
      }
      Self::Detail { id } => format!("issue {}", id),
      Self::Analytics => "analytics".to_string(),
    }
  }
}

/// Normalize a search term for consistent hashing.
/// Trims whitespace and lowercases for case-insensitive matching.
fn normalize_search(search: &str) -> String {
  search.trim().to_lowercase()
}
