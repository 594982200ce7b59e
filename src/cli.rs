//! Client-side command implementations.
//!
//! A `Session` wires the cached client, the issue store and the mutation
//! orchestrator together: reads populate the store through the cache
//! layer, mutations go through the orchestrator so optimistic state and
//! rollback behave the same here as in any other frontend.

use chrono::Utc;
use color_eyre::Result;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::api::cached_client::CachedApiClient;
use crate::api::client::ApiClient;
use crate::api::error::ApiError;
use crate::config::Config;
use crate::model::{CreateIssue, Issue, IssueFilters, IssueStatus, UpdateIssue};
use crate::mutation::MutationOrchestrator;
use crate::store::IssueStore;
use crate::validate;
use crate::views::{self, SortConfig, SortDirection, SortField};

/// Parse a status argument, with the same wording the API uses.
pub fn parse_status(s: &str) -> Result<IssueStatus, String> {
  IssueStatus::parse(s).ok_or_else(|| {
    format!(
      "Invalid status '{}'. Must be one of: not-started, in-progress, completed",
      s
    )
  })
}

/// One CLI invocation's view of the system.
pub struct Session {
  client: CachedApiClient,
  store: Arc<Mutex<IssueStore>>,
  orchestrator: MutationOrchestrator,
}

impl Session {
  pub fn new(config: &Config) -> Result<Self> {
    let client = ApiClient::new(&config.client.base_url, config.request_timeout())?;
    let client = CachedApiClient::new(client, config.stale_time());

    let mut store = IssueStore::new(config.stale_time());
    store.subscribe(|issues| {
      debug!(count = issues.len(), "issue store changed");
    });
    let store = Arc::new(Mutex::new(store));

    let orchestrator = MutationOrchestrator::new(store.clone(), client.clone());

    Ok(Self {
      client,
      store,
      orchestrator,
    })
  }

  /// Populate the store with the full collection unless it is still
  /// fresh. Filtered projections are derived locally from this snapshot.
  pub async fn load(&self) -> Result<(), ApiError> {
    {
      let store = self.store()?;
      if store.is_fresh(Utc::now()) {
        return Ok(());
      }
    }

    match self.client.list_issues(&IssueFilters::default()).await {
      Ok(issues) => {
        self.store()?.set(issues);
        Ok(())
      }
      Err(err) => {
        self.store()?.set_error(err.clone());
        Err(err)
      }
    }
  }

  /// Snapshot of the store's collection.
  pub fn issues(&self) -> Result<Vec<Issue>, ApiError> {
    Ok(self.store()?.issues().to_vec())
  }

  /// Filtered and optionally sorted projection of the loaded collection.
  pub async fn list(
    &self,
    filters: &IssueFilters,
    sort: Option<SortConfig>,
  ) -> Result<Vec<Issue>, ApiError> {
    self.load().await?;
    let snapshot = self.issues()?;

    let filtered: Vec<Issue> = views::filter_issues(&snapshot, filters)
      .into_iter()
      .cloned()
      .collect();
    Ok(views::sort_issues(&filtered, sort.as_ref()))
  }

  pub async fn get(&self, id: i64) -> Result<Issue, ApiError> {
    // A fresh store snapshot already holds the entity.
    {
      let store = self.store()?;
      if store.is_fresh(Utc::now()) {
        if let Some(issue) = store.get(id) {
          return Ok(issue.clone());
        }
      }
    }
    self.client.get_issue(id).await
  }

  pub async fn create(&self, input: CreateIssue) -> Result<Issue, ApiError> {
    let input = validate::validate_create(input)?;
    self.orchestrator.create(input).await
  }

  pub async fn update(&self, id: i64, input: UpdateIssue) -> Result<Issue, ApiError> {
    let input = validate::validate_update(input)?;
    // Load first so the optimistic write has an entity to apply to.
    self.load().await.ok();
    self.orchestrator.update(id, input).await
  }

  pub async fn delete(&self, id: i64) -> Result<Issue, ApiError> {
    self.load().await.ok();
    self.orchestrator.delete(id).await
  }

  pub async fn set_status(&self, id: i64, status: IssueStatus) -> Result<Issue, ApiError> {
    self.load().await.ok();
    self.orchestrator.set_status(id, status).await
  }

  pub async fn analytics(&self) -> Result<crate::model::AnalyticsData, ApiError> {
    self.client.get_analytics().await
  }

  /// Aggregate analytics from the loaded collection instead of the
  /// server. Always computed over the full unfiltered snapshot.
  pub async fn local_analytics(&self) -> Result<crate::model::AnalyticsData, ApiError> {
    self.load().await?;
    Ok(views::compute_analytics(&self.issues()?, Utc::now()))
  }

  pub async fn health(&self) -> Result<crate::model::HealthBody, ApiError> {
    self.client.health().await
  }

  fn store(&self) -> Result<std::sync::MutexGuard<'_, IssueStore>, ApiError> {
    self
      .store
      .lock()
      .map_err(|_| ApiError::Unexpected("issue store lock poisoned".into()))
  }
}

// ============================================================================
// Output
// ============================================================================

pub fn print_issue(issue: &Issue, json: bool) -> Result<()> {
  if json {
    println!("{}", serde_json::to_string_pretty(issue)?);
    return Ok(());
  }

  println!("#{} {}", issue.id, issue.title);
  if let Some(description) = &issue.description {
    println!("  {}", description);
  }
  println!("  status: {}  progress: {}%", issue.status, issue.progress);
  println!(
    "  created: {}  updated: {}",
    issue.created_at.format("%Y-%m-%d %H:%M"),
    issue.updated_at.format("%Y-%m-%d %H:%M")
  );
  Ok(())
}

pub fn print_issue_table(issues: &[Issue], json: bool) -> Result<()> {
  if json {
    println!("{}", serde_json::to_string_pretty(issues)?);
    return Ok(());
  }

  if issues.is_empty() {
    println!("no issues");
    return Ok(());
  }

  println!(
    "{:>5}  {:<40}  {:<12}  {:>8}  {}",
    "ID", "TITLE", "STATUS", "PROGRESS", "UPDATED"
  );
  for issue in issues {
    let title: String = if issue.title.chars().count() > 40 {
      let truncated: String = issue.title.chars().take(39).collect();
      format!("{}…", truncated)
    } else {
      issue.title.clone()
    };
    println!(
      "{:>5}  {:<40}  {:<12}  {:>7}%  {}",
      issue.id,
      title,
      issue.status.to_string(),
      issue.progress,
      issue.updated_at.format("%Y-%m-%d %H:%M")
    );
  }
  Ok(())
}

pub fn print_grouped(issues: &[Issue], json: bool) -> Result<()> {
  let grouped = views::group_by_status(issues);

  if json {
    let value = serde_json::json!({
      "not-started": grouped.not_started,
      "in-progress": grouped.in_progress,
      "completed": grouped.completed,
    });
    println!("{}", serde_json::to_string_pretty(&value)?);
    return Ok(());
  }

  for (label, bucket) in [
    ("not-started", &grouped.not_started),
    ("in-progress", &grouped.in_progress),
    ("completed", &grouped.completed),
  ] {
    println!("{} ({})", label, bucket.len());
    for issue in bucket {
      println!("  #{} {}", issue.id, issue.title);
    }
  }
  Ok(())
}

pub fn print_analytics(analytics: &crate::model::AnalyticsData, json: bool) -> Result<()> {
  if json {
    println!("{}", serde_json::to_string_pretty(analytics)?);
    return Ok(());
  }

  println!("total issues:     {}", analytics.total_issues);
  println!("average progress: {}%", analytics.average_progress);
  println!("completion rate:  {}%", analytics.completion_rate);
  for entry in &analytics.status_distribution {
    println!("  {:<12} {}", entry.status.to_string(), entry.count);
  }
  if !analytics.recent_activity.is_empty() {
    println!("created in the last 7 days:");
    for day in &analytics.recent_activity {
      println!("  {}  {}", day.date, day.count);
    }
  }
  Ok(())
}

/// Build a sort config from `--sort`/`--desc` flags.
pub fn sort_config(sort: Option<SortField>, desc: bool) -> Option<SortConfig> {
  sort.map(|field| SortConfig {
    field,
    direction: if desc {
      SortDirection::Desc
    } else {
      SortDirection::Asc
    },
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::server::repo::IssueRepo;
  use crate::server::routes::AppState;
  use std::time::Instant;

  async fn spawn_server() -> String {
    let state = AppState {
      repo: Arc::new(IssueRepo::open_in_memory().unwrap()),
      started_at: Instant::now(),
    };
    let app = crate::server::router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/api", addr)
  }

  fn config_for(base_url: &str) -> Config {
    let mut config = Config::default();
    config.client.base_url = base_url.to_string();
    config.client.timeout_secs = 2;
    config
  }

  #[tokio::test]
  async fn test_list_derives_filtered_sorted_view() {
    let base_url = spawn_server().await;
    let session = Session::new(&config_for(&base_url)).unwrap();

    session
      .create(CreateIssue {
        title: "Bug in login".into(),
        status: Some(IssueStatus::Completed),
        progress: Some(100),
        ..Default::default()
      })
      .await
      .unwrap();
    session
      .create(CreateIssue {
        title: "Add login button".into(),
        ..Default::default()
      })
      .await
      .unwrap();
    session
      .create(CreateIssue {
        title: "Unrelated".into(),
        ..Default::default()
      })
      .await
      .unwrap();

    let filters = IssueFilters {
      status: Some(IssueStatus::NotStarted),
      search: Some("login".into()),
    };
    let listed = session.list(&filters, None).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].title, "Add login button");

    let sorted = session
      .list(
        &IssueFilters::default(),
        Some(SortConfig {
          field: SortField::Title,
          direction: SortDirection::Asc,
        }),
      )
      .await
      .unwrap();
    assert_eq!(sorted[0].title, "Add login button");
    assert_eq!(sorted[2].title, "Unrelated");
  }

  #[tokio::test]
  async fn test_fresh_store_serves_without_network() {
    // Nothing listens here, so any network access would fail loudly.
    let session = Session::new(&config_for("http://127.0.0.1:1/api")).unwrap();

    {
      let mut store = session.store.lock().unwrap();
      let now = Utc::now();
      store.set(vec![Issue {
        id: 1,
        title: "cached".into(),
        description: None,
        status: IssueStatus::NotStarted,
        progress: 0,
        created_at: now,
        updated_at: now,
      }]);
    }

    // The store was just set, so it is fresh and load never fetches.
    session.load().await.unwrap();
    let listed = session.list(&IssueFilters::default(), None).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].title, "cached");
  }

  #[tokio::test]
  async fn test_schema_boundary_rejects_before_network() {
    // Invalid input must be rejected without reaching the remote layer;
    // an unreachable server proves no call was made.
    let session = Session::new(&config_for("http://127.0.0.1:1/api")).unwrap();

    let err = session
      .create(CreateIssue {
        title: "ok".into(),
        status: Some(IssueStatus::Completed),
        progress: Some(10),
        ..Default::default()
      })
      .await
      .unwrap_err();
    assert!(matches!(err, ApiError::InvalidInput(_)));
  }

  #[tokio::test]
  async fn test_local_analytics_agrees_with_server() {
    let base_url = spawn_server().await;
    let session = Session::new(&config_for(&base_url)).unwrap();

    for (title, status, progress) in [
      ("a", IssueStatus::NotStarted, 0),
      ("b", IssueStatus::InProgress, 50),
      ("c", IssueStatus::Completed, 100),
    ] {
      session
        .create(CreateIssue {
          title: title.into(),
          status: Some(status),
          progress: Some(progress),
          ..Default::default()
        })
        .await
        .unwrap();
    }

    let remote = session.analytics().await.unwrap();
    let local = session.local_analytics().await.unwrap();

    assert_eq!(remote.total_issues, 3);
    assert_eq!(remote.average_progress, 50);
    assert_eq!(remote.completion_rate, 33);
    assert_eq!(local, remote);
  }

  #[test]
  fn test_parse_status() {
    assert_eq!(parse_status("completed").unwrap(), IssueStatus::Completed);
    assert!(parse_status("done").is_err());
  }
}
