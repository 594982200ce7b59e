//! SQLite-backed issue repository.
//!
//! The storage layer is deliberately permissive: it stores whatever
//! combination of fields it is handed. Field validation, including the
//! status/progress coupling, happens at the API boundary.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, params_from_iter, Connection, Row};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::info;

use crate::model::{
  AnalyticsData, ActivityDay, CreateIssue, Issue, IssueFilters, IssueStatus, StatusCount,
  UpdateIssue,
};

#[derive(Debug, Error)]
pub enum RepoError {
  #[error("Issue with id {0} not found")]
  NotFound(i64),

  #[error("corrupted row: {0}")]
  Corrupted(String),

  #[error(transparent)]
  Sqlite(#[from] rusqlite::Error),
}

/// Schema for the issues table, applied idempotently at open.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS issues (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    description TEXT,
    status TEXT NOT NULL DEFAULT 'not-started',
    progress INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_issues_status ON issues(status);
CREATE INDEX IF NOT EXISTS idx_issues_created ON issues(created_at);
"#;

/// Repository over a single `issues` table.
pub struct IssueRepo {
  conn: Mutex<Connection>,
}

impl IssueRepo {
  /// Open or create the database at the given path.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create database directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// Open an in-memory database. Used by tests and `--database :memory:`.
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(SCHEMA)
      .map_err(|e| eyre!("Failed to run migrations: {}", e))?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
    // A poisoned lock means another thread panicked mid-query; the
    // connection itself is still usable.
    self.conn.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// All issues matching the filters, newest first.
  pub fn find_all(&self, filters: &IssueFilters) -> Result<Vec<Issue>, RepoError> {
    let conn = self.lock();

    let mut sql = String::from(
      "SELECT id, title, description, status, progress, created_at, updated_at
       FROM issues WHERE 1=1",
    );
    let mut params: Vec<String> = Vec::new();

    if let Some(status) = filters.status {
      params.push(status.as_str().to_string());
      sql.push_str(&format!(" AND status = ?{}", params.len()));
    }

    if let Some(search) = &filters.search {
      params.push(format!("%{}%", search.to_lowercase()));
      sql.push_str(&format!(
        " AND (LOWER(title) LIKE ?{n} OR LOWER(description) LIKE ?{n})",
        n = params.len()
      ));
    }

    // created_at has microsecond precision; id breaks exact ties so
    // newest-first stays stable for same-instant inserts.
    sql.push_str(" ORDER BY created_at DESC, id DESC");

    let mut stmt = conn.prepare(&sql)?;
    let issues = stmt
      .query_map(params_from_iter(params), row_to_issue)?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    issues.into_iter().map(finish_row).collect()
  }

  /// Single issue by id.
  pub fn find_by_id(&self, id: i64) -> Result<Issue, RepoError> {
    let conn = self.lock();
    find_by_id_locked(&conn, id)
  }

  /// Insert a new issue, applying defaults for omitted fields.
  pub fn create(&self, input: &CreateIssue) -> Result<Issue, RepoError> {
    let conn = self.lock();
    let now = timestamp(Utc::now());
    let status = input.status.unwrap_or_default();
    let progress = input.progress.unwrap_or(0);

    conn.execute(
      "INSERT INTO issues (title, description, status, progress, created_at, updated_at)
       VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
      params![
        input.title,
        input.description,
        status.as_str(),
        progress,
        now
      ],
    )?;

    find_by_id_locked(&conn, conn.last_insert_rowid())
  }

  /// Update only the supplied fields and bump `updated_at`. An empty
  /// payload is a no-op read: nothing changes, `updated_at` included.
  pub fn update(&self, id: i64, input: &UpdateIssue) -> Result<Issue, RepoError> {
    let conn = self.lock();

    // Existence check up front so a missing row is a 404, not a zero-row
    // update.
    find_by_id_locked(&conn, id)?;

    if input.is_empty() {
      return find_by_id_locked(&conn, id);
    }

    let mut fields: Vec<String> = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(title) = &input.title {
      params.push(Box::new(title.clone()));
      fields.push(format!("title = ?{}", params.len()));
    }
    if let Some(description) = &input.description {
      params.push(Box::new(description.clone()));
      fields.push(format!("description = ?{}", params.len()));
    }
    if let Some(status) = input.status {
      params.push(Box::new(status.as_str().to_string()));
      fields.push(format!("status = ?{}", params.len()));
    }
    if let Some(progress) = input.progress {
      params.push(Box::new(progress));
      fields.push(format!("progress = ?{}", params.len()));
    }

    params.push(Box::new(timestamp(Utc::now())));
    fields.push(format!("updated_at = ?{}", params.len()));

    params.push(Box::new(id));
    let sql = format!(
      "UPDATE issues SET {} WHERE id = ?{}",
      fields.join(", "),
      params.len()
    );
    conn.execute(&sql, params_from_iter(params.iter().map(|p| p.as_ref())))?;

    find_by_id_locked(&conn, id)
  }

  /// Delete an issue, returning the deleted snapshot.
  pub fn delete(&self, id: i64) -> Result<Issue, RepoError> {
    let conn = self.lock();
    let issue = find_by_id_locked(&conn, id)?;
    conn.execute("DELETE FROM issues WHERE id = ?1", params![id])?;
    Ok(issue)
  }

  /// Aggregate analytics over the whole table. An empty table yields
  /// all-zero fields, not an error.
  pub fn analytics(&self) -> Result<AnalyticsData, RepoError> {
    let conn = self.lock();

    let (total, completed): (i64, i64) = conn.query_row(
      "SELECT COUNT(*), COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0)
       FROM issues",
      [],
      |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    if total == 0 {
      return Ok(AnalyticsData::empty());
    }

    let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM issues GROUP BY status")?;
    let mut status_distribution = stmt
      .query_map([], |row| {
        let status: String = row.get(0)?;
        let count: i64 = row.get(1)?;
        Ok((status, count))
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?
      .into_iter()
      .map(|(status, count)| {
        let status = IssueStatus::parse(&status)
          .ok_or_else(|| RepoError::Corrupted(format!("unknown status '{}'", status)))?;
        Ok(StatusCount { status, count })
      })
      .collect::<Result<Vec<_>, RepoError>>()?;
    status_distribution.sort_by_key(|entry| entry.status);

    let average_progress: i64 = conn.query_row(
      "SELECT COALESCE(CAST(ROUND(AVG(progress)) AS INTEGER), 0) FROM issues",
      [],
      |row| row.get(0),
    )?;

    let cutoff = timestamp(Utc::now() - Duration::days(7));
    let mut stmt = conn.prepare(
      "SELECT DATE(created_at), COUNT(*) FROM issues
       WHERE created_at > ?1
       GROUP BY DATE(created_at)
       ORDER BY DATE(created_at)",
    )?;
    let recent_activity = stmt
      .query_map(params![cutoff], |row| {
        Ok(ActivityDay {
          date: row.get(0)?,
          count: row.get(1)?,
        })
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    let completion_rate = (completed as f64 * 100.0 / total as f64).round() as i64;

    Ok(AnalyticsData {
      status_distribution,
      average_progress,
      recent_activity,
      completion_rate,
      total_issues: total,
    })
  }

  /// Insert a handful of sample issues when the table is empty. Idempotent
  /// setup convenience, never run implicitly.
  pub fn seed(&self) -> Result<(), RepoError> {
    let count: i64 = {
      let conn = self.lock();
      conn.query_row("SELECT COUNT(*) FROM issues", [], |row| row.get(0))?
    };
    if count > 0 {
      info!("database already has {} issues, skipping seed", count);
      return Ok(());
    }

    let samples = [
      (
        "Set up project board",
        Some("Agree on columns and workflow"),
        IssueStatus::Completed,
        100,
      ),
      (
        "Fix login redirect loop",
        Some("Safari drops the session cookie on redirect"),
        IssueStatus::InProgress,
        60,
      ),
      ("Write onboarding docs", None, IssueStatus::NotStarted, 0),
    ];

    for (title, description, status, progress) in samples {
      self.create(&CreateIssue {
        title: title.to_string(),
        description: description.map(String::from),
        status: Some(status),
        progress: Some(progress),
      })?;
    }
    info!("seeded {} sample issues", samples.len());

    Ok(())
  }
}

fn find_by_id_locked(conn: &Connection, id: i64) -> Result<Issue, RepoError> {
  let row = conn
    .query_row(
      "SELECT id, title, description, status, progress, created_at, updated_at
       FROM issues WHERE id = ?1",
      params![id],
      row_to_issue,
    )
    .map_err(|e| match e {
      rusqlite::Error::QueryReturnedNoRows => RepoError::NotFound(id),
      other => RepoError::Sqlite(other),
    })?;

  finish_row(row)
}

/// Raw row shape before status/timestamp parsing.
struct RawIssue {
  id: i64,
  title: String,
  description: Option<String>,
  status: String,
  progress: i64,
  created_at: String,
  updated_at: String,
}

fn row_to_issue(row: &Row<'_>) -> rusqlite::Result<RawIssue> {
  Ok(RawIssue {
    id: row.get(0)?,
    title: row.get(1)?,
    description: row.get(2)?,
    status: row.get(3)?,
    progress: row.get(4)?,
    created_at: row.get(5)?,
    updated_at: row.get(6)?,
  })
}

fn finish_row(raw: RawIssue) -> Result<Issue, RepoError> {
  let status = IssueStatus::parse(&raw.status)
    .ok_or_else(|| RepoError::Corrupted(format!("unknown status '{}'", raw.status)))?;
  Ok(Issue {
    id: raw.id,
    title: raw.title,
    description: raw.description,
    status,
    progress: raw.progress,
    created_at: parse_timestamp(&raw.created_at)?,
    updated_at: parse_timestamp(&raw.updated_at)?,
  })
}

/// Timestamps are stored as RFC 3339 with microsecond precision so that
/// lexical ordering matches chronological ordering.
fn timestamp(at: DateTime<Utc>) -> String {
  at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, RepoError> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| RepoError::Corrupted(format!("bad timestamp '{}': {}", s, e)))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn repo() -> IssueRepo {
    IssueRepo::open_in_memory().unwrap()
  }

  fn create(repo: &IssueRepo, title: &str, status: IssueStatus, progress: i64) -> Issue {
    repo
      .create(&CreateIssue {
        title: title.to_string(),
        description: None,
        status: Some(status),
        progress: Some(progress),
      })
      .unwrap()
  }

  #[test]
  fn test_create_applies_defaults_and_assigns_fields() {
    let repo = repo();
    let issue = repo
      .create(&CreateIssue {
        title: "First".into(),
        ..Default::default()
      })
      .unwrap();

    assert!(issue.id > 0);
    assert_eq!(issue.status, IssueStatus::NotStarted);
    assert_eq!(issue.progress, 0);
    assert_eq!(issue.created_at, issue.updated_at);
  }

  #[test]
  fn test_find_all_orders_newest_first() {
    let repo = repo();
    let a = create(&repo, "a", IssueStatus::NotStarted, 0);
    let b = create(&repo, "b", IssueStatus::NotStarted, 0);

    let all = repo.find_all(&IssueFilters::default()).unwrap();
    assert_eq!(
      all.iter().map(|i| i.id).collect::<Vec<_>>(),
      vec![b.id, a.id]
    );
  }

  #[test]
  fn test_find_all_filters_by_status_and_search() {
    let repo = repo();
    create(&repo, "Bug in login", IssueStatus::Completed, 100);
    let keep = create(&repo, "Add login button", IssueStatus::NotStarted, 0);
    create(&repo, "Unrelated", IssueStatus::NotStarted, 0);

    let found = repo
      .find_all(&IssueFilters {
        status: Some(IssueStatus::NotStarted),
        search: Some("LOGIN".into()),
      })
      .unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, keep.id);
  }

  #[test]
  fn test_search_matches_description() {
    let repo = repo();
    let issue = repo
      .create(&CreateIssue {
        title: "Parser".into(),
        description: Some("tokenizer cleanup".into()),
        ..Default::default()
      })
      .unwrap();

    let found = repo
      .find_all(&IssueFilters {
        status: None,
        search: Some("Tokenizer".into()),
      })
      .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, issue.id);
  }

  #[test]
  fn test_find_by_id_missing_is_not_found() {
    let repo = repo();
    let err = repo.find_by_id(99).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(99)));
    assert_eq!(err.to_string(), "Issue with id 99 not found");
  }

  #[test]
  fn test_update_changes_only_supplied_fields() {
    let repo = repo();
    let issue = create(&repo, "Original", IssueStatus::InProgress, 30);

    let updated = repo
      .update(
        issue.id,
        &UpdateIssue {
          progress: Some(60),
          ..Default::default()
        },
      )
      .unwrap();

    assert_eq!(updated.title, "Original");
    assert_eq!(updated.progress, 60);
    assert_eq!(updated.status, IssueStatus::InProgress);
    assert!(updated.updated_at > issue.updated_at);
  }

  #[test]
  fn test_empty_update_is_a_no_op_read() {
    let repo = repo();
    let issue = create(&repo, "Original", IssueStatus::InProgress, 30);

    let updated = repo.update(issue.id, &UpdateIssue::default()).unwrap();
    // Nothing changes, updated_at included.
    assert_eq!(updated, issue);
  }

  #[test]
  fn test_delete_returns_snapshot_and_removes_row() {
    let repo = repo();
    let issue = create(&repo, "Doomed", IssueStatus::NotStarted, 0);

    let deleted = repo.delete(issue.id).unwrap();
    assert_eq!(deleted, issue);
    assert!(matches!(
      repo.find_by_id(issue.id).unwrap_err(),
      RepoError::NotFound(_)
    ));
    assert!(matches!(
      repo.delete(issue.id).unwrap_err(),
      RepoError::NotFound(_)
    ));
  }

  #[test]
  fn test_analytics_example() {
    let repo = repo();
    create(&repo, "a", IssueStatus::NotStarted, 0);
    create(&repo, "b", IssueStatus::InProgress, 50);
    create(&repo, "c", IssueStatus::Completed, 100);

    let analytics = repo.analytics().unwrap();
    assert_eq!(analytics.total_issues, 3);
    assert_eq!(analytics.average_progress, 50);
    assert_eq!(analytics.completion_rate, 33);
    assert_eq!(analytics.status_distribution.len(), 3);
    for entry in &analytics.status_distribution {
      assert_eq!(entry.count, 1);
    }
    // All three created just now, on the same day.
    assert_eq!(analytics.recent_activity.len(), 1);
    assert_eq!(analytics.recent_activity[0].count, 3);
  }

  #[test]
  fn test_analytics_empty_dataset_is_all_zero() {
    let repo = repo();
    assert_eq!(repo.analytics().unwrap(), AnalyticsData::empty());
  }

  #[test]
  fn test_seed_is_idempotent() {
    let repo = repo();
    repo.seed().unwrap();
    let first = repo.find_all(&IssueFilters::default()).unwrap();
    assert!(!first.is_empty());

    repo.seed().unwrap();
    let second = repo.find_all(&IssueFilters::default()).unwrap();
    assert_eq!(first.len(), second.len());
  }
}
