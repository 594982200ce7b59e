//! Mutation orchestration: optimistic writes with reconciliation.
//!
//! Each mutation runs a small state machine: apply the optimistic write to
//! the store (taking a versioned ticket), call the remote operation, then
//! either reconcile the store with server truth and invalidate cached
//! reads, or roll the optimistic write back and surface the typed error.
//! Input is validated at the schema boundary before it reaches this layer.

use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::api::cached_client::CachedApiClient;
use crate::api::error::ApiError;
use crate::model::{CreateIssue, Issue, IssueStatus, UpdateIssue};
use crate::store::IssueStore;

/// Drives create/update/delete against the remote API while keeping the
/// issue store consistent. Mutations on the same entity compose through
/// the store's write-sequence rule: a rollback or late reconciliation
/// never clobbers a newer write.
#[derive(Clone)]
pub struct MutationOrchestrator {
  store: Arc<Mutex<IssueStore>>,
  client: CachedApiClient,
}

impl MutationOrchestrator {
  pub fn new(store: Arc<Mutex<IssueStore>>, client: CachedApiClient) -> Self {
    Self { store, client }
  }

  fn store(&self) -> Result<MutexGuard<'_, IssueStore>, ApiError> {
    self
      .store
      .lock()
      .map_err(|_| ApiError::Unexpected("issue store lock poisoned".into()))
  }

  /// Create an issue. The store shows a placeholder with a temporary id
  /// until the server assigns the real one.
  pub async fn create(&self, input: CreateIssue) -> Result<Issue, ApiError> {
    let ticket = self.store()?.apply_create(&input);
    debug!(temp_id = ticket.temp_id(), "create optimistically applied");

    match self.client.create_issue(&input).await {
      Ok(server) => {
        self.store()?.reconcile_create(&ticket, server.clone());
        self.client.invalidate_all();
        debug!(id = server.id, "create committed");
        Ok(server)
      }
      Err(err) => {
        self.store()?.rollback(ticket);
        log_rollback("create", &err);
        Err(err)
      }
    }
  }

  /// Update an issue. Fields merge into the stored entity immediately;
  /// the server copy overwrites it on completion.
  pub async fn update(&self, id: i64, input: UpdateIssue) -> Result<Issue, ApiError> {
    // The entity may not be loaded (e.g. a direct `trk update` without a
    // prior list); then there is nothing to apply optimistically.
    let ticket = self.store()?.apply_update(id, &input);
    if ticket.is_some() {
      debug!(id, "update optimistically applied");
    }

    match self.client.update_issue(id, &input).await {
      Ok(server) => {
        if let Some(ticket) = &ticket {
          self.store()?.reconcile_update(ticket, server.clone());
        }
        self.client.invalidate_all();
        debug!(id, "update committed");
        Ok(server)
      }
      Err(err) => {
        if let Some(ticket) = ticket {
          self.store()?.rollback(ticket);
        }
        log_rollback("update", &err);
        Err(err)
      }
    }
  }

  /// Delete an issue. It disappears from the store immediately and comes
  /// back only if the server refuses.
  pub async fn delete(&self, id: i64) -> Result<Issue, ApiError> {
    let ticket = self.store()?.apply_delete(id);
    if ticket.is_some() {
      debug!(id, "delete optimistically applied");
    }

    match self.client.delete_issue(id).await {
      Ok(server) => {
        if let Some(ticket) = &ticket {
          self.store()?.reconcile_delete(ticket);
        }
        self.client.invalidate_all();
        debug!(id, "delete committed");
        Ok(server)
      }
      Err(err) => {
        if let Some(ticket) = ticket {
          self.store()?.rollback(ticket);
        }
        log_rollback("delete", &err);
        Err(err)
      }
    }
  }

  /// Quick status change with the matching progress value: completed
  /// means 100, not-started means 0, in-progress defaults to 50.
  pub async fn set_status(&self, id: i64, status: IssueStatus) -> Result<Issue, ApiError> {
    let progress = match status {
      IssueStatus::Completed => 100,
      IssueStatus::NotStarted => 0,
      IssueStatus::InProgress => 50,
    };
    self
      .update(
        id,
        UpdateIssue {
          status: Some(status),
          progress: Some(progress),
          ..Default::default()
        },
      )
      .await
  }
}

/// Rejections are expected user-facing outcomes; only transport and server
/// failures warrant a warning.
fn log_rollback(op: &str, err: &ApiError) {
  if err.is_client_error() {
    debug!(%err, "{} rejected, rolled back", op);
  } else {
    warn!(%err, "{} failed, rolled back", op);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::client::ApiClient;
  use crate::server::repo::IssueRepo;
  use crate::server::routes::AppState;
  use chrono::Duration;
  use std::time::Instant;

  /// Spin up the real router over an in-memory repo on an ephemeral port.
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

  fn session(base_url: &str) -> (MutationOrchestrator, Arc<Mutex<IssueStore>>, CachedApiClient) {
    let client = ApiClient::new(base_url, std::time::Duration::from_secs(2)).unwrap();
    let cached = CachedApiClient::new(client, Duration::seconds(30));
    let store = Arc::new(Mutex::new(IssueStore::new(Duration::seconds(30))));
    let orchestrator = MutationOrchestrator::new(store.clone(), cached.clone());
    (orchestrator, store, cached)
  }

  #[tokio::test]
  async fn test_create_round_trip() {
    let base_url = spawn_server().await;
    let (orchestrator, store, client) = session(&base_url);

    let created = orchestrator
      .create(CreateIssue {
        title: "A".into(),
        status: Some(IssueStatus::InProgress),
        progress: Some(50),
        ..Default::default()
      })
      .await
      .unwrap();

    // Server-assigned fields are populated and the placeholder is gone.
    assert!(created.id > 0);
    {
      let store = store.lock().unwrap();
      assert_eq!(store.issues().len(), 1);
      assert_eq!(store.issues()[0].id, created.id);
    }

    // Fetching by the returned id yields the same entity.
    let fetched = client.get_issue(created.id).await.unwrap();
    assert_eq!(fetched.title, "A");
    assert_eq!(fetched.progress, 50);
    assert_eq!(fetched.status, IssueStatus::InProgress);
  }

  #[tokio::test]
  async fn test_failed_update_rolls_back_and_surfaces_error() {
    let base_url = spawn_server().await;
    let (orchestrator, store, client) = session(&base_url);

    let issue = orchestrator
      .create(CreateIssue {
        title: "X".into(),
        ..Default::default()
      })
      .await
      .unwrap();

    let before = store.lock().unwrap().issues().to_vec();

    // An empty title bypasses the schema boundary on purpose; the server
    // rejects it with 400 and the optimistic write must be undone.
    let err = orchestrator
      .update(
        issue.id,
        UpdateIssue {
          title: Some("".into()),
          ..Default::default()
        },
      )
      .await
      .unwrap_err();

    assert!(matches!(err, ApiError::InvalidInput(_)));
    assert_eq!(store.lock().unwrap().issues(), &before[..]);

    // Server state never changed either.
    let fetched = client.get_issue(issue.id).await.unwrap();
    assert_eq!(fetched.title, "X");
  }

  #[tokio::test]
  async fn test_network_failure_rolls_back() {
    // Nothing listens on port 1; the connection is refused immediately.
    let (orchestrator, store, _) = session("http://127.0.0.1:1/api");

    {
      let mut guard = store.lock().unwrap();
      let now = chrono::Utc::now();
      guard.set(vec![Issue {
        id: 1,
        title: "X".into(),
        description: None,
        status: IssueStatus::NotStarted,
        progress: 0,
        created_at: now,
        updated_at: now,
      }]);
    }
    let before = store.lock().unwrap().issues().to_vec();

    let err = orchestrator
      .update(
        1,
        UpdateIssue {
          title: Some("Y".into()),
          ..Default::default()
        },
      )
      .await
      .unwrap_err();

    assert!(matches!(err, ApiError::Network(_)));
    assert_eq!(store.lock().unwrap().issues(), &before[..]);
  }

  #[tokio::test]
  async fn test_delete_removes_optimistically_and_commits() {
    let base_url = spawn_server().await;
    let (orchestrator, store, _) = session(&base_url);

    let issue = orchestrator
      .create(CreateIssue {
        title: "doomed".into(),
        ..Default::default()
      })
      .await
      .unwrap();
    assert_eq!(store.lock().unwrap().issues().len(), 1);

    let deleted = orchestrator.delete(issue.id).await.unwrap();
    assert_eq!(deleted.id, issue.id);
    assert!(store.lock().unwrap().issues().is_empty());

    // Deleting again surfaces not-found.
    let err = orchestrator.delete(issue.id).await.unwrap_err();
    assert!(err.is_not_found());
  }

  #[tokio::test]
  async fn test_set_status_applies_progress_mapping() {
    let base_url = spawn_server().await;
    let (orchestrator, _, _) = session(&base_url);

    let issue = orchestrator
      .create(CreateIssue {
        title: "task".into(),
        ..Default::default()
      })
      .await
      .unwrap();

    let updated = orchestrator
      .set_status(issue.id, IssueStatus::Completed)
      .await
      .unwrap();
    assert_eq!(updated.status, IssueStatus::Completed);
    assert_eq!(updated.progress, 100);

    let updated = orchestrator
      .set_status(issue.id, IssueStatus::InProgress)
      .await
      .unwrap();
    assert_eq!(updated.progress, 50);
  }
}
