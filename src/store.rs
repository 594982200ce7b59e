//! Authoritative in-memory issue store with optimistic mutation support.
//!
//! The store holds the collection the UI reads, ordered newest-first like
//! the server's list endpoint. Mutations are applied optimistically before
//! the network call resolves; each optimistic write is tagged with a
//! monotonically increasing sequence number per entity, so a rollback or a
//! late reconciliation can tell whether it is still the latest write to
//! that entity. An older mutation never clobbers a newer one.
//!
//! Stores are plain values constructed where needed and passed explicitly;
//! interested parties register listeners and are notified after every
//! collection change.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::api::error::ApiError;
use crate::cache::is_fresh;
use crate::model::{CreateIssue, Issue, UpdateIssue};

/// Opaque whole-collection snapshot, taken before an optimistic write and
/// handed back to `restore` to undo it.
#[derive(Debug, Clone)]
pub struct Snapshot(Vec<Issue>);

/// Handle for an optimistic write. Carries the write sequence and just
/// enough state to undo this one mutation.
#[derive(Debug, Clone)]
pub struct MutationTicket {
  seq: u64,
  kind: TicketKind,
}

#[derive(Debug, Clone)]
enum TicketKind {
  Create { temp_id: i64 },
  Update { id: i64, previous: Issue },
  Delete { id: i64, previous: Issue, position: usize },
}

impl MutationTicket {
  /// The temporary id assigned by an optimistic create.
  pub fn temp_id(&self) -> Option<i64> {
    match self.kind {
      TicketKind::Create { temp_id } => Some(temp_id),
      _ => None,
    }
  }

  /// The id of the entity this ticket refers to.
  pub fn entity_id(&self) -> i64 {
    match self.kind {
      TicketKind::Create { temp_id } => temp_id,
      TicketKind::Update { id, .. } | TicketKind::Delete { id, .. } => id,
    }
  }
}

pub type ListenerId = u64;

type Listener = Box<dyn Fn(&[Issue]) + Send>;

/// The client-side source of truth for issue state.
pub struct IssueStore {
  issues: Vec<Issue>,
  last_fetched: Option<DateTime<Utc>>,
  error: Option<ApiError>,
  stale_time: Duration,

  /// Global write sequence; bumped by every optimistic apply.
  seq: u64,
  /// Latest optimistic write per entity id.
  last_write: HashMap<i64, u64>,
  /// Temporary create ids are negative so they can never collide with
  /// server-assigned ids.
  next_temp_id: i64,

  listeners: Vec<(ListenerId, Listener)>,
  next_listener_id: ListenerId,
}

impl IssueStore {
  pub fn new(stale_time: Duration) -> Self {
    Self {
      issues: Vec::new(),
      last_fetched: None,
      error: None,
      stale_time,
      seq: 0,
      last_write: HashMap::new(),
      next_temp_id: -1,
      listeners: Vec::new(),
      next_listener_id: 0,
    }
  }

  /// Current collection, newest-first.
  pub fn issues(&self) -> &[Issue] {
    &self.issues
  }

  pub fn get(&self, id: i64) -> Option<&Issue> {
    self.issues.iter().find(|i| i.id == id)
  }

  pub fn error(&self) -> Option<&ApiError> {
    self.error.as_ref()
  }

  /// True while the last `set` is inside the staleness window; callers
  /// observing a fresh store must not trigger a redundant fetch.
  pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
    match self.last_fetched {
      Some(fetched_at) => is_fresh(fetched_at, now, self.stale_time),
      None => false,
    }
  }

  /// Replace the collection with server truth. Clears any error flag,
  /// records the fetch time, and forgets in-flight write sequences (a full
  /// refresh supersedes them).
  pub fn set(&mut self, issues: Vec<Issue>) {
    self.issues = issues;
    self.last_fetched = Some(Utc::now());
    self.error = None;
    self.last_write.clear();
    self.notify();
  }

  /// Record a fetch failure without touching the collection.
  pub fn set_error(&mut self, error: ApiError) {
    self.error = Some(error);
  }

  /// Whole-collection snapshot for callers that want plain value-semantics
  /// rollback. Mutations themselves use versioned tickets instead, which
  /// compose under concurrency.
  pub fn snapshot(&self) -> Snapshot {
    Snapshot(self.issues.clone())
  }

  pub fn restore(&mut self, snapshot: Snapshot) {
    self.issues = snapshot.0;
    self.notify();
  }

  // ==========================================================================
  // Optimistic writes
  // ==========================================================================

  /// Insert an optimistic placeholder for a create, newest-first. The
  /// placeholder carries a negative temporary id that reconciliation swaps
  /// for the server-assigned one.
  pub fn apply_create(&mut self, input: &CreateIssue) -> MutationTicket {
    let now = Utc::now();
    let temp_id = self.next_temp_id;
    self.next_temp_id -= 1;

    let issue = Issue {
      id: temp_id,
      title: input.title.clone(),
      description: input.description.clone(),
      status: input.status.unwrap_or_default(),
      progress: input.progress.unwrap_or(0),
      created_at: now,
      updated_at: now,
    };

    self.issues.insert(0, issue);
    let seq = self.next_seq(temp_id);
    self.notify();

    MutationTicket {
      seq,
      kind: TicketKind::Create { temp_id },
    }
  }

  /// Merge update fields into the entity and bump `updated_at` locally
  /// (a client-side approximation, overwritten by reconciliation).
  /// Returns None when the entity is not in the store.
  pub fn apply_update(&mut self, id: i64, input: &UpdateIssue) -> Option<MutationTicket> {
    let position = self.issues.iter().position(|i| i.id == id)?;
    let previous = self.issues[position].clone();

    let issue = &mut self.issues[position];
    if let Some(title) = &input.title {
      issue.title = title.clone();
    }
    if let Some(description) = &input.description {
      issue.description = Some(description.clone());
    }
    if let Some(status) = input.status {
      issue.status = status;
    }
    if let Some(progress) = input.progress {
      issue.progress = progress;
    }
    issue.updated_at = Utc::now();

    let seq = self.next_seq(id);
    self.notify();

    Some(MutationTicket {
      seq,
      kind: TicketKind::Update { id, previous },
    })
  }

  /// Remove the entity immediately. Returns None when it is not present.
  pub fn apply_delete(&mut self, id: i64) -> Option<MutationTicket> {
    let position = self.issues.iter().position(|i| i.id == id)?;
    let previous = self.issues.remove(position);

    let seq = self.next_seq(id);
    self.notify();

    Some(MutationTicket {
      seq,
      kind: TicketKind::Delete {
        id,
        previous,
        position,
      },
    })
  }

  // ==========================================================================
  // Rollback / reconciliation
  // ==========================================================================

  /// Undo one failed mutation. Only applies while the ticket is still the
  /// latest write to its entity; a newer optimistic write wins otherwise.
  pub fn rollback(&mut self, ticket: MutationTicket) {
    match ticket.kind {
      TicketKind::Create { temp_id } => {
        self.issues.retain(|i| i.id != temp_id);
        self.last_write.remove(&temp_id);
        self.notify();
      }
      TicketKind::Update { id, previous } => {
        if self.last_write.get(&id) != Some(&ticket.seq) {
          return;
        }
        if let Some(slot) = self.issues.iter_mut().find(|i| i.id == id) {
          *slot = previous;
        }
        self.last_write.remove(&id);
        self.notify();
      }
      TicketKind::Delete {
        id,
        previous,
        position,
      } => {
        if self.last_write.get(&id) != Some(&ticket.seq) {
          return;
        }
        let position = position.min(self.issues.len());
        self.issues.insert(position, previous);
        self.last_write.remove(&id);
        self.notify();
      }
    }
  }

  /// Swap the optimistic create placeholder for the server entity.
  pub fn reconcile_create(&mut self, ticket: &MutationTicket, server: Issue) {
    let temp_id = match ticket.kind {
      TicketKind::Create { temp_id } => temp_id,
      _ => return,
    };
    if let Some(slot) = self.issues.iter_mut().find(|i| i.id == temp_id) {
      *slot = server;
    }
    self.last_write.remove(&temp_id);
    self.notify();
  }

  /// Overwrite the entity with the authoritative server copy, unless a
  /// newer optimistic write has touched it since this mutation applied.
  pub fn reconcile_update(&mut self, ticket: &MutationTicket, server: Issue) {
    let id = ticket.entity_id();
    if self.last_write.get(&id) != Some(&ticket.seq) {
      // A newer write superseded this mutation; its reconciliation will
      // bring in server truth.
      return;
    }
    if let Some(slot) = self.issues.iter_mut().find(|i| i.id == id) {
      *slot = server;
    }
    self.last_write.remove(&id);
    self.notify();
  }

  /// The entity was already removed optimistically; just retire the write
  /// sequence.
  pub fn reconcile_delete(&mut self, ticket: &MutationTicket) {
    let id = ticket.entity_id();
    if self.last_write.get(&id) == Some(&ticket.seq) {
      self.last_write.remove(&id);
    }
  }

  // ==========================================================================
  // Subscriptions
  // ==========================================================================

  /// Register a listener called after every collection change.
  pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
  where
    F: Fn(&[Issue]) + Send + 'static,
  {
    let id = self.next_listener_id;
    self.next_listener_id += 1;
    self.listeners.push((id, Box::new(listener)));
    id
  }

  pub fn unsubscribe(&mut self, id: ListenerId) {
    self.listeners.retain(|(listener_id, _)| *listener_id != id);
  }

  fn next_seq(&mut self, id: i64) -> u64 {
    self.seq += 1;
    self.last_write.insert(id, self.seq);
    self.seq
  }

  fn notify(&self) {
    for (_, listener) in &self.listeners {
      listener(&self.issues);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::IssueStatus;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;

  fn issue(id: i64, title: &str) -> Issue {
    let now = Utc::now();
    Issue {
      id,
      title: title.to_string(),
      description: None,
      status: IssueStatus::NotStarted,
      progress: 0,
      created_at: now,
      updated_at: now,
    }
  }

  fn store_with(issues: Vec<Issue>) -> IssueStore {
    let mut store = IssueStore::new(Duration::seconds(30));
    store.set(issues);
    store
  }

  #[test]
  fn test_set_records_freshness_and_clears_error() {
    let mut store = IssueStore::new(Duration::seconds(30));
    assert!(!store.is_fresh(Utc::now()));

    store.set_error(ApiError::Network("down".into()));
    store.set(vec![issue(1, "X")]);

    assert!(store.error().is_none());
    assert!(store.is_fresh(Utc::now()));
    assert!(!store.is_fresh(Utc::now() + Duration::seconds(31)));
  }

  #[test]
  fn test_optimistic_create_assigns_negative_temp_id() {
    let mut store = store_with(vec![issue(1, "existing")]);

    let ticket = store.apply_create(&CreateIssue {
      title: "new issue".into(),
      ..Default::default()
    });

    let temp_id = ticket.temp_id().unwrap();
    assert!(temp_id < 0);
    // Optimistic entity goes to the front, matching newest-first order.
    assert_eq!(store.issues()[0].id, temp_id);
    assert_eq!(store.issues()[0].title, "new issue");
    assert_eq!(store.issues().len(), 2);
  }

  #[test]
  fn test_reconcile_create_swaps_in_server_entity() {
    let mut store = store_with(vec![issue(1, "existing")]);
    let ticket = store.apply_create(&CreateIssue {
      title: "new issue".into(),
      ..Default::default()
    });

    let server = issue(42, "new issue");
    store.reconcile_create(&ticket, server);

    assert_eq!(store.issues()[0].id, 42);
    assert_eq!(store.issues().len(), 2);
  }

  #[test]
  fn test_rollback_restores_pre_mutation_collection() {
    let original = vec![issue(1, "X")];
    let mut store = store_with(original.clone());

    let ticket = store
      .apply_update(
        1,
        &UpdateIssue {
          title: Some("Y".into()),
          ..Default::default()
        },
      )
      .unwrap();
    assert_eq!(store.issues()[0].title, "Y");

    store.rollback(ticket);
    assert_eq!(store.issues(), &original[..]);
  }

  #[test]
  fn test_rollback_of_failed_create_removes_placeholder() {
    let original = vec![issue(1, "X")];
    let mut store = store_with(original.clone());

    let ticket = store.apply_create(&CreateIssue {
      title: "doomed".into(),
      ..Default::default()
    });
    assert_eq!(store.issues().len(), 2);

    store.rollback(ticket);
    assert_eq!(store.issues(), &original[..]);
  }

  #[test]
  fn test_rollback_of_failed_delete_reinserts_at_position() {
    let original = vec![issue(3, "c"), issue(2, "b"), issue(1, "a")];
    let mut store = store_with(original.clone());

    let ticket = store.apply_delete(2).unwrap();
    assert_eq!(store.issues().len(), 2);

    store.rollback(ticket);
    assert_eq!(store.issues(), &original[..]);
  }

  #[test]
  fn test_optimistic_update_bumps_updated_at() {
    let mut store = store_with(vec![issue(1, "X")]);
    let before = store.issues()[0].updated_at;

    store
      .apply_update(
        1,
        &UpdateIssue {
          progress: Some(50),
          ..Default::default()
        },
      )
      .unwrap();

    assert_eq!(store.issues()[0].progress, 50);
    assert!(store.issues()[0].updated_at >= before);
  }

  #[test]
  fn test_out_of_order_reconciliation_keeps_newer_write() {
    let mut store = store_with(vec![issue(1, "X")]);

    // Mutation A starts, then B starts before A resolves.
    let ticket_a = store
      .apply_update(
        1,
        &UpdateIssue {
          title: Some("A".into()),
          ..Default::default()
        },
      )
      .unwrap();
    let ticket_b = store
      .apply_update(
        1,
        &UpdateIssue {
          title: Some("B".into()),
          ..Default::default()
        },
      )
      .unwrap();

    // B's network call completes first.
    store.reconcile_update(&ticket_b, issue(1, "B"));
    assert_eq!(store.issues()[0].title, "B");

    // A's response arrives late; it must not revert the newer write.
    store.reconcile_update(&ticket_a, issue(1, "A"));
    assert_eq!(store.issues()[0].title, "B");
  }

  #[test]
  fn test_rollback_does_not_clobber_newer_write() {
    let mut store = store_with(vec![issue(1, "X")]);

    let ticket_a = store
      .apply_update(
        1,
        &UpdateIssue {
          title: Some("A".into()),
          ..Default::default()
        },
      )
      .unwrap();
    store
      .apply_update(
        1,
        &UpdateIssue {
          title: Some("B".into()),
          ..Default::default()
        },
      )
      .unwrap();

    // A fails after B was applied; the rollback must leave B's optimistic
    // state in place.
    store.rollback(ticket_a);
    assert_eq!(store.issues()[0].title, "B");
  }

  #[test]
  fn test_snapshot_restore_round_trip() {
    let original = vec![issue(2, "b"), issue(1, "a")];
    let mut store = store_with(original.clone());

    let snapshot = store.snapshot();
    store.apply_delete(1).unwrap();
    store.apply_delete(2).unwrap();
    assert!(store.issues().is_empty());

    store.restore(snapshot);
    assert_eq!(store.issues(), &original[..]);
  }

  #[test]
  fn test_listeners_fire_on_changes_until_unsubscribed() {
    let mut store = IssueStore::new(Duration::seconds(30));
    let calls = Arc::new(AtomicU32::new(0));

    let counter = calls.clone();
    let id = store.subscribe(move |_| {
      counter.fetch_add(1, Ordering::SeqCst);
    });

    store.set(vec![issue(1, "X")]);
    store
      .apply_update(
        1,
        &UpdateIssue {
          progress: Some(10),
          ..Default::default()
        },
      )
      .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    store.unsubscribe(id);
    store.apply_delete(1).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn test_update_of_unknown_entity_returns_none() {
    let mut store = store_with(vec![issue(1, "X")]);
    assert!(store
      .apply_update(
        99,
        &UpdateIssue {
          title: Some("nope".into()),
          ..Default::default()
        }
      )
      .is_none());
    assert!(store.apply_delete(99).is_none());
  }
}
