//! Schema-boundary validation for issue payloads.
//!
//! Field constraints live here, ahead of the remote access layer: the CLI
//! validates before sending, and the server validates incoming bodies with
//! the same rules so direct API calls cannot bypass them. The repository
//! itself stays permissive and stores whatever it is handed.

use crate::api::error::ApiError;
use crate::model::{CreateIssue, IssueStatus, UpdateIssue};

pub const TITLE_MAX: usize = 255;
pub const DESCRIPTION_MAX: usize = 2000;

/// Validate and normalize a create payload.
///
/// Trims title and description, drops an empty description, and rejects
/// status/progress pairs that violate the workflow coupling
/// (not-started means 0, completed means 100).
pub fn validate_create(input: CreateIssue) -> Result<CreateIssue, ApiError> {
  let title = input.title.trim().to_string();
  if title.is_empty() {
    return Err(ApiError::InvalidInput("Title is required".into()));
  }
  if title.chars().count() > TITLE_MAX {
    return Err(ApiError::InvalidInput(
      "Title must be less than 255 characters".into(),
    ));
  }

  let description = normalize_description(input.description)?;

  if let Some(progress) = input.progress {
    check_progress_range(progress)?;
  }

  // Coupling is checked against the effective values the server would
  // store, with defaults applied.
  let status = input.status.unwrap_or_default();
  let progress = input.progress.unwrap_or(0);
  check_coupling(status, progress)?;

  Ok(CreateIssue {
    title,
    description,
    status: input.status,
    progress: input.progress,
  })
}

/// Validate and normalize an update payload.
///
/// All fields optional. When status moves to a terminal state the progress
/// is coerced to match (0 for not-started, 100 for completed) rather than
/// rejected, so a bare status change is always a valid update.
pub fn validate_update(input: UpdateIssue) -> Result<UpdateIssue, ApiError> {
  let title = match input.title {
    Some(t) => {
      let t = t.trim().to_string();
      if t.is_empty() {
        return Err(ApiError::InvalidInput("Title cannot be empty".into()));
      }
      if t.chars().count() > TITLE_MAX {
        return Err(ApiError::InvalidInput(
          "Title must be less than 255 characters".into(),
        ));
      }
      Some(t)
    }
    None => None,
  };

  let description = normalize_description(input.description)?;

  if let Some(progress) = input.progress {
    check_progress_range(progress)?;
  }

  let progress = match input.status {
    Some(IssueStatus::NotStarted) => Some(0),
    Some(IssueStatus::Completed) => Some(100),
    _ => input.progress,
  };

  Ok(UpdateIssue {
    title,
    description,
    status: input.status,
    progress,
  })
}

fn normalize_description(description: Option<String>) -> Result<Option<String>, ApiError> {
  match description {
    Some(d) => {
      let d = d.trim().to_string();
      if d.chars().count() > DESCRIPTION_MAX {
        return Err(ApiError::InvalidInput(
          "Description must be less than 2000 characters".into(),
        ));
      }
      Ok(if d.is_empty() { None } else { Some(d) })
    }
    None => Ok(None),
  }
}

fn check_progress_range(progress: i64) -> Result<(), ApiError> {
  if !(0..=100).contains(&progress) {
    return Err(ApiError::InvalidInput(
      "Progress must be between 0 and 100".into(),
    ));
  }
  Ok(())
}

fn check_coupling(status: IssueStatus, progress: i64) -> Result<(), ApiError> {
  match status {
    IssueStatus::NotStarted if progress != 0 => Err(ApiError::InvalidInput(
      "When status is not-started, progress must be 0".into(),
    )),
    IssueStatus::Completed if progress != 100 => Err(ApiError::InvalidInput(
      "When status is completed, progress must be 100".into(),
    )),
    _ => Ok(()),
  }
}
