//! Typed error taxonomy for the remote access layer.
//!
//! Every transport or status-code failure is normalized into one of these
//! variants before it reaches the mutation orchestrator or any view code,
//! so callers can match exhaustively instead of probing status codes.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
  /// The caller supplied malformed or out-of-range data (HTTP 400).
  /// Never retried; surfaced to the user as-is.
  #[error("{0}")]
  InvalidInput(String),

  /// The target entity does not exist (HTTP 404). Never retried; callers
  /// doing background refreshes may swallow it.
  #[error("{0}")]
  NotFound(String),

  /// Any other 4xx response.
  #[error("{0}")]
  Client(String),

  /// A 5xx response. Eligible for bounded retry.
  #[error("server error ({status}): {message}")]
  Server { status: u16, message: String },

  /// Transport failure or timeout. Eligible for bounded retry.
  #[error("network error: {0}")]
  Network(String),

  /// Anything that does not fit the taxonomy, e.g. a malformed success
  /// body. Logged and shown as a generic failure.
  #[error("unexpected error: {0}")]
  Unexpected(String),
}

impl ApiError {
  /// Classify an HTTP failure status plus the server's error message.
  pub fn from_status(status: u16, message: String) -> Self {
    match status {
      400 => ApiError::InvalidInput(message),
      404 => ApiError::NotFound(message),
      401..=499 => ApiError::Client(message),
      500..=599 => ApiError::Server { status, message },
      _ => ApiError::Unexpected(message),
    }
  }

  /// True for any 4xx-class failure, including not-found.
  pub fn is_client_error(&self) -> bool {
    matches!(
      self,
      ApiError::InvalidInput(_) | ApiError::NotFound(_) | ApiError::Client(_)
    )
  }

  pub fn is_not_found(&self) -> bool {
    matches!(self, ApiError::NotFound(_))
  }

  /// Only transport failures and 5xx responses are worth retrying.
  pub fn is_retryable(&self) -> bool {
    matches!(self, ApiError::Network(_) | ApiError::Server { .. })
  }
}

impl From<reqwest::Error> for ApiError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_timeout() || err.is_connect() || err.is_request() {
      ApiError::Network(err.to_string())
    } else if err.is_decode() {
      ApiError::Unexpected(format!("failed to decode response: {}", err))
    } else {
      ApiError::Unexpected(err.to_string())
    }
  }
}
