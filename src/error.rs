//! Error taxonomy shared by the story gateway and its callers.

use thiserror::Error;

use crate::db::StorageError;
use crate::story::ApiError;

#[derive(Debug, Error)]
pub enum Error {
  /// Transient; reads fall back to the local mirror
  #[error("network unavailable: {0}")]
  NetworkUnavailable(String),

  /// Never masked by cached data
  #[error("authentication required: {0}")]
  AuthenticationRequired(String),

  /// Both the network and the local mirror came up empty
  #[error("data unavailable: {0}")]
  DataUnavailable(String),

  #[error(transparent)]
  Storage(#[from] StorageError),

  /// The server understood the request and refused it
  #[error("request rejected: {0}")]
  Rejected(String),
}

impl Error {
  /// What to tell the user.
  pub fn user_message(&self) -> String {
    match self {
      Error::NetworkUnavailable(_) => "You are offline. Try again when connected.".to_string(),
      Error::AuthenticationRequired(_) => "Your session has expired. Please log in again.".to_string(),
      Error::DataUnavailable(_) => "No connection and no stories available offline.".to_string(),
      Error::Storage(e) if e.is_quota_exceeded() => "Local storage is full.".to_string(),
      Error::Storage(e) => format!("Local storage failed: {}", e),
      Error::Rejected(message) => message.clone(),
    }
  }
}

impl From<ApiError> for Error {
  fn from(e: ApiError) -> Self {
    match e {
      ApiError::Unauthorized(message) => Error::AuthenticationRequired(message),
      ApiError::Network(message) => Error::NetworkUnavailable(message),
      ApiError::Rejected { message, .. } => Error::Rejected(message),
      ApiError::InvalidResponse(message) => Error::Rejected(message),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_user_messages_are_distinct() {
    let messages = [
      Error::NetworkUnavailable(String::new()).user_message(),
      Error::AuthenticationRequired(String::new()).user_message(),
      Error::DataUnavailable(String::new()).user_message(),
      crate::story::OFFLINE_NOTICE.to_string(),
    ];
    for (i, a) in messages.iter().enumerate() {
      for b in &messages[i + 1..] {
        assert_ne!(a, b);
      }
    }
  }

  #[test]
  fn test_api_error_mapping() {
    assert!(matches!(
      Error::from(ApiError::Unauthorized("x".into())),
      Error::AuthenticationRequired(_)
    ));
    assert!(matches!(
      Error::from(ApiError::Network("x".into())),
      Error::NetworkUnavailable(_)
    ));
  }
}
