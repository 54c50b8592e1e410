use thiserror::Error;

use crate::net::{Response, TransportError};

use super::api_types::ApiEnvelope;

#[derive(Error, Debug)]
pub enum ApiError {
  #[error("Unauthorized - {0}")]
  Unauthorized(String),

  #[error("Network unavailable: {0}")]
  Network(String),

  #[error("Request rejected ({status}): {message}")]
  Rejected { status: u16, message: String },

  #[error("Invalid response: {0}")]
  InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Server messages that mean the bearer credential is missing or dead.
const AUTH_MESSAGES: &[&str] = &[
  "authentication is required",
  "unauthorized",
  "missing authentication",
  "invalid token",
  "token expired",
];

impl ApiError {
  /// Truncate a response body to avoid logging excessive data
  fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
      body.to_string()
    } else {
      let mut end = MAX_ERROR_BODY_LENGTH;
      while !body.is_char_boundary(end) {
        end -= 1;
      }
      format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }
  }

  pub fn is_auth(&self) -> bool {
    matches!(self, ApiError::Unauthorized(_))
  }

  fn is_auth_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    AUTH_MESSAGES.iter().any(|m| lower.contains(m))
  }

  /// Classify a response. Succeeds only for a 2xx response whose envelope
  /// does not carry the `error` flag.
  pub fn check(response: Response) -> Result<Response, ApiError> {
    if response.is_offline_fallback() {
      return Err(ApiError::Network(response.text()));
    }

    let envelope: Option<ApiEnvelope> = response.json().ok();
    let message = match &envelope {
      Some(env) if !env.message.is_empty() => env.message.clone(),
      _ => Self::truncate_body(&response.text()),
    };

    if response.status == 401 {
      return Err(ApiError::Unauthorized(message));
    }

    let flagged = envelope.as_ref().is_some_and(|env| env.error);
    if flagged || !response.is_success() {
      if Self::is_auth_message(&message) {
        return Err(ApiError::Unauthorized(message));
      }
      return Err(ApiError::Rejected {
        status: response.status,
        message,
      });
    }

    Ok(response)
  }
}

impl From<TransportError> for ApiError {
  fn from(e: TransportError) -> Self {
    ApiError::Network(e.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_success_passes() {
    let response = Response::ok(r#"{"error":false,"message":"ok"}"#);
    assert!(ApiError::check(response).is_ok());
  }

  #[test]
  fn test_401_is_unauthorized() {
    let response = Response::new(401, r#"{"error":true,"message":"Missing authentication"}"#);
    let err = ApiError::check(response).unwrap_err();
    assert!(err.is_auth());
  }

  #[test]
  fn test_error_flag_on_http_success_is_failure() {
    let response = Response::ok(r#"{"error":true,"message":"\"description\" is required"}"#);
    match ApiError::check(response).unwrap_err() {
      ApiError::Rejected { status, message } => {
        assert_eq!(status, 200);
        assert!(message.contains("description"));
      }
      other => panic!("unexpected error: {:?}", other),
    }
  }

  #[test]
  fn test_auth_message_without_401() {
    let response = Response::new(400, r#"{"error":true,"message":"Authentication is required"}"#);
    assert!(ApiError::check(response).unwrap_err().is_auth());
  }

  #[test]
  fn test_synthesized_unavailable_is_network() {
    let response = Response::service_unavailable("offline");
    assert!(matches!(
      ApiError::check(response),
      Err(ApiError::Network(_))
    ));
  }

  #[test]
  fn test_truncate_body() {
    let short = "short";
    assert_eq!(ApiError::truncate_body(short), "short");

    let long = "é".repeat(400);
    let truncated = ApiError::truncate_body(&long);
    assert!(truncated.contains("truncated, 800 total bytes"));
  }
}
