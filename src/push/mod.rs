//! Push notification subscription.

mod keys;
mod manager;
mod platform;

use thiserror::Error;

pub use manager::{SubscribeOutcome, SubscriptionManager, UnsubscribeOutcome};
pub use platform::LocalPushPlatform;

#[derive(Debug, Error)]
pub enum PushError {
  #[error("push platform error: {0}")]
  Platform(String),

  #[error("invalid key encoding: {0}")]
  Key(#[from] base64::DecodeError),

  #[error("server registration failed: {0}")]
  Server(#[source] crate::error::Error),

  #[error("push registration I/O failed: {0}")]
  Io(#[from] std::io::Error),

  #[error("corrupt push registration: {0}")]
  Corrupt(#[from] serde_json::Error),
}

impl PushError {
  /// The gateway error behind a failed server call, if that is what failed.
  pub fn server_error(&self) -> Option<&crate::error::Error> {
    match self {
      PushError::Server(e) => Some(e),
      _ => None,
    }
  }
}
