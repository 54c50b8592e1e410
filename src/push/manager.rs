//! Keeps the platform subscription and the server registration in step.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use super::keys::decode_server_key;
use super::platform::{PushPlatform, PushSubscription};
use super::PushError;
use crate::error::Error;
use crate::net::Transport;
use crate::story::{StoryGateway, SubscribeRequest};

/// The server half of a push pairing.
#[async_trait::async_trait]
pub trait PushServer: Send + Sync {
  async fn register(&self, subscription: &SubscribeRequest) -> Result<(), Error>;
  async fn unregister(&self, endpoint: &str) -> Result<(), Error>;
}

#[async_trait::async_trait]
impl<T: Transport> PushServer for StoryGateway<T> {
  async fn register(&self, subscription: &SubscribeRequest) -> Result<(), Error> {
    self.subscribe_notification(subscription).await
  }

  async fn unregister(&self, endpoint: &str) -> Result<(), Error> {
    self.unsubscribe_notification(endpoint).await
  }
}

#[async_trait::async_trait]
impl<S: PushServer + ?Sized> PushServer for Arc<S> {
  async fn register(&self, subscription: &SubscribeRequest) -> Result<(), Error> {
    (**self).register(subscription).await
  }

  async fn unregister(&self, endpoint: &str) -> Result<(), Error> {
    (**self).unregister(endpoint).await
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
  Unsubscribed,
  Subscribing,
  Subscribed,
  Unsubscribing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeOutcome {
  Subscribed(PushSubscription),
  /// A local subscription existed; nothing was sent to the server
  AlreadySubscribed(PushSubscription),
  Unsupported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
  Unsubscribed,
  NotSubscribed,
  Unsupported,
}

/// Push subscription state machine.
///
/// Operations are serialized through the state lock, so a subscribe racing an
/// unsubscribe sees the other's result rather than a half-finished pairing.
pub struct SubscriptionManager<P, S> {
  platform: P,
  server: S,
  server_key: String,
  /// Unknown until first read from the platform
  state: Mutex<Option<SubscriptionState>>,
}

impl<P: PushPlatform, S: PushServer> SubscriptionManager<P, S> {
  pub fn new(platform: P, server: S, server_key: impl Into<String>) -> Self {
    Self {
      platform,
      server,
      server_key: server_key.into(),
      state: Mutex::new(None),
    }
  }

  /// Settled state, seeded from any registration the platform already holds.
  pub async fn state(&self) -> SubscriptionState {
    let mut state = self.state.lock().await;
    if let Some(known) = *state {
      return known;
    }
    if !self.platform.is_supported() {
      return SubscriptionState::Unsubscribed;
    }

    match self.platform.get_subscription().await {
      Ok(existing) => {
        let known = if existing.is_some() {
          SubscriptionState::Subscribed
        } else {
          SubscriptionState::Unsubscribed
        };
        *state = Some(known);
        known
      }
      Err(e) => {
        warn!(error = %e, "Failed to read push subscription");
        SubscriptionState::Unsubscribed
      }
    }
  }

  /// Current local subscription, if any.
  pub async fn current(&self) -> Result<Option<PushSubscription>, PushError> {
    if !self.platform.is_supported() {
      return Ok(None);
    }
    self.platform.get_subscription().await
  }

  pub async fn subscribe(&self) -> Result<SubscribeOutcome, PushError> {
    if !self.platform.is_supported() {
      info!("Push is not supported on this platform");
      return Ok(SubscribeOutcome::Unsupported);
    }

    let mut state = self.state.lock().await;
    if let Some(existing) = self.platform.get_subscription().await? {
      *state = Some(SubscriptionState::Subscribed);
      return Ok(SubscribeOutcome::AlreadySubscribed(existing));
    }

    let key = decode_server_key(&self.server_key)?;
    *state = Some(SubscriptionState::Subscribing);
    let subscription = match self.platform.subscribe(&key).await {
      Ok(subscription) => subscription,
      Err(e) => {
        *state = Some(SubscriptionState::Unsubscribed);
        return Err(e);
      }
    };

    if let Err(e) = self.server.register(&subscription.to_request()).await {
      warn!(endpoint = %subscription.endpoint, error = %e, "Server registration failed, rolling back");
      if let Err(rollback) = self.platform.unsubscribe(&subscription).await {
        warn!(error = %rollback, "Failed to roll back local push subscription");
      }
      *state = Some(SubscriptionState::Unsubscribed);
      return Err(PushError::Server(e));
    }

    *state = Some(SubscriptionState::Subscribed);
    info!(endpoint = %subscription.endpoint, "Subscribed to push notifications");
    Ok(SubscribeOutcome::Subscribed(subscription))
  }

  pub async fn unsubscribe(&self) -> Result<UnsubscribeOutcome, PushError> {
    if !self.platform.is_supported() {
      return Ok(UnsubscribeOutcome::Unsupported);
    }

    let mut state = self.state.lock().await;
    let Some(subscription) = self.platform.get_subscription().await? else {
      *state = Some(SubscriptionState::Unsubscribed);
      return Ok(UnsubscribeOutcome::NotSubscribed);
    };

    *state = Some(SubscriptionState::Unsubscribing);
    if let Err(e) = self.server.unregister(&subscription.endpoint).await {
      // Still subscribed locally; the server may still deliver
      warn!(endpoint = %subscription.endpoint, error = %e, "Server unsubscribe failed, keeping local subscription");
      *state = Some(SubscriptionState::Subscribed);
      return Err(PushError::Server(e));
    }

    match self.platform.unsubscribe(&subscription).await {
      Ok(_) => {
        *state = Some(SubscriptionState::Unsubscribed);
        info!(endpoint = %subscription.endpoint, "Unsubscribed from push notifications");
        Ok(UnsubscribeOutcome::Unsubscribed)
      }
      Err(e) => {
        *state = Some(SubscriptionState::Subscribed);
        Err(e)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
  use url::Url;

  use crate::push::LocalPushPlatform;

  const VAPID_KEY: &str =
    "BCCs2eonMI-6H2ctvFaWg-UYdDv387Vno_bzUzALpB442r2lCnsHmtrx8biyPi_E-1fSGABK_Qs_GlvPoJJqxbk";

  #[derive(Default)]
  struct FakeServer {
    fail: AtomicBool,
    registered: AtomicUsize,
    unregistered: AtomicUsize,
    last: std::sync::Mutex<Option<SubscribeRequest>>,
  }

  #[async_trait::async_trait]
  impl PushServer for FakeServer {
    async fn register(&self, subscription: &SubscribeRequest) -> Result<(), Error> {
      if self.fail.load(Ordering::SeqCst) {
        return Err(Error::NetworkUnavailable("down".to_string()));
      }
      self.registered.fetch_add(1, Ordering::SeqCst);
      *self.last.lock().unwrap() = Some(subscription.clone());
      Ok(())
    }

    async fn unregister(&self, _endpoint: &str) -> Result<(), Error> {
      if self.fail.load(Ordering::SeqCst) {
        return Err(Error::NetworkUnavailable("down".to_string()));
      }
      self.unregistered.fetch_add(1, Ordering::SeqCst);
      Ok(())
    }
  }

  fn manager(
    dir: &tempfile::TempDir,
    supported: bool,
  ) -> (SubscriptionManager<LocalPushPlatform, Arc<FakeServer>>, Arc<FakeServer>) {
    let service = supported.then(|| Url::parse("https://push.example.com/send").unwrap());
    let platform = LocalPushPlatform::new(dir.path().join("push.json"), service);
    let server = Arc::new(FakeServer::default());
    (
      SubscriptionManager::new(platform, Arc::clone(&server), VAPID_KEY),
      server,
    )
  }

  #[tokio::test]
  async fn test_subscribe_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, server) = manager(&dir, true);

    let first = manager.subscribe().await.unwrap();
    let SubscribeOutcome::Subscribed(sub) = first else {
      panic!("expected a new subscription");
    };
    let second = manager.subscribe().await.unwrap();
    assert_eq!(second, SubscribeOutcome::AlreadySubscribed(sub.clone()));
    assert_eq!(server.registered.load(Ordering::SeqCst), 1);
    assert_eq!(manager.state().await, SubscriptionState::Subscribed);

    let sent = server.last.lock().unwrap().clone().unwrap();
    assert_eq!(sent.endpoint, sub.endpoint);
    assert_eq!(sent.keys.auth, crate::push::keys::encode_key(&sub.auth));
  }

  #[tokio::test]
  async fn test_failed_registration_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, server) = manager(&dir, true);
    server.fail.store(true, Ordering::SeqCst);

    let err = manager.subscribe().await.unwrap_err();
    assert!(matches!(err, PushError::Server(_)));
    assert!(manager.current().await.unwrap().is_none());
    assert_eq!(manager.state().await, SubscriptionState::Unsubscribed);
  }

  #[tokio::test]
  async fn test_failed_server_unsubscribe_keeps_local() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, server) = manager(&dir, true);
    manager.subscribe().await.unwrap();
    server.fail.store(true, Ordering::SeqCst);

    assert!(manager.unsubscribe().await.is_err());
    assert!(manager.current().await.unwrap().is_some());
    assert_eq!(manager.state().await, SubscriptionState::Subscribed);
  }

  #[tokio::test]
  async fn test_unsubscribe_tears_down_after_server() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, server) = manager(&dir, true);
    manager.subscribe().await.unwrap();

    assert_eq!(manager.unsubscribe().await.unwrap(), UnsubscribeOutcome::Unsubscribed);
    assert_eq!(server.unregistered.load(Ordering::SeqCst), 1);
    assert!(manager.current().await.unwrap().is_none());

    assert_eq!(manager.unsubscribe().await.unwrap(), UnsubscribeOutcome::NotSubscribed);
    assert_eq!(server.unregistered.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_state_picks_up_existing_registration() {
    let dir = tempfile::tempdir().unwrap();
    let (first, _) = manager(&dir, true);
    assert_eq!(first.state().await, SubscriptionState::Unsubscribed);
    first.subscribe().await.unwrap();

    let (restarted, server) = manager(&dir, true);
    assert_eq!(restarted.state().await, SubscriptionState::Subscribed);
    assert_eq!(server.registered.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_unsupported_platform_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, server) = manager(&dir, false);

    assert_eq!(manager.subscribe().await.unwrap(), SubscribeOutcome::Unsupported);
    assert_eq!(manager.unsubscribe().await.unwrap(), UnsubscribeOutcome::Unsupported);
    assert_eq!(server.registered.load(Ordering::SeqCst), 0);
  }
}
