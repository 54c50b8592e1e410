//! The platform side of push: who actually holds the subscription.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use super::keys::{decode_key, encode_key};
use super::PushError;
use crate::story::{SubscribeKeys, SubscribeRequest};

/// A local push registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushSubscription {
  pub endpoint: String,
  pub p256dh: Vec<u8>,
  pub auth: Vec<u8>,
}

impl PushSubscription {
  /// The registration body the story server expects.
  pub fn to_request(&self) -> SubscribeRequest {
    SubscribeRequest {
      endpoint: self.endpoint.clone(),
      keys: SubscribeKeys {
        p256dh: encode_key(&self.p256dh),
        auth: encode_key(&self.auth),
      },
    }
  }
}

/// Platform push capability.
#[async_trait::async_trait]
pub trait PushPlatform: Send + Sync {
  fn is_supported(&self) -> bool;

  async fn get_subscription(&self) -> Result<Option<PushSubscription>, PushError>;

  async fn subscribe(&self, application_server_key: &[u8]) -> Result<PushSubscription, PushError>;

  /// Tear down a subscription. Returns whether one was removed.
  async fn unsubscribe(&self, subscription: &PushSubscription) -> Result<bool, PushError>;
}

/// On-disk shape of a local registration.
#[derive(Debug, Serialize, Deserialize)]
struct LocalRegistration {
  endpoint: String,
  p256dh: String,
  auth: String,
  application_server_key: String,
  created_at: DateTime<Utc>,
}

/// Push platform for running outside a browser: a single registration kept
/// in a JSON file. Supported only when a push service URL is configured.
pub struct LocalPushPlatform {
  path: PathBuf,
  service_url: Option<Url>,
}

const P256DH_LEN: usize = 65;
const AUTH_LEN: usize = 16;

impl LocalPushPlatform {
  pub fn new(path: PathBuf, service_url: Option<Url>) -> Self {
    Self { path, service_url }
  }

  async fn load(&self) -> Result<Option<LocalRegistration>, PushError> {
    match tokio::fs::read_to_string(&self.path).await {
      Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(e.into()),
    }
  }

  /// Fresh credentials shaped like a browser's: an uncompressed P-256 point
  /// and a 16-byte auth secret.
  fn generate_credentials() -> (Vec<u8>, Vec<u8>, String) {
    let mut rng = rand::thread_rng();
    let mut p256dh = vec![0u8; P256DH_LEN];
    rng.fill(&mut p256dh[..]);
    p256dh[0] = 0x04;
    let mut auth = vec![0u8; AUTH_LEN];
    rng.fill(&mut auth[..]);
    let token: [u8; 16] = rng.gen();
    (p256dh, auth, hex::encode(token))
  }
}

#[async_trait::async_trait]
impl PushPlatform for LocalPushPlatform {
  fn is_supported(&self) -> bool {
    self.service_url.is_some()
  }

  async fn get_subscription(&self) -> Result<Option<PushSubscription>, PushError> {
    match self.load().await? {
      Some(reg) => Ok(Some(PushSubscription {
        endpoint: reg.endpoint,
        p256dh: decode_key(&reg.p256dh)?,
        auth: decode_key(&reg.auth)?,
      })),
      None => Ok(None),
    }
  }

  async fn subscribe(&self, application_server_key: &[u8]) -> Result<PushSubscription, PushError> {
    let service_url = self
      .service_url
      .as_ref()
      .ok_or_else(|| PushError::Platform("push is not supported".to_string()))?;
    if application_server_key.is_empty() {
      return Err(PushError::Platform("empty application server key".to_string()));
    }

    let (p256dh, auth, token) = Self::generate_credentials();
    let endpoint = format!("{}/{}", service_url.as_str().trim_end_matches('/'), token);

    let reg = LocalRegistration {
      endpoint: endpoint.clone(),
      p256dh: encode_key(&p256dh),
      auth: encode_key(&auth),
      application_server_key: encode_key(application_server_key),
      created_at: Utc::now(),
    };
    if let Some(parent) = self.path.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&self.path, serde_json::to_string_pretty(&reg)?).await?;

    info!(endpoint = %endpoint, "Created local push subscription");
    Ok(PushSubscription {
      endpoint,
      p256dh,
      auth,
    })
  }

  async fn unsubscribe(&self, subscription: &PushSubscription) -> Result<bool, PushError> {
    match self.load().await? {
      Some(reg) if reg.endpoint == subscription.endpoint => {
        tokio::fs::remove_file(&self.path).await?;
        debug!(endpoint = %reg.endpoint, "Removed local push subscription");
        Ok(true)
      }
      _ => Ok(false),
    }
  }
}
