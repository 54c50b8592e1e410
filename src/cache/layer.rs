//! Strategy execution: how a cache bucket and the network cooperate to
//! answer one request.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::rules::BucketPolicy;
use super::storage::BucketStorage;
use crate::clock::Clock;
use crate::net::{Request, Response, Transport, TransportError};

/// Body of the response synthesized when nothing can answer.
pub const OFFLINE_MESSAGE: &str = "Offline and no cached data available.";

/// Runs the caching strategies against a transport and a bucket backend.
///
/// Bucket failures never reach the caller: a broken bucket behaves like an
/// empty one and the failure is logged.
pub struct StrategyLayer<T, S> {
  transport: Arc<T>,
  storage: Arc<S>,
  clock: Arc<dyn Clock>,
}

impl<T, S> Clone for StrategyLayer<T, S> {
  fn clone(&self) -> Self {
    Self {
      transport: Arc::clone(&self.transport),
      storage: Arc::clone(&self.storage),
      clock: Arc::clone(&self.clock),
    }
  }
}

impl<T, S> StrategyLayer<T, S>
where
  T: Transport + 'static,
  S: BucketStorage + 'static,
{
  pub fn new(transport: Arc<T>, storage: Arc<S>, clock: Arc<dyn Clock>) -> Self {
    Self {
      transport,
      storage,
      clock,
    }
  }

  pub fn storage(&self) -> &S {
    &self.storage
  }

  pub fn now(&self) -> DateTime<Utc> {
    self.clock.now()
  }

  fn is_expired(&self, policy: &BucketPolicy, cached_at: DateTime<Utc>) -> bool {
    match policy.max_age {
      Some(max_age) => self.clock.now() - cached_at > max_age,
      None => false,
    }
  }

  /// Usable cached response for `request`, if any. Expired entries are
  /// removed on the way out.
  pub fn lookup(&self, policy: &BucketPolicy, request: &Request) -> Option<Response> {
    let key = request.cache_key();
    match self.storage.lookup(&policy.name, &key) {
      Ok(Some(cached)) if self.is_expired(policy, cached.cached_at) => {
        debug!(bucket = %policy.name, url = %request.url, "Cache entry expired");
        if let Err(e) = self.storage.remove(&policy.name, &key) {
          warn!(bucket = %policy.name, error = %e, "Failed to purge expired entry");
        }
        None
      }
      Ok(Some(cached)) => {
        debug!(bucket = %policy.name, url = %request.url, "Cache hit");
        Some(cached.response)
      }
      Ok(None) => {
        debug!(bucket = %policy.name, url = %request.url, "Cache miss");
        None
      }
      Err(e) => {
        warn!(bucket = %policy.name, error = %e, "Cache lookup failed, treating as miss");
        None
      }
    }
  }

  /// Store a response if it is cacheable, then enforce the capacity bound.
  pub fn put(&self, policy: &BucketPolicy, request: &Request, response: &Response) {
    if !request.is_get() || !response.is_cacheable() {
      debug!(bucket = %policy.name, status = response.status, "Response not cacheable");
      return;
    }

    let key = request.cache_key();
    if let Err(e) = self.storage.store(
      &policy.name,
      &key,
      request.url.as_str(),
      response,
      self.clock.now(),
    ) {
      warn!(bucket = %policy.name, error = %e, "Failed to store response");
      return;
    }

    if let Some(max_entries) = policy.max_entries {
      match self.storage.trim(&policy.name, max_entries) {
        Ok(0) => {}
        Ok(evicted) => debug!(bucket = %policy.name, evicted, "Evicted oldest entries"),
        Err(e) => warn!(bucket = %policy.name, error = %e, "Failed to trim bucket"),
      }
    }
  }

  /// Serve from the bucket when possible, otherwise fetch and remember.
  pub async fn cache_first(
    &self,
    policy: &BucketPolicy,
    request: &Request,
  ) -> Result<Response, TransportError> {
    if let Some(cached) = self.lookup(policy, request) {
      return Ok(cached);
    }

    let response = self.transport.fetch(request).await?;
    self.put(policy, request, &response);
    Ok(response)
  }

  /// Prefer the network, fall back to the bucket, and synthesize a
  /// service-unavailable response when both come up empty.
  pub async fn network_first(&self, policy: &BucketPolicy, request: &Request) -> Response {
    match self.transport.fetch(request).await {
      Ok(response) => {
        self.put(policy, request, &response);
        response
      }
      Err(e) => {
        warn!(url = %request.url, error = %e, "Network failed, trying cache");
        match self.lookup(policy, request) {
          Some(cached) => Response {
            fallback: true,
            ..cached
          },
          None => Response::service_unavailable(OFFLINE_MESSAGE),
        }
      }
    }
  }

  /// Answer from the bucket immediately and refresh it in the background.
  /// Without a cached copy this waits for the network like cache-first.
  pub async fn stale_while_revalidate(
    &self,
    policy: &BucketPolicy,
    request: &Request,
  ) -> Result<Response, TransportError> {
    if let Some(cached) = self.lookup(policy, request) {
      let layer = self.clone();
      let policy = policy.clone();
      let request = request.clone();
      tokio::spawn(async move {
        layer.revalidate(&policy, &request).await;
      });
      return Ok(cached);
    }

    let response = self.transport.fetch(request).await?;
    self.put(policy, request, &response);
    Ok(response)
  }

  async fn revalidate(&self, policy: &BucketPolicy, request: &Request) {
    match self.transport.fetch(request).await {
      Ok(response) => {
        debug!(url = %request.url, status = response.status, "Background refresh done");
        self.put(policy, request, &response);
      }
      Err(e) => {
        warn!(url = %request.url, error = %e, "Background refresh failed");
      }
    }
  }

  /// Straight to the network; transport failures become a synthesized
  /// service-unavailable response.
  pub async fn network_only(&self, request: &Request) -> Response {
    match self.transport.fetch(request).await {
      Ok(response) => response,
      Err(e) => {
        warn!(method = %request.method, url = %request.url, error = %e, "Network request failed");
        Response::service_unavailable(OFFLINE_MESSAGE)
      }
    }
  }
}
