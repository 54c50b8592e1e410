//! The cache strategy router: the single entry point for outbound requests.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};
use url::Url;

use super::layer::StrategyLayer;
use super::rules::{RouteTable, Strategy};
use super::storage::{BucketStorage, CacheError};
use crate::clock::Clock;
use crate::net::{Request, Response, Transport, TransportError};

/// Result of precaching the app shell.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InstallReport {
  pub cached: usize,
  pub failed: Vec<String>,
}

/// Per-bucket entry count, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketStats {
  pub name: String,
  pub entries: usize,
  pub current: bool,
}

/// Classifies every request and dispatches it to the strategy its rule names.
///
/// The router is itself a [`Transport`], so anything built on top of it
/// (the story gateway in particular) goes through the caches transparently.
pub struct CacheRouter<T, S> {
  routes: RouteTable,
  layer: StrategyLayer<T, S>,
}

impl<T, S> CacheRouter<T, S>
where
  T: Transport + 'static,
  S: BucketStorage + 'static,
{
  pub fn new(transport: T, storage: S, routes: RouteTable, clock: Arc<dyn Clock>) -> Self {
    Self {
      routes,
      layer: StrategyLayer::new(Arc::new(transport), Arc::new(storage), clock),
    }
  }

  /// Answer a request according to its rule.
  pub async fn route(&self, request: &Request) -> Result<Response, TransportError> {
    if !request.is_get() {
      return Ok(self.layer.network_only(request).await);
    }

    let Some(rule) = self.routes.classify(request) else {
      return Ok(self.layer.network_only(request).await);
    };

    debug!(url = %request.url, strategy = ?rule.strategy, bucket = %rule.bucket.name, "Routing request");

    match rule.strategy {
      Strategy::CacheFirst => self.layer.cache_first(&rule.bucket, request).await,
      Strategy::NetworkFirst => Ok(self.layer.network_first(&rule.bucket, request).await),
      Strategy::StaleWhileRevalidate => {
        self
          .layer
          .stale_while_revalidate(&rule.bucket, request)
          .await
      }
    }
  }

  /// Precache the given URLs into whichever bucket their rule selects.
  pub async fn install(&self, urls: &[Url]) -> InstallReport {
    let fetches = urls.iter().map(|url| async move {
      let request = Request::get(url.clone());
      let result = match self.routes.classify(&request) {
        Some(rule) => match self.layer.cache_first(&rule.bucket, &request).await {
          Ok(response) if response.is_cacheable() => Ok(()),
          Ok(response) => Err(format!("status {}", response.status)),
          Err(e) => Err(e.to_string()),
        },
        None => Err("no matching rule".to_string()),
      };
      (url, result)
    });

    let mut report = InstallReport::default();
    for (url, result) in join_all(fetches).await {
      match result {
        Ok(()) => report.cached += 1,
        Err(reason) => {
          warn!(url = %url, reason = %reason, "Failed to precache");
          report.failed.push(url.to_string());
        }
      }
    }

    info!(cached = report.cached, failed = report.failed.len(), "Precache complete");
    report
  }

  /// Delete every bucket left behind by another version, then purge expired
  /// entries from the current buckets. Returns the deleted bucket names.
  pub fn activate(&self) -> Result<Vec<String>, CacheError> {
    let storage = self.layer.storage();
    let current = self.routes.bucket_names();

    let mut deleted = Vec::new();
    for name in storage.bucket_names()? {
      if !current.contains(&name.as_str()) {
        info!(bucket = %name, "Deleting old cache bucket");
        storage.delete_bucket(&name)?;
        deleted.push(name);
      }
    }

    let now = self.layer.now();
    for rule in self.routes.rules() {
      if let Some(max_age) = rule.bucket.max_age {
        let purged = storage.purge_older_than(&rule.bucket.name, now - max_age)?;
        if purged > 0 {
          debug!(bucket = %rule.bucket.name, purged, "Purged expired entries");
        }
      }
    }

    Ok(deleted)
  }

  /// Entry counts for every bucket on disk.
  pub fn stats(&self) -> Result<Vec<BucketStats>, CacheError> {
    let storage = self.layer.storage();
    let current = self.routes.bucket_names();
    storage
      .bucket_names()?
      .into_iter()
      .map(|name| {
        Ok(BucketStats {
          entries: storage.len(&name)?,
          current: current.contains(&name.as_str()),
          name,
        })
      })
      .collect()
  }
}

#[async_trait::async_trait]
impl<T, S> Transport for CacheRouter<T, S>
where
  T: Transport + 'static,
  S: BucketStorage + 'static,
{
  async fn fetch(&self, request: &Request) -> Result<Response, TransportError> {
    self.route(request).await
  }
}
