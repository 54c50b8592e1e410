//! Request classification: which strategy and which bucket serve a request.

use chrono::Duration;
use url::{Origin, Url};

use crate::net::{Destination, Request};

/// The three fixed caching strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  CacheFirst,
  NetworkFirst,
  StaleWhileRevalidate,
}

/// Name and bounds of one cache bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketPolicy {
  pub name: String,
  /// Oldest entries are evicted once a bucket grows past this
  pub max_entries: Option<usize>,
  /// Entries older than this are treated as misses
  pub max_age: Option<Duration>,
}

/// Predicate half of a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
  /// Document, style, script or image from the application's own origin
  AppAsset,
  /// Image served by the story API host
  ApiImage,
  /// Anything else on the story API host
  Api,
  /// Requests to one of the listed third-party hosts
  Hosts(Vec<String>),
  /// Catch-all
  Any,
}

#[derive(Debug, Clone)]
pub struct Rule {
  pub matcher: Matcher,
  pub strategy: Strategy,
  pub bucket: BucketPolicy,
}

/// Inputs for building the standard rule table.
#[derive(Debug, Clone)]
pub struct RouterSettings {
  pub app_origin: Url,
  pub api_base: Url,
  pub vendor_hosts: Vec<String>,
  pub bucket_prefix: String,
  pub version: String,
}

/// Ordered rule table. The first matching rule wins.
#[derive(Debug, Clone)]
pub struct RouteTable {
  app_origin: Origin,
  api_host: Option<String>,
  rules: Vec<Rule>,
}

const ASSET_MAX_ENTRIES: usize = 60;
const ASSET_MAX_AGE_DAYS: i64 = 30;
const API_MAX_ENTRIES: usize = 50;
const API_MAX_AGE_DAYS: i64 = 7;

impl RouteTable {
  pub fn new(app_origin: &Url, api_base: &Url, rules: Vec<Rule>) -> Self {
    Self {
      app_origin: app_origin.origin(),
      api_host: api_base.host_str().map(str::to_ascii_lowercase),
      rules,
    }
  }

  /// The application's rule table: static assets, API images, API data,
  /// vendor assets, then everything else.
  pub fn standard(settings: &RouterSettings) -> Self {
    let bucket = |role: &str, max_entries: Option<usize>, max_age_days: Option<i64>| BucketPolicy {
      name: format!("{}-{}-{}", settings.bucket_prefix, role, settings.version),
      max_entries,
      max_age: max_age_days.map(Duration::days),
    };

    let rules = vec![
      Rule {
        matcher: Matcher::AppAsset,
        strategy: Strategy::CacheFirst,
        bucket: bucket("static", Some(ASSET_MAX_ENTRIES), Some(ASSET_MAX_AGE_DAYS)),
      },
      Rule {
        matcher: Matcher::ApiImage,
        strategy: Strategy::StaleWhileRevalidate,
        bucket: bucket("api-images", Some(ASSET_MAX_ENTRIES), Some(ASSET_MAX_AGE_DAYS)),
      },
      Rule {
        matcher: Matcher::Api,
        strategy: Strategy::NetworkFirst,
        bucket: bucket("api", Some(API_MAX_ENTRIES), Some(API_MAX_AGE_DAYS)),
      },
      Rule {
        matcher: Matcher::Hosts(
          settings
            .vendor_hosts
            .iter()
            .map(|h| h.to_ascii_lowercase())
            .collect(),
        ),
        strategy: Strategy::CacheFirst,
        bucket: bucket("vendor", Some(ASSET_MAX_ENTRIES), Some(ASSET_MAX_AGE_DAYS)),
      },
      Rule {
        matcher: Matcher::Any,
        strategy: Strategy::NetworkFirst,
        bucket: bucket("runtime", None, None),
      },
    ];

    Self::new(&settings.app_origin, &settings.api_base, rules)
  }

  /// Find the rule for a request, or `None` if no rule matches (only
  /// possible for tables without a catch-all).
  pub fn classify(&self, request: &Request) -> Option<&Rule> {
    self.rules.iter().find(|rule| self.matches(&rule.matcher, request))
  }

  /// Names of every bucket the current table can write to.
  pub fn bucket_names(&self) -> Vec<&str> {
    self.rules.iter().map(|r| r.bucket.name.as_str()).collect()
  }

  pub fn rules(&self) -> &[Rule] {
    &self.rules
  }

  fn matches(&self, matcher: &Matcher, request: &Request) -> bool {
    let host = request.url.host_str().map(str::to_ascii_lowercase);
    let on_api_host = host.is_some() && host == self.api_host;

    match matcher {
      Matcher::AppAsset => {
        request.url.origin() == self.app_origin
          && matches!(
            request.destination,
            Destination::Document | Destination::Style | Destination::Script | Destination::Image
          )
      }
      Matcher::ApiImage => on_api_host && request.destination == Destination::Image,
      Matcher::Api => on_api_host,
      Matcher::Hosts(hosts) => host.is_some_and(|h| hosts.iter().any(|allowed| *allowed == h)),
      Matcher::Any => true,
    }
  }
}

#[cfg(test)]
pub(crate) fn test_settings() -> RouterSettings {
  RouterSettings {
    app_origin: Url::parse("http://localhost:8080/").unwrap(),
    api_base: Url::parse("https://story-api.dicoding.dev/v1").unwrap(),
    vendor_hosts: vec!["unpkg.com".to_string()],
    bucket_prefix: "story-app".to_string(),
    version: "v2".to_string(),
  }
}
