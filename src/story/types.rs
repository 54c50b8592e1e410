use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::api_types::StoryRecord;

/// A point on the map where a story was posted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
  pub lat: f64,
  pub lon: f64,
}

/// One user-submitted story. Replaced wholesale, never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoryRecord", into = "StoryRecord")]
pub struct Story {
  pub id: String,
  pub author_name: String,
  pub description: String,
  pub photo_url: String,
  pub created_at: DateTime<Utc>,
  pub location: Option<GeoPoint>,
}

/// Query for the story list endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListQuery {
  pub page: u32,
  pub size: u32,
  /// Only stories that carry a location
  pub with_location: bool,
}

impl Default for ListQuery {
  fn default() -> Self {
    Self {
      page: 1,
      size: 10,
      with_location: false,
    }
  }
}

/// A story about to be submitted.
#[derive(Debug, Clone)]
pub struct NewStory {
  pub description: String,
  pub photo: Vec<u8>,
  pub photo_name: String,
  pub photo_mime: String,
  pub location: Option<GeoPoint>,
}

/// Result of a read, including where the data came from.
#[derive(Debug, Clone)]
pub struct Fetched<T> {
  pub data: T,
  pub source: DataSource,
}

impl<T> Fetched<T> {
  /// Fresh data from the network.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: DataSource::Network,
    }
  }

  /// Network unreachable, serving the local mirror.
  pub fn offline(data: T) -> Self {
    Self {
      data,
      source: DataSource::Offline,
    }
  }

  pub fn is_stale(&self) -> bool {
    self.source == DataSource::Offline
  }

  /// Message to show alongside the data, if any.
  pub fn notice(&self) -> Option<&'static str> {
    match self.source {
      DataSource::Network => None,
      DataSource::Offline => Some(OFFLINE_NOTICE),
    }
  }
}

pub const OFFLINE_NOTICE: &str = "You are offline, showing saved data.";

/// Indicates where data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
  /// Fresh data from network
  Network,
  /// Network unavailable, possibly stale data from the local mirror
  Offline,
}
