//! Serde types matching the story API's JSON.
//!
//! These are kept apart from the domain types so the wire format can stay
//! loose (optional coordinates, envelope flags) while `Story` stays strict.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{GeoPoint, Story};

// ============================================================================
// Story
// ============================================================================

/// A story as the API (and the local store) encodes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryRecord {
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub photo_url: String,
  pub created_at: DateTime<Utc>,
  #[serde(default)]
  pub lat: Option<f64>,
  #[serde(default)]
  pub lon: Option<f64>,
}

impl From<StoryRecord> for Story {
  fn from(record: StoryRecord) -> Self {
    // Half a coordinate is no location at all
    let location = match (record.lat, record.lon) {
      (Some(lat), Some(lon)) => Some(GeoPoint { lat, lon }),
      _ => None,
    };
    Story {
      id: record.id,
      author_name: record.name,
      description: record.description,
      photo_url: record.photo_url,
      created_at: record.created_at,
      location,
    }
  }
}

impl From<Story> for StoryRecord {
  fn from(story: Story) -> Self {
    StoryRecord {
      id: story.id,
      name: story.author_name,
      description: story.description,
      photo_url: story.photo_url,
      created_at: story.created_at,
      lat: story.location.map(|p| p.lat),
      lon: story.location.map(|p| p.lon),
    }
  }
}

// ============================================================================
// Response envelopes
// ============================================================================

/// Fields every API response carries.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope {
  #[serde(default)]
  pub error: bool,
  #[serde(default)]
  pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ListStoriesResponse {
  #[serde(rename = "listStory", default)]
  pub list_story: Vec<Story>,
}

#[derive(Debug, Deserialize)]
pub struct StoryDetailResponse {
  pub story: Story,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
  #[serde(rename = "loginResult")]
  pub login_result: LoginResult,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResult {
  #[serde(rename = "userId")]
  pub user_id: String,
  pub name: String,
  pub token: String,
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Debug, Serialize)]
pub struct RegisterRequest<'a> {
  pub name: &'a str,
  pub email: &'a str,
  pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
  pub email: &'a str,
  pub password: &'a str,
}

/// Push registration as the server expects it, keys in standard base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscribeRequest {
  pub endpoint: String,
  pub keys: SubscribeKeys,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscribeKeys {
  pub p256dh: String,
  pub auth: String,
}

#[derive(Debug, Serialize)]
pub struct UnsubscribeRequest<'a> {
  pub endpoint: &'a str,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_list_response() {
    let json = r#"{
      "error": false,
      "message": "Stories fetched successfully",
      "listStory": [
        {
          "id": "story-FvU4u0Vp2S3PMsFg",
          "name": "Dimas",
          "description": "Lorem Ipsum",
          "photoUrl": "https://story-api.dicoding.dev/images/stories/photos-1641623658595_dummy-pic.png",
          "createdAt": "2022-01-08T06:34:18.598Z",
          "lat": -10.212,
          "lon": -16.002
        },
        {
          "id": "story-2",
          "name": "Ayu",
          "description": "No location",
          "photoUrl": "https://story-api.dicoding.dev/images/stories/b.png",
          "createdAt": "2022-01-08T06:34:18.598Z",
          "lat": null,
          "lon": null
        }
      ]
    }"#;

    let resp: ListStoriesResponse = serde_json::from_str(json).unwrap();
    assert_eq!(resp.list_story.len(), 2);

    let first = &resp.list_story[0];
    assert_eq!(first.author_name, "Dimas");
    assert_eq!(
      first.location,
      Some(GeoPoint {
        lat: -10.212,
        lon: -16.002
      })
    );
    assert!(resp.list_story[1].location.is_none());
  }

  #[test]
  fn test_half_coordinate_is_dropped() {
    let json = r#"{"id":"s","name":"n","description":"d","photoUrl":"p","createdAt":"2022-01-08T06:34:18.598Z","lat":1.5}"#;
    let story: Story = serde_json::from_str(json).unwrap();
    assert!(story.location.is_none());
  }

  #[test]
  fn test_story_serializes_in_wire_format() {
    let json = r#"{"id":"s","name":"n","description":"d","photoUrl":"p","createdAt":"2022-01-08T06:34:18.598Z","lat":1.5,"lon":2.5}"#;
    let story: Story = serde_json::from_str(json).unwrap();
    let value = serde_json::to_value(&story).unwrap();
    assert_eq!(value["photoUrl"], "p");
    assert_eq!(value["name"], "n");
    assert_eq!(value["lon"], 2.5);
  }

  #[test]
  fn test_parse_login_response() {
    let json = r#"{"error":false,"message":"success","loginResult":{"userId":"user-yj5pc_LARC_AgK61","name":"Arif Faizin","token":"eyJhbGci"}}"#;
    let resp: LoginResponse = serde_json::from_str(json).unwrap();
    assert_eq!(resp.login_result.token, "eyJhbGci");
    assert_eq!(resp.login_result.name, "Arif Faizin");
  }

  #[test]
  fn test_envelope_defaults() {
    let env: ApiEnvelope = serde_json::from_str("{}").unwrap();
    assert!(!env.error);
    assert!(env.message.is_empty());
  }
}
