//! Story gateway: the story API with the local mirror as read fallback.

use std::sync::Arc;

use tracing::{info, warn};

use super::api_types::{LoginResult, SubscribeRequest};
use super::client::StoryClient;
use super::types::{Fetched, ListQuery, NewStory, Story};
use crate::db::StoryStore;
use crate::error::Error;
use crate::net::Transport;

/// Story client with read-through mirroring and offline fallback.
///
/// Successful reads refresh the mirror collection; failed reads fall back to
/// it exactly once. Reads the router replayed from a bucket are passed on as
/// offline data and leave the mirror alone. Authentication failures are never masked by the mirror,
/// and mutations are never answered from it.
pub struct StoryGateway<T> {
  client: StoryClient<T>,
  store: Arc<StoryStore>,
}

impl<T: Transport> StoryGateway<T> {
  pub fn new(client: StoryClient<T>, store: Arc<StoryStore>) -> Self {
    Self { client, store }
  }

  pub fn set_token(&self, token: Option<String>) {
    self.client.set_token(token);
  }

  /// List stories, replacing the mirror on success.
  pub async fn list_stories(&self, query: &ListQuery) -> Result<Fetched<Vec<Story>>, Error> {
    match self.client.list_stories(query).await {
      Ok(fetched) if fetched.is_stale() => {
        info!(count = fetched.data.len(), "Serving stories replayed from cache");
        Ok(fetched)
      }
      Ok(fetched) => {
        // The mirror is best-effort; fresh data is returned either way
        match self.store.mirror().replace_all(&fetched.data) {
          Ok(()) => info!(count = fetched.data.len(), "Stories fetched and mirrored"),
          Err(e) => warn!(error = %e, "Failed to mirror fetched stories"),
        }
        Ok(fetched)
      }
      Err(e) if e.is_auth() => Err(e.into()),
      Err(e) => {
        warn!(error = %e, "Failed to fetch stories, reading mirror");
        let cached = self.store.mirror().get_all()?;
        if cached.is_empty() {
          return Err(Error::DataUnavailable(format!(
            "no stories mirrored offline ({})",
            e
          )));
        }
        info!(count = cached.len(), "Serving stories from mirror");
        Ok(Fetched::offline(cached))
      }
    }
  }

  /// Get one story, upserting it into the mirror on success.
  pub async fn get_story(&self, id: &str) -> Result<Fetched<Story>, Error> {
    match self.client.get_story(id).await {
      Ok(fetched) if fetched.is_stale() => {
        info!(id, "Serving story replayed from cache");
        Ok(fetched)
      }
      Ok(fetched) => {
        if let Err(e) = self.store.mirror().put(&fetched.data) {
          warn!(id, error = %e, "Failed to mirror fetched story");
        }
        Ok(fetched)
      }
      Err(e) if e.is_auth() => Err(e.into()),
      Err(e) => {
        warn!(id, error = %e, "Failed to fetch story, reading mirror");
        match self.store.mirror().get(id)? {
          Some(story) => Ok(Fetched::offline(story)),
          None => Err(Error::DataUnavailable(format!(
            "story {} is not mirrored offline ({})",
            id, e
          ))),
        }
      }
    }
  }

  /// Submit a new story (not cached - write operation).
  pub async fn add_new_story(&self, story: &NewStory) -> Result<String, Error> {
    Ok(self.client.add_story(story).await?)
  }

  pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<String, Error> {
    Ok(self.client.register(name, email, password).await?)
  }

  /// Log in and adopt the returned token for later calls.
  pub async fn login(&self, email: &str, password: &str) -> Result<LoginResult, Error> {
    let result = self.client.login(email, password).await?;
    self.client.set_token(Some(result.token.clone()));
    Ok(result)
  }

  pub async fn subscribe_notification(&self, subscription: &SubscribeRequest) -> Result<(), Error> {
    self
      .client
      .subscribe_notification(subscription)
      .await
      .map_err(Error::from)
  }

  pub async fn unsubscribe_notification(&self, endpoint: &str) -> Result<(), Error> {
    self
      .client
      .unsubscribe_notification(endpoint)
      .await
      .map_err(Error::from)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{test_settings, CacheRouter, RouteTable, SqliteStorage};
  use crate::clock::SystemClock;
  use crate::net::testing::FakeTransport;
  use crate::net::Response;
  use chrono::{TimeZone, Utc};
  use url::Url;

  const LIST_URL: &str = "https://story-api.dicoding.dev/v1/stories?page=1&size=10&location=0";
  const DETAIL_URL: &str = "https://story-api.dicoding.dev/v1/stories/story-1";

  fn story(id: &str) -> Story {
    Story {
      id: id.to_string(),
      author_name: "Ayu".to_string(),
      description: "A walk".to_string(),
      photo_url: "https://story-api.dicoding.dev/images/stories/a.png".to_string(),
      created_at: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
      location: None,
    }
  }

  fn list_body(stories: &[Story]) -> Response {
    Response::ok(
      serde_json::json!({ "error": false, "message": "ok", "listStory": stories })
        .to_string(),
    )
  }

  fn gateway(transport: Arc<FakeTransport>) -> (StoryGateway<Arc<FakeTransport>>, Arc<StoryStore>) {
    let store = Arc::new(StoryStore::in_memory());
    let client = StoryClient::new(
      transport,
      Url::parse("https://story-api.dicoding.dev/v1").unwrap(),
    );
    let gateway = StoryGateway::new(client, Arc::clone(&store));
    gateway.set_token(Some("tok".to_string()));
    (gateway, store)
  }

  #[tokio::test]
  async fn test_list_success_replaces_mirror() {
    let transport = Arc::new(FakeTransport::new());
    transport.respond(LIST_URL, list_body(&[story("story-1"), story("story-2")]));
    let (gateway, store) = gateway(Arc::clone(&transport));
    store.mirror().replace_all(&[story("stale")]).unwrap();

    let result = gateway.list_stories(&ListQuery::default()).await.unwrap();
    assert!(!result.is_stale());
    assert_eq!(result.data.len(), 2);

    let mirrored: Vec<String> = store.mirror().get_all().unwrap().into_iter().map(|s| s.id).collect();
    assert_eq!(mirrored, vec!["story-1", "story-2"]);
  }

  #[tokio::test]
  async fn test_list_network_failure_serves_mirror() {
    let transport = Arc::new(FakeTransport::new());
    let (gateway, store) = gateway(Arc::clone(&transport));
    store.mirror().replace_all(&[story("story-1")]).unwrap();
    transport.set_offline(true);

    let result = gateway.list_stories(&ListQuery::default()).await.unwrap();
    assert!(result.is_stale());
    assert_eq!(result.notice(), Some(crate::story::OFFLINE_NOTICE));
    assert_eq!(result.data, vec![story("story-1")]);
  }

  #[tokio::test]
  async fn test_list_network_failure_with_empty_mirror_is_unavailable() {
    let transport = Arc::new(FakeTransport::new());
    transport.set_offline(true);
    let (gateway, _store) = gateway(transport);

    let err = gateway.list_stories(&ListQuery::default()).await.unwrap_err();
    assert!(matches!(err, Error::DataUnavailable(_)));
  }

  #[tokio::test]
  async fn test_synthesized_unavailable_counts_as_network_failure() {
    let transport = Arc::new(FakeTransport::new());
    transport.respond(LIST_URL, Response::service_unavailable("offline"));
    let (gateway, store) = gateway(transport);
    store.mirror().replace_all(&[story("story-1")]).unwrap();

    let result = gateway.list_stories(&ListQuery::default()).await.unwrap();
    assert!(result.is_stale());
  }

  #[tokio::test]
  async fn test_auth_failure_never_consults_mirror() {
    let transport = Arc::new(FakeTransport::new());
    transport.respond(
      LIST_URL,
      Response::new(401, r#"{"error":true,"message":"Missing authentication"}"#),
    );
    transport.respond(
      DETAIL_URL,
      Response::new(401, r#"{"error":true,"message":"Missing authentication"}"#),
    );
    let (gateway, store) = gateway(transport);
    store.mirror().replace_all(&[story("story-1")]).unwrap();

    let err = gateway.list_stories(&ListQuery::default()).await.unwrap_err();
    assert!(matches!(err, Error::AuthenticationRequired(_)));

    let err = gateway.get_story("story-1").await.unwrap_err();
    assert!(matches!(err, Error::AuthenticationRequired(_)));
  }

  #[tokio::test]
  async fn test_detail_success_upserts_mirror() {
    let transport = Arc::new(FakeTransport::new());
    transport.respond(
      DETAIL_URL,
      Response::ok(
        serde_json::json!({ "error": false, "message": "ok", "story": story("story-1") })
          .to_string(),
      ),
    );
    let (gateway, store) = gateway(transport);
    store.mirror().replace_all(&[story("story-0")]).unwrap();

    let result = gateway.get_story("story-1").await.unwrap();
    assert!(!result.is_stale());
    assert_eq!(store.mirror().len().unwrap(), 2);
  }

  #[tokio::test]
  async fn test_detail_fallback() {
    let transport = Arc::new(FakeTransport::new());
    transport.set_offline(true);
    let (gateway, store) = gateway(transport);
    store.mirror().replace_all(&[story("story-1")]).unwrap();

    let hit = gateway.get_story("story-1").await.unwrap();
    assert!(hit.is_stale());

    let miss = gateway.get_story("story-9").await.unwrap_err();
    assert!(matches!(miss, Error::DataUnavailable(_)));
  }

  #[tokio::test]
  async fn test_router_replay_is_offline_and_keeps_mirror() {
    let transport = Arc::new(FakeTransport::new());
    transport.respond(LIST_URL, list_body(&[story("story-1")]));
    let router = Arc::new(CacheRouter::new(
      Arc::clone(&transport),
      SqliteStorage::in_memory().unwrap(),
      RouteTable::standard(&test_settings()),
      Arc::new(SystemClock),
    ));
    let store = Arc::new(StoryStore::in_memory());
    let client = StoryClient::new(
      router,
      Url::parse("https://story-api.dicoding.dev/v1").unwrap(),
    );
    let gateway = StoryGateway::new(client, Arc::clone(&store));
    gateway.set_token(Some("tok".to_string()));

    let online = gateway.list_stories(&ListQuery::default()).await.unwrap();
    assert!(!online.is_stale());
    assert_eq!(online.notice(), None);

    // Mirror diverges from the bucket so a rewrite would be visible
    store.mirror().replace_all(&[story("story-1"), story("story-2")]).unwrap();
    transport.set_offline(true);

    let replayed = gateway.list_stories(&ListQuery::default()).await.unwrap();
    assert!(replayed.is_stale());
    assert_eq!(replayed.notice(), Some(crate::story::OFFLINE_NOTICE));
    assert_eq!(replayed.data, vec![story("story-1")]);
    assert_eq!(store.mirror().len().unwrap(), 2);
  }

  #[tokio::test]
  async fn test_mutation_failure_propagates() {
    let transport = Arc::new(FakeTransport::new());
    transport.set_offline(true);
    let (gateway, _store) = gateway(transport);

    let story = NewStory {
      description: "offline post".to_string(),
      photo: vec![0],
      photo_name: "p.png".to_string(),
      photo_mime: "image/png".to_string(),
      location: None,
    };
    let err = gateway.add_new_story(&story).await.unwrap_err();
    assert!(matches!(err, Error::NetworkUnavailable(_)));
  }

  #[tokio::test]
  async fn test_saved_collection_untouched_by_reads() {
    let transport = Arc::new(FakeTransport::new());
    transport.respond(LIST_URL, list_body(&[story("story-1")]));
    let (gateway, store) = gateway(transport);
    store.saved().save(&story("mine")).unwrap();

    gateway.list_stories(&ListQuery::default()).await.unwrap();
    assert_eq!(store.saved().len().unwrap(), 1);
    assert!(store.saved().contains("mine").unwrap());
  }
}
