//! Raw story API calls. No caching or fallback happens here.

use std::sync::RwLock;

use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;
use url::Url;

use super::api_types::{
  ApiEnvelope, ListStoriesResponse, LoginRequest, LoginResponse, LoginResult, RegisterRequest,
  StoryDetailResponse, SubscribeRequest, UnsubscribeRequest,
};
use super::error::ApiError;
use super::types::{Fetched, ListQuery, NewStory, Story};
use crate::net::{Body, FormPart, Request, Response, Transport};

/// Story API client
pub struct StoryClient<T> {
  transport: T,
  base_url: Url,
  token: RwLock<Option<String>>,
}

impl<T: Transport> StoryClient<T> {
  pub fn new(transport: T, base_url: Url) -> Self {
    Self {
      transport,
      base_url,
      token: RwLock::new(None),
    }
  }

  /// Set the bearer token for authenticated requests
  pub fn set_token(&self, token: Option<String>) {
    if let Ok(mut guard) = self.token.write() {
      *guard = token;
    }
  }

  pub fn token(&self) -> Option<String> {
    self.token.read().ok().and_then(|t| t.clone())
  }

  fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
    // Join relative to the base path, e.g. https://host/v1 + stories
    let mut base = self.base_url.clone();
    if !base.path().ends_with('/') {
      let path = format!("{}/", base.path());
      base.set_path(&path);
    }
    base
      .join(path.trim_start_matches('/'))
      .map_err(|e| ApiError::InvalidResponse(format!("bad endpoint {}: {}", path, e)))
  }

  fn authed(&self, request: Request) -> Result<Request, ApiError> {
    match self.token() {
      Some(token) => Ok(request.bearer(&token)),
      None => Err(ApiError::Unauthorized("no active session".to_string())),
    }
  }

  async fn send(&self, request: Request) -> Result<Response, ApiError> {
    debug!(method = %request.method, url = %request.url, "Story API request");
    let response = self.transport.fetch(&request).await?;
    ApiError::check(response)
  }

  fn parse<R: DeserializeOwned>(response: &Response) -> Result<R, ApiError> {
    response
      .json()
      .map_err(|e| ApiError::InvalidResponse(e.to_string()))
  }

  fn json_body(value: impl Serialize) -> Result<Body, ApiError> {
    serde_json::to_value(value)
      .map(Body::Json)
      .map_err(|e| ApiError::InvalidResponse(e.to_string()))
  }

  pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<String, ApiError> {
    let body = Self::json_body(RegisterRequest {
      name,
      email,
      password,
    })?;
    let response = self
      .send(Request::post(self.endpoint("register")?, body))
      .await?;
    Ok(Self::parse::<ApiEnvelope>(&response)?.message)
  }

  pub async fn login(&self, email: &str, password: &str) -> Result<LoginResult, ApiError> {
    let body = Self::json_body(LoginRequest { email, password })?;
    let response = self.send(Request::post(self.endpoint("login")?, body)).await?;
    Ok(Self::parse::<LoginResponse>(&response)?.login_result)
  }

  /// A read answered from a router bucket after the network failed comes
  /// back marked offline.
  fn fetched<D>(response: &Response, data: D) -> Fetched<D> {
    if response.fallback {
      Fetched::offline(data)
    } else {
      Fetched::from_network(data)
    }
  }

  pub async fn list_stories(&self, query: &ListQuery) -> Result<Fetched<Vec<Story>>, ApiError> {
    let mut url = self.endpoint("stories")?;
    url
      .query_pairs_mut()
      .append_pair("page", &query.page.to_string())
      .append_pair("size", &query.size.to_string())
      .append_pair("location", if query.with_location { "1" } else { "0" });

    let response = self.send(self.authed(Request::get(url))?).await?;
    let stories = Self::parse::<ListStoriesResponse>(&response)?.list_story;
    Ok(Self::fetched(&response, stories))
  }

  pub async fn get_story(&self, id: &str) -> Result<Fetched<Story>, ApiError> {
    let mut url = self.endpoint("stories")?;
    // The id is a single path segment, percent-encoded
    url
      .path_segments_mut()
      .map_err(|_| ApiError::InvalidResponse("base url cannot hold a path".to_string()))?
      .push(id);
    let response = self.send(self.authed(Request::get(url))?).await?;
    let story = Self::parse::<StoryDetailResponse>(&response)?.story;
    Ok(Self::fetched(&response, story))
  }

  pub async fn add_story(&self, story: &NewStory) -> Result<String, ApiError> {
    let mut parts = vec![
      FormPart::text("description", story.description.clone()),
      FormPart::file(
        "photo",
        &story.photo_name,
        &story.photo_mime,
        story.photo.clone(),
      ),
    ];
    if let Some(point) = story.location {
      parts.push(FormPart::text("lat", point.lat.to_string()));
      parts.push(FormPart::text("lon", point.lon.to_string()));
    }

    let request = Request::post(self.endpoint("stories")?, Body::Multipart(parts));
    let response = self.send(self.authed(request)?).await?;
    Ok(Self::parse::<ApiEnvelope>(&response)?.message)
  }

  pub async fn subscribe_notification(&self, subscription: &SubscribeRequest) -> Result<(), ApiError> {
    let body = Self::json_body(subscription)?;
    let request = Request::post(self.endpoint("notifications/subscribe")?, body);
    self.send(self.authed(request)?).await?;
    Ok(())
  }

  pub async fn unsubscribe_notification(&self, endpoint: &str) -> Result<(), ApiError> {
    let body = Self::json_body(UnsubscribeRequest { endpoint })?;
    let request = Request::delete(self.endpoint("notifications/subscribe")?, body);
    self.send(self.authed(request)?).await?;
    Ok(())
  }
}
