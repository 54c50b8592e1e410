use reqwest::Method;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

/// What kind of resource a request is for, as a browser would report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
  Document,
  Style,
  Script,
  Image,
  Font,
  /// Data requests (fetch/XHR) and anything unrecognised
  Empty,
}

impl Destination {
  /// Infer the destination from a URL path.
  pub fn from_path(path: &str) -> Self {
    if path.is_empty() || path.ends_with('/') {
      return Self::Document;
    }

    let file = path.rsplit('/').next().unwrap_or(path);
    let ext = match file.rsplit_once('.') {
      Some((_, ext)) => ext.to_ascii_lowercase(),
      None => return Self::Empty,
    };

    match ext.as_str() {
      "html" | "htm" => Self::Document,
      "css" => Self::Style,
      "js" | "mjs" => Self::Script,
      "png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" | "ico" | "avif" => Self::Image,
      "woff" | "woff2" | "ttf" | "otf" => Self::Font,
      _ => Self::Empty,
    }
  }
}

/// One field of a multipart form body.
#[derive(Debug, Clone)]
pub struct FormPart {
  pub name: String,
  pub value: PartValue,
}

#[derive(Debug, Clone)]
pub enum PartValue {
  Text(String),
  File {
    file_name: String,
    mime: String,
    bytes: Vec<u8>,
  },
}

impl FormPart {
  pub fn text(name: &str, value: impl Into<String>) -> Self {
    Self {
      name: name.to_string(),
      value: PartValue::Text(value.into()),
    }
  }

  pub fn file(name: &str, file_name: &str, mime: &str, bytes: Vec<u8>) -> Self {
    Self {
      name: name.to_string(),
      value: PartValue::File {
        file_name: file_name.to_string(),
        mime: mime.to_string(),
        bytes,
      },
    }
  }
}

#[derive(Debug, Clone, Default)]
pub enum Body {
  #[default]
  Empty,
  Json(serde_json::Value),
  Multipart(Vec<FormPart>),
}

/// An outbound HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub destination: Destination,
  pub headers: Vec<(String, String)>,
  pub body: Body,
}

impl Request {
  pub fn new(method: Method, url: Url) -> Self {
    let destination = Destination::from_path(url.path());
    Self {
      method,
      url,
      destination,
      headers: Vec::new(),
      body: Body::Empty,
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }

  pub fn post(url: Url, body: Body) -> Self {
    Self::new(Method::POST, url).with_body(body)
  }

  pub fn delete(url: Url, body: Body) -> Self {
    Self::new(Method::DELETE, url).with_body(body)
  }

  pub fn with_body(mut self, body: Body) -> Self {
    self.body = body;
    self
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  pub fn bearer(self, token: &str) -> Self {
    self.with_header("authorization", &format!("Bearer {}", token))
  }

  pub fn is_get(&self) -> bool {
    self.method == Method::GET
  }

  /// Stable key identifying this request inside a cache bucket.
  ///
  /// Buckets match on method and URL only; credentials do not take part.
  pub fn cache_key(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_str().as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_str().as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// An HTTP response, either from the network or replayed from a cache bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
  /// Cross-origin no-cors response whose status is hidden from the caller
  pub opaque: bool,
  /// Produced by the router itself rather than received from anywhere
  pub synthesized: bool,
  /// Replayed from a bucket because the network could not be reached
  pub fallback: bool,
}

impl Response {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body: body.into(),
      opaque: false,
      synthesized: false,
      fallback: false,
    }
  }

  pub fn ok(body: impl Into<Vec<u8>>) -> Self {
    Self::new(200, body)
  }

  pub fn opaque() -> Self {
    Self {
      opaque: true,
      ..Self::new(0, Vec::new())
    }
  }

  /// The router's answer when neither network nor cache could help.
  pub fn service_unavailable(message: &str) -> Self {
    Self {
      headers: vec![("content-type".to_string(), "text/plain".to_string())],
      synthesized: true,
      ..Self::new(503, message.as_bytes().to_vec())
    }
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Only successful (or opaque) responses are ever written to a bucket.
  pub fn is_cacheable(&self) -> bool {
    !self.synthesized && (self.is_success() || self.opaque)
  }

  pub fn is_offline_fallback(&self) -> bool {
    self.synthesized && self.status == 503
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }

  pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
    serde_json::from_slice(&self.body)
  }
}

/// Failure to obtain any response at all.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
  #[error("connection failed: {0}")]
  Connect(String),

  #[error("request timed out: {0}")]
  Timeout(String),

  #[error("invalid request: {0}")]
  InvalidRequest(String),

  #[error("transport error: {0}")]
  Other(String),
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_destination_from_path() {
    assert_eq!(Destination::from_path("/"), Destination::Document);
    assert_eq!(Destination::from_path("/index.html"), Destination::Document);
    assert_eq!(Destination::from_path("/styles/styles.css"), Destination::Style);
    assert_eq!(Destination::from_path("/app.bundle.js"), Destination::Script);
    assert_eq!(Destination::from_path("/images/photo.JPG"), Destination::Image);
    assert_eq!(Destination::from_path("/v1/stories"), Destination::Empty);
    assert_eq!(Destination::from_path("/v1.2/stories"), Destination::Empty);
  }

  #[test]
  fn test_cache_key_ignores_credentials() {
    let url = Url::parse("https://story-api.dicoding.dev/v1/stories?page=1").unwrap();
    let plain = Request::get(url.clone());
    let authed = Request::get(url).bearer("secret");
    assert_eq!(plain.cache_key(), authed.cache_key());
  }

  #[test]
  fn test_cache_key_distinguishes_query() {
    let a = Request::get(Url::parse("https://example.com/stories?page=1").unwrap());
    let b = Request::get(Url::parse("https://example.com/stories?page=2").unwrap());
    assert_ne!(a.cache_key(), b.cache_key());
  }

  #[test]
  fn test_cacheable_responses() {
    assert!(Response::ok("hi").is_cacheable());
    assert!(Response::opaque().is_cacheable());
    assert!(!Response::new(404, "nope").is_cacheable());
    assert!(!Response::new(500, "boom").is_cacheable());
    assert!(!Response::service_unavailable("offline").is_cacheable());
  }

  #[test]
  fn test_service_unavailable_is_marked() {
    let response = Response::service_unavailable("offline");
    assert_eq!(response.status, 503);
    assert!(response.is_offline_fallback());
    assert_eq!(response.header("Content-Type"), Some("text/plain"));
    assert!(!Response::new(503, "upstream").is_offline_fallback());
  }
}
