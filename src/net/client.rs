//! Reqwest-backed implementation of the `Transport` port.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use tracing::{debug, warn};

use super::types::{Body, FormPart, PartValue, Request, Response, TransportError};
use super::Transport;

/// Network transport. Clone is cheap, reqwest shares the connection pool.
#[derive(Clone)]
pub struct ReqwestTransport {
  client: reqwest::Client,
}

impl ReqwestTransport {
  pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
    let client = reqwest::Client::builder()
      .user_agent(user_agent)
      .timeout(timeout)
      .build()?;
    Ok(Self { client })
  }

  fn classify_error(e: &reqwest::Error) -> TransportError {
    if e.is_timeout() {
      TransportError::Timeout(e.to_string())
    } else if e.is_connect() {
      TransportError::Connect(e.to_string())
    } else if e.is_builder() {
      TransportError::InvalidRequest(e.to_string())
    } else {
      TransportError::Other(e.to_string())
    }
  }

  fn build_form(parts: &[FormPart]) -> Result<Form, TransportError> {
    let mut form = Form::new();
    for part in parts {
      form = match &part.value {
        PartValue::Text(text) => form.text(part.name.clone(), text.clone()),
        PartValue::File {
          file_name,
          mime,
          bytes,
        } => {
          let file = Part::bytes(bytes.clone())
            .file_name(file_name.clone())
            .mime_str(mime)
            .map_err(|e| TransportError::InvalidRequest(format!("bad mime type {}: {}", mime, e)))?;
          form.part(part.name.clone(), file)
        }
      };
    }
    Ok(form)
  }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
  async fn fetch(&self, request: &Request) -> Result<Response, TransportError> {
    debug!(method = %request.method, url = %request.url, "HTTP request start");

    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }
    builder = match &request.body {
      Body::Empty => builder,
      Body::Json(value) => builder.json(value),
      Body::Multipart(parts) => builder.multipart(Self::build_form(parts)?),
    };

    let resp = builder.send().await.map_err(|e| {
      warn!(url = %request.url, error = %e, "HTTP request failed");
      Self::classify_error(&e)
    })?;

    let status = resp.status().as_u16();
    let headers = resp
      .headers()
      .iter()
      .filter_map(|(k, v)| {
        v.to_str()
          .ok()
          .map(|v| (k.as_str().to_string(), v.to_string()))
      })
      .collect();
    let body = resp
      .bytes()
      .await
      .map_err(|e| {
        warn!(url = %request.url, error = %e, "Failed reading body");
        Self::classify_error(&e)
      })?
      .to_vec();

    debug!(url = %request.url, status, bytes = body.len(), "HTTP request done");

    Ok(Response {
      status,
      headers,
      body,
      opaque: false,
      synthesized: false,
      fallback: false,
    })
  }
}
