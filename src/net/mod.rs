//! Platform-neutral HTTP plumbing.
//!
//! Every outbound request the application makes is expressed as a
//! [`Request`] and handed to a [`Transport`]. The real transport is backed by
//! reqwest; the cache router wraps it and is itself a `Transport`, so callers
//! never know whether a response came from the network or a cache bucket.

mod client;
#[cfg(test)]
pub mod testing;
mod types;

use std::sync::Arc;

pub use client::ReqwestTransport;
pub use types::{Body, Destination, FormPart, Request, Response, TransportError};

#[cfg(test)]
pub use types::PartValue;

/// Anything that can turn a request into a response.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
  async fn fetch(&self, request: &Request) -> Result<Response, TransportError>;
}

#[async_trait::async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
  async fn fetch(&self, request: &Request) -> Result<Response, TransportError> {
    (**self).fetch(request).await
  }
}
