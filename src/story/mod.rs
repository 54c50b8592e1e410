//! Story API access.
//!
//! `StoryClient` speaks the wire protocol; `StoryGateway` layers the
//! offline-first read policy on top of it using the durable store's mirror.

pub mod api_types;
mod cached_client;
mod client;
mod error;
mod types;

pub use api_types::{LoginResult, SubscribeKeys, SubscribeRequest};
pub use cached_client::StoryGateway;
pub use client::StoryClient;
pub use error::ApiError;
pub use types::{Fetched, GeoPoint, ListQuery, NewStory, Story};

#[cfg(test)]
pub use types::OFFLINE_NOTICE;
