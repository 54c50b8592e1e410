//! CLI subcommands.

use clap::Subcommand;
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
  /// Precache the app shell
  Install,

  /// Delete cache buckets from other versions and purge expired entries
  Activate,

  /// Show cache buckets and their entry counts
  Buckets,

  /// Fetch a URL through the cache router
  Fetch {
    url: String,
  },

  /// Create an account
  Register {
    #[arg(long)]
    name: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
  },

  /// Log in and remember the session
  Login {
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
  },

  /// Forget the stored session
  Logout,

  /// List stories (falls back to the offline mirror)
  List {
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long, default_value_t = 10)]
    size: u32,
    /// Only stories that carry a location
    #[arg(long)]
    with_location: bool,
  },

  /// Show one story
  Show {
    id: String,
  },

  /// Post a new story with a photo
  Post {
    #[arg(long)]
    description: String,
    #[arg(long)]
    photo: PathBuf,
    #[arg(long, requires = "lon", allow_hyphen_values = true)]
    lat: Option<f64>,
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    lon: Option<f64>,
  },

  /// Keep a story in the saved collection
  Save {
    id: String,
  },

  /// Remove a story from the saved collection
  Unsave {
    id: String,
  },

  /// List saved stories
  Saved,

  /// Subscribe to push notifications
  Subscribe,

  /// Unsubscribe from push notifications
  Unsubscribe,

  /// Show the push subscription state
  PushStatus,

  /// Deliver a push payload to the worker
  Push {
    payload: Option<String>,
  },

  /// Simulate clicking a notification
  NotificationClick,
}

/// Guess a photo's MIME type from its extension.
pub fn photo_mime(path: &Path) -> &'static str {
  let ext = path
    .extension()
    .and_then(|e| e.to_str())
    .map(|e| e.to_ascii_lowercase());
  match ext.as_deref() {
    Some("jpg") | Some("jpeg") => "image/jpeg",
    Some("png") => "image/png",
    Some("gif") => "image/gif",
    Some("webp") => "image/webp",
    _ => "application/octet-stream",
  }
}
