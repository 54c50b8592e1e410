//! Encoding of push credentials.
//!
//! The application server key arrives as URL-safe base64 (padding optional)
//! and is handed to the platform as raw bytes. Subscription credentials go to
//! the story server as standard base64.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::{DecodeError, Engine as _};

/// Decode a VAPID-style public key into raw bytes.
pub fn decode_server_key(key: &str) -> Result<Vec<u8>, DecodeError> {
  let normalized: String = key
    .trim()
    .trim_end_matches('=')
    .chars()
    .map(|c| match c {
      '+' => '-',
      '/' => '_',
      c => c,
    })
    .collect();
  URL_SAFE_NO_PAD.decode(normalized)
}

/// Encode a subscription credential for the story server.
pub fn encode_key(bytes: &[u8]) -> String {
  STANDARD.encode(bytes)
}

pub fn decode_key(text: &str) -> Result<Vec<u8>, DecodeError> {
  STANDARD.decode(text)
}
