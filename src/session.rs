//! Login session persisted between invocations.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};

use crate::story::LoginResult;

const SESSION_FILE: &str = "session.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
  pub token: String,
  pub user_id: String,
  pub name: String,
  pub created_at: DateTime<Utc>,
}

impl From<LoginResult> for SessionData {
  fn from(result: LoginResult) -> Self {
    Self {
      token: result.token,
      user_id: result.user_id,
      name: result.name,
      created_at: Utc::now(),
    }
  }
}

pub struct Session {
  path: PathBuf,
  pub data: Option<SessionData>,
}

impl Session {
  pub fn new(data_dir: &Path) -> Self {
    Self {
      path: data_dir.join(SESSION_FILE),
      data: None,
    }
  }

  /// Load the session from disk. Returns whether one was found.
  pub fn load(&mut self) -> Result<bool> {
    if !self.path.exists() {
      return Ok(false);
    }
    let contents = std::fs::read_to_string(&self.path)
      .map_err(|e| eyre!("Failed to read session file {}: {}", self.path.display(), e))?;
    let data: SessionData = serde_json::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse session file {}: {}", self.path.display(), e))?;
    self.data = Some(data);
    Ok(true)
  }

  pub fn save(&self) -> Result<()> {
    if let Some(ref data) = self.data {
      if let Some(parent) = self.path.parent() {
        std::fs::create_dir_all(parent)?;
      }
      std::fs::write(&self.path, serde_json::to_string_pretty(data)?)?;
    }
    Ok(())
  }

  pub fn clear(&mut self) -> Result<()> {
    self.data = None;
    if self.path.exists() {
      std::fs::remove_file(&self.path)?;
    }
    Ok(())
  }

  pub fn update(&mut self, data: SessionData) {
    self.data = Some(data);
  }

  pub fn token(&self) -> Option<&str> {
    self.data.as_ref().map(|d| d.token.as_str())
  }
}
