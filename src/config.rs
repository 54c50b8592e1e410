use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::cache::RouterSettings;

const DEFAULT_API_BASE: &str = "https://story-api.dicoding.dev/v1";
const DEFAULT_VAPID_KEY: &str =
  "BCCs2eonMI-6H2ctvFaWg-UYdDv387Vno_bzUzALpB442r2lCnsHmtrx8biyPi_E-1fSGABK_Qs_GlvPoJJqxbk";

/// Environment variable that overrides the stored session token.
pub const TOKEN_ENV: &str = "STORYCACHE_TOKEN";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  pub app: AppConfig,
  pub cache: CacheConfig,
  pub push: PushConfig,
  pub log: LogConfig,
  /// Overrides the platform data directory
  pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  pub base_url: String,
  /// URL-safe base64 application server key used for push registration
  pub vapid_public_key: String,
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: DEFAULT_API_BASE.to_string(),
      vapid_public_key: DEFAULT_VAPID_KEY.to_string(),
      timeout_secs: 30,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  /// Origin the app shell is served from
  pub origin: String,
  /// App-shell URLs fetched at install; relative entries resolve against `origin`
  pub precache: Vec<String>,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      origin: "http://localhost:8080/".to_string(),
      precache: [
        "/",
        "/index.html",
        "/favicon.png",
        "/styles/styles.css",
        "/app.bundle.js",
        "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css",
        "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js",
      ]
      .iter()
      .map(|s| s.to_string())
      .collect(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub enabled: bool,
  pub prefix: String,
  /// Build tag baked into bucket names; changing it retires old buckets
  pub version: String,
  /// Third-party hosts whose assets are cached
  pub vendor_hosts: Vec<String>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      prefix: "story-app".to_string(),
      version: "v1".to_string(),
      vendor_hosts: vec!["unpkg.com".to_string()],
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PushConfig {
  /// Push service base URL. Without one, push is unsupported.
  pub service_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  pub level: String,
  /// Also write a daily log file under the data directory
  pub file: bool,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "warn".to_string(),
      file: false,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./storycache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/storycache/config.yaml
  ///
  /// Falls back to defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("storycache.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("storycache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents)
  }

  /// Bearer token from the environment, if set.
  pub fn get_token() -> Option<String> {
    std::env::var(TOKEN_ENV).ok().filter(|t| !t.trim().is_empty())
  }

  pub fn data_dir(&self) -> Result<PathBuf> {
    if let Some(ref dir) = self.data_dir {
      return Ok(dir.clone());
    }
    dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .map(|p| p.join("storycache"))
      .ok_or_else(|| eyre!("Could not determine a data directory; set data_dir in the config"))
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.api.timeout_secs)
  }

  pub fn api_base(&self) -> Result<Url> {
    Url::parse(&self.api.base_url).map_err(|e| eyre!("Invalid api.base_url '{}': {}", self.api.base_url, e))
  }

  pub fn app_origin(&self) -> Result<Url> {
    Url::parse(&self.app.origin).map_err(|e| eyre!("Invalid app.origin '{}': {}", self.app.origin, e))
  }

  pub fn precache_urls(&self) -> Result<Vec<Url>> {
    let origin = self.app_origin()?;
    self
      .app
      .precache
      .iter()
      .map(|entry| {
        origin
          .join(entry)
          .map_err(|e| eyre!("Invalid precache entry '{}': {}", entry, e))
      })
      .collect()
  }

  pub fn push_service_url(&self) -> Result<Option<Url>> {
    self
      .push
      .service_url
      .as_deref()
      .map(|s| Url::parse(s).map_err(|e| eyre!("Invalid push.service_url '{}': {}", s, e)))
      .transpose()
  }

  pub fn router_settings(&self) -> Result<RouterSettings> {
    Ok(RouterSettings {
      app_origin: self.app_origin()?,
      api_base: self.api_base()?,
      vendor_hosts: self.cache.vendor_hosts.clone(),
      bucket_prefix: self.cache.prefix.clone(),
      version: self.cache.version.clone(),
    })
  }
}
