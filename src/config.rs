use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Origin the site is served from; relative paths resolve against it
  pub origin: String,
  /// Version string naming the current cache generation
  pub cache_version: String,
  /// Resources written into a generation at install time
  pub manifest: Vec<String>,
  /// Page served for failed navigations
  pub offline_url: String,
  pub submission_endpoint: String,
  pub version_endpoint: String,
  pub sync: SyncConfig,
  pub notifications: NotificationConfig,
  pub logging: LoggingConfig,
  /// Where the cache and queue databases live (defaults to the XDG data dir)
  pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Tag that triggers a replay of queued submissions
  pub tag: String,
  /// Periodic tag that triggers a version check
  pub update_tag: String,
  /// Seconds between periodic syncs in watch mode
  pub interval_secs: u64,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      tag: "contact-form".to_string(),
      update_tag: "portfolio-update".to_string(),
      interval_secs: 300,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
  pub title: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  /// Page opened when a notification is clicked
  pub open_url: String,
}

impl Default for NotificationConfig {
  fn default() -> Self {
    Self {
      title: "Adem Portfolio".to_string(),
      icon: "/static/images/icon-192.png".to_string(),
      badge: "/static/images/badge-72.png".to_string(),
      vibrate: vec![200, 100, 200],
      open_url: "/".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// Filter directive used when RUST_LOG is unset
  pub level: String,
  /// Also write a daily rolling log file under the data dir
  pub file: bool,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      file: true,
    }
  }
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: "http://localhost:5000".to_string(),
      cache_version: "adem-portfolio-v1.0.0".to_string(),
      manifest: DEFAULT_MANIFEST.iter().map(|s| s.to_string()).collect(),
      offline_url: "/offline.html".to_string(),
      submission_endpoint: "/contact".to_string(),
      version_endpoint: "/api/version".to_string(),
      sync: SyncConfig::default(),
      notifications: NotificationConfig::default(),
      logging: LoggingConfig::default(),
      data_dir: None,
    }
  }
}

const DEFAULT_MANIFEST: &[&str] = &[
  "/",
  "/static/style.css",
  "/static/main.js",
  "/static/projects.js",
  "/offline.html",
  "https://cdn.jsdelivr.net/npm/bootstrap@5.3.0/dist/css/bootstrap.min.css",
  "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.0.0/css/all.min.css",
  "https://cdn.jsdelivr.net/npm/bootstrap@5.3.0/dist/js/bootstrap.bundle.min.js",
];

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./folio-cache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/folio-cache/config.yaml
  ///
  /// Falls back to the built-in defaults when no file is found.
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
    let local = PathBuf::from("folio-cache.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("folio-cache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  /// The site origin as a URL.
  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))
  }

  /// Resolve an absolute or origin-relative URL.
  pub fn resolve(&self, location: &str) -> Result<Url> {
    self
      .origin_url()?
      .join(location)
      .map_err(|e| eyre!("Invalid URL '{}': {}", location, e))
  }

  pub fn offline_url(&self) -> Result<Url> {
    self.resolve(&self.offline_url)
  }

  pub fn submission_url(&self) -> Result<Url> {
    self.resolve(&self.submission_endpoint)
  }

  pub fn version_url(&self) -> Result<Url> {
    self.resolve(&self.version_endpoint)
  }

  /// Directory holding the cache and queue databases.
  pub fn data_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.data_dir {
      return Ok(dir.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("folio-cache"))
  }
}
