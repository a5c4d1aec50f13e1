use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Directory for persisted reader state (defaults to the XDG data dir)
  pub storage_dir: Option<PathBuf>,
  /// Toast auto-dismiss timeout
  pub toast_timeout_ms: u64,
  /// Simulated route-load delay
  pub route_load_delay_ms: u64,
  pub cache: CacheConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      storage_dir: None,
      toast_timeout_ms: 2600,
      route_load_delay_ms: 160,
      cache: CacheConfig::default(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Version tag; changing it supersedes every previous cache generation
  pub version: String,
  /// Serving origin; only same-origin responses are cached opportunistically
  pub origin: String,
  /// Core assets fetched at install time, as origin-relative paths
  pub core_assets: Vec<String>,
  /// Cache database location (defaults to the XDG data dir)
  pub db_path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      version: "v2".to_string(),
      origin: "http://localhost:8000".to_string(),
      core_assets: [
        "/",
        "/index.html",
        "/manifest.webmanifest",
        "/assets/styles.css",
        "/assets/app.js",
        "/assets/icons/favicon.svg",
      ]
      .into_iter()
      .map(String::from)
      .collect(),
      db_path: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./offprint.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/offprint/config.yaml
  ///
  /// An offline-first reader must boot with zero setup, so a missing config
  /// file yields the built-in defaults rather than an error.
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
    // Check current directory
    let local = PathBuf::from("offprint.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("offprint").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Resolved state storage directory.
  pub fn storage_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.storage_dir {
      return Ok(dir.clone());
    }
    Self::data_dir().map(|d| d.join("state"))
  }

  /// Resolved cache database path.
  pub fn cache_db_path(&self) -> Result<PathBuf> {
    if let Some(path) = &self.cache.db_path {
      return Ok(path.clone());
    }
    Self::data_dir().map(|d| d.join("cache.db"))
  }

  fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("offprint"))
  }
}

impl CacheConfig {
  /// Serving origin as a parsed URL.
  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid cache origin {}: {}", self.origin, e))
  }

  /// Core-asset manifest as absolute URLs on the serving origin.
  pub fn manifest_urls(&self) -> Result<Vec<String>> {
    let origin = self.origin_url()?;
    self
      .core_assets
      .iter()
      .map(|path| {
        origin
          .join(path)
          .map(|u| u.to_string())
          .map_err(|e| eyre!("Invalid core asset path {}: {}", path, e))
      })
      .collect()
  }
}
