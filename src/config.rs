use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Dataset the app displays: quarterly mobile data volume.
pub const DEFAULT_RESOURCE_ID: &str = "a807b7ab-6cad-4aa6-87d0-e283a7353a0f";
pub const DEFAULT_BASE_URL: &str = "https://data.gov.sg";

/// 10 MiB
pub const DEFAULT_CACHE_SIZE: u64 = 10 * 1024 * 1024;
/// Read from cache for 60 seconds even while online
pub const DEFAULT_MAX_AGE_SECS: u64 = 60;
/// Offline cache available for 30 days
pub const DEFAULT_MAX_STALE_SECS: u64 = 60 * 60 * 24 * 30;
/// Environment variable overriding `api.base_url`
pub const BASE_URL_ENV: &str = "DATAUSAGE_BASE_URL";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub http: HttpConfig,
  #[serde(default)]
  pub connectivity: ConnectivityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  #[serde(default = "default_base_url")]
  pub base_url: String,
  #[serde(default = "default_resource_id")]
  pub resource_id: String,
  /// Page size; omitted from the request when unset
  pub limit: Option<u32>,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: default_base_url(),
      resource_id: default_resource_id(),
      limit: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Directory for the response cache (defaults to $XDG_CACHE_HOME/datausage/responses)
  pub dir: Option<PathBuf>,
  #[serde(default = "default_cache_size")]
  pub max_size_bytes: u64,
  #[serde(default = "default_max_age")]
  pub max_age_secs: u64,
  #[serde(default = "default_max_stale")]
  pub max_stale_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      dir: None,
      max_size_bytes: DEFAULT_CACHE_SIZE,
      max_age_secs: DEFAULT_MAX_AGE_SECS,
      max_stale_secs: DEFAULT_MAX_STALE_SECS,
    }
  }
}

impl CacheConfig {
  pub fn max_age(&self) -> Duration {
    Duration::from_secs(self.max_age_secs)
  }

  pub fn max_stale(&self) -> Duration {
    Duration::from_secs(self.max_stale_secs)
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpConfig {
  /// Overall request timeout; the HTTP client's default when unset
  pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectivityConfig {
  /// host:port to probe; derived from the base URL when unset
  pub probe_addr: Option<String>,
  #[serde(default = "default_probe_timeout")]
  pub probe_timeout_ms: u64,
}

impl Default for ConnectivityConfig {
  fn default() -> Self {
    Self {
      probe_addr: None,
      probe_timeout_ms: default_probe_timeout(),
    }
  }
}

fn default_base_url() -> String {
  DEFAULT_BASE_URL.to_string()
}

fn default_resource_id() -> String {
  DEFAULT_RESOURCE_ID.to_string()
}

fn default_true() -> bool {
  true
}

fn default_cache_size() -> u64 {
  DEFAULT_CACHE_SIZE
}

fn default_max_age() -> u64 {
  DEFAULT_MAX_AGE_SECS
}

fn default_max_stale() -> u64 {
  DEFAULT_MAX_STALE_SECS
}

fn default_probe_timeout() -> u64 {
  1500
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./datausage.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/datausage/config.yaml
  ///
  /// Falls back to defaults when no file exists. `DATAUSAGE_BASE_URL`
  /// overrides the configured base URL.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    Self::load_with(
      explicit_path,
      &Self::search_paths(),
      std::env::var(BASE_URL_ENV).ok(),
    )
  }

  fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("datausage.yaml")];
    if let Some(config_dir) = dirs::config_dir() {
      paths.push(config_dir.join("datausage").join("config.yaml"));
    }
    paths
  }

  /// Explicit path, else the first existing candidate, else defaults.
  fn load_with(
    explicit_path: Option<&Path>,
    candidates: &[PathBuf],
    base_url_override: Option<String>,
  ) -> Result<Self> {
    let path = match explicit_path {
      Some(p) if p.exists() => Some(p.to_path_buf()),
      Some(p) => return Err(eyre!("Config file not found: {}", p.display())),
      None => candidates.iter().find(|p| p.exists()).cloned(),
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };

    if let Some(base_url) = base_url_override {
      config.api.base_url = base_url;
    }

    Ok(config)
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    // An empty file is a valid "all defaults" config
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// Address used to probe connectivity: explicit, or host:port of the base URL.
  pub fn probe_addr(&self) -> Result<String> {
    if let Some(addr) = &self.connectivity.probe_addr {
      return Ok(addr.clone());
    }

    let url = url::Url::parse(&self.api.base_url)
      .map_err(|e| eyre!("Invalid base URL '{}': {}", self.api.base_url, e))?;
    let host = url
      .host_str()
      .ok_or_else(|| eyre!("Base URL '{}' has no host", self.api.base_url))?;
    let port = url
      .port_or_known_default()
      .ok_or_else(|| eyre!("Base URL '{}' has no port", self.api.base_url))?;

    Ok(format!("{}:{}", host, port))
  }
}
