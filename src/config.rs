use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub server: ServerConfig,
  #[serde(default)]
  pub client: ClientConfig,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  /// Address the API server binds to.
  #[serde(default = "default_bind")]
  pub bind: String,
  /// SQLite database path. `:memory:` for an in-memory database;
  /// defaults to the platform data directory.
  pub database: Option<PathBuf>,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      bind: default_bind(),
      database: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
  /// Base URL of the API the client commands talk to.
  #[serde(default = "default_base_url")]
  pub base_url: String,
  /// Per-request timeout in seconds.
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for ClientConfig {
  fn default() -> Self {
    Self {
      base_url: default_base_url(),
      timeout_secs: default_timeout_secs(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// How long a fetched result stays fresh, in seconds.
  #[serde(default = "default_stale_secs")]
  pub stale_secs: i64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      stale_secs: default_stale_secs(),
    }
  }
}

fn default_bind() -> String {
  "127.0.0.1:3001".to_string()
}

fn default_base_url() -> String {
  "http://127.0.0.1:3001/api".to_string()
}

fn default_timeout_secs() -> u64 {
  10
}

fn default_stale_secs() -> i64 {
  30
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./trk.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/trk/config.yaml
  ///
  /// Every field has a default, so a missing config file just yields the
  /// default configuration.
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
    let local = PathBuf::from("trk.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("trk").join("config.yaml");
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

  /// Staleness window for cached reads.
  pub fn stale_time(&self) -> chrono::Duration {
    chrono::Duration::seconds(self.cache.stale_secs)
  }

  /// Per-request network timeout.
  pub fn request_timeout(&self) -> std::time::Duration {
    std::time::Duration::from_secs(self.client.timeout_secs)
  }
}
