use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub store: StoreConfig,
  #[serde(default)]
  pub globe: GlobeConfig,
  #[serde(default)]
  pub github: GithubConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Disable to send every read to the store
  pub enabled: bool,
  pub posts_ttl_secs: u64,
  pub projects_ttl_secs: u64,
  pub content_ttl_secs: u64,
  pub github_ttl_secs: u64,
  /// Cap on entries per cache (unbounded when unset)
  pub max_entries: Option<usize>,
  /// Coalesce concurrent misses for the same key
  pub single_flight: bool,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      posts_ttl_secs: 2 * 60,
      projects_ttl_secs: 5 * 60,
      content_ttl_secs: 5 * 60,
      github_ttl_secs: 10 * 60,
      max_entries: None,
      single_flight: true,
    }
  }
}

impl CacheConfig {
  pub fn posts_ttl(&self) -> Duration {
    Duration::from_secs(self.posts_ttl_secs)
  }

  pub fn projects_ttl(&self) -> Duration {
    Duration::from_secs(self.projects_ttl_secs)
  }

  pub fn content_ttl(&self) -> Duration {
    Duration::from_secs(self.content_ttl_secs)
  }

  pub fn github_ttl(&self) -> Duration {
    Duration::from_secs(self.github_ttl_secs)
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
  /// SQLite file (defaults to $XDG_DATA_HOME/devhub/store.db)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GlobeConfig {
  pub earthquakes_url: String,
  pub weather_url: String,
  /// Per-feed timeout
  pub feed_timeout_secs: u64,
}

impl Default for GlobeConfig {
  fn default() -> Self {
    Self {
      earthquakes_url: "https://earthquake.usgs.gov/earthquakes/feed/v1.0/summary/all_day.geojson"
        .to_string(),
      weather_url: "https://api.openweathermap.org/data/2.5/weather".to_string(),
      feed_timeout_secs: 10,
    }
  }
}

impl GlobeConfig {
  pub fn feed_timeout(&self) -> Duration {
    Duration::from_secs(self.feed_timeout_secs)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
  pub api_url: String,
}

impl Default for GithubConfig {
  fn default() -> Self {
    Self {
      api_url: "https://api.github.com".to_string(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./devhub.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/devhub/config.yaml
  ///
  /// With no file found the defaults are used.
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
    let local = PathBuf::from("devhub.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("devhub").join("config.yaml");
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

  pub fn parse(contents: &str) -> Result<Self> {
    Ok(serde_yaml::from_str(contents)?)
  }

  /// Get the OpenWeather API key from environment variables.
  ///
  /// Checks DEVHUB_OPENWEATHER_KEY first, then OPENWEATHER_API_KEY as fallback.
  /// Without a key the weather feed serves its fallback dataset.
  pub fn get_weather_api_key() -> Option<String> {
    std::env::var("DEVHUB_OPENWEATHER_KEY")
      .or_else(|_| std::env::var("OPENWEATHER_API_KEY"))
      .ok()
      .filter(|key| !key.is_empty())
  }
}
