use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub telemetry: TelemetryConfig,
  #[serde(default)]
  pub episodes: EpisodesConfig,
  #[serde(default)]
  pub cloud: CloudSettings,
  /// Where the local store and logs live (defaults to the platform data dir)
  pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  #[serde(default = "default_base_url")]
  pub base_url: String,
  /// Per-request timeout
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: default_base_url(),
      timeout_secs: default_timeout_secs(),
    }
  }
}

fn default_base_url() -> String {
  "https://rickandmortyapi.com/api".to_string()
}

fn default_timeout_secs() -> u64 {
  10
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// How long cached catalog data stays usable
  #[serde(default = "default_max_age_secs")]
  pub max_age_secs: i64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      max_age_secs: default_max_age_secs(),
    }
  }
}

fn default_max_age_secs() -> i64 {
  300
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
  #[serde(default = "default_max_events")]
  pub max_events: usize,
}

impl Default for TelemetryConfig {
  fn default() -> Self {
    Self {
      max_events: default_max_events(),
    }
  }
}

fn default_max_events() -> usize {
  crate::telemetry::DEFAULT_MAX_EVENTS
}

#[derive(Debug, Clone, Deserialize)]
pub struct EpisodesConfig {
  /// Episodes fetched for a character's detail view
  #[serde(default = "default_preview_limit")]
  pub preview_limit: usize,
}

impl Default for EpisodesConfig {
  fn default() -> Self {
    Self {
      preview_limit: default_preview_limit(),
    }
  }
}

fn default_preview_limit() -> usize {
  10
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
  /// Real auth when cloud credentials are complete, simulated otherwise
  #[default]
  Auto,
  /// Always the identity REST API
  Real,
  /// In-process simulated accounts, for development
  Simulated,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CloudSettings {
  #[serde(default)]
  pub auth: AuthMode,
}

/// Cloud service identity, read from the environment only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudConfig {
  pub api_key: String,
  pub auth_domain: String,
  pub project_id: String,
  pub storage_bucket: String,
  pub messaging_sender_id: String,
  pub app_id: String,
  pub measurement_id: Option<String>,
}

pub const CLOUD_ENV_VARS: [&str; 6] = [
  "MVHUB_FIREBASE_API_KEY",
  "MVHUB_FIREBASE_AUTH_DOMAIN",
  "MVHUB_FIREBASE_PROJECT_ID",
  "MVHUB_FIREBASE_STORAGE_BUCKET",
  "MVHUB_FIREBASE_MESSAGING_SENDER_ID",
  "MVHUB_FIREBASE_APP_ID",
];

impl CloudConfig {
  /// Read the cloud settings from process environment variables.
  pub fn from_env() -> Result<Self, Vec<&'static str>> {
    Self::from_lookup(|name| std::env::var(name).ok())
  }

  /// Build the settings from any variable source.
  ///
  /// Every missing or blank required variable is logged and returned.
  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Vec<&'static str>> {
    let values: Vec<Option<String>> = CLOUD_ENV_VARS
      .iter()
      .map(|name| lookup(name).filter(|v| !v.trim().is_empty()))
      .collect();

    let missing: Vec<&'static str> = CLOUD_ENV_VARS
      .iter()
      .zip(&values)
      .filter(|(_, value)| value.is_none())
      .map(|(name, _)| *name)
      .collect();

    if !missing.is_empty() {
      for name in &missing {
        tracing::warn!(variable = name, "cloud environment variable missing");
      }
      return Err(missing);
    }

    let mut values = values.into_iter().flatten();
    let mut next = || values.next().unwrap_or_default();

    Ok(Self {
      api_key: next(),
      auth_domain: next(),
      project_id: next(),
      storage_bucket: next(),
      messaging_sender_id: next(),
      app_id: next(),
      measurement_id: lookup("MVHUB_FIREBASE_MEASUREMENT_ID").filter(|v| !v.trim().is_empty()),
    })
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./mvhub.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/mvhub/config.yaml
  ///
  /// Without any file the defaults apply.
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
    let local = PathBuf::from("mvhub.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("mvhub").join("config.yaml");
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

  fn parse(contents: &str) -> Result<Self> {
    // An empty file is a valid "all defaults" config
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    Ok(serde_yaml::from_str(contents)?)
  }

  /// Resolve the data directory.
  pub fn data_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.data_dir {
      return Ok(dir.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("mvhub"))
  }

  pub fn cache_max_age(&self) -> chrono::Duration {
    chrono::Duration::seconds(self.cache.max_age_secs)
  }

  /// Get the account password from the environment.
  ///
  /// Checks MVHUB_PASSWORD.
  pub fn get_password() -> Result<String> {
    std::env::var("MVHUB_PASSWORD")
      .map_err(|_| eyre!("Password not found. Set MVHUB_PASSWORD environment variable."))
  }
}
