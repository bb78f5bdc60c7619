use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use url::Url;

use crate::assets::{DEFAULT_MANIFEST, DEFAULT_VERSION};
use crate::gateway::TransitionPolicy;
use crate::realtime::BackoffConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Which data backend to use
  pub mode: GatewayMode,
  pub api: ApiConfig,
  pub assets: AssetsConfig,
  /// Reconnect schedule for the real-time channel
  pub realtime: BackoffConfig,
  /// Status transition validation: permissive or strict
  pub transitions: TransitionPolicy,
  pub storage: StorageConfig,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GatewayMode {
  /// Everything stays in the local store, no backend needed
  #[default]
  Local,
  /// PowerBack REST API plus the real-time channel
  Remote,
}

impl FromStr for GatewayMode {
  type Err = color_eyre::Report;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_lowercase().as_str() {
      "local" => Ok(GatewayMode::Local),
      "remote" => Ok(GatewayMode::Remote),
      other => Err(eyre!("Unknown mode '{}', expected 'local' or 'remote'", other)),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  pub base_url: String,
  /// Real-time stream endpoint (defaults to <base_url>/api/realtime)
  pub realtime_url: Option<String>,
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: "http://localhost:8080".to_string(),
      realtime_url: None,
      timeout_secs: 30,
    }
  }
}

impl ApiConfig {
  pub fn realtime_url(&self) -> Result<Url> {
    let raw = match &self.realtime_url {
      Some(url) => url.clone(),
      None => format!("{}/api/realtime", self.base_url.trim_end_matches('/')),
    };
    Url::parse(&raw).map_err(|e| eyre!("Invalid real-time URL '{}': {}", raw, e))
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
  /// Origin relative manifest entries are resolved against
  pub origin: String,
  /// Cache name for the current release
  pub version: String,
  pub manifest: Vec<String>,
}

impl Default for AssetsConfig {
  fn default() -> Self {
    Self {
      origin: "http://localhost:8080".to_string(),
      version: DEFAULT_VERSION.to_string(),
      manifest: DEFAULT_MANIFEST.iter().map(|s| s.to_string()).collect(),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
  /// Database file (defaults to the user data directory)
  pub path: Option<PathBuf>,
}

impl Config {
  /// Load configuration from file, then apply environment overrides.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./powerback.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/powerback/config.yaml
  ///
  /// With no file anywhere the defaults apply (local mode).
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

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => {
        tracing::debug!("no configuration file found, using defaults");
        Config::default()
      }
    };

    config.apply_overrides(|key| std::env::var(key).ok())?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("powerback.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("powerback").join("config.yaml");
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

    tracing::debug!(path = %path.display(), "loaded configuration");
    Ok(config)
  }

  /// Apply POWERBACK_API_URL and POWERBACK_MODE from `lookup`.
  pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
    if let Some(url) = lookup("POWERBACK_API_URL").filter(|v| !v.trim().is_empty()) {
      self.api.base_url = url;
    }

    if let Some(mode) = lookup("POWERBACK_MODE").filter(|v| !v.trim().is_empty()) {
      self.mode = mode.parse()?;
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  #[test]
  fn test_defaults_are_local_mode() {
    let config = Config::default();
    assert_eq!(config.mode, GatewayMode::Local);
    assert_eq!(config.transitions, TransitionPolicy::Permissive);
    assert_eq!(config.assets.version, "powerback-v1");
    assert_eq!(config.assets.manifest.len(), DEFAULT_MANIFEST.len());
    assert_eq!(config.realtime.initial_delay_ms, 5_000);
  }

  #[test]
  fn test_partial_yaml_keeps_defaults() {
    let yaml = r#"
mode: remote
api:
  base_url: https://powerback.example.org
transitions: strict
realtime:
  max_attempts: 10
assets:
  version: powerback-v2
  manifest:
    - /pwa/
"#;
    let config: Config = serde_yaml::from_str(yaml).unwrap();

    assert_eq!(config.mode, GatewayMode::Remote);
    assert_eq!(config.api.timeout_secs, 30);
    assert_eq!(config.transitions, TransitionPolicy::Strict);
    assert_eq!(config.realtime.max_attempts, Some(10));
    assert_eq!(config.realtime.max_delay_ms, 60_000);
    assert_eq!(config.assets.manifest, vec!["/pwa/".to_string()]);
    assert_eq!(
      config.api.realtime_url().unwrap().as_str(),
      "https://powerback.example.org/api/realtime"
    );
  }

  #[test]
  fn test_env_overrides() {
    let env: HashMap<&str, &str> = [
      ("POWERBACK_API_URL", "http://10.0.0.5:8080"),
      ("POWERBACK_MODE", "Remote"),
    ]
    .into_iter()
    .collect();

    let mut config = Config::default();
    config
      .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
      .unwrap();

    assert_eq!(config.mode, GatewayMode::Remote);
    assert_eq!(config.api.base_url, "http://10.0.0.5:8080");
  }

  #[test]
  fn test_invalid_mode_override_is_an_error() {
    let mut config = Config::default();
    let result =
      config.apply_overrides(|key| (key == "POWERBACK_MODE").then(|| "cloud".to_string()));
    assert!(result.is_err());
  }

  #[test]
  fn test_explicit_missing_path_is_an_error() {
    let result = Config::load(Some(Path::new("/nonexistent/powerback.yaml")));
    assert!(result.is_err());
  }

  #[test]
  fn test_load_from_path() {
    let path = std::env::temp_dir().join(format!("powerback-config-{}.yaml", std::process::id()));
    std::fs::write(&path, "storage:\n  path: /tmp/pb.db\n").unwrap();

    let config = Config::load_from_path(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(config.storage.path, Some(PathBuf::from("/tmp/pb.db")));
  }
}
