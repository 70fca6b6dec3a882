use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::enums::TriggerMode;
use crate::error::ConfigError;

/// Prefix of the environment variables that override file settings.
pub const ENV_PREFIX: &str = "POWEROPS_";

fn default_shop_version() -> String {
  "latest".to_string()
}

fn default_poll_interval_ms() -> u64 {
  3_000
}

/// Settings for talking to the platform and the compute service.
///
/// # Example
///
/// ```yaml
/// project: power-ops-staging
/// service_url: https://power-ops-api.example.com
/// shop_version: "15.3.0.0"
/// trigger_mode: standard
/// poll_interval_ms: 3000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
  /// Project the runs belong to; part of the trigger URL.
  pub project: String,

  /// Base URL of the compute service, e.g. `https://power-ops-api.example.com`.
  pub service_url: String,

  /// Bearer token for the compute service.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub token: Option<String>,

  #[serde(default = "default_shop_version")]
  pub shop_version: String,

  #[serde(default)]
  pub trigger_mode: TriggerMode,

  /// Pause between two status polls while waiting for a run.
  #[serde(default = "default_poll_interval_ms")]
  pub poll_interval_ms: u64,

  /// Where the local platform keeps its records and files.
  /// Defaults to `~/.powerops` in the CLI.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub data_dir: Option<PathBuf>,
}

impl Settings {
  /// Create settings with defaults for everything but project and service URL.
  pub fn new(project: impl Into<String>, service_url: impl Into<String>) -> Self {
    Self {
      project: project.into(),
      service_url: service_url.into(),
      token: None,
      shop_version: default_shop_version(),
      trigger_mode: TriggerMode::default(),
      poll_interval_ms: default_poll_interval_ms(),
      data_dir: None,
    }
  }

  /// Load settings from a JSON or YAML file, chosen by extension.
  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;

    let settings: Settings = match path.extension().and_then(|e| e.to_str()) {
      Some("json") => serde_json::from_str(&content)?,
      _ => serde_yaml::from_str(&content)?,
    };
    settings.validate()?;
    Ok(settings)
  }

  /// Apply overrides from the process environment.
  pub fn with_env(self) -> Result<Self, ConfigError> {
    self.with_overrides(std::env::vars())
  }

  /// Apply `POWEROPS_*` overrides from the given key/value pairs.
  ///
  /// Recognised keys: `POWEROPS_PROJECT`, `POWEROPS_SERVICE_URL`,
  /// `POWEROPS_TOKEN`, `POWEROPS_SHOP_VERSION`, `POWEROPS_TRIGGER_MODE`,
  /// `POWEROPS_POLL_INTERVAL_MS`, `POWEROPS_DATA_DIR`. Others are ignored.
  pub fn with_overrides<I, K, V>(mut self, vars: I) -> Result<Self, ConfigError>
  where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
  {
    for (key, value) in vars {
      let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
        continue;
      };
      let value = value.into();
      match name {
        "PROJECT" => self.project = value,
        "SERVICE_URL" => self.service_url = value,
        "TOKEN" => self.token = Some(value),
        "SHOP_VERSION" => self.shop_version = value,
        "TRIGGER_MODE" => {
          self.trigger_mode = serde_json::from_value(serde_json::Value::String(value.clone()))
            .map_err(|_| ConfigError::invalid("trigger_mode", format!("unknown mode '{value}'")))?;
        }
        "POLL_INTERVAL_MS" => {
          self.poll_interval_ms = value
            .parse()
            .map_err(|e| ConfigError::invalid("poll_interval_ms", format!("{e}")))?;
        }
        "DATA_DIR" => self.data_dir = Some(PathBuf::from(value)),
        _ => {}
      }
    }
    self.validate()?;
    Ok(self)
  }

  pub fn poll_interval(&self) -> Duration {
    Duration::from_millis(self.poll_interval_ms)
  }

  fn validate(&self) -> Result<(), ConfigError> {
    if self.project.trim().is_empty() {
      return Err(ConfigError::invalid("project", "must not be empty"));
    }
    if self.service_url.trim().is_empty() {
      return Err(ConfigError::invalid("service_url", "must not be empty"));
    }
    if self.poll_interval_ms == 0 {
      return Err(ConfigError::invalid("poll_interval_ms", "must be positive"));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn test_load_yaml_with_defaults() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(file, "project: power-ops-dev\nservice_url: https://api.example.com").unwrap();

    let settings = Settings::from_file(file.path()).unwrap();
    assert_eq!(settings.project, "power-ops-dev");
    assert_eq!(settings.shop_version, "latest");
    assert_eq!(settings.trigger_mode, TriggerMode::Standard);
    assert_eq!(settings.poll_interval(), Duration::from_secs(3));
  }

  #[test]
  fn test_load_json() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(
      file,
      r#"{{"project": "p", "service_url": "http://localhost:1", "trigger_mode": "as_service"}}"#
    )
    .unwrap();

    let settings = Settings::from_file(file.path()).unwrap();
    assert_eq!(settings.trigger_mode, TriggerMode::AsService);
  }

  #[test]
  fn test_overrides() {
    let settings = Settings::new("p", "http://a")
      .with_overrides([
        ("POWEROPS_PROJECT", "other"),
        ("POWEROPS_TOKEN", "secret"),
        ("POWEROPS_POLL_INTERVAL_MS", "250"),
        ("POWEROPS_TRIGGER_MODE", "as_service"),
        ("HOME", "/root"),
      ])
      .unwrap();

    assert_eq!(settings.project, "other");
    assert_eq!(settings.token.as_deref(), Some("secret"));
    assert_eq!(settings.poll_interval_ms, 250);
    assert_eq!(settings.trigger_mode, TriggerMode::AsService);
  }

  #[test]
  fn test_invalid_override() {
    let err = Settings::new("p", "http://a")
      .with_overrides([("POWEROPS_POLL_INTERVAL_MS", "soon")])
      .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "poll_interval_ms"));
  }

  #[test]
  fn test_empty_project_rejected() {
    let err = Settings::new("p", "http://a")
      .with_overrides([("POWEROPS_PROJECT", " ")])
      .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { .. }));
  }
}
