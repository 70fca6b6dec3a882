use std::path::PathBuf;

/// Errors raised while loading settings or case definitions.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  /// The file could not be read.
  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid json: {0}")]
  Json(#[from] serde_json::Error),

  #[error("invalid yaml: {0}")]
  Yaml(#[from] serde_yaml::Error),

  /// A field is missing or holds an unusable value.
  #[error("invalid value for '{field}': {message}")]
  InvalidValue { field: String, message: String },
}

impl ConfigError {
  pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
    Self::InvalidValue {
      field: field.into(),
      message: message.into(),
    }
  }
}
