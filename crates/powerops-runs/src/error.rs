use std::time::Duration;

use powerops_trigger::TriggerError;

/// Errors raised by run orchestration.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
  #[error("run not found: {0}")]
  RunNotFound(String),

  /// The event exists but does not describe a SHOP run.
  #[error("invalid run '{run}': {message}")]
  InvalidRun { run: String, message: String },

  #[error("run '{run}' has no linked {kind} file")]
  FileNotFound { run: String, kind: &'static str },

  /// Results were requested before the run reached a terminal status.
  #[error("run '{run}' is still in progress")]
  RunNotComplete { run: String },

  #[error("no objective function sequence linked to run '{run}'")]
  ObjectiveFunctionNotFound { run: String },

  #[error("invalid result file '{name}': {message}")]
  InvalidResult { name: String, message: String },

  #[error("run '{run}' did not complete within {timeout:?}")]
  Timeout { run: String, timeout: Duration },

  #[error("waiting for run '{run}' was cancelled")]
  Cancelled { run: String },

  #[error(transparent)]
  Config(#[from] powerops_config::ConfigError),

  #[error("record store error: {0}")]
  Store(#[from] powerops_store::Error),

  #[error("file store error: {0}")]
  Artifact(#[from] powerops_artifact::Error),

  #[error("trigger failed: {0}")]
  Trigger(#[from] TriggerError),
}
