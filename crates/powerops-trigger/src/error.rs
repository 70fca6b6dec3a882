/// Errors that can occur while dispatching runs.
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
  /// The service URL or a path derived from it is unusable.
  #[error("invalid service url '{url}': {message}")]
  InvalidUrl { url: String, message: String },

  /// The request could not be sent or its response not read.
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  /// The compute service answered with a non-success status.
  #[error("trigger for '{run}' failed with status {status}: {body}")]
  Status { run: String, status: u16, body: String },

  /// The dispatch was cancelled before it completed.
  #[error("trigger cancelled")]
  Cancelled,

  /// A dispatch task panicked or was aborted unexpectedly.
  #[error("trigger task failed: {message}")]
  Join { message: String },
}
