/// Errors raised while building or applying transformations.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
  #[error("unknown transformation: {0}")]
  UnknownTransformation(String),

  #[error("transformation already registered: {0}")]
  DuplicateTransformation(String),

  #[error("invalid arguments for {transformation}: {message}")]
  InvalidArguments { transformation: String, message: String },

  #[error("invalid time series: {0}")]
  InvalidSeries(String),
}

impl TransformError {
  pub(crate) fn invalid(transformation: &str, message: impl Into<String>) -> Self {
    Self::InvalidArguments {
      transformation: transformation.to_string(),
      message: message.into(),
    }
  }
}
