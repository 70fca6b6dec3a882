/// Errors raised while comparing result documents.
#[derive(Debug, thiserror::Error)]
pub enum CompareError {
  #[error("invalid yaml: {0}")]
  Yaml(#[from] serde_yaml::Error),

  #[error("failed to render report: {0}")]
  Render(#[from] minijinja::Error),
}
