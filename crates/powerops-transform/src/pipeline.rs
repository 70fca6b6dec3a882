use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::TransformError;
use crate::registry::{TransformationRegistry, default_registry};
use crate::series::TimeSeries;
use crate::transforms::Transform;

/// A transformation described as data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationSpec {
  pub transformation: String,
  #[serde(default)]
  pub kwargs: Value,
}

impl TransformationSpec {
  pub fn new(transformation: impl Into<String>, kwargs: Value) -> Self {
    Self {
      transformation: transformation.into(),
      kwargs,
    }
  }

  /// Build with the built-in transformations.
  pub fn build(&self) -> Result<Box<dyn Transform>, TransformError> {
    self.build_with(default_registry())
  }

  pub fn build_with(&self, registry: &TransformationRegistry) -> Result<Box<dyn Transform>, TransformError> {
    registry.build(&self.transformation, &self.kwargs)
  }
}

/// Transformations applied one after another.
#[derive(Debug, Default)]
pub struct Pipeline {
  steps: Vec<Box<dyn Transform>>,
}

impl Pipeline {
  pub fn new(steps: Vec<Box<dyn Transform>>) -> Self {
    Self { steps }
  }

  pub fn from_specs(specs: &[TransformationSpec], registry: &TransformationRegistry) -> Result<Self, TransformError> {
    let steps = specs
      .iter()
      .map(|spec| spec.build_with(registry))
      .collect::<Result<Vec<_>, _>>()?;
    Ok(Self { steps })
  }

  /// Parse a YAML (or JSON) list of specs and build it with the built-ins.
  pub fn from_yaml(content: &str) -> Result<Self, TransformError> {
    let specs: Vec<TransformationSpec> = serde_yaml::from_str(content)
      .map_err(|e| TransformError::invalid("pipeline", e.to_string()))?;
    Self::from_specs(&specs, default_registry())
  }

  pub fn len(&self) -> usize {
    self.steps.len()
  }

  pub fn is_empty(&self) -> bool {
    self.steps.is_empty()
  }

  pub fn apply(&self, series: &TimeSeries) -> Result<TimeSeries, TransformError> {
    let mut current = series.clone();
    for step in &self.steps {
      current = step.apply(&current)?;
      debug!(transformation = step.name(), points = current.len(), "applied transformation");
    }
    Ok(current)
  }
}
