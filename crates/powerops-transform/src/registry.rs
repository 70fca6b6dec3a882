use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::TransformError;
use crate::transforms::{
  AddConstant, AddFromOffset, HeightToVolume, MultiplyConstant, MultiplyFromOffset, StaticValues, Transform,
  WaterInTransit,
};

type Constructor = Arc<dyn Fn(&Value) -> Result<Box<dyn Transform>, TransformError> + Send + Sync>;

/// Maps transformation tags to constructors taking the JSON `kwargs`.
#[derive(Clone, Default)]
pub struct TransformationRegistry {
  constructors: HashMap<String, Constructor>,
}

impl TransformationRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// A registry with every built-in transformation.
  pub fn with_builtins() -> Self {
    let mut registry = Self::new();
    registry
      .register_typed::<AddConstant>("AddConstant")
      .register_typed::<MultiplyConstant>("MultiplyConstant")
      .register_typed::<StaticValues>("StaticValues")
      .register_typed::<AddFromOffset>("AddFromOffset")
      .register_typed::<MultiplyFromOffset>("MultiplyFromOffset")
      .register_typed::<HeightToVolume>("HeightToVolume")
      .register_typed::<WaterInTransit>("WaterInTransit");
    registry
  }

  /// Register a constructor. Fails if the tag is taken.
  pub fn register<F>(&mut self, tag: impl Into<String>, constructor: F) -> Result<&mut Self, TransformError>
  where
    F: Fn(&Value) -> Result<Box<dyn Transform>, TransformError> + Send + Sync + 'static,
  {
    let tag = tag.into();
    if self.constructors.contains_key(&tag) {
      return Err(TransformError::DuplicateTransformation(tag));
    }
    self.constructors.insert(tag, Arc::new(constructor));
    Ok(self)
  }

  /// Register a transformation whose `kwargs` deserialize straight into it.
  fn register_typed<T>(&mut self, tag: &'static str) -> &mut Self
  where
    T: Transform + DeserializeOwned + 'static,
  {
    self.constructors.insert(
      tag.to_string(),
      Arc::new(move |kwargs: &Value| -> Result<Box<dyn Transform>, TransformError> {
        let kwargs = if kwargs.is_null() {
          Value::Object(Default::default())
        } else {
          kwargs.clone()
        };
        let transform: T = serde_json::from_value(kwargs).map_err(|e| TransformError::invalid(tag, e.to_string()))?;
        Ok(Box::new(transform) as Box<dyn Transform>)
      }),
    );
    self
  }

  pub fn contains(&self, tag: &str) -> bool {
    self.constructors.contains_key(tag)
  }

  /// Registered tags in stable order.
  pub fn tags(&self) -> Vec<String> {
    let mut tags: Vec<String> = self.constructors.keys().cloned().collect();
    tags.sort();
    tags
  }

  pub fn build(&self, tag: &str, kwargs: &Value) -> Result<Box<dyn Transform>, TransformError> {
    let constructor = self
      .constructors
      .get(tag)
      .ok_or_else(|| TransformError::UnknownTransformation(tag.to_string()))?;
    constructor(kwargs)
  }
}

static DEFAULT_REGISTRY: LazyLock<TransformationRegistry> = LazyLock::new(TransformationRegistry::with_builtins);

/// The shared registry of built-in transformations.
pub fn default_registry() -> &'static TransformationRegistry {
  &DEFAULT_REGISTRY
}
