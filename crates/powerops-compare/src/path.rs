use std::fmt;

use serde_yaml::Value;

/// Location of a value as the mapping keys leading to it, rendered as
/// `model.reservoir.Reservoir1`.
///
/// Lists are compared as a whole, so a path ends at the list and never
/// indexes into it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyPath(Vec<String>);

impl KeyPath {
  pub fn root() -> Self {
    Self::default()
  }

  pub fn segments(&self) -> &[String] {
    &self.0
  }

  pub fn child(&self, key: impl Into<String>) -> Self {
    let mut segments = self.0.clone();
    segments.push(key.into());
    Self(segments)
  }

  pub(crate) fn key(&self, key: &Value) -> Self {
    self.child(key_to_string(key))
  }
}

impl fmt::Display for KeyPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.0.is_empty() {
      return f.write_str("<root>");
    }
    f.write_str(&self.0.join("."))
  }
}

/// Render a mapping key the way it reads in the source document.
pub(crate) fn key_to_string(key: &Value) -> String {
  match key {
    Value::String(s) => s.clone(),
    Value::Number(n) => n.to_string(),
    Value::Bool(b) => b.to_string(),
    Value::Null => "null".to_string(),
    other => serde_yaml::to_string(other)
      .map(|s| s.trim().to_string())
      .unwrap_or_else(|_| "?".to_string()),
  }
}
