use serde_yaml::Value;

use crate::path::KeyPath;
use crate::shape::{ValueShape, is_time_series};

/// One location where the two documents disagree.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffEntry {
  pub path: KeyPath,
  pub shape: ValueShape,
  /// Value in A, `None` when the location only exists in B.
  pub old: Option<Value>,
  /// Value in B, `None` when the location only exists in A.
  pub new: Option<Value>,
}

/// Result of diffing document A against document B.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct YamlDiff {
  /// Present in A, missing in B.
  pub removed: Vec<DiffEntry>,
  /// Present in B, missing in A.
  pub added: Vec<DiffEntry>,
  /// Present in both with different values.
  pub changed: Vec<DiffEntry>,
}

impl YamlDiff {
  pub fn is_empty(&self) -> bool {
    self.removed.is_empty() && self.added.is_empty() && self.changed.is_empty()
  }

  pub fn len(&self) -> usize {
    self.removed.len() + self.added.len() + self.changed.len()
  }
}

/// Structural equality where integers and floats compare by numeric value.
pub fn values_equal(a: &Value, b: &Value) -> bool {
  match (a, b) {
    (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
      (Some(x), Some(y)) => x == y,
      _ => x == y,
    },
    (Value::Sequence(xs), Value::Sequence(ys)) => {
      xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
    }
    (Value::Mapping(xs), Value::Mapping(ys)) => {
      xs.len() == ys.len()
        && xs
          .iter()
          .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
    }
    (Value::Tagged(x), Value::Tagged(y)) => x.tag == y.tag && values_equal(&x.value, &y.value),
    _ => a == b,
  }
}

/// Diff `b` against `a`.
///
/// Mappings are walked key by key. Lists and time series are compared as a
/// whole and reported as a single entry when any element differs.
pub fn diff_values(a: &Value, b: &Value) -> YamlDiff {
  let mut diff = YamlDiff::default();
  walk(&KeyPath::root(), a, b, &mut diff);
  diff
}

fn walk(path: &KeyPath, a: &Value, b: &Value, diff: &mut YamlDiff) {
  if values_equal(a, b) {
    return;
  }

  match (a, b) {
    (Value::Mapping(left), Value::Mapping(right)) if !(is_time_series(a) && is_time_series(b)) => {
      for (key, old) in left {
        let child = path.key(key);
        match right.get(key) {
          Some(new) => walk(&child, old, new, diff),
          None => diff.removed.push(DiffEntry {
            path: child,
            shape: ValueShape::of(old),
            old: Some(old.clone()),
            new: None,
          }),
        }
      }
      for (key, new) in right {
        if !left.contains_key(key) {
          diff.added.push(DiffEntry {
            path: path.key(key),
            shape: ValueShape::of(new),
            old: None,
            new: Some(new.clone()),
          });
        }
      }
    }
    _ => diff.changed.push(DiffEntry {
      path: path.clone(),
      shape: ValueShape::of_change(a, b),
      old: Some(a.clone()),
      new: Some(b.clone()),
    }),
  }
}
