//! PowerOps Compare
//!
//! Compares two SHOP result documents. The diff walks both trees in
//! parallel, treating `1` and `1.0` as equal, and records every location
//! where they disagree. Each location is classified by the shape of the
//! values found there:
//!
//! - [`ValueShape::Value`]: a scalar (or an opaque nested mapping)
//! - [`ValueShape::List`]: a sequence, compared as a whole
//! - [`ValueShape::TimeSeries`]: a mapping whose keys are all timestamps
//!   and whose values are all numbers, compared as a whole
//!
//! [`render_markdown`] turns the diff into a human readable report.

mod diff;
mod error;
mod path;
mod report;
mod shape;

pub use diff::{DiffEntry, YamlDiff, diff_values, values_equal};
pub use error::CompareError;
pub use path::KeyPath;
pub use report::render_markdown;
pub use shape::{ValueShape, time_series_points};

/// A diff together with its rendered report.
#[derive(Debug, Clone)]
pub struct Comparison {
  pub diff: YamlDiff,
  pub report: String,
}

/// Parse two YAML documents, diff them and render the report.
pub fn compare_yaml(a: &str, b: &str, name_a: &str, name_b: &str) -> Result<Comparison, CompareError> {
  let a: serde_yaml::Value = serde_yaml::from_str(a)?;
  let b: serde_yaml::Value = serde_yaml::from_str(b)?;
  compare_values(&a, &b, name_a, name_b)
}

/// Diff two parsed documents and render the report.
pub fn compare_values(
  a: &serde_yaml::Value,
  b: &serde_yaml::Value,
  name_a: &str,
  name_b: &str,
) -> Result<Comparison, CompareError> {
  let diff = diff_values(a, b);
  let report = render_markdown(&diff, name_a, name_b)?;
  Ok(Comparison { diff, report })
}
