//! Case definitions submitted to the compute service.
//!
//! A SHOP case is a YAML document. Its `time` section carries the
//! optimisation window:
//!
//! ```yaml
//! time:
//!   starttime: 2022-05-22 00:00:00
//!   endtime: 2022-05-29 00:00:00
//!   timeunit: hour
//!   timeresolution: {2022-05-22 00:00:00: 60}
//! model:
//!   reservoir: ...
//! ```

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::enums::FileKind;
use crate::error::ConfigError;
use crate::time::parse_timestamp;

/// A SHOP case document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShopCase {
  pub data: Value,
}

impl ShopCase {
  pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
    let data: Value = serde_yaml::from_str(content)?;
    if !data.is_mapping() {
      return Err(ConfigError::invalid("case", "document root must be a mapping"));
    }
    Ok(Self { data })
  }

  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_yaml_str(&content)
  }

  /// Serialize to the YAML uploaded as the run's case file.
  pub fn to_yaml(&self) -> Result<String, ConfigError> {
    Ok(serde_yaml::to_string(&self.data)?)
  }

  /// Read `time.starttime` and `time.endtime`.
  pub fn time_window(&self) -> Result<(DateTime<Utc>, DateTime<Utc>), ConfigError> {
    let start = self.time_field("starttime")?;
    let end = self.time_field("endtime")?;
    Ok((start, end))
  }

  /// The `time.timeresolution` section rendered as compact JSON, if present.
  pub fn time_resolution(&self) -> Option<String> {
    let resolution = self.data.get("time")?.get("timeresolution")?;
    serde_json::to_string(resolution).ok()
  }

  fn time_field(&self, field: &str) -> Result<DateTime<Utc>, ConfigError> {
    let raw = self
      .data
      .get("time")
      .and_then(|t| t.get(field))
      .ok_or_else(|| ConfigError::invalid(format!("time.{field}"), "missing"))?;

    let text = match raw {
      Value::String(s) => s.clone(),
      other => serde_yaml::to_string(other)?.trim().to_string(),
    };
    parse_timestamp(&text)
      .ok_or_else(|| ConfigError::invalid(format!("time.{field}"), format!("not a timestamp: {text}")))
  }
}

/// An auxiliary input file (cut, mapping or extra) shipped with a case.
#[derive(Debug, Clone, PartialEq)]
pub struct AuxFile {
  pub kind: FileKind,
  /// File name as shown on the platform, e.g. `cuts.txt`.
  pub name: String,
  pub content: Vec<u8>,
}

impl AuxFile {
  pub fn new(kind: FileKind, name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
    Self {
      kind,
      name: name.into(),
      content: content.into(),
    }
  }

  /// Read an auxiliary file from disk, naming it after the path's file name.
  pub fn from_path(kind: FileKind, path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let name = path
      .file_name()
      .and_then(|n| n.to_str())
      .ok_or_else(|| ConfigError::invalid("file", format!("no file name in {}", path.display())))?;
    Ok(Self::new(kind, name, content))
  }
}

/// Everything needed to create one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ShopRunRequest {
  pub watercourse: String,
  pub starttime: DateTime<Utc>,
  pub endtime: DateTime<Utc>,
  pub time_resolution: Option<String>,
  pub manual_run: bool,
  /// Free-form tag recorded as the run event's source.
  pub source: Option<String>,
  pub case: ShopCase,
  pub aux_files: Vec<AuxFile>,
}

impl ShopRunRequest {
  /// Build a request whose window and resolution come from the case's `time` section.
  pub fn new(watercourse: impl Into<String>, case: ShopCase) -> Result<Self, ConfigError> {
    let (starttime, endtime) = case.time_window()?;
    let request = Self {
      watercourse: watercourse.into(),
      starttime,
      endtime,
      time_resolution: case.time_resolution(),
      manual_run: true,
      source: None,
      case,
      aux_files: Vec::new(),
    };
    request.validate()?;
    Ok(request)
  }

  pub fn with_file(mut self, file: AuxFile) -> Self {
    self.aux_files.push(file);
    self
  }

  pub fn with_source(mut self, source: impl Into<String>) -> Self {
    self.source = Some(source.into());
    self
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.watercourse.trim().is_empty() {
      return Err(ConfigError::invalid("watercourse", "must not be empty"));
    }
    if self.starttime >= self.endtime {
      return Err(ConfigError::invalid(
        "time",
        format!("starttime {} is not before endtime {}", self.starttime, self.endtime),
      ));
    }
    for file in &self.aux_files {
      if !matches!(file.kind, FileKind::Cut | FileKind::Mapping | FileKind::Extra) {
        return Err(ConfigError::invalid(
          "aux_files",
          format!("'{}' has kind {:?}; only cut, mapping and extra files are accepted", file.name, file.kind),
        ));
      }
    }
    Ok(())
  }
}
