use serde::{Deserialize, Serialize};

/// How the compute service is asked to run a case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
  /// `POST /{project}/run-shop` with the run's event id and SHOP version.
  #[default]
  Standard,
  /// `POST /{project}/run-shop-as-service` in asset mode.
  AsService,
}

/// Kind of a file linked to a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
  Case,
  Cut,
  Mapping,
  Extra,
  Log,
  YamlResult,
}

impl FileKind {
  pub const ALL: [FileKind; 6] = [
    FileKind::Case,
    FileKind::Cut,
    FileKind::Mapping,
    FileKind::Extra,
    FileKind::Log,
    FileKind::YamlResult,
  ];

  /// Relationship label used when linking a file of this kind to its run.
  ///
  /// YAML results share the `LOG_FILE` label with logs; they are told apart
  /// by file name when results are retrieved.
  pub fn label(self) -> &'static str {
    match self {
      FileKind::Case => "CASE_FILE",
      FileKind::Cut => "CUT_FILE",
      FileKind::Mapping => "MAPPING_FILE",
      FileKind::Extra => "EXTRA_FILE",
      FileKind::Log | FileKind::YamlResult => "LOG_FILE",
    }
  }

  /// Value stored in the `shop:file_type` metadata of an uploaded file.
  pub fn as_str(self) -> &'static str {
    match self {
      FileKind::Case => "case",
      FileKind::Cut => "cut",
      FileKind::Mapping => "mapping",
      FileKind::Extra => "extra",
      FileKind::Log => "log",
      FileKind::YamlResult => "yaml_result",
    }
  }

  pub fn from_label(label: &str) -> Option<Self> {
    match label {
      "CASE_FILE" => Some(FileKind::Case),
      "CUT_FILE" => Some(FileKind::Cut),
      "MAPPING_FILE" => Some(FileKind::Mapping),
      "EXTRA_FILE" => Some(FileKind::Extra),
      "LOG_FILE" => Some(FileKind::Log),
      _ => None,
    }
  }

  /// Whether this kind is supplied by the caller when a run is created.
  pub fn is_input(self) -> bool {
    matches!(
      self,
      FileKind::Case | FileKind::Cut | FileKind::Mapping | FileKind::Extra
    )
  }
}
