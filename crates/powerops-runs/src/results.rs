//! Reading the output of a completed run.
//!
//! The compute service links its output to the run: log files and the YAML
//! result under the `LOG_FILE` label, and the objective function as a
//! sequence under `OBJECTIVE_SEQUENCE`.

use std::collections::BTreeMap;

use powerops_artifact::{Store as _, read_to_bytes};
use powerops_config::{AuxFile, FileKind};
use powerops_store::{
  Relationship, RelationshipFilter, ResourceType, Sequence, SequenceColumn, Store as _, ValueType,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, error, info, instrument, warn};

use crate::api::ShopRunsApi;
use crate::constants::{
  LOG_FILE_LABEL, META_PENALTY_BREAKDOWN, META_RUN_EVENT_XID, META_WATERCOURSE, OBJECTIVE_SEQUENCE_LABEL,
};
use crate::error::RunError;
use crate::run::ShopRun;
use crate::status::ShopRunStatus;

const KEY_COLUMN: &str = "key";
const VALUE_COLUMN: &str = "value";

/// What a linked result file turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultFile {
  CplexLog,
  MessagesLog,
  Yaml,
}

/// Classify a result file by its name.
pub fn classify_file_name(name: &str) -> Option<ResultFile> {
  let name = name.to_ascii_lowercase();
  if name.ends_with(".log") {
    if name.contains("cplex") {
      return Some(ResultFile::CplexLog);
    }
    if name.contains("shop_messages") {
      return Some(ResultFile::MessagesLog);
    }
    return None;
  }
  name.ends_with(".yaml").then_some(ResultFile::Yaml)
}

/// A plain-text log produced by a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
  pub external_id: String,
  pub name: String,
  pub content: String,
}

/// The YAML result document produced by a run.
#[derive(Debug, Clone, PartialEq)]
pub struct YamlFile {
  pub external_id: String,
  pub name: String,
  pub data: serde_yaml::Value,
}

/// Penalty contributions to the objective, grouped by severity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PenaltyBreakdown {
  #[serde(default)]
  pub major: BTreeMap<String, JsonValue>,
  #[serde(default)]
  pub minor: BTreeMap<String, JsonValue>,
  #[serde(default)]
  pub unknown: BTreeMap<String, JsonValue>,
}

impl PenaltyBreakdown {
  pub fn is_empty(&self) -> bool {
    self.major.is_empty() && self.minor.is_empty() && self.unknown.is_empty()
  }

  /// Decode the metadata field; anything unreadable becomes an empty breakdown.
  fn from_metadata(sequence: &Sequence) -> Self {
    let Some(raw) = sequence.metadata(META_PENALTY_BREAKDOWN) else {
      return Self::default();
    };
    serde_json::from_str(raw).unwrap_or_else(|e| {
      warn!(
        sequence = %sequence.external_id,
        error = %e,
        "malformed penalty breakdown, using an empty one"
      );
      Self::default()
    })
  }
}

/// Objective function of a run: a flat `name -> value` table.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectiveFunction {
  pub external_id: String,
  pub watercourse: Option<String>,
  pub data: BTreeMap<String, f64>,
  pub penalty_breakdown: PenaltyBreakdown,
  pub fields: Vec<SequenceColumn>,
}

impl ObjectiveFunction {
  pub fn new(external_id: impl Into<String>, data: BTreeMap<String, f64>) -> Self {
    Self {
      external_id: external_id.into(),
      watercourse: None,
      data,
      penalty_breakdown: PenaltyBreakdown::default(),
      fields: vec![
        SequenceColumn {
          external_id: KEY_COLUMN.to_string(),
          value_type: ValueType::String,
        },
        SequenceColumn {
          external_id: VALUE_COLUMN.to_string(),
          value_type: ValueType::Double,
        },
      ],
    }
  }

  pub fn with_watercourse(mut self, watercourse: impl Into<String>) -> Self {
    self.watercourse = Some(watercourse.into());
    self
  }

  pub fn with_penalty_breakdown(mut self, penalty_breakdown: PenaltyBreakdown) -> Self {
    self.penalty_breakdown = penalty_breakdown;
    self
  }

  /// Read an objective function stored as `key`/`value` rows.
  pub fn from_sequence(sequence: &Sequence) -> Result<Self, RunError> {
    let invalid = |message: &str| RunError::InvalidResult {
      name: sequence.name.clone(),
      message: message.to_string(),
    };
    let key_index = sequence
      .column_index(KEY_COLUMN)
      .ok_or_else(|| invalid("missing key column"))?;
    let value_index = sequence
      .column_index(VALUE_COLUMN)
      .ok_or_else(|| invalid("missing value column"))?;

    let mut data = BTreeMap::new();
    for row in &sequence.rows.0 {
      let key = row.values.get(key_index).and_then(JsonValue::as_str);
      let value = row.values.get(value_index).and_then(JsonValue::as_f64);
      match (key, value) {
        (Some(key), Some(value)) => {
          data.insert(key.to_string(), value);
        }
        _ => debug!(sequence = %sequence.external_id, row = row.row_number, "skipping non-numeric row"),
      }
    }

    Ok(Self {
      external_id: sequence.external_id.clone(),
      watercourse: sequence.metadata(META_WATERCOURSE).map(str::to_string),
      data,
      penalty_breakdown: PenaltyBreakdown::from_metadata(sequence),
      fields: sequence.columns.0.clone(),
    })
  }

  fn to_sequence(&self, run: &ShopRun) -> Result<Sequence, RunError> {
    let breakdown = serde_json::to_string(&self.penalty_breakdown).map_err(|e| RunError::InvalidResult {
      name: self.external_id.clone(),
      message: e.to_string(),
    })?;
    let watercourse = self.watercourse.as_deref().unwrap_or(run.watercourse());

    let mut sequence = Sequence::new(&self.external_id, format!("{watercourse} objective function"))
      .with_metadata(META_RUN_EVENT_XID, run.external_id())
      .with_metadata(META_WATERCOURSE, watercourse)
      .with_metadata(META_PENALTY_BREAKDOWN, breakdown)
      .with_column(KEY_COLUMN, ValueType::String)
      .with_column(VALUE_COLUMN, ValueType::Double);
    for (key, value) in &self.data {
      sequence.push_row(vec![JsonValue::from(key.as_str()), JsonValue::from(*value)]);
    }
    Ok(sequence)
  }
}

/// Everything a completed run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ShopRunResult {
  pub run: String,
  pub cplex_log: Option<LogFile>,
  pub messages_log: Option<LogFile>,
  pub yaml: Option<YamlFile>,
  pub objective_function: ObjectiveFunction,
}

/// Reads (and, on the compute side, writes) run results.
#[derive(Clone)]
pub struct ShopRunResultsApi {
  runs: ShopRunsApi,
}

impl ShopRunResultsApi {
  pub fn new(runs: ShopRunsApi) -> Self {
    Self { runs }
  }

  /// Collect the output of a completed run.
  ///
  /// Fails with [`RunError::RunNotComplete`] while the run is in progress.
  /// Result files with unrecognised names are logged and skipped.
  #[instrument(skip(self, run), fields(run = %run.external_id()))]
  pub async fn retrieve(&self, run: &ShopRun) -> Result<ShopRunResult, RunError> {
    if run.status().await? == ShopRunStatus::InProgress {
      return Err(RunError::RunNotComplete {
        run: run.external_id().to_string(),
      });
    }

    let mut result = ShopRunResult {
      run: run.external_id().to_string(),
      cplex_log: None,
      messages_log: None,
      yaml: None,
      objective_function: self.objective_function(run).await?,
    };

    let filter = RelationshipFilter::targets(ResourceType::File).with_label(LOG_FILE_LABEL);
    let links = self.runs.records().list_relationships(run.external_id(), &filter).await?;

    for link in links {
      let key = link.target_external_id;
      let info = self.runs.files().head(&key).await?;
      let Some(kind) = classify_file_name(&info.name) else {
        error!(file = %key, name = %info.name, "unrecognised result file, skipping");
        continue;
      };
      let content = read_to_bytes(self.runs.files().get(&key).await?).await?;

      match kind {
        ResultFile::CplexLog | ResultFile::MessagesLog => {
          let log = LogFile {
            external_id: key,
            name: info.name,
            content: String::from_utf8_lossy(&content).into_owned(),
          };
          let slot = match kind {
            ResultFile::CplexLog => &mut result.cplex_log,
            _ => &mut result.messages_log,
          };
          slot.get_or_insert(log);
        }
        ResultFile::Yaml => {
          let data = serde_yaml::from_slice(&content).map_err(|e| RunError::InvalidResult {
            name: info.name.clone(),
            message: e.to_string(),
          })?;
          result.yaml.get_or_insert(YamlFile {
            external_id: key,
            name: info.name,
            data,
          });
        }
      }
    }

    Ok(result)
  }

  /// The run's objective function.
  ///
  /// Every sequence linked to the run is a candidate; the first whose name
  /// contains "objective" (any case) is used.
  pub async fn objective_function(&self, run: &ShopRun) -> Result<ObjectiveFunction, RunError> {
    let links = self
      .runs
      .records()
      .list_relationships(run.external_id(), &RelationshipFilter::targets(ResourceType::Sequence))
      .await?;
    if links.iter().any(|l| !l.has_label(OBJECTIVE_SEQUENCE_LABEL)) {
      debug!(run = %run.external_id(), "run has sequences linked without the objective label");
    }

    let ids: Vec<String> = links.into_iter().map(|l| l.target_external_id).collect();
    let sequences = if ids.is_empty() {
      Vec::new()
    } else {
      self.runs.records().get_sequences(&ids).await?
    };

    let sequence = sequences
      .iter()
      .find(|s| s.name.to_lowercase().contains("objective"))
      .ok_or_else(|| RunError::ObjectiveFunctionNotFound {
        run: run.external_id().to_string(),
      })?;
    ObjectiveFunction::from_sequence(sequence)
  }

  /// Upload result files and the objective function and link them to the run.
  ///
  /// Only log and YAML result files are accepted.
  #[instrument(skip(self, run, files, objective), fields(run = %run.external_id(), files = files.len()))]
  pub async fn attach_results(
    &self,
    run: &ShopRun,
    files: &[AuxFile],
    objective: Option<&ObjectiveFunction>,
  ) -> Result<(), RunError> {
    if let Some(file) = files
      .iter()
      .find(|f| !matches!(f.kind, FileKind::Log | FileKind::YamlResult))
    {
      return Err(RunError::InvalidResult {
        name: file.name.clone(),
        message: format!("{} files are not results", file.kind.as_str()),
      });
    }

    self.runs.upload_and_link(run, files).await?;

    if let Some(objective) = objective {
      let sequence = objective.to_sequence(run)?;
      let records = self.runs.records();
      records.create_sequence(&sequence).await?;
      records
        .create_relationships(&[Relationship::new(
          (run.external_id(), ResourceType::Event),
          (&sequence.external_id, ResourceType::Sequence),
          OBJECTIVE_SEQUENCE_LABEL,
        )])
        .await?;
    }

    info!("attached results");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_classify_file_name() {
    assert_eq!(classify_file_name("cplex.log"), Some(ResultFile::CplexLog));
    assert_eq!(classify_file_name("run_cplex_1.log"), Some(ResultFile::CplexLog));
    assert_eq!(classify_file_name("shop_messages.log"), Some(ResultFile::MessagesLog));
    assert_eq!(classify_file_name("result.yaml"), Some(ResultFile::Yaml));
    assert_eq!(classify_file_name("other.log"), None);
    assert_eq!(classify_file_name("cplex.txt"), None);
    assert_eq!(classify_file_name("result.json"), None);
  }

  #[test]
  fn test_objective_from_sequence() {
    let mut sequence = Sequence::new("obj", "Objective function")
      .with_metadata(META_WATERCOURSE, "Lyse")
      .with_metadata(META_PENALTY_BREAKDOWN, r#"{"major": {"reservoir": 10.0}}"#)
      .with_column(KEY_COLUMN, ValueType::String)
      .with_column(VALUE_COLUMN, ValueType::Double);
    sequence.push_row(vec![JsonValue::from("total"), JsonValue::from(-1200.5)]);
    sequence.push_row(vec![JsonValue::from("note"), JsonValue::from("n/a")]);

    let objective = ObjectiveFunction::from_sequence(&sequence).unwrap();
    assert_eq!(objective.watercourse.as_deref(), Some("Lyse"));
    assert_eq!(objective.data.len(), 1);
    assert_eq!(objective.data["total"], -1200.5);
    assert_eq!(objective.penalty_breakdown.major["reservoir"], JsonValue::from(10.0));
    assert!(objective.penalty_breakdown.minor.is_empty());
  }

  #[test]
  fn test_malformed_penalty_breakdown_defaults() {
    let sequence = Sequence::new("obj", "objective")
      .with_metadata(META_PENALTY_BREAKDOWN, "{not json")
      .with_column(KEY_COLUMN, ValueType::String)
      .with_column(VALUE_COLUMN, ValueType::Double);

    let objective = ObjectiveFunction::from_sequence(&sequence).unwrap();
    assert!(objective.penalty_breakdown.is_empty());
  }
}
