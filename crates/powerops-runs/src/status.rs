use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{PROCESS_FAILED, PROCESS_FINISHED, PROCESS_STARTED};

/// Derived status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShopRunStatus {
  InProgress,
  Succeeded,
  Failed,
}

impl ShopRunStatus {
  /// `Succeeded` and `Failed` never change once observed.
  pub fn is_terminal(self) -> bool {
    !matches!(self, ShopRunStatus::InProgress)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      ShopRunStatus::InProgress => "IN_PROGRESS",
      ShopRunStatus::Succeeded => "SUCCEEDED",
      ShopRunStatus::Failed => "FAILED",
    }
  }
}

impl fmt::Display for ShopRunStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A process marker the compute service links to a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessEventKind {
  Started,
  Finished,
  Failed,
}

impl ProcessEventKind {
  pub fn event_type(self) -> &'static str {
    match self {
      ProcessEventKind::Started => PROCESS_STARTED,
      ProcessEventKind::Finished => PROCESS_FINISHED,
      ProcessEventKind::Failed => PROCESS_FAILED,
    }
  }

  pub fn from_event_type(event_type: &str) -> Option<Self> {
    match event_type {
      PROCESS_STARTED => Some(ProcessEventKind::Started),
      PROCESS_FINISHED => Some(ProcessEventKind::Finished),
      PROCESS_FAILED => Some(ProcessEventKind::Failed),
      _ => None,
    }
  }
}

/// Status of a run given the distinct process events linked to it.
///
/// FINISHED wins over FAILED when both are present.
pub fn classify_status(kinds: &HashSet<ProcessEventKind>) -> ShopRunStatus {
  if kinds.iter().all(|k| *k == ProcessEventKind::Started) {
    ShopRunStatus::InProgress
  } else if kinds.contains(&ProcessEventKind::Finished) {
    ShopRunStatus::Succeeded
  } else {
    ShopRunStatus::Failed
  }
}
