use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

/// Kind of resource at either end of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ResourceType {
  Event,
  File,
  Sequence,
}

/// Value type of a sequence column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
  Double,
  Long,
  String,
}

/// An event record: a run request or a process marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Event {
  pub external_id: String,
  pub event_type: String,
  pub subtype: Option<String>,
  pub source: Option<String>,
  pub start_time: Option<DateTime<Utc>>,
  pub end_time: Option<DateTime<Utc>>,
  pub metadata: Json<BTreeMap<String, String>>,
  pub created_time: DateTime<Utc>,
}

impl Event {
  pub fn new(external_id: impl Into<String>, event_type: impl Into<String>) -> Self {
    Self {
      external_id: external_id.into(),
      event_type: event_type.into(),
      subtype: None,
      source: None,
      start_time: None,
      end_time: None,
      metadata: Json(BTreeMap::new()),
      created_time: Utc::now(),
    }
  }

  pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.metadata.0.insert(key.into(), value.into());
    self
  }

  pub fn metadata(&self, key: &str) -> Option<&str> {
    self.metadata.0.get(key).map(String::as_str)
  }
}

/// A labelled, directed link between two resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Relationship {
  pub external_id: String,
  pub source_external_id: String,
  pub source_type: ResourceType,
  pub target_external_id: String,
  pub target_type: ResourceType,
  pub labels: Json<Vec<String>>,
  pub created_time: DateTime<Utc>,
}

impl Relationship {
  /// Create a relationship with a single label. The external id is derived
  /// from both ends so linking the same pair twice collides.
  pub fn new(
    source: (&str, ResourceType),
    target: (&str, ResourceType),
    label: impl Into<String>,
  ) -> Self {
    Self {
      external_id: format!("{}.{}", source.0, target.0),
      source_external_id: source.0.to_string(),
      source_type: source.1,
      target_external_id: target.0.to_string(),
      target_type: target.1,
      labels: Json(vec![label.into()]),
      created_time: Utc::now(),
    }
  }

  pub fn has_label(&self, label: &str) -> bool {
    self.labels.0.iter().any(|l| l == label)
  }
}

/// Column description of a sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceColumn {
  pub external_id: String,
  pub value_type: ValueType,
}

/// One row of a sequence. `values` follow the column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceRow {
  pub row_number: i64,
  pub values: Vec<serde_json::Value>,
}

/// A small table of values, e.g. an objective function breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Sequence {
  pub external_id: String,
  pub name: String,
  pub metadata: Json<BTreeMap<String, String>>,
  pub columns: Json<Vec<SequenceColumn>>,
  pub rows: Json<Vec<SequenceRow>>,
  pub created_time: DateTime<Utc>,
}

impl Sequence {
  pub fn new(external_id: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      external_id: external_id.into(),
      name: name.into(),
      metadata: Json(BTreeMap::new()),
      columns: Json(Vec::new()),
      rows: Json(Vec::new()),
      created_time: Utc::now(),
    }
  }

  pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.metadata.0.insert(key.into(), value.into());
    self
  }

  pub fn with_column(mut self, external_id: impl Into<String>, value_type: ValueType) -> Self {
    self.columns.0.push(SequenceColumn {
      external_id: external_id.into(),
      value_type,
    });
    self
  }

  /// Append a row numbered after the last one.
  pub fn push_row(&mut self, values: Vec<serde_json::Value>) {
    let row_number = self.rows.0.last().map_or(0, |r| r.row_number + 1);
    self.rows.0.push(SequenceRow { row_number, values });
  }

  pub fn metadata(&self, key: &str) -> Option<&str> {
    self.metadata.0.get(key).map(String::as_str)
  }

  /// Index of the column with the given external id.
  pub fn column_index(&self, external_id: &str) -> Option<usize> {
    self
      .columns
      .0
      .iter()
      .position(|c| c.external_id == external_id)
  }
}

/// Filter for [`crate::Store::list_events`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
  pub event_type: Option<String>,
  /// Every entry must match the event's metadata exactly.
  pub metadata: BTreeMap<String, String>,
  pub limit: Option<usize>,
}

impl EventFilter {
  pub fn event_type(event_type: impl Into<String>) -> Self {
    Self {
      event_type: Some(event_type.into()),
      ..Self::default()
    }
  }

  pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.metadata.insert(key.into(), value.into());
    self
  }

  pub fn with_limit(mut self, limit: usize) -> Self {
    self.limit = Some(limit);
    self
  }

  pub fn matches(&self, event: &Event) -> bool {
    if let Some(event_type) = &self.event_type
      && &event.event_type != event_type
    {
      return false;
    }
    self
      .metadata
      .iter()
      .all(|(k, v)| event.metadata(k) == Some(v.as_str()))
  }
}

/// Filter for [`crate::Store::list_relationships`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationshipFilter {
  pub target_type: Option<ResourceType>,
  /// Match relationships carrying any of these labels. Empty matches all.
  pub labels: Vec<String>,
}

impl RelationshipFilter {
  pub fn targets(target_type: ResourceType) -> Self {
    Self {
      target_type: Some(target_type),
      labels: Vec::new(),
    }
  }

  pub fn with_label(mut self, label: impl Into<String>) -> Self {
    self.labels.push(label.into());
    self
  }

  pub fn matches(&self, relationship: &Relationship) -> bool {
    if let Some(target_type) = self.target_type
      && relationship.target_type != target_type
    {
      return false;
    }
    self.labels.is_empty() || self.labels.iter().any(|l| relationship.has_label(l))
  }
}
