use chrono::{DateTime, Utc};
use powerops_config::parse_timestamp;
use serde::Serialize;
use serde_yaml::Value;

/// How a value found at a diff location is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueShape {
  Value,
  List,
  TimeSeries,
}

impl ValueShape {
  pub fn of(value: &Value) -> Self {
    match value {
      Value::Sequence(_) => ValueShape::List,
      Value::Mapping(_) if is_time_series(value) => ValueShape::TimeSeries,
      _ => ValueShape::Value,
    }
  }

  /// Shape used for a location where `old` turned into `new`.
  /// A time series on either side wins over a list, a list over a scalar.
  pub fn of_change(old: &Value, new: &Value) -> Self {
    match (Self::of(old), Self::of(new)) {
      (ValueShape::TimeSeries, _) | (_, ValueShape::TimeSeries) => ValueShape::TimeSeries,
      (ValueShape::List, _) | (_, ValueShape::List) => ValueShape::List,
      _ => ValueShape::Value,
    }
  }
}

/// A non-empty mapping with timestamp keys and numeric values.
pub(crate) fn is_time_series(value: &Value) -> bool {
  match value {
    Value::Mapping(map) => {
      !map.is_empty()
        && map
          .iter()
          .all(|(k, v)| v.is_number() && timestamp_key(k).is_some())
    }
    _ => false,
  }
}

fn timestamp_key(key: &Value) -> Option<DateTime<Utc>> {
  match key {
    Value::String(s) => parse_timestamp(s),
    _ => None,
  }
}

/// Points of a time-series shaped value, ordered by time.
/// Returns an empty vector for anything else.
pub fn time_series_points(value: &Value) -> Vec<(DateTime<Utc>, f64)> {
  if !is_time_series(value) {
    return Vec::new();
  }
  let Value::Mapping(map) = value else {
    return Vec::new();
  };

  let mut points: Vec<(DateTime<Utc>, f64)> = map
    .iter()
    .filter_map(|(k, v)| Some((timestamp_key(k)?, v.as_f64()?)))
    .collect();
  points.sort_by_key(|(ts, _)| *ts);
  points
}

/// Short inline rendering of a scalar; containers are summarised.
pub(crate) fn inline(value: &Value) -> String {
  match value {
    Value::Null => "null".to_string(),
    Value::Bool(b) => b.to_string(),
    Value::Number(n) => n.to_string(),
    Value::String(s) => format!("\"{s}\""),
    Value::Sequence(items) => format!("list with {} items", items.len()),
    Value::Mapping(map) => format!("mapping with {} keys", map.len()),
    Value::Tagged(tagged) => format!("{} {}", tagged.tag, inline(&tagged.value)),
  }
}
