use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use powerops_config::parse_timestamp;
use serde_yaml::{Mapping, Value};

use crate::error::TransformError;

/// A time series ordered by timestamp.
pub type TimeSeries = BTreeMap<DateTime<Utc>, f64>;

/// Value in effect at `at`: the latest point at or before it.
pub(crate) fn value_at(series: &TimeSeries, at: DateTime<Utc>) -> Option<f64> {
  series.range(..=at).next_back().map(|(_, v)| *v)
}

/// Read a `timestamp: value` mapping.
pub fn series_from_yaml(content: &str) -> Result<TimeSeries, TransformError> {
  let value: Value = serde_yaml::from_str(content).map_err(|e| TransformError::InvalidSeries(e.to_string()))?;
  let Value::Mapping(map) = value else {
    return Err(TransformError::InvalidSeries("expected a mapping of timestamps to values".into()));
  };

  map
    .iter()
    .map(|(k, v)| {
      let key = k
        .as_str()
        .ok_or_else(|| TransformError::InvalidSeries(format!("non-string key {k:?}")))?;
      let ts = parse_timestamp(key).ok_or_else(|| TransformError::InvalidSeries(format!("not a timestamp: {key}")))?;
      let value = v
        .as_f64()
        .ok_or_else(|| TransformError::InvalidSeries(format!("non-numeric value at {key}")))?;
      Ok((ts, value))
    })
    .collect()
}

/// Write the series in the layout SHOP case files use.
pub fn series_to_yaml(series: &TimeSeries) -> Result<String, TransformError> {
  let mut map = Mapping::new();
  for (ts, value) in series {
    map.insert(
      Value::String(ts.format("%Y-%m-%d %H:%M:%S").to_string()),
      Value::Number((*value).into()),
    );
  }
  serde_yaml::to_string(&Value::Mapping(map)).map_err(|e| TransformError::InvalidSeries(e.to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  #[test]
  fn test_value_at_steps() {
    let t0 = Utc.with_ymd_and_hms(2022, 5, 22, 0, 0, 0).unwrap();
    let t1 = Utc.with_ymd_and_hms(2022, 5, 22, 2, 0, 0).unwrap();
    let series = TimeSeries::from([(t0, 1.0), (t1, 2.0)]);

    assert_eq!(value_at(&series, t0 - chrono::Duration::hours(1)), None);
    assert_eq!(value_at(&series, t0), Some(1.0));
    assert_eq!(value_at(&series, t0 + chrono::Duration::hours(1)), Some(1.0));
    assert_eq!(value_at(&series, t1), Some(2.0));
  }

  #[test]
  fn test_yaml_round_trip() {
    let series = series_from_yaml("{'2022-05-22 00:00:00': 1, '2022-05-22 01:00:00': 2.5}").unwrap();
    assert_eq!(series.len(), 2);
    let again = series_from_yaml(&series_to_yaml(&series).unwrap()).unwrap();
    assert_eq!(series, again);
  }

  #[test]
  fn test_rejects_bad_keys() {
    assert!(series_from_yaml("{yesterday: 1}").is_err());
    assert!(series_from_yaml("[1, 2]").is_err());
  }
}
