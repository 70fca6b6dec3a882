use std::collections::BTreeMap;
use std::fmt::Debug;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TransformError;
use crate::series::{TimeSeries, value_at};

/// A transformation from one time series to another.
pub trait Transform: Debug + Send + Sync {
  /// Tag the transformation is registered under.
  fn name(&self) -> &'static str;

  fn apply(&self, series: &TimeSeries) -> Result<TimeSeries, TransformError>;
}

/// `ts` moved by `minutes`, or an argument error when it leaves chrono's range.
fn shifted(transformation: &str, ts: DateTime<Utc>, minutes: i64) -> Result<DateTime<Utc>, TransformError> {
  TimeDelta::try_minutes(minutes)
    .and_then(|delta| ts.checked_add_signed(delta))
    .ok_or_else(|| TransformError::invalid(transformation, format!("shift of {minutes} minutes is out of range")))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddConstant {
  pub constant: f64,
}

impl Transform for AddConstant {
  fn name(&self) -> &'static str {
    "AddConstant"
  }

  fn apply(&self, series: &TimeSeries) -> Result<TimeSeries, TransformError> {
    Ok(series.iter().map(|(ts, v)| (*ts, v + self.constant)).collect())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiplyConstant {
  pub constant: f64,
}

impl Transform for MultiplyConstant {
  fn name(&self) -> &'static str {
    "MultiplyConstant"
  }

  fn apply(&self, series: &TimeSeries) -> Result<TimeSeries, TransformError> {
    Ok(series.iter().map(|(ts, v)| (*ts, v * self.constant)).collect())
  }
}

/// Replace the series with fixed values spaced `step_minutes` apart.
///
/// The values start at `start`, or at the first timestamp of the input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticValues {
  pub values: Vec<f64>,
  #[serde(default)]
  pub start: Option<DateTime<Utc>>,
  #[serde(default = "default_step_minutes")]
  pub step_minutes: i64,
}

fn default_step_minutes() -> i64 {
  60
}

impl Transform for StaticValues {
  fn name(&self) -> &'static str {
    "StaticValues"
  }

  fn apply(&self, series: &TimeSeries) -> Result<TimeSeries, TransformError> {
    if self.step_minutes <= 0 {
      return Err(TransformError::invalid(self.name(), "step_minutes must be positive"));
    }
    let Some(start) = self.start.or_else(|| series.keys().next().copied()) else {
      return Ok(TimeSeries::new());
    };

    self
      .values
      .iter()
      .enumerate()
      .map(|(i, v)| -> Result<_, TransformError> {
        let minutes = i64::try_from(i)
          .ok()
          .and_then(|i| self.step_minutes.checked_mul(i))
          .ok_or_else(|| TransformError::invalid(self.name(), "step_minutes is out of range"))?;
        Ok((shifted(self.name(), start, minutes)?, *v))
      })
      .collect()
  }
}

/// A value that takes effect `offset_minute` minutes after the first timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelativeDatapoint {
  pub offset_minute: i64,
  pub offset_value: f64,
}

/// Step function of relative datapoints anchored at the start of `series`.
fn offsets_on(
  transformation: &str,
  series: &TimeSeries,
  points: &[RelativeDatapoint],
) -> Result<TimeSeries, TransformError> {
  let Some(anchor) = series.keys().next().copied() else {
    return Ok(TimeSeries::new());
  };
  points
    .iter()
    .map(|p| shifted(transformation, anchor, p.offset_minute).map(|ts| (ts, p.offset_value)))
    .collect()
}

/// Add a step function given relative to the start of the series.
///
/// Timestamps before the first offset are left unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddFromOffset {
  pub relative_datapoints: Vec<RelativeDatapoint>,
}

impl Transform for AddFromOffset {
  fn name(&self) -> &'static str {
    "AddFromOffset"
  }

  fn apply(&self, series: &TimeSeries) -> Result<TimeSeries, TransformError> {
    let offsets = offsets_on(self.name(), series, &self.relative_datapoints)?;
    Ok(
      series
        .iter()
        .map(|(ts, v)| (*ts, v + value_at(&offsets, *ts).unwrap_or(0.0)))
        .collect(),
    )
  }
}

/// Multiply by a step function given relative to the start of the series.
///
/// Timestamps before the first offset are left unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiplyFromOffset {
  pub relative_datapoints: Vec<RelativeDatapoint>,
}

impl Transform for MultiplyFromOffset {
  fn name(&self) -> &'static str {
    "MultiplyFromOffset"
  }

  fn apply(&self, series: &TimeSeries) -> Result<TimeSeries, TransformError> {
    let offsets = offsets_on(self.name(), series, &self.relative_datapoints)?;
    Ok(
      series
        .iter()
        .map(|(ts, v)| (*ts, v * value_at(&offsets, *ts).unwrap_or(1.0)))
        .collect(),
    )
  }
}

/// Convert reservoir level to volume through the reservoir's volume curve.
///
/// `heights` must be strictly increasing. Levels outside the curve are
/// clamped to its ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeightToVolume {
  pub heights: Vec<f64>,
  pub volumes: Vec<f64>,
}

impl HeightToVolume {
  fn validate(&self) -> Result<(), TransformError> {
    if self.heights.is_empty() || self.heights.len() != self.volumes.len() {
      return Err(TransformError::invalid(
        self.name(),
        "heights and volumes must be non-empty and of equal length",
      ));
    }
    if self.heights.windows(2).any(|w| w[0] >= w[1]) {
      return Err(TransformError::invalid(self.name(), "heights must be strictly increasing"));
    }
    Ok(())
  }

  fn interpolate(&self, height: f64) -> f64 {
    let last = self.heights.len() - 1;
    if height <= self.heights[0] {
      return self.volumes[0];
    }
    if height >= self.heights[last] {
      return self.volumes[last];
    }
    let upper = self.heights.partition_point(|h| *h < height);
    let (h0, h1) = (self.heights[upper - 1], self.heights[upper]);
    let (v0, v1) = (self.volumes[upper - 1], self.volumes[upper]);
    v0 + (height - h0) * (v1 - v0) / (h1 - h0)
  }
}

impl Transform for HeightToVolume {
  fn name(&self) -> &'static str {
    "HeightToVolume"
  }

  fn apply(&self, series: &TimeSeries) -> Result<TimeSeries, TransformError> {
    self.validate()?;
    Ok(series.iter().map(|(ts, h)| (*ts, self.interpolate(*h))).collect())
  }
}

/// Water released upstream that has not yet reached the downstream reservoir.
///
/// Each output point lies `time_delay_minutes` after an input point and sums
/// the discharge in effect `lag` minutes earlier, weighted by `shape[lag]`.
/// The default shape `{0: 1.0}` is a pure shift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterInTransit {
  #[serde(default)]
  pub time_delay_minutes: i64,
  #[serde(default = "default_shape")]
  pub shape: BTreeMap<i64, f64>,
}

fn default_shape() -> BTreeMap<i64, f64> {
  BTreeMap::from([(0, 1.0)])
}

impl Transform for WaterInTransit {
  fn name(&self) -> &'static str {
    "WaterInTransit"
  }

  fn apply(&self, series: &TimeSeries) -> Result<TimeSeries, TransformError> {
    if self.shape.keys().any(|lag| *lag < 0) {
      return Err(TransformError::invalid(self.name(), "shape lags must not be negative"));
    }
    series
      .keys()
      .map(|ts| -> Result<_, TransformError> {
        let mut value = 0.0;
        for (lag, weight) in &self.shape {
          let at = shifted(self.name(), *ts, -*lag)?;
          value += weight * value_at(series, at).unwrap_or(0.0);
        }
        Ok((shifted(self.name(), *ts, self.time_delay_minutes)?, value))
      })
      .collect()
  }
}
