//! Timestamp parsing for case files and result documents.
//!
//! SHOP writes naive timestamps (`2022-05-22 00:00:00`); the platform uses
//! RFC 3339. Naive values are read as UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

const NAIVE_FORMATS: [&str; 4] = [
  "%Y-%m-%d %H:%M:%S",
  "%Y-%m-%dT%H:%M:%S",
  "%Y-%m-%d %H:%M:%S%.f",
  "%Y-%m-%dT%H:%M:%S%.f",
];

/// Parse a timestamp in any of the formats seen in case and result files.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
  let value = value.trim();
  if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
    return Some(ts.with_timezone(&Utc));
  }
  for format in NAIVE_FORMATS {
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
      return Some(naive.and_utc());
    }
  }
  NaiveDate::parse_from_str(value, "%Y-%m-%d")
    .ok()
    .and_then(|d| d.and_hms_opt(0, 0, 0))
    .map(|naive| naive.and_utc())
}
