//! Markdown rendering of a [`YamlDiff`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use minijinja::{Environment, context};
use serde::Serialize;
use serde_yaml::Value;

use crate::diff::{DiffEntry, YamlDiff};
use crate::error::CompareError;
use crate::shape::{ValueShape, inline, time_series_points};

const TEMPLATE_NAME: &str = "report.md";

const TEMPLATE: &str = r#"# Comparison of {{ name_a }} and {{ name_b }}

- A: `{{ name_a }}`
- B: `{{ name_b }}`
{% if identical %}

No differences found.
{% endif %}
{% if removed %}

## Items in A which are not in B

{% for item in removed %}
- `{{ item.path }}` ({{ item.shape }}): {{ item.description }}
{% endfor %}
{% endif %}
{% if added %}

## Items in B which are not in A

{% for item in added %}
- `{{ item.path }}` ({{ item.shape }}): {{ item.description }}
{% endfor %}
{% endif %}
{% if changed %}

## Items that are both in A and B but are different
{% for group in changed %}

### {{ group.title }}

{% for item in group.items %}
- `{{ item.path }}`: {{ item.description }}
{% endfor %}
{% endfor %}
{% endif %}
"#;

#[derive(Debug, Serialize)]
struct ItemView {
  path: String,
  shape: &'static str,
  description: String,
}

#[derive(Debug, Serialize)]
struct GroupView {
  title: &'static str,
  items: Vec<ItemView>,
}

/// Render the diff as a markdown report. Empty sections are left out.
pub fn render_markdown(diff: &YamlDiff, name_a: &str, name_b: &str) -> Result<String, CompareError> {
  let mut env = Environment::new();
  env.set_trim_blocks(true);
  env.set_lstrip_blocks(true);
  env.add_template(TEMPLATE_NAME, TEMPLATE)?;

  let removed: Vec<ItemView> = diff.removed.iter().map(|e| single_side(e, e.old.as_ref())).collect();
  let added: Vec<ItemView> = diff.added.iter().map(|e| single_side(e, e.new.as_ref())).collect();

  let mut groups: BTreeMap<u8, GroupView> = BTreeMap::new();
  for entry in &diff.changed {
    let (order, title) = match entry.shape {
      ValueShape::Value => (0, "Values"),
      ValueShape::List => (1, "Lists"),
      ValueShape::TimeSeries => (2, "Time series"),
    };
    groups
      .entry(order)
      .or_insert_with(|| GroupView { title, items: Vec::new() })
      .items
      .push(ItemView {
        path: entry.path.to_string(),
        shape: shape_name(entry.shape),
        description: describe_change(entry),
      });
  }
  let changed: Vec<GroupView> = groups.into_values().collect();

  let template = env.get_template(TEMPLATE_NAME)?;
  let report = template.render(context! {
    name_a,
    name_b,
    identical => diff.is_empty(),
    removed,
    added,
    changed,
  })?;
  Ok(report)
}

fn shape_name(shape: ValueShape) -> &'static str {
  match shape {
    ValueShape::Value => "value",
    ValueShape::List => "list",
    ValueShape::TimeSeries => "time series",
  }
}

fn single_side(entry: &DiffEntry, value: Option<&Value>) -> ItemView {
  let description = match (entry.shape, value) {
    (ValueShape::TimeSeries, Some(v)) => {
      let points = time_series_points(v);
      match (points.first(), points.last()) {
        (Some((first, _)), Some((last, _))) => format!("{} points from {first} to {last}", points.len()),
        _ => "empty time series".to_string(),
      }
    }
    (_, Some(v)) => inline(v),
    (_, None) => "missing".to_string(),
  };
  ItemView {
    path: entry.path.to_string(),
    shape: shape_name(entry.shape),
    description,
  }
}

fn describe_change(entry: &DiffEntry) -> String {
  let (Some(old), Some(new)) = (&entry.old, &entry.new) else {
    return "missing".to_string();
  };

  match entry.shape {
    ValueShape::Value => format!("{} → {}", inline(old), inline(new)),
    ValueShape::List => match (old, new) {
      (Value::Sequence(a), Value::Sequence(b)) if a.len() == b.len() => {
        let differing = a
          .iter()
          .zip(b)
          .filter(|(x, y)| !crate::diff::values_equal(x, y))
          .count();
        format!("{differing} of {} items differ", a.len())
      }
      (Value::Sequence(a), Value::Sequence(b)) => format!("length {} → {}", a.len(), b.len()),
      _ => format!("{} → {}", inline(old), inline(new)),
    },
    ValueShape::TimeSeries => describe_time_series(old, new),
  }
}

fn describe_time_series(old: &Value, new: &Value) -> String {
  let a: BTreeMap<DateTime<Utc>, f64> = time_series_points(old).into_iter().collect();
  let b: BTreeMap<DateTime<Utc>, f64> = time_series_points(new).into_iter().collect();

  let mut differing = 0usize;
  let mut max_abs = 0f64;
  for ts in a.keys().chain(b.keys().filter(|ts| !a.contains_key(*ts))) {
    match (a.get(ts), b.get(ts)) {
      (Some(x), Some(y)) if x == y => {}
      (Some(x), Some(y)) => {
        differing += 1;
        max_abs = max_abs.max((x - y).abs());
      }
      _ => differing += 1,
    }
  }

  format!(
    "{} → {} points, {differing} timestamps differ, max abs diff {max_abs}",
    a.len(),
    b.len()
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::diff::diff_values;

  fn yaml(s: &str) -> Value {
    serde_yaml::from_str(s).unwrap()
  }

  #[test]
  fn test_identical_report_has_no_sections() {
    let doc = yaml("{a: 1}");
    let report = render_markdown(&diff_values(&doc, &doc), "a.yaml", "b.yaml").unwrap();
    assert!(report.contains("No differences found."));
    assert!(!report.contains("## Items"));
  }

  #[test]
  fn test_changed_scalar_description() {
    let diff = diff_values(&yaml("{a: {b: 1}}"), &yaml("{a: {b: 2}}"));
    let report = render_markdown(&diff, "a", "b").unwrap();
    assert!(report.contains("## Items that are both in A and B but are different"));
    assert!(report.contains("### Values"));
    assert!(report.contains("`a.b`: 1 → 2"));
    assert!(!report.contains("## Items in A which are not in B"));
  }

  #[test]
  fn test_time_series_description() {
    let a = yaml("{ts: {'2022-05-22 00:00:00': 1, '2022-05-22 01:00:00': 2}}");
    let b = yaml("{ts: {'2022-05-22 00:00:00': 1, '2022-05-22 01:00:00': 4.5}}");
    let report = render_markdown(&diff_values(&a, &b), "a", "b").unwrap();
    assert!(report.contains("### Time series"));
    assert!(report.contains("1 timestamps differ, max abs diff 2.5"));
  }
}
