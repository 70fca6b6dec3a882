use powerops_compare::{ValueShape, compare_yaml};

const RESULT_A: &str = r#"
model:
  reservoir:
    Reservoir1:
      max_vol: 12.5
      head:
        '2022-05-22 00:00:00': 100
        '2022-05-22 01:00:00': 101
  plant:
    Plant1:
      outlet_line: 10
      gen_names: [G1, G2]
"#;

#[test]
fn identical_documents_produce_no_changes() {
  let cmp = compare_yaml(RESULT_A, RESULT_A, "run_a.yaml", "run_b.yaml").unwrap();
  assert!(cmp.diff.is_empty());
  assert!(!cmp.report.contains("Items that are both"));
  assert!(!cmp.report.contains("Items in A which are not in B"));
  assert!(!cmp.report.contains("Items in B which are not in A"));
}

#[test]
fn added_reservoir_is_reported_under_b() {
  let b = RESULT_A.replace(
    "  plant:",
    "    Reservoir2:\n      inflow:\n        '2022-05-22 00:00:00': 5.0\n        '2022-05-22 01:00:00': 6.0\n  plant:",
  );
  let cmp = compare_yaml(RESULT_A, &b, "a", "b").unwrap();

  assert_eq!(cmp.diff.added.len(), 1);
  assert_eq!(cmp.diff.added[0].path.to_string(), "model.reservoir.Reservoir2");
  assert!(cmp.diff.removed.is_empty());
  assert!(cmp.diff.changed.is_empty());
  assert!(cmp.report.contains("## Items in B which are not in A"));
  assert!(cmp.report.contains("model.reservoir.Reservoir2"));
}

#[test]
fn added_series_under_existing_mapping_is_a_time_series() {
  let b = RESULT_A.replace(
    "  plant:",
    "      inflow:\n        '2022-05-22 00:00:00': 5.0\n        '2022-05-22 01:00:00': 6.0\n  plant:",
  );
  let cmp = compare_yaml(RESULT_A, &b, "a", "b").unwrap();

  assert_eq!(cmp.diff.added.len(), 1);
  assert_eq!(cmp.diff.added[0].shape, ValueShape::TimeSeries);
  assert_eq!(cmp.diff.added[0].path.to_string(), "model.reservoir.Reservoir1.inflow");
  assert!(cmp.report.contains("model.reservoir.Reservoir1.inflow"));
}

#[test]
fn integer_and_float_are_equal() {
  let b = RESULT_A.replace("outlet_line: 10", "outlet_line: 10.0");
  let cmp = compare_yaml(RESULT_A, &b, "a", "b").unwrap();
  assert!(cmp.diff.is_empty());
}

#[test]
fn changes_are_grouped_by_shape() {
  let b = RESULT_A
    .replace("max_vol: 12.5", "max_vol: 13")
    .replace("'2022-05-22 01:00:00': 101", "'2022-05-22 01:00:00': 99")
    .replace("[G1, G2]", "[G1, G3]");
  let cmp = compare_yaml(RESULT_A, &b, "a", "b").unwrap();

  let shapes: Vec<ValueShape> = cmp.diff.changed.iter().map(|e| e.shape).collect();
  assert!(shapes.contains(&ValueShape::Value));
  assert!(shapes.contains(&ValueShape::TimeSeries));
  assert!(shapes.contains(&ValueShape::List));
  assert!(cmp.report.contains("### Values"));
  assert!(cmp.report.contains("### Lists"));
  assert!(cmp.report.contains("### Time series"));
  assert!(cmp.report.contains("model.reservoir.Reservoir1.head"));
}

#[test]
fn invalid_yaml_is_an_error() {
  assert!(compare_yaml("a: [1,", "a: 1", "a", "b").is_err());
}
