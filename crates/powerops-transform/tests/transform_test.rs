use powerops_transform::{Pipeline, TransformError, TransformationSpec, series_from_yaml};
use serde_json::json;

const INFLOW: &str = r#"
'2022-05-22 00:00:00': 10
'2022-05-22 01:00:00': 12
'2022-05-22 02:00:00': 14
"#;

#[test]
fn pipeline_applies_steps_in_order() {
  let pipeline = Pipeline::from_yaml(
    r#"
- transformation: MultiplyConstant
  kwargs: {constant: 2}
- transformation: AddConstant
  kwargs: {constant: 1}
- transformation: AddFromOffset
  kwargs:
    relative_datapoints:
      - {offset_minute: 120, offset_value: 100}
"#,
  )
  .unwrap();
  assert_eq!(pipeline.len(), 3);

  let out = pipeline.apply(&series_from_yaml(INFLOW).unwrap()).unwrap();
  let values: Vec<f64> = out.values().copied().collect();
  assert_eq!(values, vec![21.0, 25.0, 129.0]);
}

#[test]
fn spec_round_trips_through_json() {
  let spec = TransformationSpec::new("HeightToVolume", json!({"heights": [0.0, 10.0], "volumes": [0.0, 5.0]}));
  let encoded = serde_json::to_string(&spec).unwrap();
  let decoded: TransformationSpec = serde_json::from_str(&encoded).unwrap();
  assert_eq!(decoded, spec);

  let transform = decoded.build().unwrap();
  let out = transform.apply(&series_from_yaml("{'2022-05-22 00:00:00': 4}").unwrap()).unwrap();
  assert_eq!(out.values().next().copied(), Some(2.0));
}

#[test]
fn unknown_transformation_fails_pipeline() {
  let err = Pipeline::from_yaml("- transformation: Smooth\n").unwrap_err();
  assert!(matches!(err, TransformError::UnknownTransformation(tag) if tag == "Smooth"));
}

#[test]
fn empty_series_stays_empty() {
  let pipeline = Pipeline::from_yaml("- transformation: StaticValues\n  kwargs: {values: [1, 2]}\n").unwrap();
  let out = pipeline.apply(&Default::default()).unwrap();
  assert!(out.is_empty());
}

#[test]
fn out_of_range_offset_is_an_error() {
  let pipeline = Pipeline::from_yaml(
    r#"
- transformation: AddFromOffset
  kwargs:
    relative_datapoints:
      - {offset_minute: 9223372036854775807, offset_value: 1}
"#,
  )
  .unwrap();

  let err = pipeline.apply(&series_from_yaml(INFLOW).unwrap()).unwrap_err();
  assert!(matches!(err, TransformError::InvalidArguments { transformation, .. } if transformation == "AddFromOffset"));
}
