//! End-to-end run orchestration against in-memory SQLite and a temp-dir blob store.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use powerops_artifact::FsStore;
use powerops_config::{AuxFile, FileKind, ShopCase, ShopRunRequest};
use powerops_runs::{
  ObjectiveFunction, PenaltyBreakdown, ProcessEventKind, RunError, ShopRunStatus, ShopRunsApi, has_warned,
};
use powerops_runs::constants::{META_PENALTY_BREAKDOWN, OBJECTIVE_SEQUENCE_LABEL};
use powerops_store::{Relationship, ResourceType, Sequence, SqliteStore, Store, ValueType};
use powerops_trigger::{Dispatch, TriggerError, TriggerResponse};
use serde_json::json;
use tokio_util::sync::CancellationToken;

const CASE: &str = r#"time:
  starttime: 2022-05-22 00:00:00
  endtime: 2022-05-29 00:00:00
  timeunit: hour
  timeresolution:
    2022-05-22 00:00:00: 60
model:
  reservoir:
    Reservoir1:
      max_vol: 39.0
      lrl: 860.0
"#;

#[derive(Default)]
struct RecordingDispatch {
  runs: Mutex<Vec<String>>,
  fail: bool,
}

#[async_trait]
impl Dispatch for RecordingDispatch {
  async fn dispatch(&self, run_external_id: &str) -> Result<TriggerResponse, TriggerError> {
    if self.fail {
      return Err(TriggerError::Status {
        run: run_external_id.to_string(),
        status: 500,
        body: "service unavailable".to_string(),
      });
    }
    self.runs.lock().unwrap().push(run_external_id.to_string());
    Ok(TriggerResponse {
      run: run_external_id.to_string(),
      status: 200,
      body: json!({"accepted": true}),
    })
  }
}

struct Harness {
  api: ShopRunsApi,
  records: Arc<SqliteStore>,
  dispatcher: Arc<RecordingDispatch>,
  _dir: tempfile::TempDir,
}

async fn harness_with(dispatcher: RecordingDispatch) -> Harness {
  let dir = tempfile::tempdir().unwrap();
  let records = Arc::new(SqliteStore::in_memory().await.unwrap());
  let files = Arc::new(FsStore::new(dir.path()));
  let dispatcher = Arc::new(dispatcher);
  let api = ShopRunsApi::new(records.clone(), files, dispatcher.clone()).with_poll_interval(Duration::from_millis(10));
  Harness {
    api,
    records,
    dispatcher,
    _dir: dir,
  }
}

async fn harness() -> Harness {
  harness_with(RecordingDispatch::default()).await
}

/// Store a `key`/`value` sequence and link it to `run` under `label`.
async fn link_sequence(h: &Harness, run: &str, external_id: &str, name: &str, label: &str, rows: &[(&str, f64)]) {
  link_sequence_with(h, run, Sequence::new(external_id, name), label, rows).await;
}

async fn link_sequence_with(h: &Harness, run: &str, sequence: Sequence, label: &str, rows: &[(&str, f64)]) {
  let mut sequence = sequence
    .with_column("key", ValueType::String)
    .with_column("value", ValueType::Double);
  for (key, value) in rows {
    sequence.push_row(vec![json!(key), json!(value)]);
  }
  h.records.create_sequence(&sequence).await.unwrap();
  h.records
    .create_relationships(&[Relationship::new(
      (run, ResourceType::Event),
      (&sequence.external_id, ResourceType::Sequence),
      label,
    )])
    .await
    .unwrap();
}

fn request(watercourse: &str) -> ShopRunRequest {
  ShopRunRequest::new(watercourse, ShopCase::from_yaml_str(CASE).unwrap()).unwrap()
}

#[tokio::test]
async fn create_links_files_and_round_trips_case() {
  let h = harness().await;
  let request = request("Lyse").with_file(AuxFile::new(FileKind::Cut, "cuts.txt", b"cut 1\ncut 2\n".to_vec()));

  let run = h.api.create(&request).await.unwrap();
  assert!(run.external_id().starts_with("POWEROPS_SHOP_RUN_"));
  assert_eq!(run.watercourse(), "Lyse");
  assert!(run.manual_run());
  assert_eq!(run.starttime(), request.starttime);

  let kinds: Vec<FileKind> = h.api.linked_files(&run).await.unwrap().into_iter().map(|f| f.kind).collect();
  assert_eq!(kinds.len(), 2);
  assert!(kinds.contains(&FileKind::Case));
  assert!(kinds.contains(&FileKind::Cut));

  let case = h.api.download_case(&run).await.unwrap();
  assert_eq!(case.as_ref(), request.case.to_yaml().unwrap().as_bytes());

  let again = h.api.retrieve(run.external_id()).await.unwrap();
  assert_eq!(again.watercourse(), "Lyse");
  assert_eq!(again.endtime(), request.endtime);
  assert!(again.time_resolution().is_some());

  // Nothing is sent to the compute service until the run is triggered.
  assert!(h.dispatcher.runs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn status_follows_process_events() {
  let h = harness().await;
  let run = h.api.trigger_case(&request("Lyse")).await.unwrap();
  assert_eq!(*h.dispatcher.runs.lock().unwrap(), vec![run.external_id().to_string()]);

  assert_eq!(run.status().await.unwrap(), ShopRunStatus::InProgress);

  h.api.report_process_event(&run, ProcessEventKind::Started).await.unwrap();
  assert_eq!(run.status().await.unwrap(), ShopRunStatus::InProgress);
  assert_eq!(run.status().await.unwrap(), ShopRunStatus::InProgress);

  h.api.report_process_event(&run, ProcessEventKind::Finished).await.unwrap();
  assert_eq!(run.status().await.unwrap(), ShopRunStatus::Succeeded);
}

#[tokio::test]
async fn started_then_failed_is_failed() {
  let h = harness().await;
  let run = h.api.create(&request("Lyse")).await.unwrap();

  h.api.report_process_event(&run, ProcessEventKind::Started).await.unwrap();
  h.api.report_process_event(&run, ProcessEventKind::Failed).await.unwrap();
  assert_eq!(run.status().await.unwrap(), ShopRunStatus::Failed);
}

#[tokio::test]
async fn terminal_status_is_kept_by_the_handle() {
  let h = harness().await;
  let run = h.api.create(&request("Lyse")).await.unwrap();

  h.api.report_process_event(&run, ProcessEventKind::Failed).await.unwrap();
  assert_eq!(run.status().await.unwrap(), ShopRunStatus::Failed);

  h.api.report_process_event(&run, ProcessEventKind::Finished).await.unwrap();
  assert_eq!(run.status().await.unwrap(), ShopRunStatus::Failed);

  // A fresh handle re-queries and FINISHED takes precedence.
  let fresh = h.api.retrieve(run.external_id()).await.unwrap();
  assert_eq!(fresh.status().await.unwrap(), ShopRunStatus::Succeeded);
}

#[tokio::test]
async fn wait_until_complete_returns_terminal_status() {
  let h = harness().await;
  let run = h.api.create(&request("Lyse")).await.unwrap();

  let api = h.api.clone();
  let reporter = run.clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(50)).await;
    api.report_process_event(&reporter, ProcessEventKind::Finished).await.unwrap();
  });

  let status = run
    .wait_until_complete(Duration::from_secs(5), &CancellationToken::new())
    .await
    .unwrap();
  assert_eq!(status, ShopRunStatus::Succeeded);
}

#[tokio::test]
async fn wait_until_complete_times_out() {
  let h = harness().await;
  let run = h.api.create(&request("Lyse")).await.unwrap();
  h.api.report_process_event(&run, ProcessEventKind::Started).await.unwrap();

  let err = run
    .wait_until_complete(Duration::from_millis(40), &CancellationToken::new())
    .await
    .unwrap_err();
  assert!(matches!(err, RunError::Timeout { .. }), "{err}");
}

#[tokio::test]
async fn wait_until_complete_can_be_cancelled() {
  let h = harness().await;
  let run = h.api.create(&request("Lyse")).await.unwrap().with_poll_interval(Duration::from_secs(60));

  let cancel = CancellationToken::new();
  let trigger = cancel.clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(20)).await;
    trigger.cancel();
  });

  let err = run.wait_until_complete(Duration::from_secs(120), &cancel).await.unwrap_err();
  assert!(matches!(err, RunError::Cancelled { .. }), "{err}");
}

#[tokio::test]
async fn trigger_cases_dispatches_every_run() {
  let h = harness().await;
  let requests: Vec<ShopRunRequest> = (0..7).map(|i| request(&format!("wc{i}"))).collect();

  let runs = h.api.trigger_cases(&requests, CancellationToken::new()).await.unwrap();
  assert_eq!(runs.len(), 7);

  let mut dispatched = h.dispatcher.runs.lock().unwrap().clone();
  let mut expected: Vec<String> = runs.iter().map(|r| r.external_id().to_string()).collect();
  dispatched.sort();
  expected.sort();
  assert_eq!(dispatched, expected);
}

#[tokio::test]
async fn trigger_failure_is_returned() {
  let h = harness_with(RecordingDispatch {
    fail: true,
    ..RecordingDispatch::default()
  })
  .await;

  let err = h.api.trigger_case(&request("Lyse")).await.unwrap_err();
  assert!(matches!(err, RunError::Trigger(TriggerError::Status { status: 500, .. })), "{err}");

  let requests = vec![request("a"), request("b")];
  let err = h.api.trigger_cases(&requests, CancellationToken::new()).await.unwrap_err();
  assert!(matches!(err, RunError::Trigger(_)), "{err}");
}

#[tokio::test]
#[allow(deprecated)]
async fn deprecated_alias_still_triggers() {
  let h = harness().await;
  let run = h.api.trigger_single_casefile(&request("Lyse")).await.unwrap();
  assert_eq!(h.dispatcher.runs.lock().unwrap().len(), 1);
  assert!(has_warned("ShopRunsApi::trigger_single_casefile"));

  h.api.trigger_single_casefile(&request("Lyse")).await.unwrap();
  assert_eq!(h.dispatcher.runs.lock().unwrap().len(), 2);
  assert!(run.external_id().starts_with("POWEROPS_SHOP_RUN_"));
}

#[tokio::test]
async fn retrieve_unknown_run_is_not_found() {
  let h = harness().await;
  let err = h.api.retrieve("POWEROPS_SHOP_RUN_missing").await.unwrap_err();
  assert!(matches!(err, RunError::RunNotFound(ref id) if id == "POWEROPS_SHOP_RUN_missing"));
}

#[tokio::test]
async fn list_filters_by_watercourse() {
  let h = harness().await;
  h.api.create(&request("Lyse")).await.unwrap();
  h.api.create(&request("Lyse")).await.unwrap();
  h.api.create(&request("Glomma")).await.unwrap();

  assert_eq!(h.api.list(Some("Lyse"), 10).await.unwrap().len(), 2);
  assert_eq!(h.api.list(None, 10).await.unwrap().len(), 3);
  assert_eq!(h.api.list(None, 1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn results_require_a_completed_run() {
  let h = harness().await;
  let run = h.api.create(&request("Lyse")).await.unwrap();

  let err = h.api.results().retrieve(&run).await.unwrap_err();
  assert!(matches!(err, RunError::RunNotComplete { .. }), "{err}");
}

#[tokio::test]
async fn results_are_classified_by_file_name() {
  let h = harness().await;
  let results = h.api.results();
  let run = h.api.create(&request("Lyse")).await.unwrap();

  let objective = ObjectiveFunction::new(
    format!("{}_objective", run.external_id()),
    BTreeMap::from([("grand_total".to_string(), -1500.0), ("rsv_end_value".to_string(), 320.5)]),
  )
  .with_penalty_breakdown(PenaltyBreakdown {
    major: BTreeMap::from([("reservoir".to_string(), json!(12.0))]),
    ..PenaltyBreakdown::default()
  });
  let files = vec![
    AuxFile::new(FileKind::Log, "cplex.log", b"Optimal solution found".to_vec()),
    AuxFile::new(FileKind::Log, "shop_messages.log", b"Reading case".to_vec()),
    AuxFile::new(FileKind::YamlResult, "result.yaml", b"model:\n  reservoir: {}\n".to_vec()),
    AuxFile::new(FileKind::Log, "notes.txt", b"ignored".to_vec()),
  ];
  results.attach_results(&run, &files, Some(&objective)).await.unwrap();
  h.api.report_process_event(&run, ProcessEventKind::Finished).await.unwrap();

  let result = results.retrieve(&run).await.unwrap();
  assert_eq!(result.run, run.external_id());
  assert_eq!(result.cplex_log.unwrap().content, "Optimal solution found");
  assert_eq!(result.messages_log.unwrap().name, "shop_messages.log");
  assert!(result.yaml.unwrap().data.get("model").is_some());

  let objective = result.objective_function;
  assert_eq!(objective.data["grand_total"], -1500.0);
  assert_eq!(objective.data.len(), 2);
  assert_eq!(objective.watercourse.as_deref(), Some("Lyse"));
  assert_eq!(objective.penalty_breakdown.major["reservoir"], json!(12.0));
}

#[tokio::test]
async fn results_without_files_have_empty_slots() {
  let h = harness().await;
  let results = h.api.results();
  let run = h.api.create(&request("Lyse")).await.unwrap();
  h.api.report_process_event(&run, ProcessEventKind::Failed).await.unwrap();

  let err = results.retrieve(&run).await.unwrap_err();
  assert!(matches!(err, RunError::ObjectiveFunctionNotFound { .. }), "{err}");

  let objective = ObjectiveFunction::new("objective", BTreeMap::new());
  results.attach_results(&run, &[], Some(&objective)).await.unwrap();

  let result = results.retrieve(&run).await.unwrap();
  assert!(result.cplex_log.is_none());
  assert!(result.messages_log.is_none());
  assert!(result.yaml.is_none());
  assert!(result.objective_function.data.is_empty());
}

#[tokio::test]
async fn attach_results_rejects_input_files() {
  let h = harness().await;
  let run = h.api.create(&request("Lyse")).await.unwrap();

  let files = vec![AuxFile::new(FileKind::Cut, "cuts.txt", b"cut".to_vec())];
  let err = h.api.results().attach_results(&run, &files, None).await.unwrap_err();
  assert!(matches!(err, RunError::InvalidResult { .. }), "{err}");
}

#[tokio::test]
async fn objective_is_picked_by_name_among_linked_sequences() {
  let h = harness().await;
  let results = h.api.results();
  let run = h.api.create(&request("Lyse")).await.unwrap();
  let xid = run.external_id().to_string();

  link_sequence(&h, &xid, "prices", "Lyse price forecast", OBJECTIVE_SEQUENCE_LABEL, &[("mean", 42.0)]).await;
  let err = results.objective_function(&run).await.unwrap_err();
  assert!(matches!(err, RunError::ObjectiveFunctionNotFound { .. }), "{err}");

  link_sequence(&h, &xid, "totals", "Lyse OBJECTIVE totals", "RESULT_SEQUENCE", &[("grand_total", -900.0)]).await;
  let objective = results.objective_function(&run).await.unwrap();
  assert_eq!(objective.external_id, "totals");
  assert_eq!(objective.data["grand_total"], -900.0);
}

#[tokio::test]
async fn wrongly_shaped_penalty_breakdown_defaults_to_empty() {
  let h = harness().await;
  let run = h.api.create(&request("Lyse")).await.unwrap();
  let xid = run.external_id().to_string();

  let sequence = Sequence::new("objective", "objective function").with_metadata(META_PENALTY_BREAKDOWN, r#"{"major": 5}"#);
  link_sequence_with(&h, &xid, sequence, OBJECTIVE_SEQUENCE_LABEL, &[("grand_total", 1.0)]).await;

  let objective = h.api.results().objective_function(&run).await.unwrap();
  assert!(objective.penalty_breakdown.is_empty());
  assert_eq!(objective.data["grand_total"], 1.0);
}

#[tokio::test]
async fn wait_with_unbounded_timeout_returns_finished_run() {
  let h = harness().await;
  let run = h.api.create(&request("Lyse")).await.unwrap();
  h.api.report_process_event(&run, ProcessEventKind::Finished).await.unwrap();

  let status = run
    .wait_until_complete(Duration::MAX, &CancellationToken::new())
    .await
    .unwrap();
  assert_eq!(status, ShopRunStatus::Succeeded);
}
