use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use powerops_artifact::{FileUpload, Store as FileStore, read_to_bytes, stream_from_bytes};
use powerops_config::{AuxFile, FileKind, ShopRunRequest};
use powerops_store::{Event, EventFilter, Relationship, RelationshipFilter, ResourceType, Store as RecordStore};
use powerops_trigger::{Dispatch, TriggerResponse, dispatch_all};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::constants::{
  CASE_FILE_NAME, META_ENDTIME, META_FILE_TYPE, META_MANUAL_RUN, META_RUN_EVENT_XID, META_STARTTIME,
  META_TIMERESOLUTION, META_WATERCOURSE, OCTET_CONTENT_TYPE, PROCESS_EVENT_LABEL, RUN_EVENT_SOURCE,
  RUN_EVENT_SUBTYPE, RUN_EVENT_TYPE, RUN_EXTERNAL_ID_PREFIX, TEXT_CONTENT_TYPE, YAML_CONTENT_TYPE,
};
use crate::deprecation::warn_deprecated;
use crate::error::RunError;
use crate::results::ShopRunResultsApi;
use crate::run::ShopRun;
use crate::status::ProcessEventKind;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// A file linked to a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedFile {
  pub external_id: String,
  pub kind: FileKind,
}

/// Creates, triggers and looks up SHOP runs.
#[derive(Clone)]
pub struct ShopRunsApi {
  records: Arc<dyn RecordStore>,
  files: Arc<dyn FileStore>,
  dispatcher: Arc<dyn Dispatch>,
  poll_interval: Duration,
}

impl ShopRunsApi {
  pub fn new(records: Arc<dyn RecordStore>, files: Arc<dyn FileStore>, dispatcher: Arc<dyn Dispatch>) -> Self {
    Self {
      records,
      files,
      dispatcher,
      poll_interval: DEFAULT_POLL_INTERVAL,
    }
  }

  /// Poll interval handed to every [`ShopRun`] this api returns.
  pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
    self.poll_interval = poll_interval;
    self
  }

  /// Upload the case and auxiliary files, then create the run event and link
  /// every file to it.
  #[instrument(skip(self, request), fields(watercourse = %request.watercourse))]
  pub async fn create(&self, request: &ShopRunRequest) -> Result<ShopRun, RunError> {
    request.validate()?;

    let run_xid = format!("{RUN_EXTERNAL_ID_PREFIX}_{}", Uuid::new_v4());
    let case = AuxFile::new(FileKind::Case, CASE_FILE_NAME, request.case.to_yaml()?);

    let mut relationships = Vec::with_capacity(request.aux_files.len() + 1);
    for file in std::iter::once(&case).chain(&request.aux_files) {
      let key = self.upload(&run_xid, file).await?;
      relationships.push(Relationship::new(
        (&run_xid, ResourceType::Event),
        (&key, ResourceType::File),
        file.kind.label(),
      ));
    }

    let mut event = Event::new(&run_xid, RUN_EVENT_TYPE)
      .with_metadata(META_WATERCOURSE, &request.watercourse)
      .with_metadata(META_STARTTIME, request.starttime.to_rfc3339())
      .with_metadata(META_ENDTIME, request.endtime.to_rfc3339())
      .with_metadata(META_MANUAL_RUN, request.manual_run.to_string());
    if let Some(resolution) = &request.time_resolution {
      event = event.with_metadata(META_TIMERESOLUTION, resolution);
    }
    event.subtype = Some(RUN_EVENT_SUBTYPE.to_string());
    event.source = Some(request.source.clone().unwrap_or_else(|| RUN_EVENT_SOURCE.to_string()));
    event.start_time = Some(request.starttime);
    event.end_time = Some(request.endtime);

    self.records.create_event(&event).await?;
    self.records.create_relationships(&relationships).await?;

    info!(run = %run_xid, files = relationships.len(), "created shop run");
    ShopRun::from_event(&event, self.records.clone(), self.poll_interval)
  }

  async fn upload(&self, run_xid: &str, file: &AuxFile) -> Result<String, RunError> {
    let key = format!("{run_xid}_{}_{}", file.kind.as_str(), file.name);
    let content_type = match file.kind {
      FileKind::Case | FileKind::YamlResult => YAML_CONTENT_TYPE,
      FileKind::Log => TEXT_CONTENT_TYPE,
      _ => OCTET_CONTENT_TYPE,
    };
    let upload = FileUpload::new(&key, &file.name, content_type)
      .with_metadata(META_RUN_EVENT_XID, run_xid)
      .with_metadata(META_FILE_TYPE, file.kind.as_str());

    self
      .files
      .put(upload, stream_from_bytes(Bytes::copy_from_slice(&file.content)))
      .await?;
    Ok(key)
  }

  pub(crate) async fn upload_and_link(&self, run: &ShopRun, files: &[AuxFile]) -> Result<Vec<String>, RunError> {
    let mut keys = Vec::with_capacity(files.len());
    let mut relationships = Vec::with_capacity(files.len());
    for file in files {
      let key = self.upload(run.external_id(), file).await?;
      relationships.push(Relationship::new(
        (run.external_id(), ResourceType::Event),
        (&key, ResourceType::File),
        file.kind.label(),
      ));
      keys.push(key);
    }
    self.records.create_relationships(&relationships).await?;
    Ok(keys)
  }

  /// Ask the compute service to execute the run. Not retried on failure.
  pub async fn trigger(&self, run: &ShopRun) -> Result<TriggerResponse, RunError> {
    Ok(self.dispatcher.dispatch(run.external_id()).await?)
  }

  /// Create a run for the request and trigger it.
  pub async fn trigger_case(&self, request: &ShopRunRequest) -> Result<ShopRun, RunError> {
    let run = self.create(request).await?;
    self.trigger(&run).await?;
    Ok(run)
  }

  /// Create a run per request, then trigger them all with bounded concurrency.
  ///
  /// The first trigger failure cancels the triggers still in flight and is
  /// returned. Runs created before the failure are left in place.
  #[instrument(skip(self, requests, cancel), fields(count = requests.len()))]
  pub async fn trigger_cases(
    &self,
    requests: &[ShopRunRequest],
    cancel: CancellationToken,
  ) -> Result<Vec<ShopRun>, RunError> {
    let mut runs = Vec::with_capacity(requests.len());
    for request in requests {
      runs.push(self.create(request).await?);
    }

    let ids = runs.iter().map(|r| r.external_id().to_string()).collect();
    dispatch_all(self.dispatcher.clone(), ids, cancel).await?;
    Ok(runs)
  }

  #[deprecated(note = "use `trigger_case`")]
  pub async fn trigger_single_casefile(&self, request: &ShopRunRequest) -> Result<ShopRun, RunError> {
    warn_deprecated("ShopRunsApi::trigger_single_casefile", "ShopRunsApi::trigger_case");
    self.trigger_case(request).await
  }

  /// Look up a run by its external id.
  pub async fn retrieve(&self, external_id: &str) -> Result<ShopRun, RunError> {
    let event = match self.records.get_event(external_id).await {
      Ok(event) => event,
      Err(powerops_store::Error::NotFound(_)) => return Err(RunError::RunNotFound(external_id.to_string())),
      Err(e) => return Err(e.into()),
    };
    ShopRun::from_event(&event, self.records.clone(), self.poll_interval)
  }

  /// Most recent runs, optionally restricted to one watercourse.
  pub async fn list(&self, watercourse: Option<&str>, limit: usize) -> Result<Vec<ShopRun>, RunError> {
    let mut filter = EventFilter::event_type(RUN_EVENT_TYPE).with_limit(limit);
    if let Some(watercourse) = watercourse {
      filter = filter.with_metadata(META_WATERCOURSE, watercourse);
    }

    self
      .records
      .list_events(&filter)
      .await?
      .iter()
      .map(|event| ShopRun::from_event(event, self.records.clone(), self.poll_interval))
      .collect()
  }

  /// Record a process event for the run, as the compute service does.
  #[instrument(skip(self, run), fields(run = %run.external_id()))]
  pub async fn report_process_event(&self, run: &ShopRun, kind: ProcessEventKind) -> Result<Event, RunError> {
    let xid = format!("{}_{}", kind.event_type(), Uuid::new_v4());
    let mut event = Event::new(&xid, kind.event_type()).with_metadata(META_RUN_EVENT_XID, run.external_id());
    event.subtype = Some(RUN_EVENT_SUBTYPE.to_string());
    event.source = Some(RUN_EVENT_SOURCE.to_string());

    self.records.create_event(&event).await?;
    self
      .records
      .create_relationships(&[Relationship::new(
        (run.external_id(), ResourceType::Event),
        (&xid, ResourceType::Event),
        PROCESS_EVENT_LABEL,
      )])
      .await?;

    info!(event = %xid, kind = ?kind, "reported process event");
    Ok(event)
  }

  /// Files linked to the run, in link order.
  pub async fn linked_files(&self, run: &ShopRun) -> Result<Vec<LinkedFile>, RunError> {
    let relationships = self
      .records
      .list_relationships(run.external_id(), &RelationshipFilter::targets(ResourceType::File))
      .await?;

    Ok(
      relationships
        .into_iter()
        .filter_map(|r| {
          let kind = r.labels.0.iter().find_map(|l| FileKind::from_label(l))?;
          Some(LinkedFile {
            external_id: r.target_external_id,
            kind,
          })
        })
        .collect(),
    )
  }

  /// Download the case document uploaded for the run.
  pub async fn download_case(&self, run: &ShopRun) -> Result<Bytes, RunError> {
    let case = self
      .linked_files(run)
      .await?
      .into_iter()
      .find(|f| f.kind == FileKind::Case)
      .ok_or_else(|| RunError::FileNotFound {
        run: run.external_id().to_string(),
        kind: FileKind::Case.as_str(),
      })?;

    Ok(read_to_bytes(self.files.get(&case.external_id).await?).await?)
  }

  /// Result access for runs created through this api.
  pub fn results(&self) -> ShopRunResultsApi {
    ShopRunResultsApi::new(self.clone())
  }

  pub(crate) fn records(&self) -> &Arc<dyn RecordStore> {
    &self.records
  }

  pub(crate) fn files(&self) -> &Arc<dyn FileStore> {
    &self.files
  }
}
