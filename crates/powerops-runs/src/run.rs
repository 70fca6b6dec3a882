use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use powerops_config::parse_timestamp;
use powerops_store::{Event, RelationshipFilter, ResourceType, Store as RecordStore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::constants::{
  META_ENDTIME, META_MANUAL_RUN, META_STARTTIME, META_TIMERESOLUTION, META_WATERCOURSE,
  PROCESS_EVENT_LABEL, RUN_EVENT_TYPE,
};
use crate::error::RunError;
use crate::status::{ProcessEventKind, ShopRunStatus, classify_status};

/// Handle to one SHOP run.
///
/// The status is derived from the process events linked to the run and is
/// re-queried on every [`ShopRun::status`] call until it turns terminal.
/// From then on the terminal value is kept in the handle.
#[derive(Clone)]
pub struct ShopRun {
  external_id: String,
  watercourse: String,
  starttime: DateTime<Utc>,
  endtime: DateTime<Utc>,
  time_resolution: Option<String>,
  manual_run: bool,
  source: Option<String>,
  created_time: DateTime<Utc>,
  records: Arc<dyn RecordStore>,
  poll_interval: Duration,
  terminal: OnceLock<ShopRunStatus>,
}

impl ShopRun {
  /// Build a handle from a run event.
  pub fn from_event(event: &Event, records: Arc<dyn RecordStore>, poll_interval: Duration) -> Result<Self, RunError> {
    let invalid = |message: String| RunError::InvalidRun {
      run: event.external_id.clone(),
      message,
    };

    if event.event_type != RUN_EVENT_TYPE {
      return Err(invalid(format!("event type is {}", event.event_type)));
    }

    let watercourse = event
      .metadata(META_WATERCOURSE)
      .ok_or_else(|| invalid(format!("missing {META_WATERCOURSE}")))?
      .to_string();
    let starttime = event
      .start_time
      .or_else(|| event.metadata(META_STARTTIME).and_then(parse_timestamp))
      .ok_or_else(|| invalid("missing start time".to_string()))?;
    let endtime = event
      .end_time
      .or_else(|| event.metadata(META_ENDTIME).and_then(parse_timestamp))
      .ok_or_else(|| invalid("missing end time".to_string()))?;

    Ok(Self {
      external_id: event.external_id.clone(),
      watercourse,
      starttime,
      endtime,
      time_resolution: event.metadata(META_TIMERESOLUTION).map(str::to_string),
      manual_run: event.metadata(META_MANUAL_RUN) == Some("true"),
      source: event.source.clone(),
      created_time: event.created_time,
      records,
      poll_interval,
      terminal: OnceLock::new(),
    })
  }

  pub fn external_id(&self) -> &str {
    &self.external_id
  }

  pub fn watercourse(&self) -> &str {
    &self.watercourse
  }

  pub fn starttime(&self) -> DateTime<Utc> {
    self.starttime
  }

  pub fn endtime(&self) -> DateTime<Utc> {
    self.endtime
  }

  pub fn time_resolution(&self) -> Option<&str> {
    self.time_resolution.as_deref()
  }

  pub fn manual_run(&self) -> bool {
    self.manual_run
  }

  pub fn source(&self) -> Option<&str> {
    self.source.as_deref()
  }

  pub fn created_time(&self) -> DateTime<Utc> {
    self.created_time
  }

  pub fn poll_interval(&self) -> Duration {
    self.poll_interval
  }

  pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
    self.poll_interval = poll_interval;
    self
  }

  /// Distinct kinds of process events linked to this run.
  ///
  /// Linked events with an unknown type are ignored.
  pub async fn process_events(&self) -> Result<HashSet<ProcessEventKind>, RunError> {
    let filter = RelationshipFilter::targets(ResourceType::Event).with_label(PROCESS_EVENT_LABEL);
    let ids: Vec<String> = self
      .records
      .list_relationships(&self.external_id, &filter)
      .await?
      .into_iter()
      .map(|r| r.target_external_id)
      .collect();

    if ids.is_empty() {
      return Ok(HashSet::new());
    }

    let events = self.records.get_events(&ids).await?;
    let kinds = events
      .iter()
      .filter_map(|event| {
        let kind = ProcessEventKind::from_event_type(&event.event_type);
        if kind.is_none() {
          debug!(
            run = %self.external_id,
            event = %event.external_id,
            event_type = %event.event_type,
            "ignoring linked event with unknown type"
          );
        }
        kind
      })
      .collect();
    Ok(kinds)
  }

  /// Current status of the run.
  pub async fn status(&self) -> Result<ShopRunStatus, RunError> {
    if let Some(status) = self.terminal.get() {
      return Ok(*status);
    }

    let status = classify_status(&self.process_events().await?);
    if status.is_terminal() {
      let _ = self.terminal.set(status);
    }
    Ok(status)
  }

  /// Poll until the run reaches a terminal status.
  ///
  /// Sleeps [`ShopRun::poll_interval`] between polls. Fails with
  /// [`RunError::Timeout`] once `timeout` has elapsed and with
  /// [`RunError::Cancelled`] when `cancel` fires.
  #[instrument(skip(self, cancel), fields(run = %self.external_id))]
  pub async fn wait_until_complete(
    &self,
    timeout: Duration,
    cancel: &CancellationToken,
  ) -> Result<ShopRunStatus, RunError> {
    // No deadline when the timeout does not fit in an `Instant`.
    let deadline = Instant::now().checked_add(timeout);

    loop {
      let status = self.status().await?;
      if status.is_terminal() {
        info!(status = %status, "run completed");
        return Ok(status);
      }

      let mut nap = self.poll_interval;
      if let Some(deadline) = deadline {
        let now = Instant::now();
        if now >= deadline {
          return Err(RunError::Timeout {
            run: self.external_id.clone(),
            timeout,
          });
        }
        nap = nap.min(deadline - now);
      }

      debug!(?nap, "run in progress");
      tokio::select! {
        _ = cancel.cancelled() => {
          return Err(RunError::Cancelled {
            run: self.external_id.clone(),
          });
        }
        _ = tokio::time::sleep(nap) => {}
      }
    }
  }
}

impl fmt::Debug for ShopRun {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ShopRun")
      .field("external_id", &self.external_id)
      .field("watercourse", &self.watercourse)
      .field("starttime", &self.starttime)
      .field("endtime", &self.endtime)
      .field("manual_run", &self.manual_run)
      .field("terminal", &self.terminal.get())
      .finish_non_exhaustive()
  }
}
