//! PowerOps Runs
//!
//! The orchestration layer for SHOP runs. A run is an event record on the
//! platform; its case and auxiliary files are blobs linked to it with
//! labelled relationships, and the compute service reports progress by
//! linking process events back to it.
//!
//! ```text
//! ShopRunsApi::create ─► upload files ─► run event ─► relationships
//!        │
//!        ▼
//! ShopRunsApi::trigger ─► compute service ─► STARTED / FINISHED / FAILED events
//!                                                   │
//!                   ShopRun::status ◄───────────────┘
//!                          │ (terminal)
//!                          ▼
//!              ShopRunResultsApi::retrieve ─► logs, YAML, objective function
//! ```

mod api;
pub mod constants;
mod deprecation;
mod error;
mod results;
mod run;
mod status;

pub use api::{LinkedFile, ShopRunsApi};
pub use deprecation::{has_warned, warn_deprecated};
pub use error::RunError;
pub use results::{
  LogFile, ObjectiveFunction, PenaltyBreakdown, ResultFile, ShopRunResult, ShopRunResultsApi,
  YamlFile, classify_file_name,
};
pub use run::ShopRun;
pub use status::{ProcessEventKind, ShopRunStatus, classify_status};
