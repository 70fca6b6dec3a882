//! PowerOps Trigger
//!
//! Tells the external compute service to pick up a run. The service reads
//! the run's case and auxiliary files itself; all we send is the run's event
//! external id (plus the SHOP version in standard mode).
//!
//! - [`TriggerClient`] sends one HTTP POST per run and fails fast on any
//!   non-2xx answer. There is no retry.
//! - [`run_bounded`] fans work out over a fixed number of concurrent tasks
//!   and cancels whatever is still in flight on the first failure.

mod client;
mod error;
mod fanout;

pub use client::{Dispatch, TriggerClient, TriggerConfig, TriggerResponse};
pub use error::TriggerError;
pub use fanout::{DEFAULT_CONCURRENCY, dispatch_all, run_bounded};
