//! PowerOps Config
//!
//! This crate contains the serializable configuration types shared by the
//! PowerOps crates:
//!
//! - [`Settings`]: project, compute service location and polling behaviour,
//!   loaded from a JSON or YAML file with `POWEROPS_*` environment overrides
//! - [`ShopCase`] and [`ShopRunRequest`]: what a caller submits to start a run
//! - [`FileKind`]: the kinds of files that can be linked to a run
//!
//! Nothing in here performs network or storage I/O beyond reading the
//! settings and case files from disk.

mod case;
mod enums;
mod error;
mod settings;
mod time;

pub use case::{AuxFile, ShopCase, ShopRunRequest};
pub use enums::{FileKind, TriggerMode};
pub use error::ConfigError;
pub use settings::{ENV_PREFIX, Settings};
pub use time::parse_timestamp;
