//! PowerOps Transform
//!
//! Transformations turn a raw time series into the values a SHOP case
//! expects: unit conversions, static overrides, offsets relative to the
//! start of the optimisation window, reservoir level to volume, and water
//! still travelling between plants.
//!
//! Transformations are usually configured as data:
//!
//! ```yaml
//! - transformation: MultiplyConstant
//!   kwargs: {constant: 3.6}
//! - transformation: AddFromOffset
//!   kwargs:
//!     relative_datapoints:
//!       - {offset_minute: 0, offset_value: 10}
//!       - {offset_minute: 60, offset_value: 0}
//! ```
//!
//! [`TransformationRegistry`] maps each `transformation` tag to a
//! constructor that reads its `kwargs`.

mod error;
mod pipeline;
mod registry;
mod series;
mod transforms;

pub use error::TransformError;
pub use pipeline::{Pipeline, TransformationSpec};
pub use registry::{TransformationRegistry, default_registry};
pub use series::{TimeSeries, series_from_yaml, series_to_yaml};
pub use transforms::{
  AddConstant, AddFromOffset, HeightToVolume, MultiplyConstant, MultiplyFromOffset, RelativeDatapoint,
  StaticValues, Transform, WaterInTransit,
};
