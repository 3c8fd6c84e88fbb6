//! # Contracts
//!
//! Shared data structures and traits for the retiming workspace.
//! Every other crate depends on this one; it depends on none of them.
//!
//! ## Time Model
//! - Capture timestamps are seconds (f64) on the source clock
//! - `frame_number` values are for ordering/diagnostics only
//!
//! ## Units
//! - Translations are millimetres by convention; nothing here depends on it
//! - Rotations are radians

mod axis;
mod config;
mod error;
mod frame;
mod frame_source;
mod name;
mod snapshot;
mod transform;

pub use axis::{AxisDirection, AxisMapping, AxisMappingError};
pub use config::*;
pub use error::*;
pub use frame::*;
pub use frame_source::{EventCallback, FrameSource};
pub use name::{Name, SegmentId};
pub use snapshot::*;
pub use transform::{slerp, RotationRepresentation, RotationValue, Transform};
