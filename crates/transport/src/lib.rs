//! Capture frame sources
//!
//! Implementations of `contracts::FrameSource`:
//! - `MockFrameSource`: synthetic animated skeletons
//! - `ReplayFrameSource`: JSON-lines recordings
//! - `ManualFrameSource`: events pushed by the caller

mod manual;
mod mock;
mod replay;

pub use manual::{ManualFeed, ManualFrameSource};
pub use mock::{MockFrameSource, MockSourceConfig};
pub use replay::{write_recording, ReplayConfig, ReplayFrameSource};
