//! # Retiming Engine
//!
//! Resamples an irregular stream of skeletal capture frames to
//! caller-chosen query times.
//!
//! Responsibilities:
//! - Per-segment bounded sample history
//! - Interpolation between samples, bounded prediction past the newest one
//! - Hierarchy composition into global poses
//! - Output `Snapshot`
//!
//! ## Example
//!
//! ```ignore
//! use retiming_engine::{EngineSettings, RetimingEngine};
//!
//! let mut engine = RetimingEngine::new(&config);
//! engine.apply_topology(&subjects);
//! engine.ingest_frame(&frame, false);
//!
//! match engine.update(&EngineSettings::from_config(&config), 0.0) {
//!     Ok((snapshot, report)) => publish(snapshot, report),
//!     Err(EngineError::NoNewFrame) => {}
//!     Err(e) => return Err(e.into()),
//! }
//! ```

mod data_path;
mod engine;
mod error;
mod predictor;
mod registry;
mod store;

pub use data_path::quantise;
pub use engine::{EngineSettings, EngineStats, FrameIngest, RetimingEngine};
pub use error::{EngineError, Result};
pub use predictor::Predictor;
pub use registry::{Registry, SegmentNode, SubjectEntry, TopologyError, TopologyUpdate};
pub use store::{Bracket, RecentSamples, Sample, SampleStore, SegmentHistory, StoreStats};
