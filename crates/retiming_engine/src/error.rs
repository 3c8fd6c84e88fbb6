//! Engine error definitions

use contracts::SegmentId;
use thiserror::Error;

/// Errors raised while ingesting samples or running an update cycle
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Sample timestamp not strictly after the segment's watermark
    #[error("out-of-order sample for '{segment}': {timestamp} <= {last}")]
    OutOfOrderSample {
        segment: SegmentId,
        timestamp: f64,
        last: f64,
    },

    /// NaN or infinite sample timestamp
    #[error("non-finite timestamp for '{segment}'")]
    InvalidTimestamp { segment: SegmentId },

    /// Query time did not advance, or nothing was ever ingested
    #[error("no new frame to publish")]
    NoNewFrame,
}

pub type Result<T> = std::result::Result<T, EngineError>;
