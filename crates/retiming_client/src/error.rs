//! Retiming client error types and boundary result codes

use contracts::{AxisMappingError, ContractError};
use retiming_engine::EngineError;
use thiserror::Error;

/// Retiming client error
#[derive(Debug, Error)]
pub enum RetimingError {
    /// Query or cadence call without an established connection
    #[error("not connected")]
    NotConnected,

    #[error("subject '{0}' not found")]
    SubjectNotFound(String),

    #[error("segment '{segment}' not found in subject '{subject}'")]
    SegmentNotFound { subject: String, segment: String },

    #[error("index {index} out of range (count {count})")]
    IndexOutOfRange { index: usize, count: usize },

    /// Segment known but without a pose in the current frame
    #[error("no data for segment '{segment}' of subject '{subject}'")]
    NoData { subject: String, segment: String },

    /// No frame published yet, or the cycle had nothing new to publish
    #[error("no new frame")]
    NoNewFrame,

    #[error("timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// Fatal source failure; the client is now disconnected
    #[error("transport failure: {reason}")]
    TransportFailure { reason: String },

    #[error("connection failed: {0}")]
    ConnectionFailed(#[source] ContractError),

    /// Caller-driven update while the streaming loop owns the engine
    #[error("update rejected: streaming loop active")]
    StreamingActive,

    #[error("invalid argument '{name}': {message}")]
    InvalidArgument { name: &'static str, message: String },

    #[error(transparent)]
    InvalidAxisMapping(#[from] AxisMappingError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RetimingError {
    pub fn invalid_argument(name: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name,
            message: message.into(),
        }
    }

    pub fn segment_not_found(subject: impl Into<String>, segment: impl Into<String>) -> Self {
        Self::SegmentNotFound {
            subject: subject.into(),
            segment: segment.into(),
        }
    }

    pub fn code(&self) -> ResultCode {
        ResultCode::from(self)
    }
}

impl From<EngineError> for RetimingError {
    fn from(error: EngineError) -> Self {
        match error {
            error @ EngineError::OutOfOrderSample { .. } => {
                Self::invalid_argument("timestamp", error.to_string())
            }
            EngineError::InvalidTimestamp { segment } => {
                Self::invalid_argument("timestamp", format!("non-finite timestamp for {segment}"))
            }
            EngineError::NoNewFrame => Self::NoNewFrame,
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, RetimingError>;

/// Flat status codes for callers that cannot carry a `RetimingError`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ResultCode {
    Success = 0,
    NotConnected = 1,
    NotFound = 2,
    NoFrame = 3,
    InvalidArgument = 4,
    Timeout = 5,
    TransportFailure = 6,
    StreamingActive = 7,
    CoLinearAxes = 8,
    LeftHandedAxes = 9,
    NoData = 10,
    Io = 11,
}

impl ResultCode {
    const WIRE: [(u32, ResultCode); 12] = [
        (0, ResultCode::Success),
        (1, ResultCode::NotConnected),
        (2, ResultCode::NotFound),
        (3, ResultCode::NoFrame),
        (4, ResultCode::InvalidArgument),
        (5, ResultCode::Timeout),
        (6, ResultCode::TransportFailure),
        (7, ResultCode::StreamingActive),
        (8, ResultCode::CoLinearAxes),
        (9, ResultCode::LeftHandedAxes),
        (10, ResultCode::NoData),
        (11, ResultCode::Io),
    ];

    pub fn to_wire(self) -> u32 {
        self as u32
    }

    pub fn from_wire(value: u32) -> Option<Self> {
        Self::WIRE
            .iter()
            .find(|(wire, _)| *wire == value)
            .map(|(_, code)| *code)
    }

    /// Code for the outcome of a fallible call
    pub fn of<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(error) => error.code(),
        }
    }
}

impl From<&RetimingError> for ResultCode {
    fn from(error: &RetimingError) -> Self {
        match error {
            RetimingError::NotConnected => Self::NotConnected,
            RetimingError::SubjectNotFound(_)
            | RetimingError::SegmentNotFound { .. }
            | RetimingError::IndexOutOfRange { .. } => Self::NotFound,
            RetimingError::NoData { .. } => Self::NoData,
            RetimingError::InvalidArgument { .. } => Self::InvalidArgument,
            RetimingError::NoNewFrame => Self::NoFrame,
            RetimingError::Timeout { .. } => Self::Timeout,
            RetimingError::TransportFailure { .. } | RetimingError::ConnectionFailed(_) => {
                Self::TransportFailure
            }
            RetimingError::StreamingActive => Self::StreamingActive,
            RetimingError::InvalidAxisMapping(AxisMappingError::CoLinear) => Self::CoLinearAxes,
            RetimingError::InvalidAxisMapping(AxisMappingError::LeftHanded) => {
                Self::LeftHandedAxes
            }
            RetimingError::Io(_) => Self::Io,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_table_matches_discriminants() {
        for (wire, code) in ResultCode::WIRE {
            assert_eq!(code.to_wire(), wire);
            assert_eq!(ResultCode::from_wire(wire), Some(code));
        }
        assert_eq!(ResultCode::from_wire(99), None);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            RetimingError::SubjectNotFound("A".into()).code(),
            ResultCode::NotFound
        );
        assert_eq!(
            RetimingError::InvalidAxisMapping(AxisMappingError::LeftHanded).code(),
            ResultCode::LeftHandedAxes
        );
        assert_eq!(
            RetimingError::from(EngineError::NoNewFrame).code(),
            ResultCode::NoFrame
        );
        assert_eq!(ResultCode::of(&Ok(())), ResultCode::Success);
    }

    #[test]
    fn test_sample_rejections_map_to_invalid_argument() {
        let late = EngineError::OutOfOrderSample {
            segment: contracts::SegmentId::new("Actor", "Hips"),
            timestamp: 1.0,
            last: 2.0,
        };
        assert_eq!(RetimingError::from(late).code(), ResultCode::InvalidArgument);
        let nan = EngineError::InvalidTimestamp {
            segment: contracts::SegmentId::new("Actor", "Hips"),
        };
        assert_eq!(RetimingError::from(nan).code(), ResultCode::InvalidArgument);
    }
}
