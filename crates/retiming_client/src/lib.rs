//! Retiming client
//!
//! Connects a `FrameSource` to the retiming engine and serves pose queries
//! at the caller's output rate.
//!
//! - `RetimingClient`: connection state machine, update cycles, queries
//! - `RetimingError` / `ResultCode`: error taxonomy and flat status codes

#[macro_use]
mod macros;

mod client;
mod error;
mod inbox;
mod queries;
mod timing_log;

pub use client::{ClientStats, ConnectionState, RetimingClient, Version, VERSION};
pub use error::{Result, ResultCode, RetimingError};
pub use inbox::InboxStats;
