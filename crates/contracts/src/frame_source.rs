//! FrameSource trait - Capture stream abstraction
//!
//! Decouples the retiming client from the wire protocol. Live servers,
//! recordings and synthetic generators all deliver the same `TransportEvent`s.

use std::sync::Arc;

use crate::{ContractError, TransportEvent};

/// Event callback type
///
/// Invoked from the source's own thread for every topology update, frame
/// and disconnect notification, in delivery order.
pub type EventCallback = Arc<dyn Fn(TransportEvent) + Send + Sync>;

/// Capture data source
///
/// Lifecycle: `connect` once, then `start` with a callback; `stop` ends
/// delivery and must be idempotent.
///
/// # Example
///
/// ```ignore
/// let mut source: Box<dyn FrameSource> = open_source();
/// source.connect("localhost:801")?;
/// source.start(Arc::new(|event| println!("{event:?}")))?;
/// // ...
/// source.stop();
/// ```
pub trait FrameSource: Send {
    /// Short human-readable description for logs
    fn describe(&self) -> String;

    /// Establish the connection to `host`
    fn connect(&mut self, host: &str) -> Result<(), ContractError>;

    /// Begin delivering events to `callback`
    ///
    /// A topology event is delivered before the first frame.
    fn start(&mut self, callback: EventCallback) -> Result<(), ContractError>;

    /// Stop delivering events
    fn stop(&mut self);

    /// Check if events are currently being delivered
    fn is_streaming(&self) -> bool;

    /// Ask the source for reduced segment payloads, where supported
    fn set_lightweight(&mut self, _enabled: bool) {}
}
