//! Bounded event inbox between the frame source thread and the engine

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_channel::{bounded, Receiver, Sender, TrySendError};
use contracts::{DropPolicy, InboxConfig, SubjectDescription, TransportEvent};
use tracing::trace;

/// Events waiting for the next update cycle
///
/// Frames are dropped according to the configured policy when the inbox is
/// full. Topology updates are never lost: a topology pushed out of the queue
/// is parked and delivered ahead of the remaining events.
pub struct Inbox {
    tx: Sender<TransportEvent>,
    rx: Receiver<TransportEvent>,
    drop_policy: DropPolicy,
    displaced_topology: Mutex<Option<Vec<SubjectDescription>>>,
    received: AtomicU64,
    dropped: AtomicU64,
}

/// Inbox counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InboxStats {
    pub received: u64,
    pub dropped: u64,
    pub queued: usize,
}

impl Inbox {
    pub fn new(config: &InboxConfig) -> Self {
        let (tx, rx) = bounded(config.capacity.max(1));
        Self {
            tx,
            rx,
            drop_policy: config.drop_policy,
            displaced_topology: Mutex::new(None),
            received: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue an event without blocking the caller
    pub fn push(&self, event: TransportEvent) {
        self.received.fetch_add(1, Ordering::Relaxed);

        let mut event = event;
        loop {
            match self.tx.try_send(event) {
                Ok(()) => return,
                Err(TrySendError::Closed(_)) => return,
                Err(TrySendError::Full(rejected)) => {
                    let keep_newest = matches!(rejected, TransportEvent::Topology(_))
                        || self.drop_policy == DropPolicy::DropOldest;
                    if !keep_newest {
                        self.record_drop();
                        trace!("inbox full, newest frame dropped");
                        return;
                    }
                    self.evict_oldest();
                    event = rejected;
                }
            }
        }
    }

    /// Pop the oldest event; the parked slot stays locked so a concurrent
    /// drain sees the topology either parked or still queued.
    fn evict_oldest(&self) {
        let mut displaced = self.lock_displaced();
        match self.rx.try_recv() {
            Ok(TransportEvent::Topology(subjects)) => {
                *displaced = Some(subjects);
            }
            Ok(_) => {
                self.record_drop();
                trace!("inbox full, oldest frame dropped");
            }
            Err(_) => {}
        }
    }

    fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("retiming_inbox_dropped_total").increment(1);
    }

    fn lock_displaced(&self) -> std::sync::MutexGuard<'_, Option<Vec<SubjectDescription>>> {
        self.displaced_topology
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take every queued event in arrival order
    pub fn drain(&self) -> Vec<TransportEvent> {
        let mut displaced = self.lock_displaced();
        let mut events = Vec::with_capacity(self.rx.len() + 1);
        if let Some(subjects) = displaced.take() {
            events.push(TransportEvent::Topology(subjects));
        }
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Discard everything queued
    pub fn clear(&self) {
        let mut displaced = self.lock_displaced();
        displaced.take();
        while self.rx.try_recv().is_ok() {}
    }

    pub fn stats(&self) -> InboxStats {
        InboxStats {
            received: self.received.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            queued: self.rx.len(),
        }
    }
}
