//! Manually fed frame source
//!
//! Events are pushed through a `ManualFeed` handle held by the caller,
//! typically a test. Events pushed before `start` are queued and delivered
//! once a callback is installed.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use contracts::{
    ContractError, EventCallback, FrameSource, RawFrame, SegmentFrame, SubjectDescription,
    SubjectFrame, Transform, TransportEvent,
};
use tracing::debug;

#[derive(Default)]
struct FeedState {
    callback: Option<EventCallback>,
    pending: VecDeque<TransportEvent>,
    connected_host: Option<String>,
    refuse_connect: bool,
    lightweight_requested: bool,
    next_frame_number: u64,
}

fn lock(state: &Mutex<FeedState>) -> MutexGuard<'_, FeedState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Frame source driven by a `ManualFeed`
pub struct ManualFrameSource {
    state: Arc<Mutex<FeedState>>,
}

/// Handle used to push events into a `ManualFrameSource`
#[derive(Clone)]
pub struct ManualFeed {
    state: Arc<Mutex<FeedState>>,
}

impl ManualFrameSource {
    pub fn new() -> (Self, ManualFeed) {
        let state = Arc::new(Mutex::new(FeedState::default()));
        (
            Self {
                state: state.clone(),
            },
            ManualFeed { state },
        )
    }
}

impl ManualFeed {
    /// Deliver an event, or queue it until the source is started
    pub fn push(&self, event: TransportEvent) {
        let callback = {
            let mut state = lock(&self.state);
            match state.callback.clone() {
                Some(callback) => callback,
                None => {
                    state.pending.push_back(event);
                    return;
                }
            }
        };
        callback(event);
    }

    pub fn topology(&self, subjects: Vec<SubjectDescription>) {
        self.push(TransportEvent::Topology(subjects));
    }

    /// Push a frame for one subject; frame numbers are assigned in order
    pub fn frame(&self, timestamp: f64, subject: &str, segments: &[(&str, Transform)]) {
        let frame_number = {
            let mut state = lock(&self.state);
            state.next_frame_number += 1;
            state.next_frame_number
        };
        self.push(TransportEvent::Frame(RawFrame {
            frame_number,
            timestamp,
            subjects: vec![SubjectFrame {
                name: subject.into(),
                segments: segments
                    .iter()
                    .map(|(name, transform)| SegmentFrame {
                        name: (*name).into(),
                        transform: *transform,
                        occluded: false,
                    })
                    .collect(),
            }],
        }));
    }

    pub fn disconnect(&self, reason: &str) {
        self.push(TransportEvent::Disconnected {
            reason: reason.to_string(),
        });
    }

    /// Make subsequent `connect` calls fail
    pub fn refuse_connections(&self, refuse: bool) {
        lock(&self.state).refuse_connect = refuse;
    }

    pub fn connected_host(&self) -> Option<String> {
        lock(&self.state).connected_host.clone()
    }

    pub fn lightweight_requested(&self) -> bool {
        lock(&self.state).lightweight_requested
    }

    pub fn is_started(&self) -> bool {
        lock(&self.state).callback.is_some()
    }
}

impl FrameSource for ManualFrameSource {
    fn describe(&self) -> String {
        "manual".to_string()
    }

    fn connect(&mut self, host: &str) -> Result<(), ContractError> {
        let mut state = lock(&self.state);
        if state.refuse_connect {
            return Err(ContractError::connection(host, "connection refused"));
        }
        state.connected_host = Some(host.to_string());
        Ok(())
    }

    fn start(&mut self, callback: EventCallback) -> Result<(), ContractError> {
        let pending: Vec<TransportEvent> = {
            let mut state = lock(&self.state);
            if state.connected_host.is_none() {
                return Err(ContractError::transport("manual source started before connect"));
            }
            if state.callback.is_some() {
                return Ok(());
            }
            state.callback = Some(callback.clone());
            state.pending.drain(..).collect()
        };
        debug!(queued = pending.len(), "manual source started");
        for event in pending {
            callback(event);
        }
        Ok(())
    }

    fn stop(&mut self) {
        lock(&self.state).callback = None;
    }

    fn is_streaming(&self) -> bool {
        lock(&self.state).callback.is_some()
    }

    fn set_lightweight(&mut self, enabled: bool) {
        lock(&self.state).lightweight_requested = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::SegmentDescription;

    #[test]
    fn test_queued_events_flush_on_start() {
        let (mut source, feed) = ManualFrameSource::new();
        feed.topology(vec![SubjectDescription {
            name: "Actor".into(),
            segments: vec![SegmentDescription::root("Hips", Transform::identity())],
        }]);
        feed.frame(1.0, "Actor", &[("Hips", Transform::identity())]);

        source.connect("localhost").unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        source
            .start(Arc::new(move |event| sink.lock().unwrap().push(event)))
            .unwrap();
        feed.frame(2.0, "Actor", &[("Hips", Transform::identity())]);

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 3);
        assert!(matches!(received[0], TransportEvent::Topology(_)));
        match &received[2] {
            TransportEvent::Frame(frame) => {
                assert_eq!(frame.frame_number, 2);
                assert_eq!(frame.timestamp, 2.0);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_refused_connection() {
        let (mut source, feed) = ManualFrameSource::new();
        feed.refuse_connections(true);
        assert!(source.connect("localhost").is_err());
        assert!(feed.connected_host().is_none());

        feed.refuse_connections(false);
        source.connect("localhost").unwrap();
        assert_eq!(feed.connected_host().as_deref(), Some("localhost"));
    }

    #[test]
    fn test_stop_and_lightweight_request() {
        let (mut source, feed) = ManualFrameSource::new();
        source.connect("localhost").unwrap();
        source.start(Arc::new(|_| {})).unwrap();
        assert!(feed.is_started());
        source.stop();
        assert!(!source.is_streaming());

        source.set_lightweight(true);
        assert!(feed.lightweight_requested());
    }
}
