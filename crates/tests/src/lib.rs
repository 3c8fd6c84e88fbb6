//! # Integration Tests
//!
//! End-to-end tests across the workspace:
//! - frame sources driving the retiming client
//! - configuration files feeding the client
//! - metrics aggregation over real update cycles

#[cfg(test)]
mod contract_tests {
    use contracts::{AxisMapping, ClientConfig};

    #[test]
    fn test_default_config_contract() {
        let config = ClientConfig::default();
        assert_eq!(config.output_latency_s, 0.02);
        assert_eq!(config.maximum_prediction_s, 0.1);
        assert_eq!(config.connection_timeout_ms, 5000);
        assert_eq!(config.axis_mapping, AxisMapping::default());
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{
        AxisDirection, ClientConfig, PoseSource, RawFrame, SegmentDescription, SegmentFrame,
        SubjectDescription, SubjectFrame, Transform, TransportEvent,
    };
    use observability::RetimingMetricsAggregator;
    use retiming_client::{ConnectionState, ResultCode, RetimingClient, RetimingError};
    use transport::{
        write_recording, ManualFeed, ManualFrameSource, MockFrameSource, MockSourceConfig,
        ReplayConfig, ReplayFrameSource,
    };

    fn manual_client(config: ClientConfig) -> (RetimingClient, ManualFeed) {
        let (source, feed) = ManualFrameSource::new();
        let client = RetimingClient::new(Box::new(source), config).unwrap();
        (client, feed)
    }

    fn actor(name: &str) -> SubjectDescription {
        SubjectDescription {
            name: name.into(),
            segments: vec![
                SegmentDescription::root("Hips", Transform::identity()),
                SegmentDescription::child(
                    "Spine",
                    "Hips",
                    Transform::from_translation([0.0, 0.0, 100.0]),
                ),
            ],
        }
    }

    /// Hips moving along +x at 1000 mm/s
    fn walk(feed: &ManualFeed, subject: &str, timestamps: &[f64]) {
        for &t in timestamps {
            feed.frame(
                t,
                subject,
                &[
                    ("Hips", Transform::from_translation([(t - 1.0) * 1000.0, 0.0, 0.0])),
                    ("Spine", Transform::from_translation([0.0, 0.0, 100.0])),
                ],
            );
        }
    }

    fn assert_close(a: [f64; 3], b: [f64; 3]) {
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < 1e-6, "{a:?} != {b:?}");
        }
    }

    #[test]
    fn test_interpolates_between_samples() {
        let (client, feed) = manual_client(ClientConfig {
            output_latency_s: 0.005,
            ..Default::default()
        });
        client.connect("localhost").unwrap();
        feed.topology(vec![actor("Actor")]);
        walk(&feed, "Actor", &[1.00, 1.01]);

        client.update_frame().unwrap();
        assert_close(
            client.segment_global_translation("Actor", "Hips").unwrap(),
            [5.0, 0.0, 0.0],
        );
        assert_close(
            client.segment_global_translation("Actor", "Spine").unwrap(),
            [5.0, 0.0, 100.0],
        );
        assert_close(
            client.segment_local_translation("Actor", "Spine").unwrap(),
            [0.0, 0.0, 100.0],
        );
        assert_eq!(
            client.segment_pose_source("Actor", "Hips").unwrap(),
            PoseSource::Interpolated
        );
    }

    #[test]
    fn test_predicts_and_clamps_past_newest_sample() {
        let (client, feed) = manual_client(ClientConfig {
            output_latency_s: -0.01,
            ..Default::default()
        });
        client.connect("localhost").unwrap();
        feed.topology(vec![actor("Actor")]);
        walk(&feed, "Actor", &[1.00, 1.01, 1.02]);

        client.update_frame().unwrap();
        assert_close(
            client.segment_global_translation("Actor", "Hips").unwrap(),
            [30.0, 0.0, 0.0],
        );
        assert_eq!(
            client.segment_pose_source("Actor", "Hips").unwrap(),
            PoseSource::Predicted
        );

        // 0.5s ahead is far past the 0.1s ceiling
        client.set_output_latency(-0.5).unwrap();
        walk(&feed, "Actor", &[1.03]);
        client.update_frame().unwrap();
        assert_close(
            client.segment_global_translation("Actor", "Hips").unwrap(),
            [130.0, 0.0, 0.0],
        );
        assert_eq!(
            client.segment_pose_source("Actor", "Hips").unwrap(),
            PoseSource::Clamped
        );
    }

    #[test]
    fn test_subject_filter_and_axis_mapping() {
        let (client, feed) = manual_client(ClientConfig {
            output_latency_s: 0.0,
            ..Default::default()
        });
        client.connect("localhost").unwrap();
        feed.topology(vec![actor("Alice"), actor("Bob")]);
        walk(&feed, "Alice", &[1.01]);
        walk(&feed, "Bob", &[1.01]);

        client.update_frame().unwrap();
        assert_eq!(client.subject_count().unwrap(), 2);

        client.add_to_subject_filter("Alice").unwrap();
        client
            .set_axis_mapping(AxisDirection::NegX, AxisDirection::NegY, AxisDirection::PosZ)
            .unwrap();
        walk(&feed, "Alice", &[1.02]);
        client.update_frame().unwrap();

        assert_eq!(client.subject_count().unwrap(), 1);
        assert_eq!(client.subject_name(0).unwrap(), "Alice");
        let err = client.segment_global_translation("Bob", "Hips").unwrap_err();
        assert!(matches!(err, RetimingError::SubjectNotFound(_)));
        assert_eq!(ResultCode::from(&err), ResultCode::NotFound);
        assert_close(
            client.segment_global_translation("Alice", "Hips").unwrap(),
            [-20.0, 0.0, 0.0],
        );

        client.clear_subject_filter();
        walk(&feed, "Alice", &[1.03]);
        client.update_frame().unwrap();
        assert_eq!(client.subject_count().unwrap(), 2);
    }

    #[test]
    fn test_subject_that_stops_reporting_is_dropped() {
        let (client, feed) = manual_client(ClientConfig {
            output_latency_s: 0.0,
            ..Default::default()
        });
        client.connect("localhost").unwrap();
        feed.topology(vec![actor("Alice"), actor("Bob")]);
        walk(&feed, "Bob", &[1.0]);
        walk(&feed, "Alice", &[1.0, 2.0, 3.0, 4.0, 5.0]);
        client.update_frame().unwrap();

        assert_eq!(client.subject_count().unwrap(), 1);
        assert_eq!(client.subject_name(0).unwrap(), "Alice");
        let err = client.segment_global_translation("Bob", "Hips").unwrap_err();
        assert!(matches!(err, RetimingError::SubjectNotFound(_)));
        assert_close(
            client.segment_global_translation("Alice", "Hips").unwrap(),
            [4000.0, 0.0, 0.0],
        );

        walk(&feed, "Bob", &[5.01]);
        client.update_frame().unwrap();
        assert_eq!(client.subject_count().unwrap(), 2);
    }

    #[test]
    fn test_streaming_mode_rejects_manual_updates() {
        let (client, feed) = manual_client(ClientConfig::default());
        client.connect_and_start("localhost", 200.0).unwrap();
        assert_eq!(client.connection_state(), ConnectionState::Streaming);
        feed.topology(vec![actor("Actor")]);

        let result = client.update_frame();
        assert!(matches!(result, Err(RetimingError::StreamingActive)));
        assert_eq!(ResultCode::of(&result), ResultCode::StreamingActive);

        client.disconnect().unwrap();
        assert_eq!(ResultCode::of(&client.update_frame()), ResultCode::NotConnected);
    }

    #[test]
    fn test_mock_stream_publishes_increasing_query_times() {
        let source = MockFrameSource::new(MockSourceConfig {
            frame_rate_hz: 240.0,
            subjects: 2,
            ..Default::default()
        });
        let client = RetimingClient::new(Box::new(source), ClientConfig::default()).unwrap();
        client.connect_and_start("localhost:801", 120.0).unwrap();

        let mut aggregator = RetimingMetricsAggregator::new();
        let mut t_queries = Vec::new();
        for _ in 0..10 {
            client.wait_for_frame().unwrap();
            let report = client.last_cycle_report().unwrap();
            aggregator.update(&report);
            t_queries.push(report.t_query);
        }
        client.disconnect().unwrap();

        assert!(t_queries.windows(2).all(|w| w[1] > w[0]), "{t_queries:?}");
        let summary = aggregator.summary();
        assert_eq!(summary.total_cycles, 10);
        assert!(summary.interpolated_rate + summary.predicted_rate > 0.0);
    }

    #[test]
    fn test_mock_failure_surfaces_once() {
        let source = MockFrameSource::new(MockSourceConfig {
            frame_rate_hz: 500.0,
            fail_after_frames: Some(5),
            ..Default::default()
        });
        let client = RetimingClient::new(Box::new(source), ClientConfig::default()).unwrap();
        client.connect_and_start("localhost:801", 500.0).unwrap();

        let error = loop {
            if let Err(e) = client.wait_for_frame() {
                break e;
            }
        };
        assert!(matches!(error, RetimingError::TransportFailure { .. }), "{error}");
        assert!(matches!(
            client.wait_for_frame(),
            Err(RetimingError::NotConnected)
        ));
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_unreachable_host() {
        let source = MockFrameSource::new(MockSourceConfig {
            unreachable_hosts: vec!["nowhere:801".into()],
            ..Default::default()
        });
        let client = RetimingClient::new(Box::new(source), ClientConfig::default()).unwrap();
        let err = client.connect("nowhere:801").unwrap_err();
        assert!(matches!(err, RetimingError::ConnectionFailed(_)));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_wakes_blocked_waiter() {
        let (client, feed) = manual_client(ClientConfig::default());
        let client = Arc::new(client);
        client.connect("localhost").unwrap();
        feed.topology(vec![actor("Actor")]);

        let waiter = {
            let client = client.clone();
            tokio::task::spawn_blocking(move || client.wait_for_frame())
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        client.disconnect().unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("waiter not woken")
            .unwrap();
        assert!(matches!(result, Err(RetimingError::NotConnected)));
    }

    #[test]
    fn test_frame_from_another_thread_wakes_waiter() {
        let (client, feed) = manual_client(ClientConfig::default());
        client.connect("localhost").unwrap();
        feed.topology(vec![actor("Actor")]);

        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            walk(&feed, "Actor", &[1.0]);
            feed
        });
        client.wait_for_frame().unwrap();
        let _feed = producer.join().unwrap();
        assert_eq!(client.frame_number().unwrap(), 1);
    }

    #[test]
    fn test_replay_recording_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.jsonl");

        let mut events = vec![TransportEvent::Topology(vec![actor("Actor")])];
        for i in 0..40 {
            let t = 1.0 + i as f64 * 0.01;
            events.push(TransportEvent::Frame(RawFrame {
                frame_number: i + 1,
                timestamp: t,
                subjects: vec![SubjectFrame {
                    name: "Actor".into(),
                    segments: vec![SegmentFrame {
                        name: "Hips".into(),
                        transform: Transform::from_translation([i as f64, 0.0, 0.0]),
                        occluded: false,
                    }],
                }],
            }));
        }
        write_recording(&path, &events).unwrap();

        let source = ReplayFrameSource::load(
            &path,
            ReplayConfig {
                speed: 1.0,
                loop_playback: false,
            },
        )
        .unwrap();
        assert_eq!(source.frame_count(), 40);

        let client = RetimingClient::new(Box::new(source), ClientConfig::default()).unwrap();
        client.connect_and_start("file", 100.0).unwrap();
        for _ in 0..3 {
            client.wait_for_frame().unwrap();
        }

        assert_eq!(client.subject_name(0).unwrap(), "Actor");
        assert_eq!(client.segment_count("Actor").unwrap(), 2);
        let hips = client.segment_global_translation("Actor", "Hips");
        assert_eq!(ResultCode::of(&hips), ResultCode::Success);
        // never streamed a pose
        let spine = client.segment_global_translation("Actor", "Spine");
        assert_eq!(ResultCode::of(&spine), ResultCode::NoData);
        client.disconnect().unwrap();
    }

    #[test]
    fn test_config_file_drives_client() {
        let config = ClientConfig {
            output_latency_s: 0.0,
            maximum_prediction_s: 0.05,
            subject_filter: vec!["Alice".into()],
            ..Default::default()
        };
        let toml = ConfigLoader::to_toml(&config).unwrap();
        let loaded = ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap();

        let (client, feed) = manual_client(loaded);
        assert_eq!(client.output_latency(), 0.0);
        assert_eq!(client.maximum_prediction(), 0.05);

        client.connect("localhost").unwrap();
        feed.topology(vec![actor("Alice"), actor("Bob")]);
        walk(&feed, "Alice", &[1.0]);
        walk(&feed, "Bob", &[1.0]);
        client.update_frame().unwrap();
        assert_eq!(client.subject_count().unwrap(), 1);
    }
}
