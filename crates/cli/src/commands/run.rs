//! `run` command implementation.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use config_loader::ConfigLoader;
use contracts::{ClientConfig, FrameSource, Name};
use retiming_client::{RetimingClient, RetimingError};
use transport::{MockFrameSource, MockSourceConfig, ReplayConfig, ReplayFrameSource};

use super::load_config;
use crate::cli::{RunArgs, SourceKind};
use crate::error::CliError;
use crate::session::SessionStats;

/// Execute the `run` command
pub async fn run_client(args: &RunArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    apply_overrides(&mut config, args);
    ConfigLoader::validate(&config).map_err(CliError::Config)?;

    info!(
        latency_s = config.output_latency_s,
        max_prediction_s = config.maximum_prediction_s,
        lightweight = config.lightweight_segment_data,
        subjects = config.subject_filter.len(),
        "Configuration loaded"
    );

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
        info!("Metrics endpoint available on port {}", args.metrics_port);
    }

    let source = build_source(args)?;
    let client = Arc::new(RetimingClient::new(source, config).map_err(CliError::from)?);
    info!(
        version = %RetimingClient::version(),
        source = %client.source_description(),
        host = %args.host,
        "Connecting..."
    );
    client
        .connect_and_start(&args.host, args.frame_rate)
        .with_context(|| format!("Failed to start streaming from {}", args.host))?;

    let stop = Arc::new(AtomicBool::new(false));
    let session = {
        let client = client.clone();
        let stop = stop.clone();
        let args = args.clone();
        tokio::task::spawn_blocking(move || stream(&client, &args, &stop))
    };
    let abort = session.abort_handle();

    tokio::select! {
        result = session => {
            let stats = result
                .map_err(|e| CliError::session(e.to_string()))?
                .context("Streaming session failed")?;
            info!(
                frames = stats.frames_published,
                duration_secs = stats.duration.as_secs_f64(),
                fps = format!("{:.2}", stats.fps()),
                "Session completed"
            );
            stats.print_summary();
        }
        _ = shutdown_signal() => {
            warn!("Received shutdown signal, stopping client...");
            stop.store(true, Ordering::SeqCst);
            // wakes a blocked wait_for_frame
            if let Err(e) = client.disconnect() {
                debug!(error = %e, "disconnect after shutdown signal");
            }
            abort.abort();
        }
    }

    info!("Retiming client finished");
    Ok(())
}

fn apply_overrides(config: &mut ClientConfig, args: &RunArgs) {
    if let Some(latency) = args.latency {
        info!(latency, "Overriding output latency from CLI");
        config.output_latency_s = latency;
    }
    if let Some(prediction) = args.max_prediction {
        info!(prediction, "Overriding maximum prediction from CLI");
        config.maximum_prediction_s = prediction;
    }
    if !args.subjects_filter.is_empty() {
        config.subject_filter = args.subjects_filter.iter().map(|s| Name::from(s.as_str())).collect();
    }
}

fn build_source(args: &RunArgs) -> Result<Box<dyn FrameSource>, CliError> {
    match args.source {
        SourceKind::Mock => {
            info!("Running in MOCK mode (no capture server required)");
            Ok(Box::new(MockFrameSource::new(MockSourceConfig {
                frame_rate_hz: args.capture_rate,
                subjects: args.subjects,
                ..Default::default()
            })))
        }
        SourceKind::Replay => {
            let path = args
                .recording
                .as_deref()
                .ok_or_else(|| CliError::session("--recording is required for replay"))?;
            info!(path = %path.display(), "Running in REPLAY mode");
            let source = ReplayFrameSource::load(
                path,
                ReplayConfig {
                    speed: args.speed,
                    loop_playback: args.loop_playback,
                },
            )
            .map_err(CliError::Source)?;
            info!(
                frames = source.frame_count(),
                duration_secs = source.duration(),
                "Recording loaded"
            );
            Ok(Box::new(source))
        }
    }
}

/// Split `SUBJECT/SEGMENT`
fn parse_segment_path(path: &str) -> Option<(&str, &str)> {
    let (subject, segment) = path.split_once('/')?;
    if subject.is_empty() || segment.is_empty() {
        return None;
    }
    Some((subject, segment))
}

/// Blocking consumer loop; runs until a limit, a stop request or an error
fn stream(client: &RetimingClient, args: &RunArgs, stop: &AtomicBool) -> Result<SessionStats, CliError> {
    let traced = match args.trace_segment.as_deref() {
        Some(path) => {
            let parsed = parse_segment_path(path);
            if parsed.is_none() {
                warn!(path, "--trace-segment expects SUBJECT/SEGMENT, ignoring");
            }
            parsed
        }
        None => None,
    };
    let deadline = (args.timeout > 0).then(|| Instant::now() + Duration::from_secs(args.timeout));

    let mut stats = SessionStats::default();
    let start = Instant::now();

    while !stop.load(Ordering::SeqCst) {
        if args.max_frames > 0 && stats.frames_published >= args.max_frames {
            info!(max_frames = args.max_frames, "Reached frame limit");
            break;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            info!(timeout_secs = args.timeout, "Reached run timeout");
            break;
        }

        let waited = Instant::now();
        match client.wait_for_frame() {
            Ok(()) => {
                let wait = waited.elapsed();
                observability::record_wait_latency_ms(wait.as_secs_f64() * 1000.0);
                stats.record(wait, client.last_cycle_report().as_ref());

                if let Some((subject, segment)) = traced {
                    if args.trace_every > 0 && stats.frames_published % args.trace_every == 0 {
                        trace_pose(client, subject, segment);
                    }
                }
            }
            Err(RetimingError::Timeout { timeout_ms }) => {
                stats.wait_timeouts += 1;
                warn!(timeout_ms, "No frame within the connection timeout");
            }
            Err(RetimingError::NotConnected) if stop.load(Ordering::SeqCst) => break,
            Err(e) => return Err(e.into()),
        }
    }

    stats.duration = start.elapsed();
    stats.client = Some(client.stats());
    match client.disconnect() {
        Ok(()) | Err(RetimingError::NotConnected) => {}
        Err(e) => warn!(error = %e, "disconnect failed"),
    }
    Ok(stats)
}

fn trace_pose(client: &RetimingClient, subject: &str, segment: &str) {
    let frame = client.frame_number().unwrap_or_default();
    match (
        client.segment_global_translation(subject, segment),
        client.segment_global_rotation_euler_xyz(subject, segment),
        client.segment_pose_source(subject, segment),
    ) {
        (Ok(translation), Ok(euler), Ok(source)) => info!(
            frame,
            subject,
            segment,
            ?source,
            translation = ?translation,
            euler_xyz = ?euler,
            "Segment pose"
        ),
        (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
            debug!(frame, subject, segment, error = %e, "Segment pose unavailable")
        }
    }
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
