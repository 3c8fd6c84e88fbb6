//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Retiming client for motion capture streams
#[derive(Parser, Debug)]
#[command(
    name = "retiming",
    author,
    version,
    about = "Motion capture retiming client",
    long_about = "Connects to a motion capture frame source, keeps a bounded pose history \n\
                  per segment and publishes poses retimed to the output latency, \n\
                  interpolating between samples or predicting past the newest one."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "RETIMING_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "RETIMING_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect to a frame source and stream retimed poses
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display the effective configuration
    Info(InfoArgs),
}

/// Where frames come from
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SourceKind {
    /// Procedurally animated subjects
    #[default]
    Mock,
    /// JSON-lines recording
    Replay,
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON); defaults apply when absent
    #[arg(short, long, env = "RETIMING_CONFIG")]
    pub config: Option<PathBuf>,

    /// Frame source
    #[arg(long, value_enum, default_value = "mock", env = "RETIMING_SOURCE")]
    pub source: SourceKind,

    /// Recording to play back (required with --source replay)
    #[arg(long, required_if_eq("source", "replay"))]
    pub recording: Option<PathBuf>,

    /// Replay speed multiplier
    #[arg(long, default_value = "1.0")]
    pub speed: f64,

    /// Restart the recording when it ends
    #[arg(long = "loop")]
    pub loop_playback: bool,

    /// Host passed to the frame source
    #[arg(long, default_value = "localhost:801", env = "RETIMING_HOST")]
    pub host: String,

    /// Publication rate of the streaming cycle (Hz)
    #[arg(long, default_value = "100.0", env = "RETIMING_FRAME_RATE")]
    pub frame_rate: f64,

    /// Mock capture rate (Hz)
    #[arg(long, default_value = "120.0")]
    pub capture_rate: f64,

    /// Mock subject count
    #[arg(long, default_value = "1")]
    pub subjects: usize,

    /// Override output latency from configuration (seconds)
    #[arg(long, allow_negative_numbers = true)]
    pub latency: Option<f64>,

    /// Override maximum prediction from configuration (seconds)
    #[arg(long)]
    pub max_prediction: Option<f64>,

    /// Only retime these subjects (repeatable)
    #[arg(long = "subject")]
    pub subjects_filter: Vec<String>,

    /// Log the global pose of SUBJECT/SEGMENT every --trace-every frames
    #[arg(long, value_name = "SUBJECT/SEGMENT")]
    pub trace_segment: Option<String>,

    /// Frames between pose traces
    #[arg(long, default_value = "50")]
    pub trace_every: u64,

    /// Maximum number of published frames (0 = unlimited)
    #[arg(long, default_value = "0", env = "RETIMING_MAX_FRAMES")]
    pub max_frames: u64,

    /// Run timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "RETIMING_TIMEOUT")]
    pub timeout: u64,

    /// Prometheus metrics port (0 = disabled)
    #[arg(long, default_value = "0", env = "RETIMING_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug, Clone)]
pub struct ValidateArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", env = "RETIMING_CONFIG")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug, Clone)]
pub struct InfoArgs {
    /// Path to configuration file; defaults are shown when absent
    #[arg(short, long, env = "RETIMING_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format options
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_defaults() {
        let cli = Cli::try_parse_from(["retiming", "run"]).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.source, SourceKind::Mock);
        assert!(args.config.is_none());
        assert_eq!(args.max_frames, 0);
        assert_eq!(cli.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_replay_requires_recording() {
        assert!(Cli::try_parse_from(["retiming", "run", "--source", "replay"]).is_err());
        let cli = Cli::try_parse_from([
            "retiming",
            "run",
            "--source",
            "replay",
            "--recording",
            "session.jsonl",
            "--loop",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(args.loop_playback);
    }

    #[test]
    fn test_negative_latency_and_filter() {
        let cli = Cli::try_parse_from([
            "retiming",
            "run",
            "--latency",
            "-0.01",
            "--subject",
            "Alice",
            "--subject",
            "Bob",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.latency, Some(-0.01));
        assert_eq!(args.subjects_filter, vec!["Alice", "Bob"]);
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["retiming", "-q", "-v", "info"]).is_err());
    }
}
