//! Streaming session statistics.

use std::time::Duration;

use contracts::CycleReport;
use observability::{RetimingMetricsAggregator, RunningStats, StatsSummary};
use retiming_client::ClientStats;

/// Statistics from a `run` session
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Snapshots observed by the caller
    pub frames_published: u64,

    /// `wait_for_frame` calls that hit the connection timeout
    pub wait_timeouts: u64,

    /// Total duration of the session
    pub duration: Duration,

    /// Time spent blocked in `wait_for_frame` (ms)
    pub wait_ms: RunningStats,

    /// Client counters at the end of the session
    pub client: Option<ClientStats>,

    /// Per-cycle retiming metrics
    pub retiming: RetimingMetricsAggregator,
}

impl SessionStats {
    pub fn record(&mut self, wait: Duration, report: Option<&CycleReport>) {
        self.frames_published += 1;
        self.wait_ms.push(wait.as_secs_f64() * 1000.0);
        if let Some(report) = report {
            self.retiming.update(report);
        }
    }

    /// Published frames per second
    pub fn fps(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.frames_published as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== Session Statistics ===\n");
        println!("Overview");
        println!("  Duration: {:.2}s", self.duration.as_secs_f64());
        println!("  Frames published: {}", self.frames_published);
        println!("  FPS: {:.2}", self.fps());
        println!("  Wait timeouts: {}", self.wait_timeouts);
        println!("  Wait (ms): {}", StatsSummary::from(&self.wait_ms));

        if let Some(client) = &self.client {
            println!("\nClient");
            println!("  State: {:?}", client.state);
            println!("  Subjects: {}", client.engine.subjects);
            println!("  Segments: {}", client.engine.segments);
            println!("  Frames received: {}", client.inbox.received);
            println!("  Frames dropped: {}", client.inbox.dropped);
        }

        println!();
        print!("{}", self.retiming.summary());
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fps_without_duration() {
        let stats = SessionStats::default();
        assert_eq!(stats.fps(), 0.0);
    }

    #[test]
    fn test_record_counts_frames() {
        let mut stats = SessionStats::default();
        stats.record(Duration::from_millis(10), None);
        stats.record(Duration::from_millis(20), None);
        stats.duration = Duration::from_secs(1);
        assert_eq!(stats.frames_published, 2);
        assert_eq!(stats.fps(), 2.0);
        assert!((stats.wait_ms.mean() - 15.0).abs() < 1e-9);
    }
}
