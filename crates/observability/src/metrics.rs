//! Retiming metrics collection
//!
//! Records Prometheus metrics from each `CycleReport` and keeps an in-memory
//! aggregate for end-of-run summaries.

use contracts::CycleReport;
use metrics::{counter, gauge, histogram};

/// Record metrics for one published snapshot
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_cycle_metrics;
///
/// client.wait_for_frame()?;
/// if let Some(report) = client.last_cycle_report() {
///     record_cycle_metrics(&report);
/// }
/// ```
pub fn record_cycle_metrics(report: &CycleReport) {
    counter!("retiming_cycles_total").increment(1);
    gauge!("retiming_last_frame_number").set(report.frame_number as f64);

    // Positive when the snapshot is extrapolated past the newest sample
    histogram!("retiming_lead_ms").record(report.lead_s * 1000.0);

    for (source, count) in [
        ("interpolated", report.interpolated),
        ("predicted", report.predicted),
        ("clamped", report.clamped),
        ("absent", report.absent),
    ] {
        gauge!("retiming_segments", "source" => source).set(count as f64);
        if count > 0 {
            counter!("retiming_segments_total", "source" => source).increment(count as u64);
        }
    }

    gauge!("retiming_samples_rejected").set(report.samples_rejected as f64);
    gauge!("retiming_samples_evicted").set(report.samples_evicted as f64);
}

/// Record a frame delivered by the source
pub fn record_frame_ingested(segments: usize) {
    counter!("retiming_source_frames_total").increment(1);
    histogram!("retiming_frame_segments").record(segments as f64);
}

/// Record samples dropped before reaching a segment history
///
/// `reason` is `out_of_order` or `unknown_segment`.
pub fn record_sample_rejected(reason: &'static str, count: u64) {
    counter!("retiming_ingest_rejected_total", "reason" => reason).increment(count);
}

/// Record how long a caller waited for a frame
pub fn record_wait_latency_ms(latency_ms: f64) {
    histogram!("retiming_wait_latency_ms").record(latency_ms);
}

/// Retiming metrics aggregator
///
/// Aggregates cycle reports in memory for summaries.
#[derive(Debug, Clone, Default)]
pub struct RetimingMetricsAggregator {
    pub total_cycles: u64,

    /// Segment poses by how they were obtained
    pub interpolated: u64,
    pub predicted: u64,
    pub clamped: u64,
    pub absent: u64,

    /// Store totals as of the latest report
    pub samples_rejected: u64,
    pub samples_evicted: u64,

    /// Publication numbers skipped between consecutive reports
    pub skipped_frames: u64,

    /// Query time lead over the newest sample (ms)
    pub lead_stats: RunningStats,

    /// Query time advance between consecutive cycles (ms)
    pub step_stats: RunningStats,

    last_frame_number: Option<u64>,
    last_t_query: Option<f64>,
}

impl RetimingMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, report: &CycleReport) {
        self.total_cycles += 1;
        self.interpolated += report.interpolated as u64;
        self.predicted += report.predicted as u64;
        self.clamped += report.clamped as u64;
        self.absent += report.absent as u64;
        self.samples_rejected = report.samples_rejected;
        self.samples_evicted = report.samples_evicted;

        if let Some(last) = self.last_frame_number {
            self.skipped_frames += report.frame_number.saturating_sub(last + 1);
        }
        if let Some(last) = self.last_t_query {
            self.step_stats.push((report.t_query - last) * 1000.0);
        }
        self.lead_stats.push(report.lead_s * 1000.0);

        self.last_frame_number = Some(report.frame_number);
        self.last_t_query = Some(report.t_query);
    }

    pub fn summary(&self) -> MetricsSummary {
        let posed = self.interpolated + self.predicted + self.clamped;
        let total = posed + self.absent;
        let percent = |n: u64| {
            if total > 0 {
                n as f64 / total as f64 * 100.0
            } else {
                0.0
            }
        };
        MetricsSummary {
            total_cycles: self.total_cycles,
            skipped_frames: self.skipped_frames,
            samples_rejected: self.samples_rejected,
            samples_evicted: self.samples_evicted,
            interpolated_rate: percent(self.interpolated),
            predicted_rate: percent(self.predicted),
            clamped_rate: percent(self.clamped),
            absent_rate: percent(self.absent),
            lead_ms: StatsSummary::from(&self.lead_stats),
            step_ms: StatsSummary::from(&self.step_stats),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Metrics summary
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_cycles: u64,
    pub skipped_frames: u64,
    pub samples_rejected: u64,
    pub samples_evicted: u64,
    pub interpolated_rate: f64,
    pub predicted_rate: f64,
    pub clamped_rate: f64,
    pub absent_rate: f64,
    pub lead_ms: StatsSummary,
    pub step_ms: StatsSummary,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Retiming Metrics Summary ===")?;
        writeln!(f, "Total cycles: {}", self.total_cycles)?;
        writeln!(f, "Skipped frames: {}", self.skipped_frames)?;
        writeln!(
            f,
            "Segment poses: interpolated {:.2}%, predicted {:.2}%, clamped {:.2}%, absent {:.2}%",
            self.interpolated_rate, self.predicted_rate, self.clamped_rate, self.absent_rate
        )?;
        writeln!(f, "Rejected samples: {}", self.samples_rejected)?;
        writeln!(f, "Evicted samples: {}", self.samples_evicted)?;
        writeln!(f, "Lead (ms): {}", self.lead_ms)?;
        writeln!(f, "Step (ms): {}", self.step_ms)?;
        Ok(())
    }
}

/// Statistics summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            self.m2 += delta * (value - self.mean);
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(frame_number: u64, t_query: f64, interpolated: u32, absent: u32) -> CycleReport {
        CycleReport {
            frame_number,
            t_query,
            latest_timestamp: t_query + 0.02,
            lead_s: -0.02,
            interpolated,
            absent,
            ..Default::default()
        }
    }

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.push(v);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_update() {
        let mut aggregator = RetimingMetricsAggregator::new();
        aggregator.update(&report(1, 1.00, 3, 1));
        aggregator.update(&report(2, 1.01, 4, 0));
        aggregator.update(&report(5, 1.02, 4, 0));

        assert_eq!(aggregator.total_cycles, 3);
        assert_eq!(aggregator.interpolated, 11);
        assert_eq!(aggregator.absent, 1);
        assert_eq!(aggregator.skipped_frames, 2);
        assert_eq!(aggregator.step_stats.count(), 2);
        assert!((aggregator.step_stats.mean() - 10.0).abs() < 1e-6);
        assert!((aggregator.lead_stats.mean() + 20.0).abs() < 1e-9);

        let summary = aggregator.summary();
        assert!((summary.absent_rate - 100.0 / 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_summary_display() {
        let summary = MetricsSummary {
            total_cycles: 100,
            interpolated_rate: 95.0,
            predicted_rate: 5.0,
            lead_ms: StatsSummary {
                count: 100,
                min: -20.0,
                max: 5.0,
                mean: -15.0,
                std_dev: 2.0,
            },
            ..Default::default()
        };

        let output = format!("{}", summary);
        assert!(output.contains("Total cycles: 100"));
        assert!(output.contains("interpolated 95.00%"));
        assert!(output.contains("Step (ms): N/A"));
    }
}
