//! Per-segment sample history with timestamp-based bracketing.
//!
//! Each segment owns a `HeapRb` of samples in arrival order. Arrival order is
//! also time order because out-of-order samples are refused at `record`.

use std::collections::HashMap;
use std::fmt;

use contracts::{SegmentId, Transform};
use ringbuf::{traits::*, HeapRb};

use crate::error::{EngineError, Result};

/// Samples always kept regardless of age (enough for prediction).
pub const MIN_RETAINED: usize = 3;

/// One timestamped measurement of a segment, relative to its parent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: f64,
    pub transform: Transform,
    /// `false` for occluded samples
    pub valid: bool,
}

/// The newest valid samples of a segment, oldest first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecentSamples {
    samples: [Sample; MIN_RETAINED],
    len: usize,
}

impl RecentSamples {
    fn collect_newest<'a>(mut iter: impl Iterator<Item = &'a Sample>) -> Option<Self> {
        let first = *iter.next()?;
        let mut samples = [first; MIN_RETAINED];
        let mut len = 1;
        for sample in iter {
            if len < MIN_RETAINED {
                samples[len] = *sample;
                len += 1;
            } else {
                samples.rotate_left(1);
                samples[MIN_RETAINED - 1] = *sample;
            }
        }
        Some(Self { samples, len })
    }

    pub fn as_slice(&self) -> &[Sample] {
        &self.samples[..self.len]
    }

    pub fn newest(&self) -> &Sample {
        &self.samples[self.len - 1]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Where a query time falls relative to a segment's valid samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bracket {
    /// `from.timestamp <= t <= to.timestamp`, or `from == to` when `t`
    /// precedes the oldest sample.
    Interpolate { from: Sample, to: Sample, factor: f64 },
    /// `t` is past the newest valid sample.
    ExtrapolateForward { history: RecentSamples },
    /// No valid sample at all.
    NoData,
}

/// Bounded history of one segment
pub struct SegmentHistory {
    samples: HeapRb<Sample>,
    /// Timestamp of the last accepted sample, valid or not
    watermark: Option<f64>,
    evicted: u64,
}

impl fmt::Debug for SegmentHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentHistory")
            .field("len", &self.samples.occupied_len())
            .field("watermark", &self.watermark)
            .field("evicted", &self.evicted)
            .finish()
    }
}

impl SegmentHistory {
    #[inline]
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: HeapRb::new(max_samples.max(MIN_RETAINED)),
            watermark: None,
            evicted: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.occupied_len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn newest_timestamp(&self) -> Option<f64> {
        self.watermark
    }

    #[inline]
    pub fn evicted_count(&self) -> u64 {
        self.evicted
    }

    /// Append a sample, then prune anything older than `newest - retention_s`.
    ///
    /// Returns the last accepted timestamp on rejection.
    fn push(&mut self, sample: Sample, retention_s: f64) -> std::result::Result<(), f64> {
        if let Some(last) = self.watermark {
            if sample.timestamp <= last {
                return Err(last);
            }
        }
        self.watermark = Some(sample.timestamp);

        if self.samples.is_full() {
            let _ = self.samples.try_pop();
            self.evicted += 1;
        }
        let _ = self.samples.try_push(sample);

        self.prune(sample.timestamp - retention_s);
        Ok(())
    }

    fn prune(&mut self, cutoff: f64) {
        while self.samples.occupied_len() > MIN_RETAINED {
            match self.samples.iter().next() {
                Some(oldest) if oldest.timestamp < cutoff => {
                    let _ = self.samples.try_pop();
                    self.evicted += 1;
                }
                _ => break,
            }
        }
    }

    fn valid(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter().filter(|s| s.valid)
    }

    /// Locate `t` among the valid samples.
    pub fn bracket(&self, t: f64) -> Bracket {
        let Some(oldest) = self.valid().next() else {
            return Bracket::NoData;
        };
        if t <= oldest.timestamp {
            return Bracket::Interpolate {
                from: *oldest,
                to: *oldest,
                factor: 0.0,
            };
        }

        let mut previous = *oldest;
        for sample in self.valid().skip(1) {
            if t <= sample.timestamp {
                let span = sample.timestamp - previous.timestamp;
                return Bracket::Interpolate {
                    from: previous,
                    to: *sample,
                    factor: (t - previous.timestamp) / span,
                };
            }
            previous = *sample;
        }

        match RecentSamples::collect_newest(self.valid()) {
            Some(history) => Bracket::ExtrapolateForward { history },
            None => Bracket::NoData,
        }
    }

    /// Valid samples, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.valid()
    }
}

/// Store-wide counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub segments: usize,
    pub samples: usize,
    pub accepted: u64,
    pub rejected: u64,
    pub evicted: u64,
}

/// Histories of every known segment
#[derive(Debug)]
pub struct SampleStore {
    histories: HashMap<SegmentId, SegmentHistory>,
    max_samples: usize,
    retention_s: f64,
    accepted: u64,
    rejected: u64,
    /// Evictions from histories that no longer exist
    evicted_removed: u64,
}

impl SampleStore {
    pub fn new(max_samples: usize, retention_s: f64) -> Self {
        Self {
            histories: HashMap::new(),
            max_samples,
            retention_s,
            accepted: 0,
            rejected: 0,
            evicted_removed: 0,
        }
    }

    /// Age window behind the newest sample that pruning preserves.
    pub fn set_retention(&mut self, retention_s: f64) {
        self.retention_s = retention_s.max(0.0);
    }

    pub fn retention(&self) -> f64 {
        self.retention_s
    }

    /// Record one sample. Rejected samples leave the history untouched.
    pub fn record(
        &mut self,
        segment: &SegmentId,
        timestamp: f64,
        transform: Transform,
        valid: bool,
    ) -> Result<()> {
        if !timestamp.is_finite() {
            self.rejected += 1;
            return Err(EngineError::InvalidTimestamp {
                segment: segment.clone(),
            });
        }

        let max_samples = self.max_samples;
        let retention_s = self.retention_s;
        let history = self
            .histories
            .entry(segment.clone())
            .or_insert_with(|| SegmentHistory::new(max_samples));

        let sample = Sample {
            timestamp,
            transform,
            valid,
        };
        match history.push(sample, retention_s) {
            Ok(()) => {
                self.accepted += 1;
                Ok(())
            }
            Err(last) => {
                self.rejected += 1;
                Err(EngineError::OutOfOrderSample {
                    segment: segment.clone(),
                    timestamp,
                    last,
                })
            }
        }
    }

    pub fn query_bracket(&self, segment: &SegmentId, t: f64) -> Bracket {
        self.histories
            .get(segment)
            .map(|history| history.bracket(t))
            .unwrap_or(Bracket::NoData)
    }

    pub fn history(&self, segment: &SegmentId) -> Option<&SegmentHistory> {
        self.histories.get(segment)
    }

    /// Drop histories for which `keep` returns false.
    pub fn retain(&mut self, mut keep: impl FnMut(&SegmentId) -> bool) -> usize {
        let before = self.histories.len();
        let mut evicted = 0;
        self.histories.retain(|id, history| {
            let kept = keep(id);
            if !kept {
                evicted += history.evicted_count();
            }
            kept
        });
        self.evicted_removed += evicted;
        before - self.histories.len()
    }

    /// Drop every history whose newest sample (valid or occluded) is older
    /// than `cutoff`. Returns the number of histories dropped.
    pub fn expire_before(&mut self, cutoff: f64) -> usize {
        let before = self.histories.len();
        let mut evicted = 0;
        self.histories.retain(|_, history| {
            let live = history.newest_timestamp().is_some_and(|t| t >= cutoff);
            if !live {
                evicted += history.evicted_count();
            }
            live
        });
        self.evicted_removed += evicted;
        before - self.histories.len()
    }

    pub fn clear(&mut self) {
        let evicted: u64 = self.histories.values().map(|h| h.evicted_count()).sum();
        self.evicted_removed += evicted;
        self.histories.clear();
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            segments: self.histories.len(),
            samples: self.histories.values().map(|h| h.len()).sum(),
            accepted: self.accepted,
            rejected: self.rejected,
            evicted: self.evicted_removed
                + self
                    .histories
                    .values()
                    .map(|h| h.evicted_count())
                    .sum::<u64>(),
        }
    }
}
