//! Channel interval algebra
//!
//! The design matrix is assembled only over channels where at least one active
//! reference is non-zero. A [`ChannelCover`] is the sorted, non-overlapping
//! union of those ranges; extracting any full-length channel array over the
//! same cover yields index-aligned samples.

use std::fmt;

use serde::Serialize;

/// Half-open channel range `[low, high)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ChannelInterval {
    low: usize,
    high: usize,
}

impl ChannelInterval {
    /// Create an interval; `high < low` collapses to an empty interval at `low`
    pub fn new(low: usize, high: usize) -> Self {
        Self {
            low,
            high: high.max(low),
        }
    }

    pub fn empty() -> Self {
        Self { low: 0, high: 0 }
    }

    pub fn low(&self) -> usize {
        self.low
    }

    pub fn high(&self) -> usize {
        self.high
    }

    pub fn len(&self) -> usize {
        self.high - self.low
    }

    pub fn is_empty(&self) -> bool {
        self.high == self.low
    }

    pub fn contains(&self, channel: usize) -> bool {
        channel >= self.low && channel < self.high
    }

    /// True when the two intervals overlap or share an endpoint
    pub fn touches(&self, other: &ChannelInterval) -> bool {
        self.low <= other.high && other.low <= self.high
    }

    pub fn intersect(&self, other: &ChannelInterval) -> ChannelInterval {
        ChannelInterval::new(self.low.max(other.low), self.high.min(other.high))
    }

    /// Restrict to the channels of an `n`-channel spectrum
    pub fn clamp_to(&self, n: usize) -> ChannelInterval {
        self.intersect(&ChannelInterval::new(0, n))
    }

    fn merge(&self, other: &ChannelInterval) -> ChannelInterval {
        ChannelInterval::new(self.low.min(other.low), self.high.max(other.high))
    }
}

impl fmt::Display for ChannelInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.low, self.high)
    }
}

/// Sorted, non-overlapping set of channel intervals
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelCover {
    intervals: Vec<ChannelInterval>,
}

impl ChannelCover {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `interval`, merging with every interval it overlaps or touches
    pub fn union(&mut self, interval: ChannelInterval) {
        if interval.is_empty() {
            return;
        }
        let mut merged = interval;
        let mut result = Vec::with_capacity(self.intervals.len() + 1);
        let mut inserted = false;
        for existing in self.intervals.drain(..) {
            if existing.touches(&merged) {
                merged = merged.merge(&existing);
            } else if existing.high < merged.low {
                result.push(existing);
            } else {
                if !inserted {
                    result.push(merged);
                    inserted = true;
                }
                result.push(existing);
            }
        }
        if !inserted {
            result.push(merged);
        }
        self.intervals = result;
    }

    pub fn intervals(&self) -> &[ChannelInterval] {
        &self.intervals
    }

    /// Total number of channels covered
    pub fn len(&self) -> usize {
        self.intervals.iter().map(ChannelInterval::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Covered channel indices in ascending order
    pub fn channels(&self) -> impl Iterator<Item = usize> + '_ {
        self.intervals.iter().flat_map(|iv| iv.low..iv.high)
    }

    /// Concatenate the samples of `data` inside each interval, in interval order
    ///
    /// Channels past the end of `data` read as zero so that every array
    /// extracted over the same cover has the same length.
    pub fn extract(&self, data: &[f64]) -> Vec<f64> {
        self.channels()
            .map(|ch| data.get(ch).copied().unwrap_or(0.0))
            .collect()
    }
}

impl FromIterator<ChannelInterval> for ChannelCover {
    fn from_iter<I: IntoIterator<Item = ChannelInterval>>(iter: I) -> Self {
        let mut cover = Self::new();
        for interval in iter {
            cover.union(interval);
        }
        cover
    }
}
