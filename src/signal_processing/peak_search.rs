use crate::signal_processing::FilteredSeries;

/// A local maximum found in a filtered spectrum
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub channel: usize,
    /// Filtered value over its standard error at the peak channel
    pub significance: f64,
}

/// Peak search on a filtered spectrum
///
/// Works on the significance trace (filtered value over its error). A peak
/// starts at a rising-edge crossing of the threshold; the reported channel is
/// the largest significance in a window after the crossing. Crossings closer
/// than the minimum separation to the previous one are ignored so the ringing
/// of the filter's side lobes does not produce extra peaks.
pub struct PeakSearch {
    threshold: f64,
    min_separation: usize,
    search_window: usize,
}

impl PeakSearch {
    /// Create a peak search
    ///
    /// # Arguments
    /// * `threshold` - Significance (in standard errors) a peak must exceed
    /// * `min_separation` - Minimum channels between reported crossings
    pub fn new(threshold: f64, min_separation: usize) -> Self {
        Self {
            threshold,
            min_separation,
            search_window: min_separation.max(1),
        }
    }

    /// Find all peaks inside the series' non-zero interval
    pub fn find_peaks(&self, series: &FilteredSeries) -> Vec<Peak> {
        let range = series.nonzero();
        let trace: Vec<f64> = (range.low()..range.high())
            .map(|ch| series.significance(ch))
            .collect();

        let mut peaks = Vec::new();
        let mut last = 0.0;
        let mut since_peak = self.min_separation;
        let mut above = false;
        for (i, &s) in trace.iter().enumerate() {
            since_peak += 1;
            let crossed = !above
                && last <= self.threshold
                && s > self.threshold
                && since_peak > self.min_separation;
            above = s > self.threshold;
            last = s;
            if !crossed {
                continue;
            }
            since_peak = 0;

            let end = (i + self.search_window).min(trace.len());
            let mut best = i;
            for (j, &candidate) in trace[i..end].iter().enumerate() {
                if candidate > trace[best] {
                    best = i + j;
                }
            }
            peaks.push(Peak {
                channel: range.low() + best,
                significance: trace[best],
            });
        }
        peaks
    }
}
