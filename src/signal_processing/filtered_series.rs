use crate::fit::ChannelInterval;

/// A spectrum after convolution with a [`FittingFilter`](super::FittingFilter)
///
/// Arrays span the full channel range of the source spectrum; only channels
/// inside [`nonzero`](Self::nonzero) carry filtered values.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredSeries {
    data: Vec<f64>,
    variance: Vec<f64>,
    nonzero: ChannelInterval,
    normalization: f64,
}

impl FilteredSeries {
    pub fn new(
        data: Vec<f64>,
        variance: Vec<f64>,
        nonzero: ChannelInterval,
        normalization: f64,
    ) -> Self {
        Self {
            data,
            variance,
            nonzero,
            normalization,
        }
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Per-channel variance of the filtered values
    pub fn variance(&self) -> &[f64] {
        &self.variance
    }

    /// Per-channel standard error of the filtered values
    pub fn errors(&self) -> Vec<f64> {
        self.variance.iter().map(|v| v.sqrt()).collect()
    }

    pub fn nonzero(&self) -> ChannelInterval {
        self.nonzero
    }

    pub fn normalization(&self) -> f64 {
        self.normalization
    }

    pub fn channel_count(&self) -> usize {
        self.data.len()
    }

    /// Filtered value over its standard error; zero where the error vanishes
    pub fn significance(&self, channel: usize) -> f64 {
        match (self.data.get(channel), self.variance.get(channel)) {
            (Some(&v), Some(&var)) if var > 0.0 && v.is_finite() => v / var.sqrt(),
            _ => 0.0,
        }
    }
}
