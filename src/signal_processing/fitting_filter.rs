use crate::config::FilterKind;
use crate::error::{FitError, Result};
use crate::fit::ChannelInterval;
use crate::signal_processing::FilteredSeries;
use crate::spectrum::Spectrum;

/// Zero-sum background-suppression kernel
///
/// Convolving a spectrum with this kernel removes any locally constant (and,
/// to first order, linear) background while keeping peak-shaped features.
/// Every kernel is scaled so its positive lobe sums to one, which makes the
/// variance correction factor `1 / Σ k²`. For the top-hat with plateau `u`
/// and side lobes `l` this is `2·u·l / (u + 2·l)`.
#[derive(Debug, Clone)]
pub struct FittingFilter {
    kind: FilterKind,
    coefficients: Vec<f64>,
    vcf: f64,
}

impl FittingFilter {
    /// Design a kernel of the given kind for a target full width
    ///
    /// # Arguments
    /// * `width_ev` - Target width, usually the detector FWHM at a reference energy
    /// * `channel_width_ev` - Energy per channel
    pub fn new(kind: FilterKind, width_ev: f64, channel_width_ev: f64) -> Result<Self> {
        if !(width_ev > 0.0 && channel_width_ev > 0.0) {
            return Err(FitError::FilterDesign(format!(
                "width {} eV / channel width {} eV must be positive",
                width_ev, channel_width_ev
            )));
        }
        let width_ch = width_ev / channel_width_ev;
        let m = ((width_ch / 2.0).round() as usize).max(1);
        match kind {
            FilterKind::TopHat => Self::top_hat(m, m),
            FilterKind::GaussianDerivative => Self::gaussian_derivative(width_ch),
            FilterKind::SavitzkyGolay => Self::savitzky_golay(m),
        }
    }

    /// Top-hat with a `2m+1` channel plateau and two `side` channel negative lobes
    pub fn top_hat(m: usize, side: usize) -> Result<Self> {
        if side == 0 {
            return Err(FitError::FilterDesign(
                "top-hat side lobes must be at least one channel".to_string(),
            ));
        }
        let u = 2 * m + 1;
        let mut kernel = vec![-1.0 / (2 * side) as f64; u + 2 * side];
        for k in kernel.iter_mut().skip(side).take(u) {
            *k = 1.0 / u as f64;
        }
        Self::from_kernel(FilterKind::TopHat, kernel)
    }

    /// Negated second derivative of a Gaussian with the given FWHM (in channels)
    pub fn gaussian_derivative(fwhm_channels: f64) -> Result<Self> {
        let sigma = fwhm_channels / 2.354_820_045;
        if !(sigma > 0.0) {
            return Err(FitError::FilterDesign(format!(
                "invalid Gaussian width {}",
                fwhm_channels
            )));
        }
        let h = ((3.0 * sigma).ceil() as usize).max(2);
        let mut kernel: Vec<f64> = (0..=2 * h)
            .map(|i| {
                let x = i as f64 - h as f64;
                let r = x * x / (sigma * sigma);
                (1.0 - r) * (-0.5 * r).exp()
            })
            .collect();
        // Truncation leaves a small residual sum
        let mean = kernel.iter().sum::<f64>() / kernel.len() as f64;
        for k in kernel.iter_mut() {
            *k -= mean;
        }
        Self::from_kernel(FilterKind::GaussianDerivative, kernel)
    }

    /// Negated quadratic Savitzky–Golay second-derivative kernel over `2m+1` points
    pub fn savitzky_golay(m: usize) -> Result<Self> {
        if m == 0 {
            return Err(FitError::FilterDesign(
                "Savitzky-Golay half width must be at least one channel".to_string(),
            ));
        }
        let mm = (m * (m + 1)) as f64;
        let kernel = (0..=2 * m)
            .map(|i| {
                let j = i as f64 - m as f64;
                mm - 3.0 * j * j
            })
            .collect();
        Self::from_kernel(FilterKind::SavitzkyGolay, kernel)
    }

    fn from_kernel(kind: FilterKind, mut kernel: Vec<f64>) -> Result<Self> {
        let positive: f64 = kernel.iter().filter(|&&k| k > 0.0).sum();
        if !(positive.is_finite() && positive > 0.0) {
            return Err(FitError::FilterDesign(format!(
                "{:?} kernel has no positive lobe",
                kind
            )));
        }
        for k in kernel.iter_mut() {
            *k /= positive;
        }
        let sum_sq: f64 = kernel.iter().map(|k| k * k).sum();
        Ok(Self {
            kind,
            coefficients: kernel,
            vcf: 1.0 / sum_sq,
        })
    }

    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn num_taps(&self) -> usize {
        self.coefficients.len()
    }

    /// Channels on each side of the kernel center
    pub fn half_width(&self) -> usize {
        (self.coefficients.len() - 1) / 2
    }

    /// Factor converting raw fit-coefficient variance into count-statistical variance
    pub fn variance_correction_factor(&self) -> f64 {
        self.vcf
    }

    /// Filter `spectrum`, keeping output only for channels inside `window`
    ///
    /// Channels where the kernel would run off either end of the spectrum are
    /// left at zero, so the non-zero interval is `window` shrunk to the
    /// fully-supported channels.
    pub fn apply(&self, spectrum: &Spectrum, window: ChannelInterval) -> FilteredSeries {
        let raw = &spectrum.counts;
        let n = raw.len();
        let h = self.half_width();
        let supported = if n > 2 * h {
            ChannelInterval::new(h, n - h)
        } else {
            ChannelInterval::empty()
        };
        let nonzero = window.clamp_to(n).intersect(&supported);

        let mut data = vec![0.0; n];
        let mut variance = vec![0.0; n];
        for i in nonzero.low()..nonzero.high() {
            let start = i - h;
            let mut acc = 0.0;
            let mut var = 0.0;
            for (k, &x) in self.coefficients.iter().zip(&raw[start..start + self.num_taps()]) {
                acc += k * x;
                var += k * k * x.max(0.0);
            }
            data[i] = acc;
            variance[i] = var;
        }

        FilteredSeries::new(data, variance, nonzero, spectrum.normalization())
    }
}
