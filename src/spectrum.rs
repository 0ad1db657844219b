//! Raw spectra, energy calibration and detector resolution.

use serde::{Deserialize, Serialize};

use crate::constants::{
    BACKGROUND_EDGE_CHANNELS, CALIBRATION_OFFSET_TOLERANCE, CALIBRATION_WIDTH_TOLERANCE,
    FANO_COEFFICIENT_EV, MN_KA_EV,
};
use crate::error::{FitError, Result};
use crate::fit::ChannelInterval;

/// Linear channel-to-energy calibration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyCalibration {
    /// Energy at the lower edge of channel 0, in eV
    pub zero_offset_ev: f64,
    /// Energy width of one channel, in eV
    pub channel_width_ev: f64,
}

impl EnergyCalibration {
    pub fn new(zero_offset_ev: f64, channel_width_ev: f64) -> Self {
        Self {
            zero_offset_ev,
            channel_width_ev,
        }
    }

    /// Energy at the lower edge of `channel`
    pub fn min_energy(&self, channel: usize) -> f64 {
        self.zero_offset_ev + channel as f64 * self.channel_width_ev
    }

    /// Energy at the center of `channel`
    pub fn center_energy(&self, channel: usize) -> f64 {
        self.min_energy(channel) + 0.5 * self.channel_width_ev
    }

    /// Channel containing `energy_ev`; negative energies below the offset map to `None`
    pub fn channel(&self, energy_ev: f64) -> Option<usize> {
        let ch = ((energy_ev - self.zero_offset_ev) / self.channel_width_ev).floor();
        if ch.is_finite() && ch >= 0.0 {
            Some(ch as usize)
        } else {
            None
        }
    }

    /// Check that two calibrations put the same energy in the same channel
    pub fn check_compatible(&self, other: &EnergyCalibration) -> Result<()> {
        let width_err =
            (self.channel_width_ev - other.channel_width_ev).abs() / self.channel_width_ev;
        if width_err > CALIBRATION_WIDTH_TOLERANCE {
            return Err(FitError::IncompatibleCalibration(format!(
                "channel width {:.4} eV vs {:.4} eV",
                self.channel_width_ev, other.channel_width_ev
            )));
        }
        let offset_err = (self.zero_offset_ev - other.zero_offset_ev).abs();
        if offset_err > CALIBRATION_OFFSET_TOLERANCE * self.channel_width_ev {
            return Err(FitError::IncompatibleCalibration(format!(
                "zero offset {:.2} eV vs {:.2} eV",
                self.zero_offset_ev, other.zero_offset_ev
            )));
        }
        Ok(())
    }
}

impl Default for EnergyCalibration {
    fn default() -> Self {
        Self::new(0.0, 10.0)
    }
}

/// Detector line-shape model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorProfile {
    /// Full width at half maximum at Mn Kα, in eV
    pub fwhm_at_mn_ka_ev: f64,
}

impl DetectorProfile {
    pub fn new(fwhm_at_mn_ka_ev: f64) -> Self {
        Self { fwhm_at_mn_ka_ev }
    }

    /// Resolution at `energy_ev` from the Fano-noise model
    pub fn fwhm_ev(&self, energy_ev: f64) -> f64 {
        let fwhm_sq =
            self.fwhm_at_mn_ka_ev.powi(2) + FANO_COEFFICIENT_EV * (energy_ev - MN_KA_EV);
        // Very low energies can drive the model negative; floor at a quarter of the reference width
        fwhm_sq.max((0.25 * self.fwhm_at_mn_ka_ev).powi(2)).sqrt()
    }
}

impl Default for DetectorProfile {
    fn default() -> Self {
        Self::new(130.0)
    }
}

/// Acquisition metadata needed to compare intensities between spectra
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectrumProperties {
    pub live_time_s: f64,
    pub probe_current_na: f64,
    pub beam_energy_kev: f64,
}

impl SpectrumProperties {
    /// Electron dose in nA·s, if both factors are known
    pub fn dose(&self) -> Option<f64> {
        let dose = self.live_time_s * self.probe_current_na;
        (dose.is_finite() && dose > 0.0).then_some(dose)
    }
}

impl Default for SpectrumProperties {
    fn default() -> Self {
        Self {
            live_time_s: 60.0,
            probe_current_na: 1.0,
            beam_energy_kev: 20.0,
        }
    }
}

/// A measured or simulated X-ray spectrum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    pub counts: Vec<f64>,
    pub calibration: EnergyCalibration,
    #[serde(default)]
    pub properties: SpectrumProperties,
}

impl Spectrum {
    pub fn new(
        counts: Vec<f64>,
        calibration: EnergyCalibration,
        properties: SpectrumProperties,
    ) -> Self {
        Self {
            counts,
            calibration,
            properties,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.counts.len()
    }

    pub fn total_counts(&self) -> f64 {
        self.counts.iter().filter(|c| c.is_finite()).sum()
    }

    /// Scale used to put spectra on a common intensity footing
    ///
    /// Electron dose when known, otherwise total counts.
    pub fn normalization(&self) -> f64 {
        self.properties.dose().unwrap_or_else(|| self.total_counts())
    }

    /// Energy just below the beam energy; lines above it cannot be excited
    pub fn max_excited_energy_ev(&self) -> f64 {
        self.properties.beam_energy_kev * 1000.0
    }

    /// Reject spectra that cannot share a channel axis with `self`
    pub fn check_compatible(&self, other: &Spectrum) -> Result<()> {
        self.calibration.check_compatible(&other.calibration)?;
        if self.channel_count() != other.channel_count() {
            return Err(FitError::ChannelCountMismatch {
                expected: self.channel_count(),
                available: other.channel_count(),
            });
        }
        Ok(())
    }

    /// Background under `roi`, one value per ROI channel
    ///
    /// The background level on each side is the mean of a few channels just
    /// outside the ROI. ROIs at or above `linear_threshold_ev` interpolate
    /// linearly between the two sides. Lower ROIs, where the continuum is
    /// strongly curved, use the smaller side as a flat level.
    pub fn roi_background(&self, roi: ChannelInterval, linear_threshold_ev: f64) -> Vec<f64> {
        let n = self.channel_count();
        let roi = roi.clamp_to(n);
        if roi.is_empty() {
            return Vec::new();
        }

        let edge_mean = |range: ChannelInterval| -> Option<f64> {
            let range = range.clamp_to(n);
            if range.is_empty() {
                return None;
            }
            let sum: f64 = self.counts[range.low()..range.high()].iter().sum();
            Some(sum / range.len() as f64)
        };
        let below = edge_mean(ChannelInterval::new(
            roi.low().saturating_sub(BACKGROUND_EDGE_CHANNELS),
            roi.low(),
        ));
        let above = edge_mean(ChannelInterval::new(
            roi.high(),
            roi.high() + BACKGROUND_EDGE_CHANNELS,
        ));
        let (low_level, high_level) = match (below, above) {
            (Some(lo), Some(hi)) => (lo, hi),
            (Some(lo), None) => (lo, lo),
            (None, Some(hi)) => (hi, hi),
            (None, None) => (0.0, 0.0),
        };

        if self.calibration.min_energy(roi.low()) >= linear_threshold_ev {
            let span = roi.len() as f64;
            (0..roi.len())
                .map(|i| {
                    let t = (i as f64 + 0.5) / span;
                    low_level + t * (high_level - low_level)
                })
                .collect()
        } else {
            vec![low_level.min(high_level); roi.len()]
        }
    }

    /// Background-corrected counts within `roi`, clamped at zero per channel
    pub fn roi_net_counts(&self, roi: ChannelInterval, linear_threshold_ev: f64) -> Vec<f64> {
        let roi = roi.clamp_to(self.channel_count());
        let background = self.roi_background(roi, linear_threshold_ev);
        self.counts[roi.low()..roi.high()]
            .iter()
            .zip(background)
            .map(|(&c, b)| (c - b).max(0.0))
            .collect()
    }
}
