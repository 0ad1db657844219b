use serde::Deserialize;

use crate::element::{Element, LineTable};
use crate::spectrum::{DetectorProfile, EnergyCalibration, Spectrum, SpectrumProperties};

use super::{NoiseConfig, apply_counting_noise};

const FWHM_TO_SIGMA: f64 = 1.0 / 2.354_820_045;

/// Kramers-law bremsstrahlung with a crude low-energy absorption edge
///
/// `I(E) = amplitude · (E0 − E) / E · exp(−(absorption / E)³)` counts per
/// channel per nA·s, energies in keV.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ContinuumConfig {
    pub amplitude: f64,
    pub absorption_kev: f64,
}

impl Default for ContinuumConfig {
    fn default() -> Self {
        Self {
            amplitude: 0.05,
            absorption_kev: 1.0,
        }
    }
}

impl ContinuumConfig {
    fn intensity(&self, energy_kev: f64, beam_kev: f64) -> f64 {
        if energy_kev <= 0.0 || energy_kev >= beam_kev {
            return 0.0;
        }
        let absorption = (-(self.absorption_kev / energy_kev).powi(3)).exp();
        self.amplitude * (beam_kev - energy_kev) / energy_kev * absorption
    }
}

/// Noise-free description of a spectrum: continuum plus Gaussian peaks
///
/// Peak areas, the continuum and the flat background are per nA·s; the
/// generated counts scale with the dose in `properties`.
#[derive(Clone, Debug)]
pub struct SpectrumModel {
    pub calibration: EnergyCalibration,
    pub detector: DetectorProfile,
    pub properties: SpectrumProperties,
    pub channel_count: usize,
    pub continuum: Option<ContinuumConfig>,
    /// Flat background in counts per channel
    pub background: f64,
    peaks: Vec<(f64, f64)>,
}

impl SpectrumModel {
    pub fn new(
        calibration: EnergyCalibration,
        detector: DetectorProfile,
        properties: SpectrumProperties,
        channel_count: usize,
    ) -> Self {
        Self {
            calibration,
            detector,
            properties,
            channel_count,
            continuum: None,
            background: 0.0,
            peaks: Vec::new(),
        }
    }

    pub fn with_continuum(mut self, continuum: ContinuumConfig) -> Self {
        self.continuum = Some(continuum);
        self
    }

    pub fn with_background(mut self, level: f64) -> Self {
        self.background = level;
        self
    }

    pub fn with_peak(mut self, energy_ev: f64, area: f64) -> Self {
        self.peaks.push((energy_ev, area));
        self
    }

    /// Add every line of `element`, each with area `intensity · weight`
    pub fn with_element(mut self, lines: &LineTable, element: Element, intensity: f64) -> Self {
        let beam_ev = self.properties.beam_energy_kev * 1000.0;
        for t in lines.transitions(element) {
            if t.energy_ev < beam_ev {
                self.peaks.push((t.energy_ev, intensity * t.weight));
            }
        }
        self
    }

    /// Mean counts per channel
    pub fn expected_counts(&self) -> Vec<f64> {
        let dose = self.properties.dose().unwrap_or(1.0);
        let width = self.calibration.channel_width_ev;
        let beam_kev = self.properties.beam_energy_kev;

        (0..self.channel_count)
            .map(|ch| {
                let e = self.calibration.center_energy(ch);
                let continuum = self
                    .continuum
                    .as_ref()
                    .map_or(0.0, |c| c.intensity(e / 1000.0, beam_kev));
                let peaks: f64 = self
                    .peaks
                    .iter()
                    .map(|&(energy, area)| {
                        let sigma = self.detector.fwhm_ev(energy) * FWHM_TO_SIGMA;
                        let x = (e - energy) / sigma;
                        area * width * (-0.5 * x * x).exp()
                            / (sigma * (2.0 * std::f64::consts::PI).sqrt())
                    })
                    .sum();
                dose * (self.background + continuum + peaks)
            })
            .collect()
    }

    /// Noise-free spectrum
    pub fn spectrum(&self) -> Spectrum {
        Spectrum::new(self.expected_counts(), self.calibration, self.properties)
    }

    /// Spectrum with counting noise
    pub fn generate(&self, noise: &NoiseConfig) -> Spectrum {
        let counts = apply_counting_noise(&self.expected_counts(), noise);
        Spectrum::new(counts, self.calibration, self.properties)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn model() -> SpectrumModel {
        SpectrumModel::new(
            EnergyCalibration::new(0.0, 10.0),
            DetectorProfile::new(130.0),
            SpectrumProperties::default(),
            2048,
        )
    }

    #[test]
    fn test_peak_area_scales_with_dose() {
        let counts = model().with_peak(6403.8, 1000.0).expected_counts();
        let total: f64 = counts.iter().sum();
        // 60 s at 1 nA
        assert_relative_eq!(total, 60_000.0, max_relative = 1e-3);
    }

    #[test]
    fn test_continuum_vanishes_above_beam_energy() {
        let counts = model()
            .with_continuum(ContinuumConfig::default())
            .expected_counts();
        assert!(counts[300] > 0.0);
        assert_eq!(counts[2001], 0.0);
        // Absorbed at very low energy
        assert!(counts[10] < counts[300]);
    }
}
