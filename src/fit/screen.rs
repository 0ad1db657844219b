use std::collections::BTreeSet;

use crate::config::PeakSearchConfig;
use crate::element::{Element, LineTable};
use crate::signal_processing::{FilteredSeries, PeakSearch};
use crate::spectrum::{DetectorProfile, EnergyCalibration};

/// Lines with at least this relative weight must show a peak for an element to be likely
const SCREEN_MIN_LINE_WEIGHT: f64 = 0.5;

/// What a screen needs to know about the measurement
pub struct ScreenContext<'a> {
    pub calibration: &'a EnergyCalibration,
    pub detector: &'a DetectorProfile,
    pub lines: &'a LineTable,
}

/// Pre-fit guess at which elements are present in the unknown
pub trait ElementScreen {
    fn likely_elements(
        &self,
        unknown: &FilteredSeries,
        candidates: &BTreeSet<Element>,
        context: &ScreenContext<'_>,
    ) -> BTreeSet<Element>;
}

/// Screen that keeps elements with a strong line near a peak of the filtered unknown
pub struct PeakSearchScreen {
    config: PeakSearchConfig,
    reference_fwhm_ev: f64,
}

impl PeakSearchScreen {
    pub fn new(config: PeakSearchConfig, reference_fwhm_ev: f64) -> Self {
        Self {
            config,
            reference_fwhm_ev,
        }
    }
}

impl ElementScreen for PeakSearchScreen {
    fn likely_elements(
        &self,
        unknown: &FilteredSeries,
        candidates: &BTreeSet<Element>,
        context: &ScreenContext<'_>,
    ) -> BTreeSet<Element> {
        let channel_width = context.calibration.channel_width_ev;
        let min_separation = (self.config.min_separation_fwhm * self.reference_fwhm_ev
            / channel_width)
            .round() as usize;
        let peaks =
            PeakSearch::new(self.config.threshold_sigma, min_separation).find_peaks(unknown);
        let peak_energies: Vec<f64> = peaks
            .iter()
            .map(|p| context.calibration.center_energy(p.channel))
            .collect();
        log::debug!("Peak search found {} peaks", peak_energies.len());

        candidates
            .iter()
            .copied()
            .filter(|&element| {
                context
                    .lines
                    .transitions(element)
                    .iter()
                    .filter(|t| t.weight >= SCREEN_MIN_LINE_WEIGHT)
                    .any(|t| {
                        let tolerance = self.config.match_tolerance_fwhm
                            * context.detector.fwhm_ev(t.energy_ev);
                        peak_energies
                            .iter()
                            .any(|&e| (e - t.energy_ev).abs() <= tolerance)
                    })
            })
            .collect()
    }
}
