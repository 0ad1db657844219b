use std::cell::OnceCell;
use std::sync::Arc;

use crate::element::{Element, LineFamily, RegionOfInterest, TransitionSet};
use crate::error::Result;
use crate::fit::{ChannelInterval, UncertainValue};
use crate::signal_processing::{FilteredSeries, FittingFilter};
use crate::spectrum::Spectrum;

/// One filtered reference: an element's ROI cut from a reference spectrum
///
/// The background-corrected ROI counts and their integral are computed on
/// first access and dropped whenever the background threshold changes or the
/// entry is re-filtered.
#[derive(Debug, Clone)]
pub struct ReferenceEntry {
    element: Element,
    roi: RegionOfInterest,
    transitions: TransitionSet,
    spectrum: Arc<Spectrum>,
    filtered: FilteredSeries,
    kratio: UncertainValue,
    background_threshold_ev: f64,
    net_counts: OnceCell<Vec<f64>>,
    peak_integral: OnceCell<UncertainValue>,
}

impl ReferenceEntry {
    pub(crate) fn new(
        roi: RegionOfInterest,
        spectrum: Arc<Spectrum>,
        filter: &FittingFilter,
        background_threshold_ev: f64,
    ) -> Result<Self> {
        let transitions = roi.transition_set()?;
        let filtered = filter.apply(&spectrum, roi.interval());
        Ok(Self {
            element: transitions.element(),
            roi,
            transitions,
            spectrum,
            filtered,
            kratio: UncertainValue::zero(),
            background_threshold_ev,
            net_counts: OnceCell::new(),
            peak_integral: OnceCell::new(),
        })
    }

    pub fn element(&self) -> Element {
        self.element
    }

    pub fn roi(&self) -> &RegionOfInterest {
        &self.roi
    }

    pub fn transitions(&self) -> &TransitionSet {
        &self.transitions
    }

    pub fn family(&self) -> Option<LineFamily> {
        self.transitions.family()
    }

    pub fn spectrum(&self) -> &Spectrum {
        &self.spectrum
    }

    pub fn filtered(&self) -> &FilteredSeries {
        &self.filtered
    }

    /// Channels where the filtered reference may be non-zero
    pub fn nonzero(&self) -> ChannelInterval {
        self.filtered.nonzero()
    }

    pub fn normalization(&self) -> f64 {
        self.filtered.normalization()
    }

    pub fn kratio(&self) -> UncertainValue {
        self.kratio
    }

    pub(crate) fn set_kratio(&mut self, kratio: UncertainValue) {
        self.kratio = kratio;
    }

    /// Background-corrected reference counts, one value per ROI channel
    pub fn net_counts(&self) -> &[f64] {
        self.net_counts.get_or_init(|| {
            self.spectrum
                .roi_net_counts(self.roi.interval(), self.background_threshold_ev)
        })
    }

    /// Background-corrected reference counts summed over the ROI
    ///
    /// The uncertainty is the Poisson error of the gross counts.
    pub fn peak_integral(&self) -> UncertainValue {
        *self.peak_integral.get_or_init(|| {
            let net: f64 = self.net_counts().iter().sum();
            let roi = self.roi.interval().clamp_to(self.spectrum.channel_count());
            let gross: f64 = self.spectrum.counts[roi.low()..roi.high()]
                .iter()
                .map(|c| c.max(0.0))
                .sum();
            UncertainValue::new(net, gross.sqrt())
        })
    }

    pub(crate) fn set_background_threshold(&mut self, threshold_ev: f64) {
        self.background_threshold_ev = threshold_ev;
        self.net_counts.take();
        self.peak_integral.take();
    }

    pub(crate) fn refilter(&mut self, filter: &FittingFilter) {
        self.filtered = filter.apply(&self.spectrum, self.roi.interval());
        self.kratio = UncertainValue::zero();
    }
}
