//! Filter-fit orchestrator
//!
//! [`FilterFit`] owns the filtered references and the filtered unknown. A fit
//! expresses the filtered unknown as a weighted sum of filtered references
//! over the channels where at least one active reference is non-zero, then
//! drops references with negative coefficients and elements rejected by the
//! culling policy until neither set changes.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::{FilterKind, FitConfig};
use crate::constants::SENTINEL_ERROR;
use crate::cull::{CullingContext, CullingPolicy};
use crate::element::{Element, LineTable, RegionOfInterest, XRayTransition};
use crate::error::{FitError, Result};
use crate::fit::{
    ChannelCover, ChannelInterval, ElementScreen, FitDesign, KRatioSet, PeakSearchScreen,
    ReferenceEntry, ScreenContext, SvdSolver, UncertainValue, WeightedSolver,
};
use crate::signal_processing::{FilteredSeries, FittingFilter};
use crate::spectrum::{DetectorProfile, EnergyCalibration, Spectrum};

/// Where the orchestrator is in its fit cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitStatus {
    /// Inputs changed since the last fit
    Dirty,
    /// The exclusion and removal sets reached a fixed point
    Converged,
    /// Every reference ended up excluded; all k-ratios are zero
    Exhausted,
}

/// Exclusion bookkeeping of one fit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitState {
    excluded: BTreeSet<usize>,
    forced: BTreeSet<Element>,
    removed: BTreeSet<Element>,
}

impl FitState {
    /// Indices of references left out of the design
    pub fn excluded(&self) -> &BTreeSet<usize> {
        &self.excluded
    }

    /// Elements the caller forced to zero
    pub fn forced(&self) -> &BTreeSet<Element> {
        &self.forced
    }

    /// Elements removed by culling
    pub fn removed(&self) -> &BTreeSet<Element> {
        &self.removed
    }
}

/// Result of the last fit
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub status: FitStatus,
    pub kratios: KRatioSet,
    /// Passes through the fit loop
    pub iterations: usize,
    /// Linear solves performed
    pub fit_events: usize,
    /// Chi-squared of the last solve (zero when nothing was solved)
    pub chi_squared: f64,
    pub state: FitState,
    /// Removed set after each pass
    pub removal_history: Vec<BTreeSet<Element>>,
}

struct UnknownSeries {
    spectrum: Arc<Spectrum>,
    filtered: FilteredSeries,
    errors: Vec<f64>,
}

impl UnknownSeries {
    fn new(spectrum: Arc<Spectrum>, filter: &FittingFilter) -> Self {
        let filtered = filter.apply(&spectrum, ChannelInterval::new(0, spectrum.channel_count()));
        let errors = filtered.errors();
        Self {
            spectrum,
            filtered,
            errors,
        }
    }
}

/// Filter-fit quantification engine
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use filterfit::FilterFit;
/// use filterfit::config::FitConfig;
/// use filterfit::element::LineTable;
/// use filterfit::spectrum::{DetectorProfile, EnergyCalibration, Spectrum};
///
/// # fn load(_: &str) -> Spectrum { unimplemented!() }
/// let lines = LineTable::from_toml_str(r#"
///     [[line]]
///     element = "Fe"
///     family = "K"
///     name = "Ka1"
///     energy_ev = 6403.8
///
///     [[line]]
///     element = "Ni"
///     family = "K"
///     name = "Ka1"
///     energy_ev = 7478.2
/// "#)
/// .unwrap();
/// let lines = Arc::new(lines);
/// let mut fit = FilterFit::new(
///     EnergyCalibration::new(0.0, 10.0),
///     DetectorProfile::new(130.0),
///     lines,
///     FitConfig::default(),
/// )
/// .unwrap();
/// fit.add_reference("Fe".parse().unwrap(), load("fe.json")).unwrap();
/// fit.add_reference("Ni".parse().unwrap(), load("ni.json")).unwrap();
/// let kratios = fit.kratios(&load("unknown.json")).unwrap();
/// for (transitions, k) in kratios.iter() {
///     println!("{}: {}", transitions, k);
/// }
/// ```
pub struct FilterFit {
    config: FitConfig,
    calibration: EnergyCalibration,
    detector: DetectorProfile,
    lines: Arc<LineTable>,
    filter: Arc<FittingFilter>,
    solver: Box<dyn WeightedSolver>,
    screen: Box<dyn ElementScreen>,
    references: Vec<ReferenceEntry>,
    unknown: Option<UnknownSeries>,
    forced_zero: BTreeSet<Element>,
    outcome: Option<FitOutcome>,
    dirty: bool,
}

impl FilterFit {
    /// Create an orchestrator for spectra sharing `calibration`
    ///
    /// The filter width is the detector FWHM at the configured reference
    /// energy, scaled by `config.filter.width_scale`.
    pub fn new(
        calibration: EnergyCalibration,
        detector: DetectorProfile,
        lines: Arc<LineTable>,
        config: FitConfig,
    ) -> Result<Self> {
        let filter = design_filter(config.filter.kind, &config, &calibration, &detector)?;
        let reference_fwhm = detector.fwhm_ev(config.filter.reference_energy_ev);
        let screen = PeakSearchScreen::new(config.peak_search.clone(), reference_fwhm);
        Ok(Self {
            config,
            calibration,
            detector,
            lines,
            filter: Arc::new(filter),
            solver: Box::new(SvdSolver::default()),
            screen: Box::new(screen),
            references: Vec::new(),
            unknown: None,
            forced_zero: BTreeSet::new(),
            outcome: None,
            dirty: true,
        })
    }

    /// Register `spectrum` as the reference for every visible line of `element`
    ///
    /// Replaces any references previously registered for `element`. ROIs the
    /// filter cannot reach are skipped. Fails when no line of `element` is left.
    pub fn add_reference(&mut self, element: Element, spectrum: Spectrum) -> Result<()> {
        self.check_reference(&spectrum)?;
        let rois = self.build_rois(element, &spectrum);
        if rois.is_empty() {
            return Err(FitError::NoTransitions(element));
        }

        let spectrum = Arc::new(spectrum);
        let mut entries = rois
            .into_iter()
            .map(|roi| {
                ReferenceEntry::new(
                    roi,
                    Arc::clone(&spectrum),
                    &self.filter,
                    self.config.residual_threshold_ev,
                )
            })
            .collect::<Result<Vec<_>>>()?;
        entries.retain(|entry| {
            let supported = !entry.nonzero().is_empty();
            if !supported {
                log::warn!(
                    "{}: ROI {} lies where the filter has no support, skipping",
                    entry.transitions(),
                    entry.roi().interval()
                );
            }
            supported
        });
        if entries.is_empty() {
            return Err(FitError::NoTransitions(element));
        }

        log::debug!("{}: {} reference ROIs", element, entries.len());
        self.references.retain(|e| e.element() != element);
        self.references.extend(entries);
        self.invalidate();
        Ok(())
    }

    /// Register `spectrum` as the reference for a single region of interest
    ///
    /// Replaces an earlier reference for the same element and channel range.
    /// Fails when the filter has no support inside the ROI.
    pub fn add_reference_roi(&mut self, roi: RegionOfInterest, spectrum: Spectrum) -> Result<()> {
        self.check_reference(&spectrum)?;
        let entry = ReferenceEntry::new(
            roi,
            Arc::new(spectrum),
            &self.filter,
            self.config.residual_threshold_ev,
        )?;
        if entry.nonzero().is_empty() {
            return Err(FitError::Config(format!(
                "ROI {} of {} lies where the filter has no support",
                entry.roi().interval(),
                entry.transitions()
            )));
        }
        match self.references.iter_mut().find(|e| {
            e.element() == entry.element() && e.roi().interval() == entry.roi().interval()
        }) {
            Some(existing) => *existing = entry,
            None => self.references.push(entry),
        }
        self.invalidate();
        Ok(())
    }

    /// Drop every reference of `element`; returns whether any was registered
    pub fn remove_reference(&mut self, element: Element) -> bool {
        let before = self.references.len();
        self.references.retain(|e| e.element() != element);
        let removed = self.references.len() != before;
        if removed {
            self.invalidate();
        }
        removed
    }

    /// Exclude `elements` from every subsequent fit
    pub fn force_zero(&mut self, elements: impl IntoIterator<Item = Element>) {
        self.forced_zero.extend(elements);
        self.invalidate();
    }

    pub fn clear_forced_zero(&mut self) {
        self.forced_zero.clear();
        self.invalidate();
    }

    /// Filter `spectrum` and make it the spectrum under analysis
    pub fn set_unknown(&mut self, spectrum: Spectrum) -> Result<()> {
        self.calibration.check_compatible(&spectrum.calibration)?;
        if let Some(reference) = self.references.first() {
            reference.spectrum().check_compatible(&spectrum)?;
        }
        self.unknown = Some(UnknownSeries::new(Arc::new(spectrum), &self.filter));
        self.invalidate();
        Ok(())
    }

    /// Fitted k-ratio of every reference ROI, refitting if anything changed
    pub fn kratios(&mut self, unknown: &Spectrum) -> Result<KRatioSet> {
        self.use_unknown(unknown)?;
        self.perform()?;
        Ok(self
            .outcome
            .as_ref()
            .map(|o| o.kratios.clone())
            .unwrap_or_default())
    }

    /// Fraction of the filtered unknown left unexplained by the fit
    ///
    /// `Σ|filtered residual| / Σ|filtered unknown|` over the channels of all
    /// reference ROIs, clamped to `[0, 1]`. Zero when the unknown has no
    /// filtered signal there.
    pub fn fit_metric(&mut self, unknown: &Spectrum) -> Result<f64> {
        let residual = self.filtered_residual(unknown)?;
        let Some(series) = self.unknown.as_ref() else {
            return Err(FitError::NoUnknown);
        };
        let cover: ChannelCover = self.references.iter().map(|e| e.nonzero()).collect();
        let unexplained: f64 = cover.extract(&residual).iter().map(|v| v.abs()).sum();
        let total: f64 = cover
            .extract(series.filtered.data())
            .iter()
            .map(|v| v.abs())
            .sum();
        if total > 0.0 {
            Ok((unexplained / total).clamp(0.0, 1.0))
        } else {
            Ok(0.0)
        }
    }

    /// Filtered unknown minus the k-ratio weighted filtered references
    pub fn filtered_residual(&mut self, unknown: &Spectrum) -> Result<Vec<f64>> {
        self.use_unknown(unknown)?;
        self.perform()?;
        let Some(series) = self.unknown.as_ref() else {
            return Err(FitError::NoUnknown);
        };
        let mut residual = series.filtered.data().to_vec();
        for entry in &self.references {
            let k = entry.kratio().value();
            if k <= 0.0 {
                continue;
            }
            let scale = k * series.filtered.normalization() / entry.normalization();
            let nonzero = entry.nonzero();
            let data = entry.filtered().data();
            for ch in nonzero.low()..nonzero.high() {
                residual[ch] -= scale * data[ch];
            }
        }
        Ok(residual)
    }

    /// Raw unknown minus the background-corrected reference ROIs, scaled by k-ratio
    ///
    /// With `subset`, only the references of those elements are subtracted.
    pub fn residual_spectrum(
        &mut self,
        unknown: &Spectrum,
        subset: Option<&BTreeSet<Element>>,
    ) -> Result<Spectrum> {
        self.use_unknown(unknown)?;
        self.perform()?;
        let Some(series) = self.unknown.as_ref() else {
            return Err(FitError::NoUnknown);
        };
        let raw = &series.spectrum;
        let mut counts = raw.counts.clone();
        let unknown_norm = raw.normalization();
        for entry in &self.references {
            if subset.is_some_and(|s| !s.contains(&entry.element())) {
                continue;
            }
            let k = entry.kratio().value();
            if k <= 0.0 {
                continue;
            }
            let scale = k * unknown_norm / entry.spectrum().normalization();
            let roi = entry.roi().interval().clamp_to(counts.len());
            for (c, net) in counts[roi.low()..roi.high()]
                .iter_mut()
                .zip(entry.net_counts())
            {
                *c -= scale * net;
            }
        }
        Ok(Spectrum::new(counts, raw.calibration, raw.properties))
    }

    /// Linear solves performed by the last fit
    pub fn fit_event_count(&self) -> usize {
        self.outcome.as_ref().map_or(0, |o| o.fit_events)
    }

    /// Result of the last fit, if one has run since the inputs last changed
    pub fn outcome(&self) -> Option<&FitOutcome> {
        if self.dirty {
            None
        } else {
            self.outcome.as_ref()
        }
    }

    pub fn status(&self) -> FitStatus {
        match (&self.outcome, self.dirty) {
            (Some(outcome), false) => outcome.status,
            _ => FitStatus::Dirty,
        }
    }

    /// Elements with at least one registered reference
    pub fn elements(&self) -> BTreeSet<Element> {
        self.references.iter().map(ReferenceEntry::element).collect()
    }

    pub fn entries(&self) -> &[ReferenceEntry] {
        &self.references
    }

    pub fn forced_zero(&self) -> &BTreeSet<Element> {
        &self.forced_zero
    }

    pub fn filter(&self) -> &Arc<FittingFilter> {
        &self.filter
    }

    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    pub fn set_strip_unlikely(&mut self, strip: bool) {
        if self.config.strip_unlikely != strip {
            self.config.strip_unlikely = strip;
            self.invalidate();
        }
    }

    /// Change the background model threshold for residual spectra
    ///
    /// Only the cached background-corrected reference counts are dropped;
    /// the fit itself does not depend on them.
    pub fn set_residual_threshold_ev(&mut self, threshold_ev: f64) {
        self.config.residual_threshold_ev = threshold_ev;
        for entry in &mut self.references {
            entry.set_background_threshold(threshold_ev);
        }
    }

    pub fn set_culling_policy(&mut self, policy: Option<CullingPolicy>) {
        self.config.culling = policy;
        self.invalidate();
    }

    /// Switch kernel shape and re-filter every spectrum
    pub fn set_filter_kind(&mut self, kind: FilterKind) -> Result<()> {
        let filter = design_filter(kind, &self.config, &self.calibration, &self.detector)?;
        self.config.filter.kind = kind;
        self.filter = Arc::new(filter);
        for entry in &mut self.references {
            entry.refilter(&self.filter);
        }
        if let Some(unknown) = self.unknown.take() {
            self.unknown = Some(UnknownSeries::new(unknown.spectrum, &self.filter));
        }
        self.invalidate();
        Ok(())
    }

    pub fn set_screen(&mut self, screen: Box<dyn ElementScreen>) {
        self.screen = screen;
        self.invalidate();
    }

    pub fn set_solver(&mut self, solver: Box<dyn WeightedSolver>) {
        self.solver = solver;
        self.invalidate();
    }

    /// Run the fit loop if anything changed since the last run
    pub fn perform(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if self.references.is_empty() {
            return Err(FitError::EmptyReferenceSet);
        }
        let Some(unknown) = self.unknown.as_ref() else {
            return Err(FitError::NoUnknown);
        };

        let (kratios, outcome) = self.run(unknown)?;
        for (entry, k) in self.references.iter_mut().zip(kratios) {
            entry.set_kratio(k);
        }
        log::info!(
            "Fit {:?} after {} iterations ({} solves), chi2 = {:.3}, removed {:?}",
            outcome.status,
            outcome.iterations,
            outcome.fit_events,
            outcome.chi_squared,
            outcome.state.removed
        );
        self.outcome = Some(outcome);
        self.dirty = false;
        Ok(())
    }

    fn run(&self, unknown: &UnknownSeries) -> Result<(Vec<UncertainValue>, FitOutcome)> {
        let count = self.references.len();
        let owners = self.elements();
        let mut state = FitState {
            forced: self.forced_zero.clone(),
            ..FitState::default()
        };
        for (i, entry) in self.references.iter().enumerate() {
            // A wider kernel can leave an entry with no supported channels
            if state.forced.contains(&entry.element()) || entry.nonzero().is_empty() {
                state.excluded.insert(i);
            }
        }

        if self.config.strip_unlikely {
            let candidates: BTreeSet<Element> = owners.difference(&state.forced).copied().collect();
            let context = ScreenContext {
                calibration: &self.calibration,
                detector: &self.detector,
                lines: &self.lines,
            };
            let likely = self
                .screen
                .likely_elements(&unknown.filtered, &candidates, &context);
            log::debug!("Likely elements: {:?}", likely);
            for (i, entry) in self.references.iter().enumerate() {
                if !likely.contains(&entry.element()) {
                    state.excluded.insert(i);
                }
            }
        }

        let vcf = self.filter.variance_correction_factor();
        let unknown_norm = unknown.filtered.normalization();
        let mut kratios = vec![UncertainValue::zero(); count];
        let mut iterations = 0;
        let mut fit_events = 0;
        let mut chi_squared = 0.0;
        let mut removal_history = Vec::new();

        let status = loop {
            let active: Vec<usize> = (0..count)
                .filter(|i| !state.excluded.contains(i))
                .collect();
            if active.is_empty() {
                break FitStatus::Exhausted;
            }
            iterations += 1;

            let cover: ChannelCover = active
                .iter()
                .map(|&i| self.references[i].nonzero())
                .collect();
            let mut observed = cover.extract(unknown.filtered.data());
            let mut errors = cover.extract(&unknown.errors);
            repair_samples(&mut observed, &mut errors);

            let mut design = FitDesign::new(observed, errors);
            for &i in &active {
                let entry = &self.references[i];
                let scale = unknown_norm / entry.normalization();
                design.push_column(
                    cover
                        .extract(entry.filtered().data())
                        .into_iter()
                        .map(|v| v * scale)
                        .collect(),
                );
            }

            let solution = self.solver.solve(&design)?;
            fit_events += 1;
            chi_squared = solution.chi_squared;

            for k in kratios.iter_mut() {
                *k = k.zeroed();
            }
            let mut went_negative = false;
            for (j, &i) in active.iter().enumerate() {
                let sigma = (vcf * solution.variances[j]).max(0.0).sqrt();
                let k = UncertainValue::new(solution.coefficients[j], sigma);
                if k.value() < 0.0 {
                    log::debug!(
                        "{} negative ({}), excluding",
                        self.references[i].transitions(),
                        k
                    );
                    state.excluded.insert(i);
                    went_negative = true;
                }
                kratios[i] = k;
            }

            let mut pending = match &self.config.culling {
                Some(policy) => {
                    let context = CullingContext::new(
                        &self.references,
                        &kratios,
                        &design,
                        &active,
                        self.solver.as_ref(),
                        chi_squared,
                    );
                    policy.propose(&context)
                }
                None => BTreeSet::new(),
            };
            pending.retain(|e| owners.contains(e));

            let grew = !pending.is_subset(&state.removed);
            state.removed.extend(pending);
            for (i, k) in kratios.iter_mut().enumerate() {
                if state.removed.contains(&self.references[i].element()) {
                    *k = k.zeroed();
                    state.excluded.insert(i);
                }
                *k = k.clamped();
            }
            removal_history.push(state.removed.clone());

            log::debug!(
                "Iteration {}: {} columns over {} channels, chi2 = {:.3}, removed {:?}",
                iterations,
                active.len(),
                cover.len(),
                chi_squared,
                state.removed
            );

            if !(went_negative || grew) {
                break FitStatus::Converged;
            }
        };

        let mut set = KRatioSet::new();
        for (entry, k) in self.references.iter().zip(&kratios) {
            set.insert(entry.transitions().clone(), *k);
        }
        let outcome = FitOutcome {
            status,
            kratios: set,
            iterations,
            fit_events,
            chi_squared,
            state,
            removal_history,
        };
        Ok((kratios, outcome))
    }

    fn invalidate(&mut self) {
        self.dirty = true;
    }

    /// Make `unknown` the live unknown unless it already is
    fn use_unknown(&mut self, unknown: &Spectrum) -> Result<()> {
        match &self.unknown {
            Some(series) if same_spectrum(&series.spectrum, unknown) => Ok(()),
            _ => self.set_unknown(unknown.clone()),
        }
    }

    fn check_reference(&self, spectrum: &Spectrum) -> Result<()> {
        self.calibration.check_compatible(&spectrum.calibration)?;
        let expected = self
            .unknown
            .as_ref()
            .map(|u| u.spectrum.channel_count())
            .or_else(|| self.references.first().map(|e| e.spectrum().channel_count()));
        if let Some(expected) = expected.filter(|&n| n != spectrum.channel_count()) {
            return Err(FitError::ChannelCountMismatch {
                expected,
                available: spectrum.channel_count(),
            });
        }
        let norm = spectrum.normalization();
        if !(norm.is_finite() && norm > 0.0) {
            return Err(FitError::Config(
                "reference spectrum has neither dose nor counts".to_string(),
            ));
        }
        Ok(())
    }

    /// One ROI per group of overlapping line spans
    ///
    /// Each visible line spans `±extent_fwhm · FWHM(E)` around its energy.
    /// Lines below the configured minimum energy or weight, and lines the
    /// beam cannot excite, are skipped.
    fn build_rois(&self, element: Element, spectrum: &Spectrum) -> Vec<RegionOfInterest> {
        let roi_config = &self.config.roi;
        let n = spectrum.channel_count();
        let max_energy = spectrum.max_excited_energy_ev();

        let spans: Vec<(&XRayTransition, ChannelInterval)> = self
            .lines
            .transitions(element)
            .iter()
            .filter(|t| {
                t.weight >= roi_config.min_weight
                    && t.energy_ev >= roi_config.min_energy_ev
                    && t.energy_ev < max_energy
            })
            .filter_map(|t| {
                let half = roi_config.extent_fwhm * self.detector.fwhm_ev(t.energy_ev);
                let low = self.calibration.channel(t.energy_ev - half).unwrap_or(0);
                let high = self
                    .calibration
                    .channel(t.energy_ev + half)
                    .map_or(0, |ch| ch + 1);
                let span = ChannelInterval::new(low, high).clamp_to(n);
                (!span.is_empty()).then_some((t, span))
            })
            .collect();

        let cover: ChannelCover = spans.iter().map(|(_, span)| *span).collect();
        cover
            .intervals()
            .iter()
            .map(|&interval| {
                let transitions = spans
                    .iter()
                    .filter(|(_, span)| interval.contains(span.low()))
                    .map(|(t, _)| (*t).clone())
                    .collect();
                RegionOfInterest::new(interval, transitions)
            })
            .collect()
    }
}

fn design_filter(
    kind: FilterKind,
    config: &FitConfig,
    calibration: &EnergyCalibration,
    detector: &DetectorProfile,
) -> Result<FittingFilter> {
    let width = detector.fwhm_ev(config.filter.reference_energy_ev) * config.filter.width_scale;
    let filter = FittingFilter::new(kind, width, calibration.channel_width_ev)?;
    log::debug!(
        "{:?} filter: {} taps for {:.1} eV, vcf = {:.3}",
        kind,
        filter.num_taps(),
        width,
        filter.variance_correction_factor()
    );
    Ok(filter)
}

/// Bit-for-bit equality, so a spectrum holding NaN counts matches itself
fn same_spectrum(a: &Spectrum, b: &Spectrum) -> bool {
    a.calibration == b.calibration
        && a.properties == b.properties
        && a.counts.len() == b.counts.len()
        && a.counts
            .iter()
            .zip(&b.counts)
            .all(|(x, y)| x.to_bits() == y.to_bits())
}

/// Make every sample usable by the weighted solve
///
/// A non-finite value takes the previous value (zero at the start). A
/// non-positive or non-finite error takes the previous error
/// ([`SENTINEL_ERROR`] at the start).
fn repair_samples(values: &mut [f64], errors: &mut [f64]) {
    let mut last_value = 0.0;
    let mut last_error = SENTINEL_ERROR;
    for (value, error) in values.iter_mut().zip(errors.iter_mut()) {
        if value.is_finite() {
            last_value = *value;
        } else {
            *value = last_value;
        }
        if error.is_finite() && *error > 0.0 {
            last_error = *error;
        } else {
            *error = last_error;
        }
    }
}
