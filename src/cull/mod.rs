//! Culling policies
//!
//! After every solve the orchestrator asks the configured policy which
//! elements the data do not support. Policies only read the fit state; a
//! policy whose computation fails proposes nothing and the fit carries on.

mod brightest_line;
mod by_chi_squared;
mod by_variance;
mod compound;
mod cross_family;
mod element_suppression;
mod within_family;

use std::collections::BTreeSet;

use serde::Deserialize;

use crate::element::Element;
use crate::error::Result;
use crate::fit::{FitDesign, ReferenceEntry, UncertainValue, WeightedSolver};

pub use brightest_line::ByBrightestLine;
pub use by_chi_squared::ByChiSquared;
pub use by_variance::ByVariance;
pub use compound::Compound;
pub use cross_family::CrossFamily;
pub use element_suppression::{ElementSuppression, SuppressionRule};
pub use within_family::WithinFamily;

/// Default significance threshold (in standard errors) shared by the policies
pub(crate) const DEFAULT_SIGNIFICANCE: f64 = 3.0;

/// Read-only view of one fit iteration
pub struct CullingContext<'a> {
    entries: &'a [ReferenceEntry],
    kratios: &'a [UncertainValue],
    design: &'a FitDesign,
    active: &'a [usize],
    solver: &'a dyn WeightedSolver,
    chi_squared: f64,
}

impl<'a> CullingContext<'a> {
    /// # Arguments
    /// * `entries` - All reference entries, excluded ones included
    /// * `kratios` - Current k-ratio per entry (same order as `entries`)
    /// * `design` - The design just solved
    /// * `active` - Entry index of each design column
    /// * `solver` - Solver for re-fits
    /// * `chi_squared` - Chi-squared of the solve
    pub fn new(
        entries: &'a [ReferenceEntry],
        kratios: &'a [UncertainValue],
        design: &'a FitDesign,
        active: &'a [usize],
        solver: &'a dyn WeightedSolver,
        chi_squared: f64,
    ) -> Self {
        Self {
            entries,
            kratios,
            design,
            active,
            solver,
            chi_squared,
        }
    }

    pub fn entries(&self) -> &[ReferenceEntry] {
        self.entries
    }

    pub fn kratio(&self, index: usize) -> UncertainValue {
        self.kratios[index]
    }

    pub fn design(&self) -> &FitDesign {
        self.design
    }

    pub fn active(&self) -> &[usize] {
        self.active
    }

    pub fn solver(&self) -> &dyn WeightedSolver {
        self.solver
    }

    pub fn chi_squared(&self) -> f64 {
        self.chi_squared
    }

    /// Elements owning at least one entry
    pub fn elements(&self) -> BTreeSet<Element> {
        self.entries.iter().map(ReferenceEntry::element).collect()
    }

    /// Entry indices belonging to `element`
    pub fn entries_for(&self, element: Element) -> impl Iterator<Item = usize> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(move |(_, e)| e.element() == element)
            .map(|(i, _)| i)
    }

    /// Inverse-variance weighted mean k-ratio over an element's entries
    ///
    /// Entries that were never fitted (zero uncertainty) are skipped; `None`
    /// when no entry has an uncertainty.
    pub fn element_kratio(&self, element: Element) -> Option<UncertainValue> {
        let (sum_w, sum_wk) = self
            .entries_for(element)
            .map(|i| self.kratios[i])
            .filter(|k| k.uncertainty() > 0.0)
            .fold((0.0, 0.0), |(sw, swk), k| {
                let w = 1.0 / (k.uncertainty() * k.uncertainty());
                (sw + w, swk + w * k.value())
            });
        (sum_w > 0.0).then(|| UncertainValue::new(sum_wk / sum_w, 1.0 / sum_w.sqrt()))
    }

    /// Signal-to-noise of the element's weighted mean k-ratio
    pub fn element_significance(&self, element: Element) -> Option<f64> {
        self.element_kratio(element).map(|k| k.significance())
    }
}

/// Statistical test proposing elements to drop from the fit
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum CullingPolicy {
    ByVariance(ByVariance),
    ByChiSquared(ByChiSquared),
    WithinFamily(WithinFamily),
    CrossFamily(CrossFamily),
    ByBrightestLine(ByBrightestLine),
    ElementSuppression(ElementSuppression),
    Compound(Compound),
}

impl CullingPolicy {
    /// Elements to remove; empty when the policy fails internally
    pub fn propose(&self, context: &CullingContext<'_>) -> BTreeSet<Element> {
        match self.try_propose(context) {
            Ok(elements) => elements,
            Err(e) => {
                log::warn!("{} culling failed, proposing nothing: {}", self.name(), e);
                BTreeSet::new()
            }
        }
    }

    fn try_propose(&self, context: &CullingContext<'_>) -> Result<BTreeSet<Element>> {
        match self {
            Self::ByVariance(policy) => policy.propose(context),
            Self::ByChiSquared(policy) => policy.propose(context),
            Self::WithinFamily(policy) => policy.propose(context),
            Self::CrossFamily(policy) => policy.propose(context),
            Self::ByBrightestLine(policy) => policy.propose(context),
            Self::ElementSuppression(policy) => policy.propose(context),
            Self::Compound(policy) => Ok(policy.propose(context)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ByVariance(_) => "by-variance",
            Self::ByChiSquared(_) => "by-chi-squared",
            Self::WithinFamily(_) => "within-family",
            Self::CrossFamily(_) => "cross-family",
            Self::ByBrightestLine(_) => "by-brightest-line",
            Self::ElementSuppression(_) => "element-suppression",
            Self::Compound(_) => "compound",
        }
    }
}
