use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;

use super::{CullingContext, DEFAULT_SIGNIFICANCE};
use crate::element::{Element, LineFamily};
use crate::error::Result;

/// Remove elements whose line families disagree
///
/// An element is dropped when none of its families is significant, or when
/// one family is significant while another family with more reference
/// counts (and so more expected signal) is not.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrossFamily {
    pub significance: f64,
}

impl Default for CrossFamily {
    fn default() -> Self {
        Self {
            significance: DEFAULT_SIGNIFICANCE,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct FamilyEvidence {
    significance: f64,
    reference_counts: f64,
}

impl CrossFamily {
    pub fn propose(&self, context: &CullingContext<'_>) -> Result<BTreeSet<Element>> {
        let entries = context.entries();
        let mut remove = BTreeSet::new();

        for element in context.elements() {
            let fitted = context
                .entries_for(element)
                .any(|i| context.kratio(i).uncertainty() > 0.0);
            if !fitted {
                continue;
            }

            let mut families: BTreeMap<LineFamily, FamilyEvidence> = BTreeMap::new();
            for i in context.entries_for(element) {
                let Some(family) = entries[i].family() else {
                    continue;
                };
                let ev = families.entry(family).or_insert(FamilyEvidence {
                    significance: f64::NEG_INFINITY,
                    reference_counts: 0.0,
                });
                ev.significance = ev.significance.max(context.kratio(i).significance());
                ev.reference_counts = ev
                    .reference_counts
                    .max(entries[i].peak_integral().value());
            }

            let (present, absent): (Vec<_>, Vec<_>) = families
                .iter()
                .partition(|(_, ev)| ev.significance >= self.significance);
            if present.is_empty() {
                log::debug!("{}: no line family significant", element);
                remove.insert(element);
                continue;
            }

            let inconsistent = present.iter().any(|(seen, seen_ev)| {
                absent.iter().any(|(missing, missing_ev)| {
                    let contradicts = missing_ev.reference_counts > seen_ev.reference_counts;
                    if contradicts {
                        log::debug!(
                            "{}: {} family present but stronger {} family absent",
                            element,
                            seen,
                            missing
                        );
                    }
                    contradicts
                })
            });
            if inconsistent {
                remove.insert(element);
            }
        }
        Ok(remove)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cull::test_support::*;
    use crate::fit::{FitDesign, SvdSolver, UncertainValue};

    fn propose(kratios: &[UncertainValue]) -> BTreeSet<Element> {
        // Fe K reference peak is brighter than its L peak
        let entries = vec![
            entry("Fe", LineFamily::K, "Ka1", 1.0, 640, 1000.0),
            entry("Fe", LineFamily::L, "La1", 1.0, 70, 300.0),
        ];
        let design = FitDesign::new(Vec::new(), Vec::new());
        let solver = SvdSolver::default();
        let ctx = CullingContext::new(&entries, kratios, &design, &[], &solver, 0.0);
        CrossFamily::default().propose(&ctx).unwrap()
    }

    #[test]
    fn test_no_family_present_removed() {
        let proposed = propose(&[
            UncertainValue::new(0.01, 0.01),
            UncertainValue::new(0.0, 0.02),
        ]);
        assert!(proposed.contains(&element("Fe")));
    }

    #[test]
    fn test_weaker_family_without_stronger_removed() {
        // L visible, brighter K missing
        let proposed = propose(&[
            UncertainValue::new(0.0, 0.01),
            UncertainValue::new(0.3, 0.02),
        ]);
        assert!(proposed.contains(&element("Fe")));
    }

    #[test]
    fn test_stronger_family_without_weaker_kept() {
        // K visible, dimmer L missing is plausible
        let proposed = propose(&[
            UncertainValue::new(0.3, 0.01),
            UncertainValue::new(0.0, 0.02),
        ]);
        assert!(proposed.is_empty());
    }

    #[test]
    fn test_never_fitted_element_skipped() {
        let proposed = propose(&[UncertainValue::zero(), UncertainValue::zero()]);
        assert!(proposed.is_empty());
    }
}
