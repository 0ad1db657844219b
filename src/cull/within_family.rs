use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;

use super::{CullingContext, DEFAULT_SIGNIFICANCE};
use crate::element::{Element, LineFamily};
use crate::error::Result;

/// Remove elements whose minor lines show up without the family's dominant line
///
/// Within one shell family the ROI holding the heaviest-weighted line must be
/// at least as visible as any other ROI of that family. A significant minor
/// ROI next to an insignificant dominant one is a misidentified peak.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WithinFamily {
    pub significance: f64,
}

impl Default for WithinFamily {
    fn default() -> Self {
        Self {
            significance: DEFAULT_SIGNIFICANCE,
        }
    }
}

impl WithinFamily {
    pub fn propose(&self, context: &CullingContext<'_>) -> Result<BTreeSet<Element>> {
        let entries = context.entries();
        let line_weight = |i: usize| {
            entries[i]
                .transitions()
                .dominant()
                .map_or(0.0, |t| t.weight)
        };
        let present = |i: usize| context.kratio(i).significance() >= self.significance;

        let mut remove = BTreeSet::new();
        for element in context.elements() {
            let mut families: BTreeMap<LineFamily, Vec<usize>> = BTreeMap::new();
            for i in context.entries_for(element) {
                if let Some(family) = entries[i].family() {
                    families.entry(family).or_default().push(i);
                }
            }

            for (family, indices) in families {
                if indices.len() < 2 {
                    continue;
                }
                let Some(dominant) = indices
                    .iter()
                    .copied()
                    .max_by(|&a, &b| line_weight(a).total_cmp(&line_weight(b)))
                else {
                    continue;
                };
                let minor_present = indices
                    .iter()
                    .copied()
                    .filter(|&i| i != dominant)
                    .any(present);
                if minor_present && !present(dominant) {
                    log::debug!(
                        "{} {}-family minor line present without {}",
                        element,
                        family,
                        entries[dominant].transitions()
                    );
                    remove.insert(element);
                }
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
        let entries = vec![
            entry("Fe", LineFamily::K, "Ka1", 1.0, 640, 1000.0),
            entry("Fe", LineFamily::K, "Kb1", 0.17, 706, 170.0),
            entry("Fe", LineFamily::L, "La1", 1.0, 70, 300.0),
        ];
        let design = FitDesign::new(Vec::new(), Vec::new());
        let solver = SvdSolver::default();
        let ctx = CullingContext::new(&entries, kratios, &design, &[], &solver, 0.0);
        WithinFamily::default().propose(&ctx).unwrap()
    }

    #[test]
    fn test_minor_without_dominant_removed() {
        let proposed = propose(&[
            UncertainValue::new(0.001, 0.01),
            UncertainValue::new(0.2, 0.02),
            UncertainValue::new(0.3, 0.01),
        ]);
        assert!(proposed.contains(&element("Fe")));
    }

    #[test]
    fn test_dominant_and_minor_present_kept() {
        let proposed = propose(&[
            UncertainValue::new(0.2, 0.01),
            UncertainValue::new(0.2, 0.02),
            UncertainValue::new(0.0, 0.01),
        ]);
        assert!(proposed.is_empty());
    }
}
