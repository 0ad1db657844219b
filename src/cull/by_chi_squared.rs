use std::collections::BTreeSet;

use serde::Deserialize;

use super::CullingContext;
use crate::element::Element;
use crate::error::{FitError, Result};

/// Remove elements whose references do not improve the fit
///
/// Each element with active columns is dropped from the design and the
/// remaining columns re-solved. The element stays only if dropping it raises
/// chi-squared by more than `threshold` times.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ByChiSquared {
    /// Required ratio of chi-squared without the element to chi-squared with it
    pub threshold: f64,
}

impl Default for ByChiSquared {
    fn default() -> Self {
        Self { threshold: 1.05 }
    }
}

impl ByChiSquared {
    pub fn propose(&self, context: &CullingContext<'_>) -> Result<BTreeSet<Element>> {
        let baseline = context.chi_squared();
        let entries = context.entries();
        let active = context.active();

        let mut remove = BTreeSet::new();
        for element in context.elements() {
            if !active.iter().any(|&i| entries[i].element() == element) {
                continue;
            }
            let reduced = context
                .design()
                .retain_columns(|col| entries[active[col]].element() != element);
            let without = context.solver().solve(&reduced)?.chi_squared;
            if !without.is_finite() {
                return Err(FitError::Solver(format!(
                    "non-finite chi-squared re-fitting without {}",
                    element
                )));
            }
            log::trace!(
                "chi-squared without {}: {:.3} (with: {:.3})",
                element,
                without,
                baseline
            );
            if without < self.threshold * baseline {
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
    use crate::element::LineFamily;
    use crate::fit::{FitDesign, SvdSolver, UncertainValue, WeightedSolver};

    #[test]
    fn test_element_that_explains_nothing_is_removed() {
        let entries = vec![
            entry("Fe", LineFamily::K, "Ka1", 1.0, 640, 1000.0),
            entry("Ni", LineFamily::K, "Ka1", 1.0, 747, 1000.0),
        ];
        // Observed is column 0 plus small noise; column 1 is orthogonal-ish junk
        let a: Vec<f64> = (0..40).map(|i| (i as f64 * 0.4).sin()).collect();
        let b: Vec<f64> = (0..40).map(|i| if i % 7 == 0 { 1.0 } else { 0.0 }).collect();
        let observed: Vec<f64> = a
            .iter()
            .enumerate()
            .map(|(i, x)| 3.0 * x + 0.05 * ((i * 13 % 5) as f64 - 2.0))
            .collect();
        let mut design = FitDesign::new(observed, vec![0.1; 40]);
        design.push_column(a);
        design.push_column(b);
        let solver = SvdSolver::default();
        let solution = solver.solve(&design).unwrap();
        let kratios: Vec<UncertainValue> = solution
            .coefficients
            .iter()
            .zip(&solution.variances)
            .map(|(c, v)| UncertainValue::new(*c, v.sqrt()))
            .collect();
        let active = [0, 1];
        let ctx = CullingContext::new(
            &entries,
            &kratios,
            &design,
            &active,
            &solver,
            solution.chi_squared,
        );

        let proposed = ByChiSquared::default().propose(&ctx).unwrap();
        assert!(proposed.contains(&element("Ni")));
        assert!(!proposed.contains(&element("Fe")));
    }
}
