use std::collections::BTreeSet;

use serde::Deserialize;

use super::{CullingContext, DEFAULT_SIGNIFICANCE};
use crate::element::Element;
use crate::error::Result;

/// Remove elements whose weighted-mean k-ratio is not significant
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ByVariance {
    /// Minimum signal-to-noise of the element's weighted-mean k-ratio
    pub significance: f64,
}

impl Default for ByVariance {
    fn default() -> Self {
        Self {
            significance: DEFAULT_SIGNIFICANCE,
        }
    }
}

impl ByVariance {
    pub fn propose(&self, context: &CullingContext<'_>) -> Result<BTreeSet<Element>> {
        Ok(context
            .elements()
            .into_iter()
            .filter(|&element| {
                context
                    .element_significance(element)
                    .is_some_and(|snr| snr < self.significance)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cull::test_support::*;
    use crate::element::LineFamily;
    use crate::fit::{FitDesign, SvdSolver, UncertainValue};

    #[test]
    fn test_insignificant_element_removed() {
        let entries = vec![
            entry("Fe", LineFamily::K, "Ka1", 1.0, 640, 1000.0),
            entry("Ni", LineFamily::K, "Ka1", 1.0, 747, 1000.0),
            entry("Cr", LineFamily::K, "Ka1", 1.0, 541, 1000.0),
        ];
        let kratios = vec![
            UncertainValue::new(0.5, 0.01),
            UncertainValue::new(0.002, 0.001),
            UncertainValue::new(0.0, 0.0),
        ];
        let design = FitDesign::new(Vec::new(), Vec::new());
        let solver = SvdSolver::default();
        let ctx = CullingContext::new(&entries, &kratios, &design, &[], &solver, 0.0);

        let proposed = ByVariance::default().propose(&ctx).unwrap();
        assert!(proposed.contains(&element("Ni")));
        assert!(!proposed.contains(&element("Fe")));
        // Never fitted, nothing to judge
        assert!(!proposed.contains(&element("Cr")));
    }
}
