use std::collections::BTreeSet;

use serde::Deserialize;

use super::{CullingContext, DEFAULT_SIGNIFICANCE};
use crate::element::Element;
use crate::error::Result;

/// Remove elements whose brightest reference ROI is not clearly present
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ByBrightestLine {
    pub significance: f64,
}

impl Default for ByBrightestLine {
    fn default() -> Self {
        Self {
            significance: DEFAULT_SIGNIFICANCE,
        }
    }
}

impl ByBrightestLine {
    pub fn propose(&self, context: &CullingContext<'_>) -> Result<BTreeSet<Element>> {
        let entries = context.entries();
        let mut remove = BTreeSet::new();
        for element in context.elements() {
            let Some(brightest) = context.entries_for(element).max_by(|&a, &b| {
                entries[a]
                    .peak_integral()
                    .value()
                    .total_cmp(&entries[b].peak_integral().value())
            }) else {
                continue;
            };
            let kratio = context.kratio(brightest);
            if kratio.uncertainty() > 0.0 && kratio.significance() < self.significance {
                log::debug!(
                    "{}: brightest ROI {} at {:.1} sigma",
                    element,
                    entries[brightest].transitions(),
                    kratio.significance()
                );
                remove.insert(element);
            }
        }
        Ok(remove)
    }
}
