use std::collections::BTreeSet;

use serde::Deserialize;

use super::{CullingContext, DEFAULT_SIGNIFICANCE};
use crate::element::Element;
use crate::error::Result;

/// Known false positive: `minor` tends to appear wherever `trigger` is strong
#[derive(Debug, Clone, Deserialize)]
pub struct SuppressionRule {
    pub trigger: Element,
    pub minor: Element,
    /// Trigger-to-minor signal-to-noise ratio above which `minor` is dropped
    #[serde(default = "default_ratio")]
    pub ratio: f64,
}

fn default_ratio() -> f64 {
    10.0
}

/// Remove minor elements overshadowed by a dominant trigger element
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ElementSuppression {
    pub rules: Vec<SuppressionRule>,
    /// The trigger itself must be at least this significant
    pub min_trigger_significance: f64,
}

impl Default for ElementSuppression {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            min_trigger_significance: DEFAULT_SIGNIFICANCE,
        }
    }
}

impl ElementSuppression {
    pub fn propose(&self, context: &CullingContext<'_>) -> Result<BTreeSet<Element>> {
        let mut remove = BTreeSet::new();
        for rule in &self.rules {
            let (Some(trigger), Some(minor)) = (
                context.element_significance(rule.trigger),
                context.element_significance(rule.minor),
            ) else {
                continue;
            };
            if trigger >= self.min_trigger_significance && trigger > rule.ratio * minor.max(0.0) {
                log::debug!(
                    "{} ({:.1} sigma) suppressed by {} ({:.1} sigma)",
                    rule.minor,
                    minor,
                    rule.trigger,
                    trigger
                );
                remove.insert(rule.minor);
            }
        }
        Ok(remove)
    }
}
