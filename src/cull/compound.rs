use std::collections::BTreeSet;

use serde::Deserialize;

use super::{CullingContext, CullingPolicy};
use crate::element::Element;

/// Union of several policies' proposals, evaluated in order
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Compound {
    pub policies: Vec<CullingPolicy>,
}

impl Compound {
    pub fn propose(&self, context: &CullingContext<'_>) -> BTreeSet<Element> {
        self.policies
            .iter()
            .flat_map(|policy| policy.propose(context))
            .collect()
    }
}
