use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::element::{Element, TransitionSet};

/// A value with a one-sigma uncertainty
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct UncertainValue {
    value: f64,
    sigma: f64,
}

impl UncertainValue {
    pub fn new(value: f64, sigma: f64) -> Self {
        Self {
            value,
            sigma: sigma.abs(),
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn uncertainty(&self) -> f64 {
        self.sigma
    }

    /// Same uncertainty, value floored at zero
    pub fn clamped(&self) -> Self {
        Self {
            value: self.value.max(0.0),
            sigma: self.sigma,
        }
    }

    /// Same uncertainty, value set to zero
    pub fn zeroed(&self) -> Self {
        Self {
            value: 0.0,
            sigma: self.sigma,
        }
    }

    /// Value over uncertainty; zero when the uncertainty is unknown
    pub fn significance(&self) -> f64 {
        if self.sigma > 0.0 {
            self.value / self.sigma
        } else {
            0.0
        }
    }

    pub fn fractional_uncertainty(&self) -> f64 {
        if self.value != 0.0 {
            (self.sigma / self.value).abs()
        } else {
            f64::INFINITY
        }
    }
}

impl fmt::Display for UncertainValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5} ± {:.5}", self.value, self.sigma)
    }
}

/// Fitted k-ratios keyed by transition set
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KRatioSet {
    entries: Vec<(TransitionSet, UncertainValue)>,
}

impl KRatioSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the k-ratio for `transitions`
    pub fn insert(&mut self, transitions: TransitionSet, kratio: UncertainValue) {
        match self.entries.iter_mut().find(|(ts, _)| *ts == transitions) {
            Some(entry) => entry.1 = kratio,
            None => self.entries.push((transitions, kratio)),
        }
    }

    pub fn get(&self, transitions: &TransitionSet) -> Option<UncertainValue> {
        self.entries
            .iter()
            .find(|(ts, _)| ts == transitions)
            .map(|(_, k)| *k)
    }

    pub fn for_element(
        &self,
        element: Element,
    ) -> impl Iterator<Item = &(TransitionSet, UncertainValue)> + '_ {
        self.entries
            .iter()
            .filter(move |(ts, _)| ts.element() == element)
    }

    pub fn elements(&self) -> BTreeSet<Element> {
        self.entries.iter().map(|(ts, _)| ts.element()).collect()
    }

    /// Only the entries with a strictly positive k-ratio
    pub fn non_zero(&self) -> KRatioSet {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|(_, k)| k.value() > 0.0)
                .cloned()
                .collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &(TransitionSet, UncertainValue)> + '_ {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{LineFamily, XRayTransition};

    #[test]
    fn test_clamp_keeps_uncertainty() {
        let k = UncertainValue::new(-0.02, 0.01);
        let c = k.clamped();
        assert_eq!(c.value(), 0.0);
        assert_eq!(c.uncertainty(), 0.01);
        assert_eq!(UncertainValue::new(0.3, 0.01).clamped().value(), 0.3);
        assert_eq!(UncertainValue::new(0.3, 0.01).zeroed().uncertainty(), 0.01);
    }

    #[test]
    fn test_significance() {
        assert_eq!(UncertainValue::new(0.3, 0.1).significance(), 3.0);
        assert_eq!(UncertainValue::new(0.3, 0.0).significance(), 0.0);
        assert_eq!(UncertainValue::new(0.3, -0.1).uncertainty(), 0.1);
        assert_eq!(UncertainValue::new(0.5, 0.1).fractional_uncertainty(), 0.2);
    }

    #[test]
    fn test_kratio_set_lookup_and_non_zero() {
        let fe: Element = "Fe".parse().unwrap();
        let si: Element = "Si".parse().unwrap();
        let fe_k = TransitionSet::new(
            fe,
            vec![XRayTransition::new(fe, LineFamily::K, "Ka1", 6403.8, 1.0)],
        );
        let si_k = TransitionSet::new(
            si,
            vec![XRayTransition::new(si, LineFamily::K, "Ka1", 1740.0, 1.0)],
        );
        let mut set = KRatioSet::new();
        set.insert(fe_k.clone(), UncertainValue::new(0.4, 0.01));
        set.insert(si_k.clone(), UncertainValue::new(0.0, 0.02));
        set.insert(fe_k.clone(), UncertainValue::new(0.5, 0.01));

        assert_eq!(set.len(), 2);
        assert_eq!(set.get(&fe_k).unwrap().value(), 0.5);
        assert_eq!(set.for_element(si).count(), 1);
        let nz = set.non_zero();
        assert_eq!(nz.len(), 1);
        assert!(nz.get(&si_k).is_none());
        assert_eq!(set.elements().len(), 2);
    }
}
