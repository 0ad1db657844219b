use std::collections::BTreeMap;

use crate::element::Element;
use crate::error::Result;
use crate::fit::{FilterFit, KRatioSet, UncertainValue};

use super::{NoiseConfig, SpectrumModel};

/// A fitted element k-ratio next to the value used to synthesize it
#[derive(Debug, Clone, Copy)]
pub struct KRatioError {
    pub element: Element,
    pub expected: f64,
    pub measured: UncertainValue,
}

impl KRatioError {
    pub fn error(&self) -> f64 {
        self.measured.value() - self.expected
    }

    /// Error in units of the reported uncertainty
    pub fn z_score(&self) -> f64 {
        if self.measured.uncertainty() > 0.0 {
            self.error() / self.measured.uncertainty()
        } else {
            0.0
        }
    }
}

/// Inverse-variance weighted k-ratio per element
///
/// ROIs with no uncertainty (never fitted) are ignored; an element whose ROIs
/// were all ignored reports zero.
pub fn element_kratios(kratios: &KRatioSet) -> BTreeMap<Element, UncertainValue> {
    kratios
        .elements()
        .into_iter()
        .map(|element| {
            let (sum_w, sum_wk) = kratios
                .for_element(element)
                .filter(|(_, k)| k.uncertainty() > 0.0)
                .fold((0.0, 0.0), |(sw, swk), (_, k)| {
                    let w = 1.0 / (k.uncertainty() * k.uncertainty());
                    (sw + w, swk + w * k.value())
                });
            let k = if sum_w > 0.0 {
                UncertainValue::new(sum_wk / sum_w, 1.0 / sum_w.sqrt())
            } else {
                UncertainValue::zero()
            };
            (element, k)
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct ErrorStats {
    pub count: usize,
    pub mean_error: f64,
    pub max_abs_error: f64,
    /// RMS of the z-scores; near one when uncertainties are honest
    pub rms_z: f64,
}

impl ErrorStats {
    pub fn from_errors(errors: &[KRatioError]) -> Self {
        if errors.is_empty() {
            return Self::default();
        }
        let n = errors.len() as f64;
        Self {
            count: errors.len(),
            mean_error: errors.iter().map(KRatioError::error).sum::<f64>() / n,
            max_abs_error: errors.iter().fold(0.0, |a, e| a.max(e.error().abs())),
            rms_z: (errors.iter().map(|e| e.z_score().powi(2)).sum::<f64>() / n).sqrt(),
        }
    }
}

/// Fit `trials` noisy realizations of `unknown` and compare with `expected`
///
/// Trial `i` uses seed `base + i` when `noise` carries a seed.
pub fn measure_kratio_errors(
    fit: &mut FilterFit,
    unknown: &SpectrumModel,
    expected: &[(Element, f64)],
    noise: &NoiseConfig,
    trials: usize,
) -> Result<Vec<KRatioError>> {
    let mut errors = Vec::with_capacity(trials * expected.len());
    for trial in 0..trials {
        let config = NoiseConfig {
            seed: noise.seed.map(|s| s + trial as u64),
            ..noise.clone()
        };
        let spectrum = unknown.generate(&config);
        let measured = element_kratios(&fit.kratios(&spectrum)?);
        for &(element, value) in expected {
            errors.push(KRatioError {
                element,
                expected: value,
                measured: measured
                    .get(&element)
                    .copied()
                    .unwrap_or_else(UncertainValue::zero),
            });
        }
    }
    Ok(errors)
}
