//! Shared synthetic spectra for the integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use filterfit::FilterFit;
use filterfit::config::FitConfig;
use filterfit::element::{Element, LineFamily, LineTable, XRayTransition};
use filterfit::fit::{KRatioSet, UncertainValue};
use filterfit::simulation::{ContinuumConfig, SpectrumModel, element_kratios};
use filterfit::spectrum::{DetectorProfile, EnergyCalibration, SpectrumProperties};

pub const CHANNELS: usize = 2048;
/// Line intensity of a pure reference, counts per nA·s
pub const REFERENCE_INTENSITY: f64 = 2000.0;
/// Flat background, counts per channel per nA·s
pub const BACKGROUND: f64 = 20.0;

pub fn element(symbol: &str) -> Element {
    symbol.parse().unwrap()
}

pub fn line_table() -> LineTable {
    let line = |symbol: &str, family, name: &str, energy, weight| {
        XRayTransition::new(element(symbol), family, name, energy, weight)
    };
    [
        line("Si", LineFamily::K, "Ka1", 1740.0, 1.0),
        line("Si", LineFamily::K, "Kb1", 1835.9, 0.03),
        line("Fe", LineFamily::L, "La1", 705.0, 1.0),
        line("Fe", LineFamily::K, "Ka1", 6403.8, 1.0),
        line("Fe", LineFamily::K, "Ka2", 6390.8, 0.5),
        line("Fe", LineFamily::K, "Kb1", 7058.0, 0.17),
        line("Ni", LineFamily::K, "Ka1", 7478.2, 1.0),
        line("Ni", LineFamily::K, "Ka2", 7460.9, 0.5),
        line("Ni", LineFamily::K, "Kb1", 8264.7, 0.17),
        line("Cu", LineFamily::K, "Ka1", 8047.8, 1.0),
        line("Cu", LineFamily::K, "Ka2", 8027.8, 0.5),
        line("Cu", LineFamily::K, "Kb1", 8905.3, 0.17),
    ]
    .into_iter()
    .collect()
}

pub fn calibration() -> EnergyCalibration {
    EnergyCalibration::new(0.0, 10.0)
}

pub fn detector() -> DetectorProfile {
    DetectorProfile::new(130.0)
}

pub fn properties(live_time_s: f64) -> SpectrumProperties {
    SpectrumProperties {
        live_time_s,
        probe_current_na: 1.0,
        beam_energy_kev: 20.0,
    }
}

fn with_composition(model: SpectrumModel, composition: &[(&str, f64)]) -> SpectrumModel {
    let lines = line_table();
    composition.iter().fold(model, |m, &(symbol, k)| {
        m.with_element(&lines, element(symbol), k * REFERENCE_INTENSITY)
    })
}

/// Peaks on a flat background; `composition` gives each element's k-ratio
pub fn flat_model(composition: &[(&str, f64)], live_time_s: f64) -> SpectrumModel {
    let model = SpectrumModel::new(calibration(), detector(), properties(live_time_s), CHANNELS)
        .with_background(BACKGROUND);
    with_composition(model, composition)
}

/// Peaks on a bremsstrahlung continuum
pub fn continuum_model(composition: &[(&str, f64)], live_time_s: f64) -> SpectrumModel {
    let model = SpectrumModel::new(calibration(), detector(), properties(live_time_s), CHANNELS)
        .with_continuum(ContinuumConfig::default());
    with_composition(model, composition)
}

pub fn new_fit(config: FitConfig) -> FilterFit {
    FilterFit::new(calibration(), detector(), Arc::new(line_table()), config).unwrap()
}

/// Orchestrator with a pure, noise-free reference for each symbol
pub fn fit_with_references(config: FitConfig, symbols: &[&str], continuum: bool) -> FilterFit {
    let mut fit = new_fit(config);
    for &symbol in symbols {
        let model = if continuum {
            continuum_model(&[(symbol, 1.0)], 60.0)
        } else {
            flat_model(&[(symbol, 1.0)], 60.0)
        };
        fit.add_reference(element(symbol), model.spectrum()).unwrap();
    }
    fit
}

pub fn element_kratio(kratios: &KRatioSet, symbol: &str) -> UncertainValue {
    element_kratios(kratios)
        .get(&element(symbol))
        .copied()
        .unwrap_or_else(UncertainValue::zero)
}
