//! Synthetic EDS spectra for tests, demos and accuracy studies.

mod measure;
mod model;
mod noise;

pub use measure::{ErrorStats, KRatioError, element_kratios, measure_kratio_errors};
pub use model::{ContinuumConfig, SpectrumModel};
pub use noise::{NoiseConfig, apply_counting_noise};
