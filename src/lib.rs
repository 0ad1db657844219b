pub mod config;
pub mod constants;
pub mod cull;
pub mod element;
pub mod error;
pub mod fit;
pub mod output;
pub mod signal_processing;
pub mod spectrum;

#[cfg(feature = "simulation")]
pub mod simulation;

pub use config::FitConfig;
pub use error::{FitError, Result};
pub use fit::FilterFit;
