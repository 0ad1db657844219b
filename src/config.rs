//! Configuration for the filter-fit engine.
//!
//! Every section has a `Default` and can be overridden from TOML; missing keys
//! fall back to the defaults.
//!
//! ```
//! use filterfit::config::{FilterKind, FitConfig};
//!
//! let config = FitConfig::from_toml_str(r#"
//!     strip_unlikely = true
//!
//!     [filter]
//!     kind = "savitzky_golay"
//!
//!     [culling]
//!     policy = "by_variance"
//!     significance = 3.0
//! "#).unwrap();
//! assert!(config.strip_unlikely);
//! assert_eq!(config.filter.kind, FilterKind::SavitzkyGolay);
//! assert!(config.culling.is_some());
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::constants::MN_KA_EV;
use crate::cull::CullingPolicy;
use crate::error::{FitError, Result};

/// An X-ray energy
///
/// # Parsing formats
/// - `1740` or `1740eV` - energy in eV
/// - `1.74keV` - energy in keV
///
/// # Example
/// ```
/// use filterfit::config::Energy;
///
/// let e: Energy = "5.9keV".parse().unwrap();
/// assert!((e.as_ev() - 5900.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Energy(f64);

impl Energy {
    pub fn from_ev(ev: f64) -> Self {
        Self(ev)
    }

    pub fn from_kev(kev: f64) -> Self {
        Self(kev * 1000.0)
    }

    pub fn as_ev(&self) -> f64 {
        self.0
    }

    pub fn as_kev(&self) -> f64 {
        self.0 / 1000.0
    }
}

impl fmt::Display for Energy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}eV", self.0)
    }
}

impl FromStr for Energy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let lower = s.to_ascii_lowercase();

        if let Some(num) = lower.strip_suffix("kev") {
            let kev: f64 = num
                .trim()
                .parse()
                .map_err(|_| format!("invalid energy: {}", s))?;
            if kev < 0.0 {
                return Err("energy must not be negative".to_string());
            }
            return Ok(Self::from_kev(kev));
        }

        let num = lower.strip_suffix("ev").unwrap_or(&lower);
        let ev: f64 = num
            .trim()
            .parse()
            .map_err(|_| format!("invalid energy: {}", s))?;
        if ev < 0.0 {
            return Err("energy must not be negative".to_string());
        }
        Ok(Self::from_ev(ev))
    }
}

/// Background-suppression kernel shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    /// Flat plateau with negative side lobes
    TopHat,
    /// Negated second derivative of a Gaussian (smoother, wider)
    GaussianDerivative,
    /// Quadratic Savitzky-Golay second derivative
    SavitzkyGolay,
}

/// Top-level filter-fit configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Digital filter configuration
    pub filter: FilterConfig,
    /// Region-of-interest construction
    pub roi: RoiConfig,
    /// Peak search used by the strip-unlikely screen
    pub peak_search: PeakSearchConfig,
    /// Exclude elements without a matching peak in the unknown before fitting
    pub strip_unlikely: bool,
    /// ROIs starting at or above this energy get a linear background model
    /// in residual spectra; lower ROIs get a flat one
    pub residual_threshold_ev: f64,
    /// Culling policy applied after every solve
    pub culling: Option<CullingPolicy>,
}

/// Digital filter configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub kind: FilterKind,
    /// Energy at which the detector resolution sets the filter width
    pub reference_energy_ev: f64,
    /// Filter width as a multiple of the FWHM at the reference energy
    pub width_scale: f64,
}

/// Region-of-interest construction
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoiConfig {
    /// Half width of each line's span in units of the local FWHM
    pub extent_fwhm: f64,
    /// Lines below this energy are not fitted
    pub min_energy_ev: f64,
    /// Lines weaker than this relative weight are ignored
    pub min_weight: f64,
}

/// Peak search configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PeakSearchConfig {
    /// Minimum filtered significance (in standard errors)
    pub threshold_sigma: f64,
    /// Minimum spacing between peaks in units of the FWHM at the reference energy
    pub min_separation_fwhm: f64,
    /// A line matches a peak when within this many FWHM of it
    pub match_tolerance_fwhm: f64,
}

impl FitConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| FitError::Config(e.to_string()))
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            filter: FilterConfig::default(),
            roi: RoiConfig::default(),
            peak_search: PeakSearchConfig::default(),
            strip_unlikely: false,
            residual_threshold_ev: 1500.0,
            culling: None,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            kind: FilterKind::TopHat,
            reference_energy_ev: MN_KA_EV,
            width_scale: 1.0,
        }
    }
}

impl Default for RoiConfig {
    fn default() -> Self {
        Self {
            extent_fwhm: 1.5,
            min_energy_ev: 100.0,
            min_weight: 0.001,
        }
    }
}

impl Default for PeakSearchConfig {
    fn default() -> Self {
        Self {
            threshold_sigma: 5.0,
            min_separation_fwhm: 1.0,
            match_tolerance_fwhm: 0.5,
        }
    }
}
