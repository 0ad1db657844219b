//! Numeric constants for the filter-fit pipeline
//!
//! Thresholds and sentinel values shared by the filter, the orchestrator and
//! the culling policies.

/// Mn Kα energy in eV, the reference energy at which detector resolution is quoted.
pub const MN_KA_EV: f64 = 5898.7;

/// Fano-noise coefficient in eV for the resolution-versus-energy model.
/// FWHM(E)² = FWHM(Mn Kα)² + FANO_COEFFICIENT_EV · (E − E(Mn Kα)).
pub const FANO_COEFFICIENT_EV: f64 = 2.5;

/// Error assigned to the first extracted channel when its estimate is
/// non-positive or NaN. Gives the channel negligible weight in the solve.
pub const SENTINEL_ERROR: f64 = 1e30;

/// Relative tolerance on channel width when comparing energy calibrations.
pub const CALIBRATION_WIDTH_TOLERANCE: f64 = 1e-3;

/// Tolerance on zero offset, as a fraction of a channel, when comparing calibrations.
pub const CALIBRATION_OFFSET_TOLERANCE: f64 = 0.1;

/// Singular values below this fraction of the largest are treated as zero.
pub const SVD_RELATIVE_TOLERANCE: f64 = 1e-12;

/// Number of channels averaged on each side of an ROI to model its background.
pub const BACKGROUND_EDGE_CHANNELS: usize = 4;
