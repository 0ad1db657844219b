use thiserror::Error;

use crate::element::Element;

#[derive(Error, Debug)]
pub enum FitError {
    #[error("Incompatible energy calibration: {0}")]
    IncompatibleCalibration(String),

    #[error("Channel count mismatch: expected {expected} channels, have {available}")]
    ChannelCountMismatch { expected: usize, available: usize },

    #[error("Region of interest spans {0} elements, expected exactly one")]
    MultiElementRoi(usize),

    #[error("No visible transitions for {0}")]
    NoTransitions(Element),

    #[error("No references registered")]
    EmptyReferenceSet,

    #[error("No unknown spectrum set")]
    NoUnknown,

    #[error("Filter design failed: {0}")]
    FilterDesign(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Linear solve failed: {0}")]
    Solver(String),

    #[error("Unknown element symbol: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FitError>;
