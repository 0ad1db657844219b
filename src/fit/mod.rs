//! Filter-fit engine: interval algebra, weighted solve, references and the
//! fit loop.

mod filter_fit;
mod interval;
mod kratio;
mod reference;
mod screen;
mod solver;

pub use filter_fit::{FilterFit, FitOutcome, FitState, FitStatus};
pub use interval::{ChannelCover, ChannelInterval};
pub use kratio::{KRatioSet, UncertainValue};
pub use reference::ReferenceEntry;
pub use screen::{ElementScreen, PeakSearchScreen, ScreenContext};
pub use solver::{FitDesign, FitSolution, SvdSolver, WeightedSolver};
