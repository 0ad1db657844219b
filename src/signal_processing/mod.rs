pub mod filtered_series;
pub mod fitting_filter;
pub mod peak_search;

pub use filtered_series::FilteredSeries;
pub use fitting_filter::FittingFilter;
pub use peak_search::{Peak, PeakSearch};
