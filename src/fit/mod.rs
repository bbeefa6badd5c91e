//! Calibration fits for polarizing elements.
//!
//! Responsibilities:
//!
//! - turn direct-beam events into transmission fractions on a time axis
//! - fit the He3 opacity to a depolarized-cell measurement
//! - fit the He3 polarization decay (unpolarized or polarized incoming beam)

pub mod direct_beam;
pub mod he3_fit;
pub mod opacity_fit;
pub mod report;

pub use direct_beam::*;
pub use he3_fit::*;
pub use opacity_fit::*;
pub use report::*;
