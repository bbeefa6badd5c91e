//! Mathematical utilities: grid helpers and the nonlinear least-squares
//! wrapper used by the He3 fits.

pub mod grid;
pub mod levenberg;

pub use grid::*;
pub use levenberg::*;
