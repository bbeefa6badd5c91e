//! Polarization correction.
//!
//! The transfer matrix of the polarizer + analyzer setup is the Kronecker
//! product of two 2×2 element matrices, so its inverse factorizes as well.
//! We never build the 4×4 matrix: each measured channel gets four weights
//! (one per corrected output) from the two element inverses and the flipper
//! models, and the corrected result is the sum of four rank-1 contributions.

pub mod apply;
pub mod coefficients;
pub mod combine;
pub mod flipper;

pub use apply::*;
pub use coefficients::*;
pub use combine::*;
pub use flipper::*;
