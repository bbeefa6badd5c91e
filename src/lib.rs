//! `polarization-correction` library crate.
//!
//! Corrects spin-resolved neutron-scattering intensities for imperfect
//! polarizing elements (He3 spin filters, supermirrors) and non-ideal spin
//! flippers:
//!
//! - `models`: transmission functions of the polarizing elements
//! - `fit`: calibration of He3 cells from direct-beam measurements
//! - `correction`: per-element inverses and their Kronecker combination
//! - `pipeline`: configuration-driven orchestration of the above

pub mod config;
pub mod correction;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod math;
pub mod models;
pub mod pipeline;
pub mod units;
