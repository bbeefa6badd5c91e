//! Domain types used throughout the correction engine.
//!
//! This module defines:
//!
//! - element and spin tags (`PolarizingElement`, `Spin`, `SpinChannel`)
//! - measured/calibration data containers (`ChannelData`, `BeamData`)
//! - correction outputs (`PolarizationCorrection`, `PolarizationCorrectedData`, etc.)

pub mod types;

pub use types::*;
