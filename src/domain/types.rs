//! Shared domain types.
//!
//! This module defines:
//!
//! - element/spin tags (`PolarizingElement`, `Spin`, `PlusMinus`, `SpinChannel`)
//! - measured and calibration data containers (`ChannelData`, `BeamData`)
//! - correction outputs (`PolarizationCorrection`, `PolarizationCorrectedData`, ...)
//! - configuration enums and fit options
//!
//! Coordinates follow one fixed convention throughout the crate: wavelengths in
//! ångström, times in seconds (relative to the cell filling time for He3 cells).

use serde::{Deserialize, Serialize};

use crate::error::PolarizationError;
use crate::math::midpoints;

/// Which physical device a quantity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolarizingElement {
    Polarizer,
    Analyzer,
}

impl PolarizingElement {
    pub fn display_name(self) -> &'static str {
        match self {
            PolarizingElement::Polarizer => "polarizer",
            PolarizingElement::Analyzer => "analyzer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Spin {
    Up,
    Down,
}

impl Spin {
    pub const ALL: [Spin; 2] = [Spin::Up, Spin::Down];

    pub fn symbol(self) -> char {
        match self {
            Spin::Up => '+',
            Spin::Down => '-',
        }
    }
}

/// Eigen-channel of a polarizing element.
///
/// `Plus` is evaluated with sign `+1` and `Minus` with sign `-1` in every
/// transmission model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlusMinus {
    Plus,
    Minus,
}

impl PlusMinus {
    pub fn sign(self) -> f64 {
        match self {
            PlusMinus::Plus => 1.0,
            PlusMinus::Minus => -1.0,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            PlusMinus::Plus => "plus",
            PlusMinus::Minus => "minus",
        }
    }
}

/// A measured spin channel `(polarizer spin, analyzer spin)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpinChannel {
    pub polarizer: Spin,
    pub analyzer: Spin,
}

impl SpinChannel {
    pub const UP_UP: SpinChannel = SpinChannel::new(Spin::Up, Spin::Up);
    pub const UP_DOWN: SpinChannel = SpinChannel::new(Spin::Up, Spin::Down);
    pub const DOWN_UP: SpinChannel = SpinChannel::new(Spin::Down, Spin::Up);
    pub const DOWN_DOWN: SpinChannel = SpinChannel::new(Spin::Down, Spin::Down);

    /// All four channels in `++, +-, -+, --` order.
    pub const ALL: [SpinChannel; 4] = [
        SpinChannel::UP_UP,
        SpinChannel::UP_DOWN,
        SpinChannel::DOWN_UP,
        SpinChannel::DOWN_DOWN,
    ];

    pub const fn new(polarizer: Spin, analyzer: Spin) -> Self {
        Self {
            polarizer,
            analyzer,
        }
    }

    /// Position in [`SpinChannel::ALL`].
    pub fn index(self) -> usize {
        let p = match self.polarizer {
            Spin::Up => 0,
            Spin::Down => 1,
        };
        let a = match self.analyzer {
            Spin::Up => 0,
            Spin::Down => 1,
        };
        2 * p + a
    }

    /// Eigen-channel of the analyzer seen by a beam polarized by the polarizer.
    ///
    /// Parallel spins select `Plus`, antiparallel spins select `Minus`.
    pub fn expected_plus_minus(self) -> PlusMinus {
        if self.polarizer == self.analyzer {
            PlusMinus::Plus
        } else {
            PlusMinus::Minus
        }
    }

    pub fn label(self) -> String {
        format!("{}{}", self.polarizer.symbol(), self.analyzer.symbol())
    }
}

/// Efficiency `f ∈ (0, 1]` of a spin flipper. `1.0` is an ideal flipper.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct FlipperEfficiency(f64);

impl FlipperEfficiency {
    pub const IDEAL: FlipperEfficiency = FlipperEfficiency(1.0);

    pub fn new(value: f64) -> Result<Self, PolarizationError> {
        if !(value.is_finite() && value > 0.0 && value <= 1.0) {
            return Err(PolarizationError::invalid_input(format!(
                "Flipper efficiency must be in (0, 1], got {value}."
            )));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn is_ideal(self) -> bool {
        self.0 == 1.0
    }
}

impl Default for FlipperEfficiency {
    fn default() -> Self {
        Self::IDEAL
    }
}

impl TryFrom<f64> for FlipperEfficiency {
    type Error = PolarizationError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FlipperEfficiency> for f64 {
    fn from(value: FlipperEfficiency) -> Self {
        value.0
    }
}

/// Intensities of one measured spin channel.
///
/// Every element carries its own coordinates (event-like layout), so the
/// arrays are always the same length. Gridded data is flattened with
/// [`ChannelData::from_grid`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelData {
    values: Vec<f64>,
    wavelength: Vec<f64>,
    time: Option<Vec<f64>>,
}

impl ChannelData {
    pub fn new(
        values: Vec<f64>,
        wavelength: Vec<f64>,
        time: Option<Vec<f64>>,
    ) -> Result<Self, PolarizationError> {
        if wavelength.len() != values.len() {
            return Err(PolarizationError::invalid_input(format!(
                "Wavelength coordinate has length {} but data has length {}.",
                wavelength.len(),
                values.len()
            )));
        }
        if let Some(time) = &time {
            if time.len() != values.len() {
                return Err(PolarizationError::invalid_input(format!(
                    "Time coordinate has length {} but data has length {}.",
                    time.len(),
                    values.len()
                )));
            }
        }
        Ok(Self {
            values,
            wavelength,
            time,
        })
    }

    /// Flatten a `time × wavelength` grid (row-major, time outermost).
    ///
    /// An empty `time` slice yields data without a time coordinate.
    pub fn from_grid(
        wavelength: &[f64],
        time: &[f64],
        values: Vec<f64>,
    ) -> Result<Self, PolarizationError> {
        let n_time = time.len().max(1);
        if values.len() != n_time * wavelength.len() {
            return Err(PolarizationError::invalid_input(format!(
                "Grid of {} times x {} wavelengths needs {} values, got {}.",
                n_time,
                wavelength.len(),
                n_time * wavelength.len(),
                values.len()
            )));
        }
        let wl: Vec<f64> = (0..n_time).flat_map(|_| wavelength.iter().copied()).collect();
        let t = if time.is_empty() {
            None
        } else {
            Some(
                time.iter()
                    .flat_map(|&t| std::iter::repeat_n(t, wavelength.len()))
                    .collect(),
            )
        };
        Self::new(values, wl, t)
    }

    /// Scalar measurement at a single coordinate.
    pub fn scalar(value: f64, wavelength: f64, time: Option<f64>) -> Self {
        Self {
            values: vec![value],
            wavelength: vec![wavelength],
            time: time.map(|t| vec![t]),
        }
    }

    /// Same coordinates, new values.
    pub fn with_values(&self, values: Vec<f64>) -> Result<Self, PolarizationError> {
        Self::new(values, self.wavelength.clone(), self.time.clone())
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn wavelength(&self) -> &[f64] {
        &self.wavelength
    }

    pub fn time(&self) -> Option<&[f64]> {
        self.time.as_deref()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn time_at(&self, i: usize) -> Option<f64> {
        self.time.as_ref().map(|t| t[i])
    }
}

/// Calibration data on a `time × wavelength` grid (row-major, time outermost).
///
/// `wavelength` holds either one point per column or bin edges (one more
/// than the number of columns). An empty `time` means the data has no time axis.
#[derive(Debug, Clone, PartialEq)]
pub struct BeamData {
    wavelength: Vec<f64>,
    time: Vec<f64>,
    values: Vec<f64>,
}

/// One grid cell of [`BeamData`], with wavelength resolved to a point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamPoint {
    pub time: Option<f64>,
    pub wavelength: f64,
    pub value: f64,
}

impl BeamData {
    pub fn new(
        wavelength: Vec<f64>,
        time: Vec<f64>,
        values: Vec<f64>,
    ) -> Result<Self, PolarizationError> {
        let n_time = time.len().max(1);
        if values.is_empty() || values.len() % n_time != 0 {
            return Err(PolarizationError::invalid_input(format!(
                "Beam data with {} time points cannot hold {} values.",
                n_time,
                values.len()
            )));
        }
        let n_wavelength = values.len() / n_time;
        if wavelength.len() != n_wavelength && wavelength.len() != n_wavelength + 1 {
            return Err(PolarizationError::invalid_input(format!(
                "Wavelength coordinate of length {} matches neither {} points nor {} bin edges.",
                wavelength.len(),
                n_wavelength,
                n_wavelength + 1
            )));
        }
        Ok(Self {
            wavelength,
            time,
            values,
        })
    }

    /// Data that depends on wavelength only.
    pub fn wavelength_only(
        wavelength: Vec<f64>,
        values: Vec<f64>,
    ) -> Result<Self, PolarizationError> {
        Self::new(wavelength, Vec::new(), values)
    }

    pub fn wavelength(&self) -> &[f64] {
        &self.wavelength
    }

    /// Empty when the data has no time axis.
    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn has_time(&self) -> bool {
        !self.time.is_empty()
    }

    pub fn n_time(&self) -> usize {
        self.time.len().max(1)
    }

    pub fn n_wavelength(&self) -> usize {
        self.values.len() / self.n_time()
    }

    pub fn is_bin_edges(&self) -> bool {
        self.wavelength.len() == self.n_wavelength() + 1
    }

    /// Wavelength points; bin-edge coordinates are replaced by bin midpoints.
    pub fn wavelength_points(&self) -> Vec<f64> {
        if self.is_bin_edges() {
            midpoints(&self.wavelength)
        } else {
            self.wavelength.clone()
        }
    }

    pub fn points(&self) -> Vec<BeamPoint> {
        let wavelength = self.wavelength_points();
        let n_wl = wavelength.len();
        self.values
            .iter()
            .enumerate()
            .map(|(i, &value)| BeamPoint {
                time: if self.has_time() {
                    Some(self.time[i / n_wl])
                } else {
                    None
                },
                wavelength: wavelength[i % n_wl],
                value,
            })
            .collect()
    }

    pub fn same_grid(&self, other: &BeamData) -> bool {
        self.wavelength == other.wavelength
            && self.time == other.time
            && self.values.len() == other.values.len()
    }
}

/// Calibration data for a fit with polarized incoming beam.
///
/// `plus_minus` is the eigen-channel the section was recorded in; it must agree
/// with [`SpinChannel::expected_plus_minus`].
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedBeamData {
    pub channel: SpinChannel,
    pub plus_minus: Option<PlusMinus>,
    pub data: BeamData,
}

/// Four weights by which one measured channel contributes to each corrected output.
#[derive(Debug, Clone, PartialEq)]
pub struct PolarizationCorrection {
    pub upup: Vec<f64>,
    pub updown: Vec<f64>,
    pub downup: Vec<f64>,
    pub downdown: Vec<f64>,
}

/// Two weights for the polarizer-only case.
#[derive(Debug, Clone, PartialEq)]
pub struct HalfPolarizedCorrection {
    pub up: Vec<f64>,
    pub down: Vec<f64>,
}

/// Contribution of measured channels to the four corrected outputs.
///
/// Summing the contributions of all four measured channels with
/// [`PolarizationCorrectedData::accumulate`] yields the corrected result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolarizationCorrectedData {
    pub upup: Vec<f64>,
    pub updown: Vec<f64>,
    pub downup: Vec<f64>,
    pub downdown: Vec<f64>,
}

impl PolarizationCorrectedData {
    pub fn zeros(len: usize) -> Self {
        Self {
            upup: vec![0.0; len],
            updown: vec![0.0; len],
            downup: vec![0.0; len],
            downdown: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.upup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upup.is_empty()
    }

    pub fn channel(&self, channel: SpinChannel) -> &[f64] {
        match channel.index() {
            0 => &self.upup,
            1 => &self.updown,
            2 => &self.downup,
            _ => &self.downdown,
        }
    }

    pub fn accumulate(
        &mut self,
        other: &PolarizationCorrectedData,
    ) -> Result<(), PolarizationError> {
        if other.len() != self.len() {
            return Err(PolarizationError::invalid_input(format!(
                "Cannot add corrected contribution of length {} to accumulator of length {}.",
                other.len(),
                self.len()
            )));
        }
        add_assign(&mut self.upup, &other.upup);
        add_assign(&mut self.updown, &other.updown);
        add_assign(&mut self.downup, &other.downup);
        add_assign(&mut self.downdown, &other.downdown);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HalfPolarizedCorrectedData {
    pub up: Vec<f64>,
    pub down: Vec<f64>,
}

impl HalfPolarizedCorrectedData {
    pub fn zeros(len: usize) -> Self {
        Self {
            up: vec![0.0; len],
            down: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.up.len()
    }

    pub fn is_empty(&self) -> bool {
        self.up.is_empty()
    }

    pub fn accumulate(
        &mut self,
        other: &HalfPolarizedCorrectedData,
    ) -> Result<(), PolarizationError> {
        if other.len() != self.len() {
            return Err(PolarizationError::invalid_input(format!(
                "Cannot add corrected contribution of length {} to accumulator of length {}.",
                other.len(),
                self.len()
            )));
        }
        add_assign(&mut self.up, &other.up);
        add_assign(&mut self.down, &other.down);
        Ok(())
    }
}

fn add_assign(acc: &mut [f64], other: &[f64]) {
    for (a, b) in acc.iter_mut().zip(other) {
        *a += b;
    }
}

/// Physical model used for a polarizing element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementModelKind {
    He3,
    Supermirror,
}

/// Where the He3 cell opacity comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OpacitySource {
    /// Closed form from cell pressure, length and temperature.
    InSitu,
    /// Least-squares fit to a direct-beam measurement with depolarized cell,
    /// seeded with the cell-parameter estimate.
    ExSitu,
}

/// State of the beam entering a He3 cell during its calibration measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncomingBeam {
    Unpolarized,
    Polarized,
}

/// Options for the nonlinear He3 fits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitOptions {
    /// Starting point for the polarization amplitude `C`.
    pub initial_polarization: f64,
    /// Starting point for the decay time `T1` (seconds).
    pub initial_t1_seconds: f64,
    /// Caps the minimiser at `max_iterations · (p + 1)` residual evaluations
    /// for `p` fit parameters.
    pub max_iterations: usize,
    /// Relative step size below which the solver stops.
    pub x_tolerance: f64,
    /// Relative cost reduction below which the solver stops.
    pub f_tolerance: f64,
    /// Reject `|C| > 1` and non-positive opacity.
    pub enforce_physical_range: bool,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            initial_polarization: 0.8,
            initial_t1_seconds: 4.0e5,
            max_iterations: 200,
            x_tolerance: 1e-10,
            f_tolerance: 1e-14,
            enforce_physical_range: true,
        }
    }
}
