//! He3 cell opacity.
//!
//! The opacity of a He3 cell is linear in wavelength because the neutron
//! absorption cross-section of He3 is proportional to wavelength:
//!
//! ```text
//! O(λ) = opacity0 · λ,    opacity0 = σ₀ / (k_B·T) · p · L
//! ```
//!
//! with `σ₀` the cross-section at 1 Å and `p / (k_B·T)` the number density.

use serde::{Deserialize, Serialize};

use crate::error::PolarizationError;
use crate::units::{BOLTZMANN, Length, Pressure, Temperature};

/// He3 neutron absorption cross-section at 1 Å, in m² per Å (2966 barn).
pub const HE3_ABSORPTION_CROSS_SECTION: f64 = 2966.0e-28;

/// Static parameters of a He3 cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct He3CellParams {
    pub pressure: Pressure,
    pub length: Length,
    pub temperature: Temperature,
}

/// `opacity0` in 1/Å from cell pressure, length and absolute temperature.
pub fn opacity0_from_cell_params(cell: &He3CellParams) -> Result<f64, PolarizationError> {
    let kelvin = cell.temperature.to_kelvin()?;
    let pressure = cell.pressure.as_pascals();
    let length = cell.length.as_meters();
    if !(pressure.is_finite() && pressure > 0.0) {
        return Err(PolarizationError::invalid_input(format!(
            "Cell pressure must be positive, got {pressure} Pa."
        )));
    }
    if !(length.is_finite() && length > 0.0) {
        return Err(PolarizationError::invalid_input(format!(
            "Cell length must be positive, got {length} m."
        )));
    }
    Ok(HE3_ABSORPTION_CROSS_SECTION / (BOLTZMANN * kelvin) * pressure * length)
}

/// Wavelength-dependent opacity `O(λ) = opacity0 · λ`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OpacityFunction {
    opacity0: f64,
}

impl OpacityFunction {
    pub fn new(opacity0: f64) -> Result<Self, PolarizationError> {
        if !opacity0.is_finite() {
            return Err(PolarizationError::invalid_input(format!(
                "Opacity at 1 Å must be finite, got {opacity0}."
            )));
        }
        Ok(Self { opacity0 })
    }

    pub fn from_cell_params(cell: &He3CellParams) -> Result<Self, PolarizationError> {
        Self::new(opacity0_from_cell_params(cell)?)
    }

    /// Opacity at 1 Å, in 1/Å.
    pub fn opacity0(&self) -> f64 {
        self.opacity0
    }

    pub fn opacity(&self, wavelength: f64) -> f64 {
        self.opacity0 * wavelength
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn cell(pressure_bar: f64, length_m: f64, kelvin: f64) -> He3CellParams {
        He3CellParams {
            pressure: Pressure::bar(pressure_bar),
            length: Length::meters(length_m),
            temperature: Temperature::kelvin(kelvin),
        }
    }

    #[test]
    fn reproduces_literature_value() {
        // 1 bar, 1 cm, 20 degC, 1 Å.
        let opacity = OpacityFunction::from_cell_params(&cell(1.0, 0.01, 293.15)).unwrap();
        let value = opacity.opacity(1.0);
        assert!(((value - 0.0733) / 0.0733).abs() < 1e-3, "got {value}");
    }

    #[test]
    fn scales_linearly_with_pressure_length_wavelength() {
        let base = OpacityFunction::from_cell_params(&cell(1.0, 1.0, 200.0)).unwrap();
        let double_p = OpacityFunction::from_cell_params(&cell(2.0, 1.0, 200.0)).unwrap();
        let double_l = OpacityFunction::from_cell_params(&cell(1.0, 2.0, 200.0)).unwrap();
        let double_t = OpacityFunction::from_cell_params(&cell(1.0, 1.0, 400.0)).unwrap();
        let o = base.opacity(10.0);
        assert!((double_p.opacity(10.0) - 2.0 * o).abs() < 1e-12 * o);
        assert!((double_l.opacity(10.0) - 2.0 * o).abs() < 1e-12 * o);
        assert!((base.opacity(20.0) - 2.0 * o).abs() < 1e-12 * o);
        assert!((2.0 * double_t.opacity(10.0) - o).abs() < 1e-12 * o);
    }

    #[test]
    fn celsius_temperature_is_a_unit_error() {
        let cell = He3CellParams {
            pressure: Pressure::bar(1.0),
            length: Length::meters(1.0),
            temperature: Temperature::celsius(200.0),
        };
        let err = opacity0_from_cell_params(&cell).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unit);
    }

    #[test]
    fn non_positive_geometry_is_rejected() {
        assert!(opacity0_from_cell_params(&cell(0.0, 1.0, 300.0)).is_err());
        assert!(opacity0_from_cell_params(&cell(1.0, -1.0, 300.0)).is_err());
    }
}
