//! Physical quantities for He3 cell parameters.
//!
//! Cell parameters arrive with units attached. Everything is normalised to SI
//! on construction except temperature, whose scale is kept so that a relative
//! scale (Celsius) can be rejected where an absolute one is required.

use serde::{Deserialize, Serialize};

use crate::error::PolarizationError;

/// Boltzmann constant in J/K.
pub const BOLTZMANN: f64 = 1.380_649e-23;

const CELSIUS_OFFSET: f64 = 273.15;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pressure {
    pascals: f64,
}

impl Pressure {
    pub fn pascals(value: f64) -> Self {
        Self { pascals: value }
    }

    pub fn bar(value: f64) -> Self {
        Self::pascals(value * 1.0e5)
    }

    pub fn millibar(value: f64) -> Self {
        Self::pascals(value * 1.0e2)
    }

    pub fn as_pascals(self) -> f64 {
        self.pascals
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Length {
    meters: f64,
}

impl Length {
    pub fn meters(value: f64) -> Self {
        Self { meters: value }
    }

    pub fn centimeters(value: f64) -> Self {
        Self::meters(value * 1.0e-2)
    }

    pub fn millimeters(value: f64) -> Self {
        Self::meters(value * 1.0e-3)
    }

    pub fn as_meters(self) -> f64 {
        self.meters
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureScale {
    Kelvin,
    Celsius,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Temperature {
    value: f64,
    scale: TemperatureScale,
}

impl Temperature {
    pub fn kelvin(value: f64) -> Self {
        Self {
            value,
            scale: TemperatureScale::Kelvin,
        }
    }

    pub fn celsius(value: f64) -> Self {
        Self {
            value,
            scale: TemperatureScale::Celsius,
        }
    }

    pub fn scale(self) -> TemperatureScale {
        self.scale
    }

    /// Absolute temperature in kelvin.
    ///
    /// Fails for relative scales; call [`Temperature::converted_to_kelvin`]
    /// first to opt into the conversion.
    pub fn to_kelvin(self) -> Result<f64, PolarizationError> {
        match self.scale {
            TemperatureScale::Kelvin => {
                if !(self.value.is_finite() && self.value > 0.0) {
                    return Err(PolarizationError::unit(format!(
                        "Absolute temperature must be positive, got {} K.",
                        self.value
                    )));
                }
                Ok(self.value)
            }
            TemperatureScale::Celsius => Err(PolarizationError::unit(format!(
                "Temperature {} degC is on a relative scale; convert it to kelvin explicitly.",
                self.value
            ))),
        }
    }

    /// Explicit conversion to the kelvin scale.
    pub fn converted_to_kelvin(self) -> Temperature {
        match self.scale {
            TemperatureScale::Kelvin => self,
            TemperatureScale::Celsius => Temperature::kelvin(self.value + CELSIUS_OFFSET),
        }
    }
}
