//! The `TransmissionFunction` seam between physical models and the correction.

use crate::domain::{ChannelData, ElementModelKind, PlusMinus};
use crate::error::PolarizationError;
use crate::models::{He3TransmissionFunction, SupermirrorTransmissionFunction};

/// Transmission fraction of a polarizing element for its two eigen-channels.
///
/// Implementations must be immutable after construction: the same instance is
/// evaluated concurrently on all measured channels.
pub trait TransmissionFunction: Send + Sync {
    /// Transmission at one coordinate (wavelength in Å, time in s).
    fn transmission(
        &self,
        wavelength: f64,
        time: Option<f64>,
        plus_minus: PlusMinus,
    ) -> Result<f64, PolarizationError>;

    /// Transmission on the coordinates of `data`; the values of `data` are ignored.
    fn apply(
        &self,
        data: &ChannelData,
        plus_minus: PlusMinus,
    ) -> Result<Vec<f64>, PolarizationError> {
        data.wavelength()
            .iter()
            .enumerate()
            .map(|(i, &wl)| self.transmission(wl, data.time_at(i), plus_minus))
            .collect()
    }
}

/// The transmission model chosen for one element.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementTransmission {
    He3(He3TransmissionFunction),
    Supermirror(SupermirrorTransmissionFunction),
}

impl ElementTransmission {
    pub fn model_kind(&self) -> ElementModelKind {
        match self {
            ElementTransmission::He3(_) => ElementModelKind::He3,
            ElementTransmission::Supermirror(_) => ElementModelKind::Supermirror,
        }
    }
}

impl TransmissionFunction for ElementTransmission {
    fn transmission(
        &self,
        wavelength: f64,
        time: Option<f64>,
        plus_minus: PlusMinus,
    ) -> Result<f64, PolarizationError> {
        match self {
            ElementTransmission::He3(t) => t.transmission(wavelength, time, plus_minus),
            ElementTransmission::Supermirror(t) => t.transmission(wavelength, time, plus_minus),
        }
    }

    fn apply(
        &self,
        data: &ChannelData,
        plus_minus: PlusMinus,
    ) -> Result<Vec<f64>, PolarizationError> {
        match self {
            ElementTransmission::He3(t) => t.apply(data, plus_minus),
            ElementTransmission::Supermirror(t) => t.apply(data, plus_minus),
        }
    }
}

impl From<He3TransmissionFunction> for ElementTransmission {
    fn from(value: He3TransmissionFunction) -> Self {
        ElementTransmission::He3(value)
    }
}

impl From<SupermirrorTransmissionFunction> for ElementTransmission {
    fn from(value: SupermirrorTransmissionFunction) -> Self {
        ElementTransmission::Supermirror(value)
    }
}
