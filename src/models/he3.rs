//! He3 spin-filter transmission.
//!
//! A polarized He3 cell absorbs neutrons with spin antiparallel to the He3
//! nuclear spin much more strongly than parallel ones. With `O = O(λ)` and
//! `P = P(t)`:
//!
//! ```text
//! T±(λ, t) = T_E · exp(-O · (1 ± P))
//! ```
//!
//! `T_E` is the transmission of the empty glass cell.

use serde::Serialize;

use crate::domain::{ChannelData, PlusMinus};
use crate::error::PolarizationError;
use crate::models::{OpacityFunction, PolarizationDecayFunction, TransmissionFunction};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct He3TransmissionFunction {
    opacity: OpacityFunction,
    polarization: PolarizationDecayFunction,
    transmission_empty_glass: f64,
}

impl He3TransmissionFunction {
    pub fn new(
        opacity: OpacityFunction,
        polarization: PolarizationDecayFunction,
        transmission_empty_glass: f64,
    ) -> Result<Self, PolarizationError> {
        validate_empty_glass(transmission_empty_glass)?;
        Ok(Self {
            opacity,
            polarization,
            transmission_empty_glass,
        })
    }

    pub fn opacity(&self) -> OpacityFunction {
        self.opacity
    }

    pub fn polarization(&self) -> PolarizationDecayFunction {
        self.polarization
    }

    pub fn transmission_empty_glass(&self) -> f64 {
        self.transmission_empty_glass
    }

    pub fn evaluate(&self, wavelength: f64, time: f64, plus_minus: PlusMinus) -> f64 {
        transmission_incoming_polarized(
            self.transmission_empty_glass,
            self.opacity.opacity(wavelength),
            self.polarization.polarization(time),
            plus_minus,
        )
    }

    /// Transmission of an unpolarized beam, the mean of both eigen-channels.
    pub fn evaluate_unpolarized(&self, wavelength: f64, time: f64) -> f64 {
        transmission_incoming_unpolarized(
            self.transmission_empty_glass,
            self.opacity.opacity(wavelength),
            self.polarization.polarization(time),
        )
    }
}

impl TransmissionFunction for He3TransmissionFunction {
    fn transmission(
        &self,
        wavelength: f64,
        time: Option<f64>,
        plus_minus: PlusMinus,
    ) -> Result<f64, PolarizationError> {
        let time = time.ok_or_else(|| {
            PolarizationError::invalid_input("He3 transmission requires a time coordinate.")
        })?;
        Ok(self.evaluate(wavelength, time, plus_minus))
    }

    fn apply(
        &self,
        data: &ChannelData,
        plus_minus: PlusMinus,
    ) -> Result<Vec<f64>, PolarizationError> {
        let time = data.time().ok_or_else(|| {
            PolarizationError::invalid_input(
                "He3 transmission requires a time coordinate, but the data has none.",
            )
        })?;
        Ok(data
            .wavelength()
            .iter()
            .zip(time)
            .map(|(&wl, &t)| self.evaluate(wl, t, plus_minus))
            .collect())
    }
}

/// `T_E · exp(-O · (1 + sign·P))`.
pub fn transmission_incoming_polarized(
    transmission_empty_glass: f64,
    opacity: f64,
    polarization: f64,
    plus_minus: PlusMinus,
) -> f64 {
    transmission_empty_glass * (-opacity * (1.0 + plus_minus.sign() * polarization)).exp()
}

/// `T_E · exp(-O) · cosh(O·P)`.
pub fn transmission_incoming_unpolarized(
    transmission_empty_glass: f64,
    opacity: f64,
    polarization: f64,
) -> f64 {
    transmission_empty_glass * (-opacity).exp() * (opacity * polarization).cosh()
}

pub(crate) fn validate_empty_glass(value: f64) -> Result<(), PolarizationError> {
    if !(value.is_finite() && value > 0.0) {
        return Err(PolarizationError::invalid_input(format!(
            "Empty-glass transmission must be positive, got {value}."
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn cell() -> He3TransmissionFunction {
        He3TransmissionFunction::new(
            OpacityFunction::new(0.6).unwrap(),
            PolarizationDecayFunction::new(0.8, 6000.0).unwrap(),
            0.9,
        )
        .unwrap()
    }

    #[test]
    fn plus_and_minus_bracket_unpolarized_mean() {
        let he3 = cell();
        let plus = he3.evaluate(3.0, 1000.0, PlusMinus::Plus);
        let minus = he3.evaluate(3.0, 1000.0, PlusMinus::Minus);
        let mean = he3.evaluate_unpolarized(3.0, 1000.0);
        assert!(minus > plus);
        assert!((0.5 * (plus + minus) - mean).abs() < 1e-14);
    }

    #[test]
    fn zero_polarization_is_plain_absorption() {
        let value = transmission_incoming_polarized(0.9, 1.5, 0.0, PlusMinus::Plus);
        assert!((value - 0.9 * (-1.5f64).exp()).abs() < 1e-15);
    }

    #[test]
    fn apply_uses_per_element_coordinates() {
        let he3 = cell();
        let data = ChannelData::from_grid(&[1.0, 4.0], &[0.0, 12000.0], vec![0.0; 4]).unwrap();
        let values = he3.apply(&data, PlusMinus::Minus).unwrap();
        assert_eq!(values.len(), 4);
        assert_eq!(values[3], he3.evaluate(4.0, 12000.0, PlusMinus::Minus));
        assert_eq!(values[0], he3.evaluate(1.0, 0.0, PlusMinus::Minus));
    }

    #[test]
    fn construction_validates_empty_glass() {
        let opacity = OpacityFunction::new(0.6).unwrap();
        let decay = PolarizationDecayFunction::new(0.8, 6000.0).unwrap();
        assert!(He3TransmissionFunction::new(opacity, decay, 0.0).is_err());
        assert!(He3TransmissionFunction::new(opacity, decay, f64::NAN).is_err());

        let he3 = cell();
        assert_eq!(he3.transmission_empty_glass(), 0.9);
        assert_eq!(he3.opacity(), opacity);
        assert_eq!(he3.polarization(), decay);
    }

    #[test]
    fn apply_without_time_is_rejected() {
        let data = ChannelData::new(vec![1.0], vec![2.0], None).unwrap();
        let err = cell().apply(&data, PlusMinus::Plus).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
