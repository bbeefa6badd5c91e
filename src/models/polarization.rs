use serde::Serialize;

use crate::error::PolarizationError;

/// Exponential relaxation of He3 polarization, `P(t) = C · exp(-t / T1)`.
///
/// `t` is measured in seconds from the cell filling time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PolarizationDecayFunction {
    c: f64,
    t1: f64,
}

impl PolarizationDecayFunction {
    pub fn new(c: f64, t1: f64) -> Result<Self, PolarizationError> {
        if !c.is_finite() {
            return Err(PolarizationError::invalid_input(format!(
                "Polarization amplitude must be finite, got {c}."
            )));
        }
        if !(t1.is_finite() && t1 > 0.0) {
            return Err(PolarizationError::invalid_input(format!(
                "Polarization decay time must be positive, got {t1} s."
            )));
        }
        Ok(Self { c, t1 })
    }

    /// Polarization at the filling time.
    pub fn c(&self) -> f64 {
        self.c
    }

    /// Decay time in seconds.
    pub fn t1(&self) -> f64 {
        self.t1
    }

    pub fn polarization(&self, time: f64) -> f64 {
        self.c * (-time / self.t1).exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decays_by_e_after_one_time_constant() {
        let decay = PolarizationDecayFunction::new(0.7, 3600.0).unwrap();
        assert_eq!(decay.polarization(0.0), 0.7);
        assert!((decay.polarization(3600.0) - 0.7 / std::f64::consts::E).abs() < 1e-12);
    }

    #[test]
    fn rejects_non_positive_t1() {
        assert!(PolarizationDecayFunction::new(0.7, 0.0).is_err());
        assert!(PolarizationDecayFunction::new(0.7, f64::INFINITY).is_err());
    }
}
