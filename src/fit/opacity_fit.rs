//! Ex-situ opacity: fit `opacity0` to a direct beam through a depolarized cell.
//!
//! With the He3 polarization destroyed, the cell is a plain absorber:
//!
//! ```text
//! T(λ) = T_E · exp(-opacity0 · λ)
//! ```

use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::{BeamData, FitOptions};
use crate::error::PolarizationError;
use crate::fit::report::solver_settings;
use crate::fit::{FitReport, FittedParameter};
use crate::math::{ResidualModel, levenberg_marquardt};
use crate::models::OpacityFunction;
use crate::models::he3::validate_empty_glass;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OpacityFit {
    pub opacity: OpacityFunction,
    pub opacity0: FittedParameter,
    pub report: FitReport,
}

struct DepolarizedCell {
    transmission_empty_glass: f64,
    wavelength: Vec<f64>,
    observed: Vec<f64>,
}

impl ResidualModel for DepolarizedCell {
    fn n_residuals(&self) -> usize {
        self.observed.len()
    }

    fn residuals(&self, params: &DVector<f64>) -> DVector<f64> {
        let opacity0 = params[0];
        DVector::from_iterator(
            self.observed.len(),
            self.wavelength
                .iter()
                .zip(&self.observed)
                .map(|(&wl, &y)| self.transmission_empty_glass * (-opacity0 * wl).exp() - y),
        )
    }

    fn jacobian(&self, params: &DVector<f64>) -> DMatrix<f64> {
        let opacity0 = params[0];
        DMatrix::from_iterator(
            self.wavelength.len(),
            1,
            self.wavelength
                .iter()
                .map(|&wl| -wl * self.transmission_empty_glass * (-opacity0 * wl).exp()),
        )
    }
}

/// Fit `opacity0` (1/Å) to a depolarized-cell transmission fraction.
///
/// `initial_opacity0` is usually the in-situ estimate from cell parameters.
/// Bin-edge wavelengths are evaluated at bin midpoints. A time axis, if
/// present, is ignored: every time row enters the fit as extra observations.
pub fn opacity_function_from_beam_data(
    transmission_empty_glass: f64,
    transmission_fraction: &BeamData,
    initial_opacity0: f64,
    options: &FitOptions,
) -> Result<OpacityFit, PolarizationError> {
    validate_empty_glass(transmission_empty_glass)?;
    if !initial_opacity0.is_finite() {
        return Err(PolarizationError::invalid_input(format!(
            "Initial opacity must be finite, got {initial_opacity0}."
        )));
    }

    let (wavelength, observed): (Vec<f64>, Vec<f64>) = transmission_fraction
        .points()
        .into_iter()
        .map(|p| (p.wavelength, p.value))
        .unzip();
    if observed.iter().chain(&wavelength).any(|v| !v.is_finite()) {
        return Err(PolarizationError::invalid_input(
            "Depolarized-cell transmission contains non-finite values.",
        ));
    }

    let problem = DepolarizedCell {
        transmission_empty_glass,
        wavelength,
        observed,
    };
    let solution = levenberg_marquardt(
        &problem,
        DVector::from_element(1, initial_opacity0),
        &solver_settings(options),
    )?;

    let opacity0 = solution.params[0];
    if !opacity0.is_finite() || (options.enforce_physical_range && opacity0 <= 0.0) {
        warn!(opacity0, "rejecting unphysical opacity fit");
        return Err(PolarizationError::fit(format!(
            "Opacity fit produced unphysical opacity0 = {opacity0} 1/Å."
        )));
    }
    let report = FitReport::from(&solution);
    debug!(
        opacity0,
        evaluations = report.evaluations,
        rmse = report.rmse(),
        "opacity fit converged"
    );

    Ok(OpacityFit {
        opacity: OpacityFunction::new(opacity0)?,
        opacity0: FittedParameter {
            value: opacity0,
            std_error: solution.std_error(0),
        },
        report,
    })
}
