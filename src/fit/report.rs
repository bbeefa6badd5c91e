//! Fit outputs shared by the opacity and He3 decay fits.

use serde::Serialize;

use crate::domain::FitOptions;
use crate::math::{Solution, SolverSettings};

/// A fitted scalar and its standard error.
///
/// Only `value` feeds the correction; the error is informational.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FittedParameter {
    pub value: f64,
    pub std_error: Option<f64>,
}

impl FittedParameter {
    pub fn relative_error(&self) -> Option<f64> {
        self.std_error.map(|e| e / self.value.abs())
    }
}

/// Solver diagnostics for one fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FitReport {
    /// `½ Σ r²` at the solution.
    pub cost: f64,
    /// Residual evaluations spent by the minimiser.
    pub evaluations: usize,
    pub n_points: usize,
}

impl FitReport {
    pub fn rmse(&self) -> f64 {
        if self.n_points == 0 {
            return f64::NAN;
        }
        (2.0 * self.cost / self.n_points as f64).sqrt()
    }
}

impl From<&Solution> for FitReport {
    fn from(solution: &Solution) -> Self {
        Self {
            cost: solution.cost,
            evaluations: solution.evaluations,
            n_points: solution.n_residuals,
        }
    }
}

pub(crate) fn solver_settings(options: &FitOptions) -> SolverSettings {
    SolverSettings {
        max_iterations: options.max_iterations,
        x_tolerance: options.x_tolerance,
        f_tolerance: options.f_tolerance,
        ..SolverSettings::default()
    }
}
