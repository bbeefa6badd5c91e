//! Nonlinear least squares for the He3 fits.
//!
//! The minimisation itself is MINPACK's `lmder`, via the `levenberg-marquardt`
//! crate. This module adapts our residual models to it and turns its
//! termination report into a [`Solution`] or a `FitConvergence` error.
//!
//! - Models supply analytic Jacobians; every fit here has one or two parameters.
//! - Non-finite residuals abort the minimisation.
//! - The covariance `s²·(JᵀJ)⁻¹` is taken from the model Jacobian at the solution.

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use nalgebra::storage::Owned;
use nalgebra::{DMatrix, DVector, Dyn};
use tracing::trace;

use crate::error::PolarizationError;

/// A residual vector `r(p)` and its Jacobian `∂r/∂p`.
pub trait ResidualModel {
    fn n_residuals(&self) -> usize;

    fn residuals(&self, params: &DVector<f64>) -> DVector<f64>;

    /// `n_residuals × params.len()` matrix of partial derivatives.
    fn jacobian(&self, params: &DVector<f64>) -> DMatrix<f64>;
}

/// Stopping rules, passed through to the minimiser.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverSettings {
    /// The minimiser may evaluate the residuals `max_iterations · (p + 1)` times.
    pub max_iterations: usize,
    pub x_tolerance: f64,
    pub f_tolerance: f64,
    pub gradient_tolerance: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            x_tolerance: 1e-10,
            f_tolerance: 1e-14,
            gradient_tolerance: 1e-12,
        }
    }
}

/// Converged solution.
#[derive(Debug, Clone)]
pub struct Solution {
    pub params: DVector<f64>,
    /// `½ Σ r²` at `params`.
    pub cost: f64,
    pub evaluations: usize,
    pub n_residuals: usize,
    /// `s²·(JᵀJ)⁻¹` with `s² = Σ r² / (n - p)`; `None` if not estimable.
    pub covariance: Option<DMatrix<f64>>,
}

impl Solution {
    /// Standard error of parameter `k`, if the covariance is available.
    pub fn std_error(&self, k: usize) -> Option<f64> {
        self.covariance
            .as_ref()
            .map(|cov| cov[(k, k)])
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(f64::sqrt)
    }
}

struct Problem<'a, M: ?Sized> {
    model: &'a M,
    params: DVector<f64>,
}

impl<M> LeastSquaresProblem<f64, Dyn, Dyn> for Problem<'_, M>
where
    M: ResidualModel + ?Sized,
{
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, params: &DVector<f64>) {
        self.params.copy_from(params);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        let residuals = self.model.residuals(&self.params);
        residuals.iter().all(|v| v.is_finite()).then_some(residuals)
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let jacobian = self.model.jacobian(&self.params);
        jacobian.iter().all(|v| v.is_finite()).then_some(jacobian)
    }
}

/// Minimise `½ Σ r²` of `model` starting from `initial`.
pub fn levenberg_marquardt<M>(
    model: &M,
    initial: DVector<f64>,
    settings: &SolverSettings,
) -> Result<Solution, PolarizationError>
where
    M: ResidualModel + ?Sized,
{
    let n = model.n_residuals();
    let m = initial.len();
    if m == 0 || n < m {
        return Err(PolarizationError::invalid_input(format!(
            "Least squares needs at least as many residuals as parameters (n={n}, p={m})."
        )));
    }
    if !model.residuals(&initial).iter().all(|v| v.is_finite()) {
        return Err(PolarizationError::fit(format!(
            "Model is not finite at the initial guess {:?}.",
            initial.as_slice()
        )));
    }

    let problem = Problem {
        model,
        params: initial,
    };
    let (problem, report) = LevenbergMarquardt::new()
        .with_xtol(settings.x_tolerance)
        .with_ftol(settings.f_tolerance)
        .with_gtol(settings.gradient_tolerance)
        .with_patience(settings.max_iterations.max(1))
        .minimize(problem);
    trace!(
        termination = ?report.termination,
        evaluations = report.number_of_evaluations,
        cost = report.objective_function,
        "minimiser finished"
    );

    if !report.termination.was_successful() {
        return Err(PolarizationError::fit(format!(
            "Fit did not converge ({:?}) after {} evaluations (last parameters {:?}).",
            report.termination,
            report.number_of_evaluations,
            problem.params.as_slice()
        )));
    }

    let params = problem.params;
    let cost = report.objective_function;
    let covariance = if n > m {
        let jac = model.jacobian(&params);
        let s2 = 2.0 * cost / (n - m) as f64;
        jac.tr_mul(&jac).try_inverse().map(|inv| inv * s2)
    } else {
        None
    };
    Ok(Solution {
        params,
        cost,
        evaluations: report.number_of_evaluations,
        n_residuals: n,
        covariance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    struct Decay {
        x: Vec<f64>,
        y: Vec<f64>,
    }

    impl ResidualModel for Decay {
        fn n_residuals(&self) -> usize {
            self.x.len()
        }

        fn residuals(&self, p: &DVector<f64>) -> DVector<f64> {
            DVector::from_iterator(
                self.x.len(),
                self.x
                    .iter()
                    .zip(&self.y)
                    .map(|(&x, &y)| p[0] * (-p[1] * x).exp() - y),
            )
        }

        fn jacobian(&self, p: &DVector<f64>) -> DMatrix<f64> {
            DMatrix::from_fn(self.x.len(), 2, |i, j| {
                let e = (-p[1] * self.x[i]).exp();
                if j == 0 { e } else { -p[0] * self.x[i] * e }
            })
        }
    }

    struct Rosenbrock;

    impl ResidualModel for Rosenbrock {
        fn n_residuals(&self) -> usize {
            2
        }

        fn residuals(&self, p: &DVector<f64>) -> DVector<f64> {
            DVector::from_row_slice(&[10.0 * (p[1] - p[0] * p[0]), 1.0 - p[0]])
        }

        fn jacobian(&self, p: &DVector<f64>) -> DMatrix<f64> {
            DMatrix::from_row_slice(2, 2, &[-20.0 * p[0], 10.0, -1.0, 0.0])
        }
    }

    #[test]
    fn recovers_exponential_decay() {
        let x: Vec<f64> = (0..30).map(|i| i as f64 * 0.2).collect();
        let y = x.iter().map(|&x| 2.5 * (-0.7 * x).exp()).collect();
        let problem = Decay { x, y };

        let sol = levenberg_marquardt(
            &problem,
            DVector::from_row_slice(&[1.0, 0.1]),
            &SolverSettings::default(),
        )
        .unwrap();
        assert!((sol.params[0] - 2.5).abs() < 1e-9);
        assert!((sol.params[1] - 0.7).abs() < 1e-9);
        assert!(sol.cost < 1e-16);
        assert!(sol.evaluations > 1);
    }

    #[test]
    fn solves_rosenbrock_from_standard_start() {
        let sol = levenberg_marquardt(
            &Rosenbrock,
            DVector::from_row_slice(&[-1.2, 1.0]),
            &SolverSettings::default(),
        )
        .unwrap();
        assert!((sol.params[0] - 1.0).abs() < 1e-8);
        assert!((sol.params[1] - 1.0).abs() < 1e-8);
        // n == p: no residual degrees of freedom for a covariance.
        assert!(sol.covariance.is_none());
    }

    #[test]
    fn evaluation_budget_exhaustion_is_an_error() {
        let settings = SolverSettings {
            max_iterations: 1,
            ..SolverSettings::default()
        };
        let err = levenberg_marquardt(&Rosenbrock, DVector::from_row_slice(&[-1.2, 1.0]), &settings)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FitConvergence);
    }

    #[test]
    fn rejects_underdetermined_problem() {
        let problem = Decay {
            x: vec![1.0],
            y: vec![1.0],
        };
        let err = levenberg_marquardt(
            &problem,
            DVector::from_row_slice(&[1.0, 1.0]),
            &SolverSettings::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn non_finite_start_is_a_fit_error() {
        let problem = Decay {
            x: vec![1.0, 2.0, 3.0],
            y: vec![1.0, 0.5, 0.25],
        };
        let err = levenberg_marquardt(
            &problem,
            DVector::from_row_slice(&[1.0, f64::NAN]),
            &SolverSettings::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FitConvergence);
    }

    #[test]
    fn standard_errors_shrink_with_more_data() {
        let make = |n: usize| {
            let x: Vec<f64> = (0..n).map(|i| i as f64 * 5.0 / n as f64).collect();
            // Deterministic alternating perturbation.
            let y = x
                .iter()
                .enumerate()
                .map(|(i, &x)| 2.0 * (-0.5 * x).exp() + if i % 2 == 0 { 0.01 } else { -0.01 })
                .collect();
            Decay { x, y }
        };
        let settings = SolverSettings::default();
        let start = DVector::from_row_slice(&[1.0, 1.0]);
        let small = levenberg_marquardt(&make(20), start.clone(), &settings).unwrap();
        let large = levenberg_marquardt(&make(2000), start, &settings).unwrap();
        assert!(large.std_error(0).unwrap() < small.std_error(0).unwrap());
    }
}
