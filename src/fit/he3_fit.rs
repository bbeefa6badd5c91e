//! He3 polarization-decay fit.
//!
//! Given the opacity of a cell and its empty-glass transmission, we fit the
//! decay `P(t) = C · exp(-t / T1)` jointly over wavelength and time to the
//! measured transmission fraction `with cell / without cell`.
//!
//! Two calibration setups are supported:
//! - unpolarized incoming beam: `T = T_E · exp(-O) · cosh(O·P)`
//! - polarized incoming beam: `T = T_E · exp(-O · (1 ± P))`, where each data
//!   section carries the plus/minus channel it was recorded in.
//!
//! `T1` is fitted as `ln T1`. The decay time is typically 10⁴..10⁶ s while `C`
//! is of order one, and the log scale keeps the solver away from `T1 ≤ 0`.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::{BeamData, FitOptions, PlusMinus, TaggedBeamData};
use crate::error::PolarizationError;
use crate::fit::report::solver_settings;
use crate::fit::{FitReport, FittedParameter};
use crate::math::{ResidualModel, levenberg_marquardt};
use crate::models::he3::validate_empty_glass;
use crate::models::{
    He3TransmissionFunction, OpacityFunction, PolarizationDecayFunction,
    transmission_incoming_polarized, transmission_incoming_unpolarized,
};

/// Transmission-fraction measurements used to calibrate a He3 cell.
#[derive(Debug, Clone, PartialEq)]
pub enum He3Calibration {
    /// Unpolarized beam through the cell, on a time × wavelength grid.
    Unpolarized(BeamData),
    /// Beam polarized upstream of the cell, one section per measured channel.
    Polarized(Vec<TaggedBeamData>),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct He3Fit {
    pub transmission: He3TransmissionFunction,
    pub c: FittedParameter,
    /// Decay time in seconds.
    pub t1: FittedParameter,
    pub report: FitReport,
}

#[derive(Debug, Clone, Copy)]
struct Observation {
    wavelength: f64,
    time: f64,
    /// `None` for an unpolarized incoming beam.
    plus_minus: Option<PlusMinus>,
    value: f64,
}

struct DecayProblem {
    opacity: OpacityFunction,
    transmission_empty_glass: f64,
    observations: Vec<Observation>,
}

impl DecayProblem {
    /// Model value and `∂T/∂P` for one observation.
    fn model(&self, obs: &Observation, polarization: f64) -> (f64, f64) {
        let te = self.transmission_empty_glass;
        let opacity = self.opacity.opacity(obs.wavelength);
        match obs.plus_minus {
            Some(pm) => {
                let value = transmission_incoming_polarized(te, opacity, polarization, pm);
                (value, -opacity * pm.sign() * value)
            }
            None => (
                transmission_incoming_unpolarized(te, opacity, polarization),
                te * (-opacity).exp() * opacity * (opacity * polarization).sinh(),
            ),
        }
    }
}

/// Parameters are `[C, ln T1]`.
impl ResidualModel for DecayProblem {
    fn n_residuals(&self) -> usize {
        self.observations.len()
    }

    fn residuals(&self, params: &DVector<f64>) -> DVector<f64> {
        let (c, t1) = (params[0], params[1].exp());
        let values: Vec<f64> = self
            .observations
            .par_iter()
            .map(|obs| self.model(obs, c * (-obs.time / t1).exp()).0 - obs.value)
            .collect();
        DVector::from_vec(values)
    }

    fn jacobian(&self, params: &DVector<f64>) -> DMatrix<f64> {
        let (c, t1) = (params[0], params[1].exp());
        let rows: Vec<[f64; 2]> = self
            .observations
            .par_iter()
            .map(|obs| {
                let decay = (-obs.time / t1).exp();
                let polarization = c * decay;
                let (_, d_polarization) = self.model(obs, polarization);
                // ∂P/∂C = exp(-t/T1), ∂P/∂ln T1 = P·t/T1
                [d_polarization * decay, d_polarization * polarization * obs.time / t1]
            })
            .collect();
        DMatrix::from_fn(rows.len(), 2, |i, j| rows[i][j])
    }
}

/// Fit the He3 decay for either calibration setup.
pub fn get_he3_transmission_from_fit(
    calibration: &He3Calibration,
    opacity: OpacityFunction,
    transmission_empty_glass: f64,
    options: &FitOptions,
) -> Result<He3Fit, PolarizationError> {
    match calibration {
        He3Calibration::Unpolarized(data) => get_he3_transmission_from_fit_unpolarized(
            data,
            opacity,
            transmission_empty_glass,
            options,
        ),
        He3Calibration::Polarized(sections) => get_he3_transmission_from_fit_polarized(
            sections,
            opacity,
            transmission_empty_glass,
            options,
        ),
    }
}

pub fn get_he3_transmission_from_fit_unpolarized(
    transmission_fraction: &BeamData,
    opacity: OpacityFunction,
    transmission_empty_glass: f64,
    options: &FitOptions,
) -> Result<He3Fit, PolarizationError> {
    let observations = observations(transmission_fraction, None, "unpolarized calibration")?;
    fit_decay(opacity, transmission_empty_glass, observations, options, false)
}

/// Fit with a polarized incoming beam.
///
/// Every section must be tagged with the plus/minus channel its spin
/// combination selects (see [`crate::domain::SpinChannel::expected_plus_minus`]).
pub fn get_he3_transmission_from_fit_polarized(
    sections: &[TaggedBeamData],
    opacity: OpacityFunction,
    transmission_empty_glass: f64,
    options: &FitOptions,
) -> Result<He3Fit, PolarizationError> {
    if sections.is_empty() {
        return Err(PolarizationError::invalid_input(
            "Polarized He3 calibration needs at least one data section.",
        ));
    }
    check_plus_minus_tags(sections)?;

    let mut all = Vec::new();
    for (i, section) in sections.iter().enumerate() {
        let label = format!("section {i} (channel {})", section.channel.label());
        all.extend(observations(&section.data, section.plus_minus, &label)?);
    }
    fit_decay(opacity, transmission_empty_glass, all, options, true)
}

/// Verify that every section carries the plus/minus tag its channel implies.
pub fn check_plus_minus_tags(sections: &[TaggedBeamData]) -> Result<(), PolarizationError> {
    for (i, section) in sections.iter().enumerate() {
        let expected = section.channel.expected_plus_minus();
        match section.plus_minus {
            None => {
                return Err(PolarizationError::config_mismatch(format!(
                    "Section {i} (channel {}) has no plus/minus tag; expected '{}'.",
                    section.channel.label(),
                    expected.display_name()
                )));
            }
            Some(tag) if tag != expected => {
                return Err(PolarizationError::config_mismatch(format!(
                    "Section {i} (channel {}) is tagged '{}' but the channel selects '{}'.",
                    section.channel.label(),
                    tag.display_name(),
                    expected.display_name()
                )));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn observations(
    data: &BeamData,
    plus_minus: Option<PlusMinus>,
    what: &str,
) -> Result<Vec<Observation>, PolarizationError> {
    if !data.has_time() {
        return Err(PolarizationError::invalid_input(format!(
            "He3 decay fit needs a time axis, but the {what} data has none."
        )));
    }
    data.points()
        .into_iter()
        .map(|p| {
            let time = p.time.unwrap_or_default();
            if !(p.value.is_finite() && p.wavelength.is_finite() && time.is_finite()) {
                return Err(PolarizationError::invalid_input(format!(
                    "Non-finite transmission fraction in {what} at λ = {} Å, t = {time} s.",
                    p.wavelength
                )));
            }
            Ok(Observation {
                wavelength: p.wavelength,
                time,
                plus_minus,
                value: p.value,
            })
        })
        .collect()
}

fn fit_decay(
    opacity: OpacityFunction,
    transmission_empty_glass: f64,
    observations: Vec<Observation>,
    options: &FitOptions,
    polarized: bool,
) -> Result<He3Fit, PolarizationError> {
    validate_empty_glass(transmission_empty_glass)?;
    let (c0, t1_0) = (options.initial_polarization, options.initial_t1_seconds);
    if !(c0.is_finite() && t1_0.is_finite() && t1_0 > 0.0) {
        return Err(PolarizationError::invalid_input(format!(
            "Invalid starting point C = {c0}, T1 = {t1_0} s."
        )));
    }

    let problem = DecayProblem {
        opacity,
        transmission_empty_glass,
        observations,
    };
    debug!(
        n_points = problem.observations.len(),
        polarized, "fitting He3 polarization decay"
    );
    let solution = levenberg_marquardt(
        &problem,
        DVector::from_row_slice(&[c0, t1_0.ln()]),
        &solver_settings(options),
    )?;

    // cosh is even in C: the unpolarized model only determines |C|.
    let c = if polarized {
        solution.params[0]
    } else {
        solution.params[0].abs()
    };
    let t1 = solution.params[1].exp();

    if !(c.is_finite() && t1.is_finite() && t1 > 0.0) {
        warn!(c, t1, "rejecting non-finite He3 fit");
        return Err(PolarizationError::fit(format!(
            "He3 fit produced non-finite parameters C = {c}, T1 = {t1} s."
        )));
    }
    if options.enforce_physical_range && c.abs() > 1.0 {
        warn!(c, t1, "rejecting He3 fit with |C| > 1");
        return Err(PolarizationError::fit(format!(
            "He3 fit produced polarization C = {c} outside [-1, 1]."
        )));
    }

    let report = FitReport::from(&solution);
    debug!(
        c,
        t1,
        evaluations = report.evaluations,
        rmse = report.rmse(),
        "He3 fit converged"
    );

    Ok(He3Fit {
        transmission: He3TransmissionFunction::new(
            opacity,
            PolarizationDecayFunction::new(c, t1)?,
            transmission_empty_glass,
        )?,
        c: FittedParameter {
            value: c,
            std_error: solution.std_error(0),
        },
        t1: FittedParameter {
            value: t1,
            // d T1 = T1 · d ln T1
            std_error: solution.std_error(1).map(|s| s * t1),
        },
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::{he3_calibration_grid, he3_polarized_calibration_sections};
    use crate::domain::SpinChannel;
    use crate::error::ErrorKind;
    use crate::math::linspace;

    const C: f64 = 0.8;
    const T1: f64 = 6000.0;
    const TE: f64 = 0.9;

    fn cell() -> He3TransmissionFunction {
        He3TransmissionFunction::new(
            OpacityFunction::new(0.6).unwrap(),
            PolarizationDecayFunction::new(C, T1).unwrap(),
            TE,
        )
        .unwrap()
    }

    fn rel(a: f64, b: f64) -> f64 {
        (a / b - 1.0).abs()
    }

    fn grid(
        he3: &He3TransmissionFunction,
        n_wav: usize,
        n_time: usize,
        noise: f64,
        seed: u64,
    ) -> BeamData {
        let wavelengths = linspace(0.5, 5.0, n_wav);
        let times = linspace(0.0, 20000.0, n_time);
        he3_calibration_grid(he3, &wavelengths, &times, noise, seed).unwrap()
    }

    fn tagged_sections(
        he3: &He3TransmissionFunction,
        n_wav: usize,
        n_time: usize,
        noise: f64,
        seed: u64,
    ) -> Vec<TaggedBeamData> {
        let wavelengths = linspace(0.5, 5.0, n_wav);
        let times = linspace(0.0, 20000.0, n_time);
        he3_polarized_calibration_sections(he3, &wavelengths, &times, noise, seed).unwrap()
    }

    #[test]
    fn recovers_exact_decay_unpolarized() {
        let he3 = cell();
        let data = grid(&he3, 10, 20, 0.0, 1);

        let options = FitOptions::default();
        let fit =
            get_he3_transmission_from_fit_unpolarized(&data, he3.opacity(), TE, &options).unwrap();
        assert!(rel(fit.c.value, C) < 1e-8, "C = {}", fit.c.value);
        assert!(rel(fit.t1.value, T1) < 1e-8, "T1 = {}", fit.t1.value);
        assert_eq!(fit.report.n_points, 200);
    }

    #[test]
    fn recovers_decay_under_noise_unpolarized() {
        let he3 = cell();
        let data = grid(&he3, 40, 1000, 0.01, 42);

        let options = FitOptions::default();
        let fit =
            get_he3_transmission_from_fit_unpolarized(&data, he3.opacity(), TE, &options).unwrap();
        assert!(rel(fit.c.value, C) < 0.01, "C = {}", fit.c.value);
        assert!(rel(fit.t1.value, T1) < 0.01, "T1 = {}", fit.t1.value);
        let t1_err = fit.t1.relative_error().unwrap();
        assert!(t1_err > 0.0 && t1_err < 0.01);
    }

    #[test]
    fn recovers_exact_decay_polarized() {
        let he3 = cell();
        let tagged = tagged_sections(&he3, 10, 20, 0.0, 1);

        let options = FitOptions::default();
        let fit =
            get_he3_transmission_from_fit_polarized(&tagged, he3.opacity(), TE, &options).unwrap();
        assert!(rel(fit.c.value, C) < 1e-8);
        assert!(rel(fit.t1.value, T1) < 1e-8);
        assert_eq!(fit.report.n_points, 800);
    }

    #[test]
    fn recovers_decay_under_noise_polarized() {
        let he3 = cell();
        let calibration = He3Calibration::Polarized(tagged_sections(&he3, 20, 100, 0.01, 7));
        let fit =
            get_he3_transmission_from_fit(&calibration, he3.opacity(), TE, &FitOptions::default())
                .unwrap();
        assert!(rel(fit.c.value, C) < 0.01);
        assert!(rel(fit.t1.value, T1) < 0.01);
    }

    #[test]
    fn analytic_jacobian_matches_central_differences() {
        let obs = |wavelength, time, plus_minus, value| Observation {
            wavelength,
            time,
            plus_minus,
            value,
        };
        let problem = DecayProblem {
            opacity: OpacityFunction::new(0.6).unwrap(),
            transmission_empty_glass: TE,
            observations: vec![
                obs(1.0, 0.0, None, 0.3),
                obs(3.5, 4000.0, None, 0.1),
                obs(2.0, 2500.0, Some(PlusMinus::Plus), 0.2),
                obs(4.0, 9000.0, Some(PlusMinus::Minus), 0.05),
            ],
        };
        let params = DVector::from_row_slice(&[0.7, 8000f64.ln()]);
        let jac = problem.jacobian(&params);

        for j in 0..2 {
            let h = 1e-6;
            let mut plus = params.clone();
            plus[j] += h;
            let mut minus = params.clone();
            minus[j] -= h;
            let numeric = (problem.residuals(&plus) - problem.residuals(&minus)) / (2.0 * h);
            for i in 0..4 {
                assert!(
                    (jac[(i, j)] - numeric[i]).abs() < 1e-8,
                    "({i}, {j}): {} vs {}",
                    jac[(i, j)],
                    numeric[i]
                );
            }
        }
    }

    #[test]
    fn missing_tag_names_the_channel() {
        let he3 = cell();
        let mut sections =
            he3_polarized_calibration_sections(&he3, &[1.0, 2.0], &[0.0, 100.0], 0.0, 1).unwrap();
        sections[2].plus_minus = None;

        let options = FitOptions::default();
        let err = get_he3_transmission_from_fit_polarized(&sections, he3.opacity(), TE, &options)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigMismatch);
        assert!(err.message().contains("Section 2"));
        assert!(err.message().contains(&SpinChannel::DOWN_UP.label()));
    }

    #[test]
    fn inconsistent_tag_is_a_config_mismatch() {
        let he3 = cell();
        let mut sections =
            he3_polarized_calibration_sections(&he3, &[1.0, 2.0], &[0.0, 100.0], 0.0, 1).unwrap();
        sections[0].plus_minus = Some(PlusMinus::Minus);

        let err = check_plus_minus_tags(&sections).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigMismatch);
        assert!(err.message().contains("'minus'"));
    }

    #[test]
    fn data_without_time_axis_is_rejected() {
        let data = BeamData::wavelength_only(vec![1.0, 2.0, 3.0], vec![0.5, 0.4, 0.3]).unwrap();
        let opacity = OpacityFunction::new(0.6).unwrap();
        let options = FitOptions::default();
        let err =
            get_he3_transmission_from_fit_unpolarized(&data, opacity, TE, &options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn exhausted_iteration_budget_is_reported() {
        let he3 = cell();
        let data = grid(&he3, 10, 20, 0.0, 1);
        let options = FitOptions {
            max_iterations: 1,
            ..FitOptions::default()
        };

        let err = get_he3_transmission_from_fit_unpolarized(&data, he3.opacity(), TE, &options)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FitConvergence);
    }
}
