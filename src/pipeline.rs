//! End-to-end orchestration.
//!
//! `build_transmission` turns the calibration inputs of one polarizing element
//! into its transmission model, following the configured model choices.
//! `correct_sample_data` then corrects the measured spin channels, one
//! rayon task per measured channel, and sums the contributions.

use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::CorrectionConfig;
use crate::correction::{
    compute_half_polarized_corrected_data, compute_half_polarized_correction,
    compute_polarization_corrected_data, compute_polarization_correction,
};
use crate::domain::{
    BeamData, ChannelData, ElementModelKind, HalfPolarizedCorrectedData, IncomingBeam,
    OpacitySource, PolarizationCorrectedData, PolarizingElement, Spin, SpinChannel,
};
use crate::error::PolarizationError;
use crate::fit::{
    He3Calibration, He3Fit, OpacityFit, get_he3_transmission_from_fit,
    opacity_function_from_beam_data,
};
use crate::models::{
    ElementTransmission, He3CellParams, OpacityFunction, SupermirrorEfficiency,
    SupermirrorTransmissionFunction, TransmissionFunction,
};

/// Calibration inputs of a He3 cell.
#[derive(Debug, Clone, PartialEq)]
pub struct He3Setup {
    pub cell: He3CellParams,
    pub transmission_empty_glass: f64,
    /// Transmission fraction through the depolarized cell; needed for ex-situ opacity.
    pub depolarized: Option<BeamData>,
    pub calibration: He3Calibration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementSetup {
    He3(He3Setup),
    Supermirror(SupermirrorEfficiency),
}

impl ElementSetup {
    pub fn model_kind(&self) -> ElementModelKind {
        match self {
            ElementSetup::He3(_) => ElementModelKind::He3,
            ElementSetup::Supermirror(_) => ElementModelKind::Supermirror,
        }
    }
}

/// Transmission model of one element and the fits it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementCalibration {
    pub transmission: ElementTransmission,
    pub opacity_fit: Option<OpacityFit>,
    pub decay_fit: Option<He3Fit>,
}

pub fn build_transmission(
    element: PolarizingElement,
    setup: &ElementSetup,
    config: &CorrectionConfig,
) -> Result<ElementCalibration, PolarizationError> {
    let configured = match element {
        PolarizingElement::Polarizer => config.polarizer_model,
        PolarizingElement::Analyzer => config.analyzer_model.ok_or_else(|| {
            PolarizationError::config_mismatch(
                "An analyzer setup was given but no analyzer is configured.",
            )
        })?,
    };
    if setup.model_kind() != configured {
        return Err(PolarizationError::config_mismatch(format!(
            "The {} is configured as {:?} but its setup describes {:?}.",
            element.display_name(),
            configured,
            setup.model_kind()
        )));
    }

    let calibration = match setup {
        ElementSetup::Supermirror(efficiency) => ElementCalibration {
            transmission: SupermirrorTransmissionFunction::new(efficiency.clone()).into(),
            opacity_fit: None,
            decay_fit: None,
        },
        ElementSetup::He3(he3) => build_he3(element, he3, config)?,
    };
    info!(
        element = element.display_name(),
        model = ?calibration.transmission.model_kind(),
        "built transmission function"
    );
    Ok(calibration)
}

fn build_he3(
    element: PolarizingElement,
    setup: &He3Setup,
    config: &CorrectionConfig,
) -> Result<ElementCalibration, PolarizationError> {
    let calibration_beam = match setup.calibration {
        He3Calibration::Unpolarized(_) => IncomingBeam::Unpolarized,
        He3Calibration::Polarized(_) => IncomingBeam::Polarized,
    };
    if calibration_beam != config.incoming_beam {
        return Err(PolarizationError::config_mismatch(format!(
            "The {} calibration uses a {:?} incoming beam but {:?} is configured.",
            element.display_name(),
            calibration_beam,
            config.incoming_beam
        )));
    }

    let in_situ = OpacityFunction::from_cell_params(&setup.cell)?;
    let (opacity, opacity_fit) = match config.opacity_source {
        OpacitySource::InSitu => (in_situ, None),
        OpacitySource::ExSitu => {
            let depolarized = setup.depolarized.as_ref().ok_or_else(|| {
                PolarizationError::config_mismatch(format!(
                    "Ex-situ opacity for the {} needs a depolarized-cell measurement.",
                    element.display_name()
                ))
            })?;
            let fit = opacity_function_from_beam_data(
                setup.transmission_empty_glass,
                depolarized,
                in_situ.opacity0(),
                &config.fit,
            )?;
            debug!(
                element = element.display_name(),
                in_situ = in_situ.opacity0(),
                fitted = fit.opacity0.value,
                "ex-situ opacity"
            );
            (fit.opacity, Some(fit))
        }
    };

    let decay = get_he3_transmission_from_fit(
        &setup.calibration,
        opacity,
        setup.transmission_empty_glass,
        &config.fit,
    )?;
    Ok(ElementCalibration {
        transmission: decay.transmission.into(),
        opacity_fit,
        decay_fit: Some(decay),
    })
}

/// Correct four measured channels, given in [`SpinChannel::ALL`] order.
pub fn correct_sample_data<P, A>(
    channels: &[ChannelData; 4],
    polarizer: &P,
    analyzer: &A,
    config: &CorrectionConfig,
) -> Result<PolarizationCorrectedData, PolarizationError>
where
    P: TransmissionFunction + ?Sized,
    A: TransmissionFunction + ?Sized,
{
    if config.is_half_polarized() {
        return Err(PolarizationError::config_mismatch(
            "Four-channel correction requested but no analyzer is configured.",
        ));
    }
    let len = channels[0].len();
    if let Some(ch) = channels.iter().find(|c| c.len() != len) {
        return Err(PolarizationError::invalid_input(format!(
            "Measured channels differ in length ({} vs {}).",
            ch.len(),
            len
        )));
    }

    let contributions = SpinChannel::ALL
        .par_iter()
        .map(|&spins| {
            let channel = &channels[spins.index()];
            let correction = compute_polarization_correction(
                channel,
                spins,
                polarizer,
                analyzer,
                config.polarizer_flipper,
                config.analyzer_flipper,
            )?;
            compute_polarization_corrected_data(channel, &correction)
        })
        .collect::<Result<Vec<_>, PolarizationError>>()?;

    let mut total = PolarizationCorrectedData::zeros(len);
    for contribution in &contributions {
        total.accumulate(contribution)?;
    }
    debug!(n = len, "corrected four spin channels");
    Ok(total)
}

/// Correct the `[up, down]` channels of a measurement without analyzer.
pub fn correct_half_polarized_sample_data<P>(
    channels: &[ChannelData; 2],
    polarizer: &P,
    config: &CorrectionConfig,
) -> Result<HalfPolarizedCorrectedData, PolarizationError>
where
    P: TransmissionFunction + ?Sized,
{
    if !config.is_half_polarized() {
        return Err(PolarizationError::config_mismatch(
            "Half-polarized correction requested but an analyzer is configured.",
        ));
    }
    let len = channels[0].len();
    if channels[1].len() != len {
        return Err(PolarizationError::invalid_input(format!(
            "Measured channels differ in length ({} vs {}).",
            channels[1].len(),
            len
        )));
    }

    let contributions = Spin::ALL
        .par_iter()
        .zip(channels.par_iter())
        .map(|(&spin, channel)| {
            let flipper = config.polarizer_flipper;
            let correction = compute_half_polarized_correction(channel, spin, polarizer, flipper)?;
            compute_half_polarized_corrected_data(channel, &correction)
        })
        .collect::<Result<Vec<_>, PolarizationError>>()?;

    let mut total = HalfPolarizedCorrectedData::zeros(len);
    for contribution in &contributions {
        total.accumulate(contribution)?;
    }
    Ok(total)
}
