use crate::domain::{
    ChannelData, HalfPolarizedCorrectedData, HalfPolarizedCorrection, PolarizationCorrectedData,
    PolarizationCorrection,
};
use crate::error::PolarizationError;

/// Contribution of one measured channel to all four corrected outputs.
pub fn compute_polarization_corrected_data(
    channel: &ChannelData,
    correction: &PolarizationCorrection,
) -> Result<PolarizationCorrectedData, PolarizationError> {
    for weights in [
        &correction.upup,
        &correction.updown,
        &correction.downup,
        &correction.downdown,
    ] {
        check_len(channel, weights)?;
    }
    Ok(PolarizationCorrectedData {
        upup: scaled(channel, &correction.upup),
        updown: scaled(channel, &correction.updown),
        downup: scaled(channel, &correction.downup),
        downdown: scaled(channel, &correction.downdown),
    })
}

pub fn compute_half_polarized_corrected_data(
    channel: &ChannelData,
    correction: &HalfPolarizedCorrection,
) -> Result<HalfPolarizedCorrectedData, PolarizationError> {
    check_len(channel, &correction.up)?;
    check_len(channel, &correction.down)?;
    Ok(HalfPolarizedCorrectedData {
        up: scaled(channel, &correction.up),
        down: scaled(channel, &correction.down),
    })
}

fn check_len(channel: &ChannelData, weights: &[f64]) -> Result<(), PolarizationError> {
    if weights.len() != channel.len() {
        return Err(PolarizationError::invalid_input(format!(
            "Correction has {} weights but the channel has {} values.",
            weights.len(),
            channel.len()
        )));
    }
    Ok(())
}

fn scaled(channel: &ChannelData, weights: &[f64]) -> Vec<f64> {
    channel.values().iter().zip(weights).map(|(v, w)| v * w).collect()
}
