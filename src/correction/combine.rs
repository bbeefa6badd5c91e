//! Four-channel correction weights for one measured spin channel.

use crate::correction::{FlipperModel, compute_correction_coefficients};
use crate::domain::{
    ChannelData, FlipperEfficiency, HalfPolarizedCorrection, PolarizationCorrection, Spin,
    SpinChannel,
};
use crate::error::PolarizationError;
use crate::models::TransmissionFunction;

/// Weights by which `channel` (measured with spins `spins`) contributes to
/// each of the four corrected outputs.
pub fn compute_polarization_correction<P, A>(
    channel: &ChannelData,
    spins: SpinChannel,
    polarizer: &P,
    analyzer: &A,
    polarizer_flipper: FlipperEfficiency,
    analyzer_flipper: FlipperEfficiency,
) -> Result<PolarizationCorrection, PolarizationError>
where
    P: TransmissionFunction + ?Sized,
    A: TransmissionFunction + ?Sized,
{
    let ana = compute_correction_coefficients(channel, analyzer)?;
    let pol = compute_correction_coefficients(channel, polarizer)?;

    let (a_up, a_down) = FlipperModel::for_spin(analyzer_flipper, spins.analyzer)
        .from_left(&ana.diag, &ana.off_diag);

    // Outer product of the polarizer column with the analyzer row.
    let upup = product(&pol.diag, &a_up);
    let updown = product(&pol.diag, &a_down);
    let downup = product(&pol.off_diag, &a_up);
    let downdown = product(&pol.off_diag, &a_down);

    // The polarizer flipper mixes along the polarizer axis only.
    let polarizer_flipper = FlipperModel::for_spin(polarizer_flipper, spins.polarizer);
    let (upup, downup) = polarizer_flipper.from_right(&upup, &downup);
    let (updown, downdown) = polarizer_flipper.from_right(&updown, &downdown);

    Ok(PolarizationCorrection {
        upup,
        updown,
        downup,
        downdown,
    })
}

/// Polarizer-only variant: weights for the two corrected outputs.
pub fn compute_half_polarized_correction<P>(
    channel: &ChannelData,
    polarizer_spin: Spin,
    polarizer: &P,
    polarizer_flipper: FlipperEfficiency,
) -> Result<HalfPolarizedCorrection, PolarizationError>
where
    P: TransmissionFunction + ?Sized,
{
    let pol = compute_correction_coefficients(channel, polarizer)?;
    let (up, down) = FlipperModel::for_spin(polarizer_flipper, polarizer_spin)
        .from_right(&pol.diag, &pol.off_diag);
    Ok(HalfPolarizedCorrection { up, down })
}

fn product(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| x * y).collect()
}
