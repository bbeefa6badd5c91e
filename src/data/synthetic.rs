//! Seeded synthetic measurements.
//!
//! - He3 calibration grids (transmission fraction vs. time and wavelength),
//!   for an unpolarized or an upstream-polarized beam
//! - measured spin channels forward-modelled from known ideal channels
//!
//! Noise is additive Gaussian with a fixed seed, so every call is reproducible.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{
    BeamData, ChannelData, FlipperEfficiency, HalfPolarizedCorrectedData, PlusMinus,
    PolarizationCorrectedData, SpinChannel, TaggedBeamData,
};
use crate::error::PolarizationError;
use crate::models::{He3TransmissionFunction, TransmissionFunction};

struct Noise {
    rng: StdRng,
    normal: Option<Normal<f64>>,
}

impl Noise {
    fn new(sigma: f64, seed: u64) -> Result<Self, PolarizationError> {
        if !(sigma.is_finite() && sigma >= 0.0) {
            return Err(PolarizationError::invalid_input(format!(
                "Noise level must be a non-negative number, got {sigma}."
            )));
        }
        let normal = if sigma > 0.0 {
            Some(Normal::new(0.0, sigma).map_err(|e| {
                PolarizationError::invalid_input(format!("Noise distribution error: {e}"))
            })?)
        } else {
            None
        };
        Ok(Self {
            rng: StdRng::seed_from_u64(seed),
            normal,
        })
    }

    fn add(&mut self, value: f64) -> f64 {
        match &self.normal {
            Some(normal) => value + normal.sample(&mut self.rng),
            None => value,
        }
    }
}

/// Transmission fraction of an unpolarized beam through `cell`.
pub fn he3_calibration_grid(
    cell: &He3TransmissionFunction,
    wavelength: &[f64],
    time: &[f64],
    noise_sigma: f64,
    seed: u64,
) -> Result<BeamData, PolarizationError> {
    let mut noise = Noise::new(noise_sigma, seed)?;
    let values = time
        .iter()
        .flat_map(|&t| wavelength.iter().map(move |&wl| (t, wl)))
        .map(|(t, wl)| noise.add(cell.evaluate_unpolarized(wl, t)))
        .collect();
    BeamData::new(wavelength.to_vec(), time.to_vec(), values)
}

/// One correctly tagged section per spin channel, in [`SpinChannel::ALL`] order.
pub fn he3_polarized_calibration_sections(
    cell: &He3TransmissionFunction,
    wavelength: &[f64],
    time: &[f64],
    noise_sigma: f64,
    seed: u64,
) -> Result<Vec<TaggedBeamData>, PolarizationError> {
    let mut noise = Noise::new(noise_sigma, seed)?;
    SpinChannel::ALL
        .iter()
        .map(|&channel| {
            let plus_minus = channel.expected_plus_minus();
            let values = time
                .iter()
                .flat_map(|&t| wavelength.iter().map(move |&wl| (t, wl)))
                .map(|(t, wl)| noise.add(cell.evaluate(wl, t, plus_minus)))
                .collect();
            Ok(TaggedBeamData {
                channel,
                plus_minus: Some(plus_minus),
                data: BeamData::new(wavelength.to_vec(), time.to_vec(), values)?,
            })
        })
        .collect()
}

/// Measured channels, in [`SpinChannel::ALL`] order, for known ideal channels.
///
/// Applies the polarizer and its flipper, then the analyzer flipper and the
/// analyzer, on the coordinates of `coords`.
pub fn forward_model_channels<P, A>(
    ideal: &PolarizationCorrectedData,
    coords: &ChannelData,
    polarizer: &P,
    analyzer: &A,
    polarizer_flipper: FlipperEfficiency,
    analyzer_flipper: FlipperEfficiency,
) -> Result<[ChannelData; 4], PolarizationError>
where
    P: TransmissionFunction + ?Sized,
    A: TransmissionFunction + ?Sized,
{
    check_len(ideal.len(), coords)?;
    let p_plus = polarizer.apply(coords, PlusMinus::Plus)?;
    let p_minus = polarizer.apply(coords, PlusMinus::Minus)?;
    let a_plus = analyzer.apply(coords, PlusMinus::Plus)?;
    let a_minus = analyzer.apply(coords, PlusMinus::Minus)?;
    let (f1, f2) = (polarizer_flipper.value(), analyzer_flipper.value());

    let mut measured = [
        Vec::with_capacity(coords.len()),
        Vec::with_capacity(coords.len()),
        Vec::with_capacity(coords.len()),
        Vec::with_capacity(coords.len()),
    ];
    for k in 0..coords.len() {
        let g = [ideal.upup[k], ideal.updown[k], ideal.downup[k], ideal.downdown[k]];
        let pol = polarizer_rows(p_plus[k], p_minus[k], f1);
        let (ap, am) = (a_plus[k], a_minus[k]);
        let ana = [[ap + (1.0 - f2) * am, f2 * am], [am + (1.0 - f2) * ap, f2 * ap]];

        for i in 0..2 {
            // After the polarizer (and its flipper), per analyzer-axis state.
            let w = [
                pol[i][0] * g[0] + pol[i][1] * g[2],
                pol[i][0] * g[1] + pol[i][1] * g[3],
            ];
            for j in 0..2 {
                measured[2 * i + j].push(ana[j][0] * w[0] + ana[j][1] * w[1]);
            }
        }
    }

    let [upup, updown, downup, downdown] = measured;
    Ok([
        coords.with_values(upup)?,
        coords.with_values(updown)?,
        coords.with_values(downup)?,
        coords.with_values(downdown)?,
    ])
}

/// Measured `[up, down]` channels for the polarizer-only setup.
pub fn forward_model_half_polarized<P>(
    ideal: &HalfPolarizedCorrectedData,
    coords: &ChannelData,
    polarizer: &P,
    polarizer_flipper: FlipperEfficiency,
) -> Result<[ChannelData; 2], PolarizationError>
where
    P: TransmissionFunction + ?Sized,
{
    check_len(ideal.len(), coords)?;
    let p_plus = polarizer.apply(coords, PlusMinus::Plus)?;
    let p_minus = polarizer.apply(coords, PlusMinus::Minus)?;
    let f = polarizer_flipper.value();

    let (mut up, mut down) = (Vec::with_capacity(coords.len()), Vec::with_capacity(coords.len()));
    for k in 0..coords.len() {
        let pol = polarizer_rows(p_plus[k], p_minus[k], f);
        up.push(pol[0][0] * ideal.up[k] + pol[0][1] * ideal.down[k]);
        down.push(pol[1][0] * ideal.up[k] + pol[1][1] * ideal.down[k]);
    }
    Ok([coords.with_values(up)?, coords.with_values(down)?])
}

/// `[[1, 0], [1 - f, f]] · [[T+, T-], [T-, T+]]`.
fn polarizer_rows(tp: f64, tm: f64, f: f64) -> [[f64; 2]; 2] {
    [[tp, tm], [(1.0 - f) * tp + f * tm, (1.0 - f) * tm + f * tp]]
}

fn check_len(len: usize, coords: &ChannelData) -> Result<(), PolarizationError> {
    if len != coords.len() {
        return Err(PolarizationError::invalid_input(format!(
            "Ideal channels have {len} values but coordinates have {}.",
            coords.len()
        )));
    }
    Ok(())
}
