//! Direct-beam preparation for the He3 fits.
//!
//! - `compute_direct_beam`: background-subtracted direct-beam intensity per
//!   (time, wavelength) bin from detector events
//! - `transmission_fraction`: ratio of direct beams with and without a cell
//! - `time_since_filling`: wall-clock run midpoints as the decay-fit time axis

use chrono::{DateTime, TimeDelta, Utc};

use crate::domain::BeamData;
use crate::error::PolarizationError;

/// One detected, normalized neutron event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectBeamEvent {
    /// Momentum transfer components in 1/Å.
    pub qx: f64,
    pub qy: f64,
    pub weight: f64,
}

/// Events binned on a `time × wavelength` grid (row-major, time outermost).
///
/// `time` and `wavelength` follow the [`BeamData`] conventions.
#[derive(Debug, Clone, PartialEq)]
pub struct BinnedEvents {
    pub wavelength: Vec<f64>,
    pub time: Vec<f64>,
    pub bins: Vec<Vec<DirectBeamEvent>>,
    /// `false` for raw counts; only normalized data can be averaged across runs.
    pub normalized: bool,
}

/// Half-open range `[start, stop)` of `|Q|` in 1/Å.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QRange {
    pub start: f64,
    pub stop: f64,
}

impl QRange {
    pub fn new(start: f64, stop: f64) -> Result<Self, PolarizationError> {
        if !(start.is_finite() && stop.is_finite() && start < stop) {
            return Err(PolarizationError::invalid_input(format!(
                "Q range must satisfy start < stop, got [{start}, {stop})."
            )));
        }
        Ok(Self { start, stop })
    }

    fn contains_squared(&self, q_squared: f64) -> bool {
        q_squared >= self.start * self.start && q_squared < self.stop * self.stop
    }
}

/// Mean event weight inside `beam` minus mean inside `background`, per bin.
///
/// Scattering is assumed rotation invariant, so only `Qx² + Qy²` matters.
pub fn compute_direct_beam(
    events: &BinnedEvents,
    beam: QRange,
    background: QRange,
) -> Result<BeamData, PolarizationError> {
    if !events.normalized {
        return Err(PolarizationError::invalid_input(
            "Direct-beam input must be normalized data, not counts.",
        ));
    }
    if beam.stop > background.start {
        return Err(PolarizationError::invalid_input(format!(
            "Background Q range [{}, {}) must start after the direct-beam range [{}, {}).",
            background.start, background.stop, beam.start, beam.stop
        )));
    }
    if beam.start < 0.0 {
        return Err(PolarizationError::invalid_input(format!(
            "Q range must be non-negative, got start {}.",
            beam.start
        )));
    }

    let n_wl = events.bins.len() / events.time.len().max(1);
    let values = events
        .bins
        .iter()
        .enumerate()
        .map(|(i, bin)| {
            let beam_mean = region_mean(bin, beam);
            let background_mean = region_mean(bin, background);
            match (beam_mean, background_mean) {
                (Some(b), Some(bg)) => Ok(b - bg),
                _ => Err(PolarizationError::invalid_input(format!(
                    "Bin (time {}, wavelength {}) has no events in the {} region.",
                    i / n_wl.max(1),
                    i % n_wl.max(1),
                    if beam_mean.is_none() { "direct-beam" } else { "background" }
                ))),
            }
        })
        .collect::<Result<Vec<f64>, _>>()?;

    BeamData::new(events.wavelength.clone(), events.time.clone(), values)
}

fn region_mean(bin: &[DirectBeamEvent], range: QRange) -> Option<f64> {
    let (sum, count) = bin
        .iter()
        .filter(|e| range.contains_squared(e.qx * e.qx + e.qy * e.qy))
        .fold((0.0, 0usize), |(s, n), e| (s + e.weight, n + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Elementwise `with_cell / without_cell` on a shared grid.
///
/// A direct beam without time axis is broadcast over the time rows of
/// `with_cell`, since the empty beam is usually measured once.
pub fn transmission_fraction(
    with_cell: &BeamData,
    without_cell: &BeamData,
) -> Result<BeamData, PolarizationError> {
    let broadcast = !without_cell.has_time()
        && with_cell.has_time()
        && without_cell.wavelength() == with_cell.wavelength()
        && without_cell.values().len() == with_cell.n_wavelength();
    if !broadcast && !with_cell.same_grid(without_cell) {
        return Err(PolarizationError::invalid_input(format!(
            "Direct beams with cell ({} x {}) and without cell ({} x {}) are on different grids.",
            with_cell.n_time(),
            with_cell.n_wavelength(),
            without_cell.n_time(),
            without_cell.n_wavelength()
        )));
    }

    let n_wl = with_cell.n_wavelength();
    let denominators = without_cell.values();
    let values = with_cell
        .values()
        .iter()
        .enumerate()
        .map(|(i, &num)| {
            let den = if broadcast {
                denominators[i % n_wl]
            } else {
                denominators[i]
            };
            if den == 0.0 {
                return Err(PolarizationError::invalid_input(format!(
                    "Direct beam without cell is zero at bin {i}."
                )));
            }
            Ok(num / den)
        })
        .collect::<Result<Vec<f64>, _>>()?;

    BeamData::new(with_cell.wavelength().to_vec(), with_cell.time().to_vec(), values)
}

/// Midpoint of a run in seconds since the cell was filled.
pub fn time_since_filling(
    run_start: DateTime<Utc>,
    run_end: DateTime<Utc>,
    filling_time: DateTime<Utc>,
) -> Result<f64, PolarizationError> {
    if run_end < run_start {
        return Err(PolarizationError::invalid_input(format!(
            "Run ends ({run_end}) before it starts ({run_start})."
        )));
    }
    let midpoint = run_start + (run_end - run_start) / 2;
    Ok(seconds(midpoint - filling_time))
}

/// Time axis for a sequence of direct-beam runs `(start, end)`.
pub fn time_axis_since_filling(
    runs: &[(DateTime<Utc>, DateTime<Utc>)],
    filling_time: DateTime<Utc>,
) -> Result<Vec<f64>, PolarizationError> {
    runs.iter()
        .map(|&(start, end)| time_since_filling(start, end, filling_time))
        .collect()
}

fn seconds(delta: TimeDelta) -> f64 {
    delta.num_seconds() as f64 + f64::from(delta.subsec_nanos()) * 1e-9
}
