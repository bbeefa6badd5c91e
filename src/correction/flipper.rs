//! Non-ideal spin flippers.
//!
//! A flipper with efficiency `f` mixes the two spin states with
//!
//! ```text
//! F = [[1, 0], [1 - f, f]]
//! ```
//!
//! i.e. a fraction `1 - f` of the beam that should have been flipped keeps its
//! spin. Which state is the "flipped" one depends on the spin setting of the
//! element, so each model instance carries a `swap` flag. Both operations
//! below apply `F⁻¹`, from the analyzer side (`from_left`) or the polarizer
//! side (`from_right`) of the correction product. For `f = 1` they reduce to a
//! plain exchange (or no-op) of the two inputs.

use crate::domain::{FlipperEfficiency, Spin};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlipperModel {
    efficiency: FlipperEfficiency,
    swap: bool,
}

impl FlipperModel {
    pub fn new(efficiency: FlipperEfficiency, swap: bool) -> Self {
        Self { efficiency, swap }
    }

    /// Flipper of an element set to `spin`; the down setting is the flipped leg.
    pub fn for_spin(efficiency: FlipperEfficiency, spin: Spin) -> Self {
        Self::new(efficiency, spin == Spin::Down)
    }

    pub fn from_left(&self, up: &[f64], down: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let (up, down) = if self.swap { (down, up) } else { (up, down) };
        if self.efficiency.is_ideal() {
            return (up.to_vec(), down.to_vec());
        }
        let f = self.efficiency.value();
        let leaked: Vec<f64> = up
            .iter()
            .zip(down)
            .map(|(&u, &d)| (d - (1.0 - f) * u) / f)
            .collect();
        (up.to_vec(), leaked)
    }

    pub fn from_right(&self, up: &[f64], down: &[f64]) -> (Vec<f64>, Vec<f64>) {
        if self.efficiency.is_ideal() {
            return if self.swap {
                (down.to_vec(), up.to_vec())
            } else {
                (up.to_vec(), down.to_vec())
            };
        }
        let f = self.efficiency.value();
        if self.swap {
            return (scale(down, 1.0 / f), scale(up, 1.0 / f));
        }
        let g = (1.0 - f) / f;
        let new_up = up.iter().zip(down).map(|(&u, &d)| u - g * d).collect();
        let new_down = up.iter().zip(down).map(|(&u, &d)| d - g * u).collect();
        (new_up, new_down)
    }
}

fn scale(values: &[f64], factor: f64) -> Vec<f64> {
    values.iter().map(|v| v * factor).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eff(f: f64) -> FlipperEfficiency {
        FlipperEfficiency::new(f).unwrap()
    }

    #[test]
    fn ideal_flipper_exchanges_or_passes_through() {
        let up = [1.0, 2.0];
        let down = [3.0, 4.0];
        let flip = FlipperModel::for_spin(FlipperEfficiency::IDEAL, Spin::Down);
        let keep = FlipperModel::for_spin(FlipperEfficiency::IDEAL, Spin::Up);

        assert_eq!(flip.from_left(&up, &down), (down.to_vec(), up.to_vec()));
        assert_eq!(flip.from_right(&up, &down), (down.to_vec(), up.to_vec()));
        assert_eq!(keep.from_left(&up, &down), (up.to_vec(), down.to_vec()));
        assert_eq!(keep.from_right(&up, &down), (up.to_vec(), down.to_vec()));
    }

    #[test]
    fn from_left_undoes_forward_mixing() {
        for f in [0.1, 0.5, 0.9, 0.99] {
            let model = FlipperModel::new(eff(f), false);
            let (u, d) = (2.0, 5.0);
            // Forward: down_out = (1 - f)·up + f·down.
            let mixed_down = (1.0 - f) * u + f * d;
            let (ru, rd) = model.from_left(&[u], &[mixed_down]);
            assert!((ru[0] - u).abs() < 1e-12);
            assert!((rd[0] - d).abs() < 1e-12, "f = {f}");
        }
    }

    #[test]
    fn unswapped_right_leg_subtracts_leakage() {
        // f = 0.5: g = (1 - f) / f = 1.
        let model = FlipperModel::new(eff(0.5), false);
        assert_eq!(model.from_right(&[1.0], &[3.0]), (vec![-2.0], vec![2.0]));
    }

    #[test]
    fn swapped_right_leg_rescales() {
        let model = FlipperModel::new(eff(0.5), true);
        assert_eq!(model.from_right(&[1.0], &[3.0]), (vec![6.0], vec![2.0]));
    }
}
