use crate::domain::{ChannelData, PlusMinus};
use crate::error::PolarizationError;
use crate::models::TransmissionFunction;

/// `|T+² - T-²|` below this fraction of `max(T+², T-²)` counts as singular.
const SINGULAR_TOLERANCE: f64 = 1e-12;

/// Inverse of one element's transfer matrix `[[T+, T-], [T-, T+]]`.
///
/// The inverse is `[[diag, off_diag], [off_diag, diag]]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionCoefficients {
    pub diag: Vec<f64>,
    pub off_diag: Vec<f64>,
}

/// Evaluate the element on the coordinates of `data` and invert its transfer matrix.
///
/// Fails with a singular-correction error where the element has no
/// polarizing power (`T+ ≈ T-`) instead of producing infinities.
pub fn compute_correction_coefficients<T>(
    data: &ChannelData,
    transmission: &T,
) -> Result<CorrectionCoefficients, PolarizationError>
where
    T: TransmissionFunction + ?Sized,
{
    let plus = transmission.apply(data, PlusMinus::Plus)?;
    let minus = transmission.apply(data, PlusMinus::Minus)?;

    let mut diag = Vec::with_capacity(plus.len());
    let mut off_diag = Vec::with_capacity(plus.len());
    for (i, (&tp, &tm)) in plus.iter().zip(&minus).enumerate() {
        let (tp2, tm2) = (tp * tp, tm * tm);
        let denom = tp2 - tm2;
        if !denom.is_finite() || denom.abs() <= SINGULAR_TOLERANCE * tp2.max(tm2) {
            let time = data
                .time_at(i)
                .map(|t| format!(", t = {t} s"))
                .unwrap_or_default();
            return Err(PolarizationError::singular(format!(
                "Transfer matrix is singular at element {i} (λ = {} Å{time}): T+ = {tp}, T- = {tm}.",
                data.wavelength()[i]
            )));
        }
        diag.push(tp / denom);
        off_diag.push(-tm / denom);
    }

    Ok(CorrectionCoefficients { diag, off_diag })
}
