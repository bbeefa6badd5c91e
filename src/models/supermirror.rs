//! Supermirror polarizer/analyzer transmission.
//!
//! A supermirror reflects one spin state and transmits the other. Its
//! transmission is described by a wavelength-dependent efficiency `ε(λ)`:
//!
//! ```text
//! T±(λ) = ½ · (1 ± ε(λ))
//! ```
//!
//! Two efficiency descriptions are supported:
//! - a second-degree polynomial in wavelength,
//! - a measured lookup table, either on wavelength points (nearest tabulated
//!   point) or on wavelength bin edges (histogram lookup). Both are step
//!   functions; tables are never interpolated.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use serde::{Deserialize, Serialize};

use crate::domain::PlusMinus;
use crate::error::{ErrorKind, PolarizationError};
use crate::models::TransmissionFunction;

/// `ε(λ) = a·λ² + b·λ + c`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SecondDegreePolynomialEfficiency {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl SecondDegreePolynomialEfficiency {
    pub fn efficiency(&self, wavelength: f64) -> f64 {
        (self.a * wavelength + self.b) * wavelength + self.c
    }
}

/// Tabulated efficiency.
///
/// `wavelength` is strictly increasing and holds either one point per
/// efficiency value or one more edge than there are values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EfficiencyLookupTable {
    wavelength: Vec<f64>,
    efficiency: Vec<f64>,
}

impl EfficiencyLookupTable {
    pub fn new(wavelength: Vec<f64>, efficiency: Vec<f64>) -> Result<Self, PolarizationError> {
        let points = wavelength.len() == efficiency.len();
        let edges = wavelength.len() == efficiency.len() + 1;
        if efficiency.is_empty() || !(points || edges) {
            return Err(PolarizationError::invalid_input(format!(
                "Efficiency table needs one wavelength per value or one more edge than values, got {} wavelengths and {} values.",
                wavelength.len(),
                efficiency.len()
            )));
        }
        if points && wavelength.len() < 2 {
            return Err(PolarizationError::invalid_input(
                "Efficiency table on wavelength points needs at least two entries.",
            ));
        }
        if wavelength.iter().chain(&efficiency).any(|v| !v.is_finite()) {
            return Err(PolarizationError::invalid_input(
                "Efficiency table contains non-finite entries.",
            ));
        }
        if wavelength.windows(2).any(|w| w[1] <= w[0]) {
            return Err(PolarizationError::invalid_input(
                "Efficiency table wavelengths must be strictly increasing.",
            ));
        }
        Ok(Self {
            wavelength,
            efficiency,
        })
    }

    /// Read a table from CSV, picking the two columns by header name.
    pub fn from_csv_reader<R: Read>(
        reader: R,
        wavelength_column: &str,
        efficiency_column: &str,
    ) -> Result<Self, PolarizationError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        let header_map = build_header_map(&headers);
        let wl_idx = column_index(&header_map, wavelength_column)?;
        let eff_idx = column_index(&header_map, efficiency_column)?;

        let mut wavelength = Vec::new();
        let mut efficiency = Vec::new();
        for (idx, result) in reader.records().enumerate() {
            // Header is line 1.
            let line = idx + 2;
            let record = result?;
            wavelength.push(parse_field(&record, wl_idx, wavelength_column, line)?);
            efficiency.push(parse_field(&record, eff_idx, efficiency_column, line)?);
        }

        Self::new(wavelength, efficiency)
    }

    pub fn from_csv_path(
        path: &Path,
        wavelength_column: &str,
        efficiency_column: &str,
    ) -> Result<Self, PolarizationError> {
        let file = File::open(path).map_err(|e| {
            PolarizationError::new(
                ErrorKind::Io,
                format!("Failed to open efficiency table '{}': {e}", path.display()),
            )
        })?;
        Self::from_csv_reader(file, wavelength_column, efficiency_column)
    }

    pub fn is_bin_edges(&self) -> bool {
        self.wavelength.len() == self.efficiency.len() + 1
    }

    pub fn efficiency(&self, wavelength: f64) -> Result<f64, PolarizationError> {
        let first = self.wavelength[0];
        let last = self.wavelength[self.wavelength.len() - 1];
        if !(wavelength >= first && wavelength <= last) {
            return Err(PolarizationError::invalid_input(format!(
                "Wavelength {wavelength} Å is outside the efficiency table range [{first}, {last}] Å."
            )));
        }

        if self.is_bin_edges() {
            // First edge strictly greater than the query; the last edge closes the last bin.
            let upper = self.wavelength.partition_point(|&w| w <= wavelength);
            let bin = upper.saturating_sub(1).min(self.efficiency.len() - 1);
            return Ok(self.efficiency[bin]);
        }

        // Nearest point: steps sit halfway between points, a tie goes to the upper point.
        let nearest = self
            .wavelength
            .windows(2)
            .take_while(|w| 0.5 * (w[0] + w[1]) <= wavelength)
            .count();
        Ok(self.efficiency[nearest])
    }
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.trim().trim_start_matches('\u{feff}').to_string(), idx))
        .collect()
}

fn column_index(
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Result<usize, PolarizationError> {
    header_map.get(name.trim()).copied().ok_or_else(|| {
        let mut available: Vec<&str> = header_map.keys().map(String::as_str).collect();
        available.sort_unstable();
        PolarizationError::invalid_input(format!(
            "Efficiency table has no column '{name}' (available: {}).",
            available.join(", ")
        ))
    })
}

fn parse_field(
    record: &StringRecord,
    idx: usize,
    column: &str,
    line: usize,
) -> Result<f64, PolarizationError> {
    let raw = record.get(idx).unwrap_or("");
    raw.parse::<f64>().map_err(|_| {
        PolarizationError::invalid_input(format!(
            "Line {line}: column '{column}' has non-numeric value '{raw}'."
        ))
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SupermirrorEfficiency {
    Polynomial(SecondDegreePolynomialEfficiency),
    LookupTable(EfficiencyLookupTable),
}

impl SupermirrorEfficiency {
    pub fn efficiency(&self, wavelength: f64) -> Result<f64, PolarizationError> {
        match self {
            SupermirrorEfficiency::Polynomial(p) => Ok(p.efficiency(wavelength)),
            SupermirrorEfficiency::LookupTable(t) => t.efficiency(wavelength),
        }
    }
}

impl From<SecondDegreePolynomialEfficiency> for SupermirrorEfficiency {
    fn from(value: SecondDegreePolynomialEfficiency) -> Self {
        SupermirrorEfficiency::Polynomial(value)
    }
}

impl From<EfficiencyLookupTable> for SupermirrorEfficiency {
    fn from(value: EfficiencyLookupTable) -> Self {
        SupermirrorEfficiency::LookupTable(value)
    }
}

/// Time-independent supermirror transmission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupermirrorTransmissionFunction {
    pub efficiency: SupermirrorEfficiency,
}

impl SupermirrorTransmissionFunction {
    pub fn new(efficiency: impl Into<SupermirrorEfficiency>) -> Self {
        Self {
            efficiency: efficiency.into(),
        }
    }
}

impl TransmissionFunction for SupermirrorTransmissionFunction {
    fn transmission(
        &self,
        wavelength: f64,
        _time: Option<f64>,
        plus_minus: PlusMinus,
    ) -> Result<f64, PolarizationError> {
        let eps = self.efficiency.efficiency(wavelength)?;
        if !(eps.is_finite() && eps.abs() <= 1.0) {
            return Err(PolarizationError::invalid_input(format!(
                "Supermirror efficiency {eps} at {wavelength} Å is outside [-1, 1]."
            )));
        }
        Ok(0.5 * (1.0 + plus_minus.sign() * eps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChannelData;

    #[test]
    fn polynomial_efficiency() {
        let p = SecondDegreePolynomialEfficiency {
            a: 1.0,
            b: 1.0,
            c: 1.0,
        };
        assert_eq!(p.efficiency(1.0), 3.0);
        assert_eq!(p.efficiency(2.0), 7.0);
        assert_eq!(p.efficiency(0.0), 1.0);
    }

    #[test]
    fn transmission_splits_around_one_half() {
        let sm = SupermirrorTransmissionFunction::new(SecondDegreePolynomialEfficiency {
            a: 0.0,
            b: 0.1,
            c: 0.5,
        });
        let plus = sm.transmission(2.0, None, PlusMinus::Plus).unwrap();
        let minus = sm.transmission(2.0, Some(123.0), PlusMinus::Minus).unwrap();
        assert!((plus - 0.85).abs() < 1e-15);
        assert!((minus - 0.15).abs() < 1e-15);
        assert!((plus + minus - 1.0).abs() < 1e-15);
    }

    #[test]
    fn efficiency_outside_unit_interval_is_rejected() {
        let sm = SupermirrorTransmissionFunction::new(SecondDegreePolynomialEfficiency {
            a: 0.0,
            b: 0.0,
            c: 1.5,
        });
        assert!(sm.transmission(2.0, None, PlusMinus::Plus).is_err());
    }

    #[test]
    fn lookup_table_on_points_takes_nearest_value() {
        let table = EfficiencyLookupTable::new(vec![1.0, 2.0, 4.0], vec![0.9, 0.8, 0.4]).unwrap();
        assert!(!table.is_bin_edges());
        assert_eq!(table.efficiency(1.0).unwrap(), 0.9);
        assert_eq!(table.efficiency(1.49).unwrap(), 0.9);
        assert_eq!(table.efficiency(1.5).unwrap(), 0.8);
        assert_eq!(table.efficiency(2.99).unwrap(), 0.8);
        assert_eq!(table.efficiency(3.0).unwrap(), 0.4);
        assert_eq!(table.efficiency(4.0).unwrap(), 0.4);
    }

    #[test]
    fn lookup_table_on_edges_is_piecewise_constant() {
        let table = EfficiencyLookupTable::new(vec![1.0, 2.0, 4.0], vec![0.9, 0.5]).unwrap();
        assert!(table.is_bin_edges());
        assert_eq!(table.efficiency(1.0).unwrap(), 0.9);
        assert_eq!(table.efficiency(1.99).unwrap(), 0.9);
        assert_eq!(table.efficiency(2.0).unwrap(), 0.5);
        assert_eq!(table.efficiency(4.0).unwrap(), 0.5);
    }

    #[test]
    fn lookup_table_out_of_range_is_an_error() {
        let table = EfficiencyLookupTable::new(vec![1.0, 2.0], vec![0.9, 0.8]).unwrap();
        assert_eq!(table.efficiency(0.5).unwrap_err().kind(), ErrorKind::InvalidInput);
        assert!(table.efficiency(2.5).is_err());
        assert!(table.efficiency(f64::NAN).is_err());
    }

    #[test]
    fn lookup_table_rejects_unsorted_wavelengths() {
        assert!(EfficiencyLookupTable::new(vec![2.0, 1.0], vec![0.9, 0.8]).is_err());
        assert!(EfficiencyLookupTable::new(vec![1.0, 2.0, 3.0, 4.0], vec![0.9, 0.8]).is_err());
    }

    #[test]
    fn lookup_table_from_csv_selects_columns_by_name() {
        let csv = "a, b ,c\n1,2,3\n4,5,6\n";
        let table = EfficiencyLookupTable::from_csv_reader(csv.as_bytes(), "a", "b").unwrap();
        assert_eq!(table.efficiency(1.0).unwrap(), 2.0);
        assert_eq!(table.efficiency(4.0).unwrap(), 5.0);
        assert_eq!(table.efficiency(2.4).unwrap(), 2.0);
        assert_eq!(table.efficiency(3.0).unwrap(), 5.0);
    }

    #[test]
    fn lookup_table_from_csv_path() {
        let name = format!("supermirror-efficiency-{}.csv", std::process::id());
        let path = std::env::temp_dir().join(name);
        std::fs::write(&path, "\u{feff}# X , Y \n3.05,0.97\n3.15,0.96\n").unwrap();
        let table = EfficiencyLookupTable::from_csv_path(&path, "# X", "Y");
        std::fs::remove_file(&path).unwrap();

        let table = table.unwrap();
        assert_eq!(table.efficiency(3.05).unwrap(), 0.97);
        assert_eq!(table.efficiency(3.15).unwrap(), 0.96);

        let missing = std::env::temp_dir().join("no-such-efficiency-table.csv");
        let err = EfficiencyLookupTable::from_csv_path(&missing, "# X", "Y").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn lookup_table_from_csv_reports_missing_column_and_bad_value() {
        let read = |csv: &str, x: &str, y: &str| {
            EfficiencyLookupTable::from_csv_reader(csv.as_bytes(), x, y).unwrap_err()
        };
        let err = read("a,b\n1,2\n", "a", "z");
        assert!(err.message().contains("'z'"));
        let err = read("a,b\n1,2\n3,x\n", "a", "b");
        assert!(err.message().contains("Line 3"));
    }

    #[test]
    fn apply_ignores_time() {
        let table = EfficiencyLookupTable::new(vec![1.0, 3.0], vec![0.9, 0.7]).unwrap();
        let sm = SupermirrorTransmissionFunction::new(table);
        let data = ChannelData::new(vec![0.0; 2], vec![1.0, 2.0], None).unwrap();
        let t = sm.apply(&data, PlusMinus::Plus).unwrap();
        assert!((t[0] - 0.95).abs() < 1e-15);
        // λ = 2 is halfway between the table points and takes the upper one.
        assert!((t[1] - 0.85).abs() < 1e-15);
    }
}
