//! Run configuration.
//!
//! Values come from `POLCORR_*` environment variables, optionally provided
//! through a `.env` file. Unset variables keep their defaults:
//!
//! | variable                              | default       |
//! |---------------------------------------|---------------|
//! | `POLCORR_POLARIZER_FLIPPER`           | `1.0`         |
//! | `POLCORR_ANALYZER_FLIPPER`            | `1.0`         |
//! | `POLCORR_POLARIZER_MODEL`             | `he3`         |
//! | `POLCORR_ANALYZER_MODEL`              | `he3` (`none` = no analyzer) |
//! | `POLCORR_OPACITY_SOURCE`              | `in-situ`     |
//! | `POLCORR_INCOMING_BEAM`               | `unpolarized` |
//! | `POLCORR_FIT_INITIAL_POLARIZATION`    | `0.8`         |
//! | `POLCORR_FIT_INITIAL_T1`              | `400000` (s)  |
//! | `POLCORR_FIT_MAX_ITERATIONS`          | `200`         |
//! | `POLCORR_FIT_X_TOLERANCE`             | `1e-10`       |
//! | `POLCORR_FIT_F_TOLERANCE`             | `1e-14`       |
//! | `POLCORR_FIT_ENFORCE_PHYSICAL_RANGE`  | `true`        |

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{ElementModelKind, FitOptions, FlipperEfficiency, IncomingBeam, OpacitySource};
use crate::error::PolarizationError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionConfig {
    pub polarizer_flipper: FlipperEfficiency,
    pub analyzer_flipper: FlipperEfficiency,
    pub polarizer_model: ElementModelKind,
    /// `None` when the setup has no analyzer (half-polarized measurement).
    pub analyzer_model: Option<ElementModelKind>,
    pub opacity_source: OpacitySource,
    pub incoming_beam: IncomingBeam,
    pub fit: FitOptions,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            polarizer_flipper: FlipperEfficiency::IDEAL,
            analyzer_flipper: FlipperEfficiency::IDEAL,
            polarizer_model: ElementModelKind::He3,
            analyzer_model: Some(ElementModelKind::He3),
            opacity_source: OpacitySource::InSitu,
            incoming_beam: IncomingBeam::Unpolarized,
            fit: FitOptions::default(),
        }
    }
}

impl CorrectionConfig {
    pub fn from_env() -> Result<Self, PolarizationError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source (e.g. a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PolarizationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(v) = get("POLCORR_POLARIZER_FLIPPER") {
            config.polarizer_flipper = parse_flipper("POLCORR_POLARIZER_FLIPPER", &v)?;
        }
        if let Some(v) = get("POLCORR_ANALYZER_FLIPPER") {
            config.analyzer_flipper = parse_flipper("POLCORR_ANALYZER_FLIPPER", &v)?;
        }
        if let Some(v) = get("POLCORR_POLARIZER_MODEL") {
            config.polarizer_model = parse_model("POLCORR_POLARIZER_MODEL", &v)?;
        }
        if let Some(v) = get("POLCORR_ANALYZER_MODEL") {
            config.analyzer_model = match v.to_ascii_lowercase().as_str() {
                "none" => None,
                _ => Some(parse_model("POLCORR_ANALYZER_MODEL", &v)?),
            };
        }
        if let Some(v) = get("POLCORR_OPACITY_SOURCE") {
            config.opacity_source = match v.to_ascii_lowercase().as_str() {
                "in-situ" | "insitu" => OpacitySource::InSitu,
                "ex-situ" | "exsitu" => OpacitySource::ExSitu,
                _ => return Err(invalid("POLCORR_OPACITY_SOURCE", &v, "in-situ or ex-situ")),
            };
        }
        if let Some(v) = get("POLCORR_INCOMING_BEAM") {
            config.incoming_beam = match v.to_ascii_lowercase().as_str() {
                "unpolarized" => IncomingBeam::Unpolarized,
                "polarized" => IncomingBeam::Polarized,
                _ => return Err(invalid("POLCORR_INCOMING_BEAM", &v, "unpolarized or polarized")),
            };
        }

        let fit = &mut config.fit;
        if let Some(v) = get("POLCORR_FIT_INITIAL_POLARIZATION") {
            fit.initial_polarization = parse_number("POLCORR_FIT_INITIAL_POLARIZATION", &v)?;
        }
        if let Some(v) = get("POLCORR_FIT_INITIAL_T1") {
            fit.initial_t1_seconds = parse_number("POLCORR_FIT_INITIAL_T1", &v)?;
            if fit.initial_t1_seconds <= 0.0 {
                return Err(invalid("POLCORR_FIT_INITIAL_T1", &v, "a positive number of seconds"));
            }
        }
        if let Some(v) = get("POLCORR_FIT_MAX_ITERATIONS") {
            fit.max_iterations = parse_number("POLCORR_FIT_MAX_ITERATIONS", &v)?;
        }
        if let Some(v) = get("POLCORR_FIT_X_TOLERANCE") {
            fit.x_tolerance = parse_number("POLCORR_FIT_X_TOLERANCE", &v)?;
        }
        if let Some(v) = get("POLCORR_FIT_F_TOLERANCE") {
            fit.f_tolerance = parse_number("POLCORR_FIT_F_TOLERANCE", &v)?;
        }
        if let Some(v) = get("POLCORR_FIT_ENFORCE_PHYSICAL_RANGE") {
            fit.enforce_physical_range = match v.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => return Err(invalid("POLCORR_FIT_ENFORCE_PHYSICAL_RANGE", &v, "true or false")),
            };
        }

        Ok(config)
    }

    pub fn is_half_polarized(&self) -> bool {
        self.analyzer_model.is_none()
    }
}

fn parse_flipper(key: &str, value: &str) -> Result<FlipperEfficiency, PolarizationError> {
    let f: f64 = parse_number(key, value)?;
    FlipperEfficiency::new(f)
        .map_err(|e| PolarizationError::config(format!("{key}: {}", e.message())))
}

fn parse_model(key: &str, value: &str) -> Result<ElementModelKind, PolarizationError> {
    match value.to_ascii_lowercase().as_str() {
        "he3" => Ok(ElementModelKind::He3),
        "supermirror" => Ok(ElementModelKind::Supermirror),
        _ => Err(invalid(key, value, "he3 or supermirror")),
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, PolarizationError> {
    value.parse::<T>().map_err(|_| invalid(key, value, "a number"))
}

fn invalid(key: &str, value: &str, expected: &str) -> PolarizationError {
    PolarizationError::config(format!("Invalid {key}='{value}': expected {expected}."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::collections::HashMap;

    fn from_map(pairs: &[(&str, &str)]) -> Result<CorrectionConfig, PolarizationError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CorrectionConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(from_map(&[]).unwrap(), CorrectionConfig::default());
    }

    #[test]
    fn reads_all_sections() {
        let config = from_map(&[
            ("POLCORR_POLARIZER_FLIPPER", "0.98"),
            ("POLCORR_POLARIZER_MODEL", "Supermirror"),
            ("POLCORR_ANALYZER_MODEL", "none"),
            ("POLCORR_OPACITY_SOURCE", "ex-situ"),
            ("POLCORR_INCOMING_BEAM", "polarized"),
            ("POLCORR_FIT_INITIAL_T1", "1e5"),
            ("POLCORR_FIT_MAX_ITERATIONS", "50"),
            ("POLCORR_FIT_ENFORCE_PHYSICAL_RANGE", "false"),
        ])
        .unwrap();
        assert_eq!(config.polarizer_flipper.value(), 0.98);
        assert!(config.analyzer_flipper.is_ideal());
        assert_eq!(config.polarizer_model, ElementModelKind::Supermirror);
        assert!(config.is_half_polarized());
        assert_eq!(config.opacity_source, OpacitySource::ExSitu);
        assert_eq!(config.incoming_beam, IncomingBeam::Polarized);
        assert_eq!(config.fit.initial_t1_seconds, 1e5);
        assert_eq!(config.fit.max_iterations, 50);
        assert!(!config.fit.enforce_physical_range);
    }

    #[test]
    fn malformed_values_are_config_errors() {
        for pair in [
            ("POLCORR_ANALYZER_FLIPPER", "1.2"),
            ("POLCORR_POLARIZER_MODEL", "mirror"),
            ("POLCORR_FIT_MAX_ITERATIONS", "-3"),
            ("POLCORR_FIT_INITIAL_T1", "0"),
        ] {
            let err = from_map(&[pair]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Config, "{pair:?}");
            assert!(err.message().contains(pair.0));
        }
    }

    #[test]
    fn serializes_with_kebab_case_enums() {
        let json = serde_json::to_string(&CorrectionConfig::default()).unwrap();
        assert!(json.contains("\"in-situ\""));
        assert!(json.contains("\"he3\""));
        let back: CorrectionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, CorrectionConfig::default());
    }
}
