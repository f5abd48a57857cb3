//! Platt-scaling calibration, fitted per zone type on the validation set.
//!
//! `P' = 1 / (1 + exp(a·logit(P) + b))` with zone-specific (a, b) when
//! available, the global pair otherwise, and identity when no calibration
//! artifact exists.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::errors::AppError;

/// Raw probability clip applied before taking the logit.
const LOGIT_CLIP: f64 = 0.001;

#[derive(Debug, Clone, Deserialize)]
struct CalibrationFile {
    global: Option<(f64, f64)>,
    #[serde(default)]
    per_zone: HashMap<String, (f64, f64)>,
}

/// Calibration parameters. The default value is the identity calibration.
#[derive(Debug, Clone, Default)]
pub struct Calibration {
    global: Option<(f64, f64)>,
    per_zone: HashMap<String, (f64, f64)>,
}

impl Calibration {
    /// Load calibration parameters from a JSON file.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AppError::Internal(format!("Failed to read {}: {}", path.display(), e)))?;
        let file: CalibrationFile = serde_json::from_str(&raw)
            .map_err(|e| AppError::Internal(format!("Failed to parse {}: {}", path.display(), e)))?;
        Ok(Self {
            global: file.global,
            per_zone: file.per_zone,
        })
    }

    pub fn is_identity(&self) -> bool {
        self.global.is_none() && self.per_zone.is_empty()
    }

    /// Calibrate a raw P(occupied) using zone-specific parameters when
    /// present, the global pair otherwise, identity as the last resort.
    pub fn calibrate(&self, p_occupied: f64, zone_type: &str) -> f64 {
        let params = self.per_zone.get(zone_type).or(self.global.as_ref());
        match params {
            Some(&(a, b)) => platt_transform(p_occupied, a, b),
            None => p_occupied,
        }
    }
}

fn platt_transform(p: f64, a: f64, b: f64) -> f64 {
    let p = p.clamp(LOGIT_CLIP, 1.0 - LOGIT_CLIP);
    let logit = (p / (1.0 - p)).ln();
    1.0 / (1.0 + (a * logit + b).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_when_unloaded() {
        let cal = Calibration::default();
        assert!(cal.is_identity());
        assert_eq!(cal.calibrate(0.73, "commercial"), 0.73);
    }

    #[test]
    fn test_negated_identity_params() {
        // a = -1, b = 0 reproduces the input probability
        let mut per_zone = HashMap::new();
        per_zone.insert("commercial".to_string(), (-1.0, 0.0));
        let cal = Calibration {
            global: None,
            per_zone,
        };
        let p = cal.calibrate(0.7, "commercial");
        assert!((p - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_zone_specific_preferred_over_global() {
        let mut per_zone = HashMap::new();
        per_zone.insert("commercial".to_string(), (-1.0, 0.0));
        let cal = Calibration {
            // The global pair pushes everything toward 0
            global: Some((-1.0, -2.0)),
            per_zone,
        };
        let zone_p = cal.calibrate(0.5, "commercial");
        let global_p = cal.calibrate(0.5, "residential");
        assert!((zone_p - 0.5).abs() < 1e-9);
        assert!(global_p > 0.5);
    }

    #[test]
    fn test_extreme_inputs_clipped() {
        let mut per_zone = HashMap::new();
        per_zone.insert("mixed".to_string(), (-1.0, 0.0));
        let cal = Calibration {
            global: None,
            per_zone,
        };
        let p0 = cal.calibrate(0.0, "mixed");
        let p1 = cal.calibrate(1.0, "mixed");
        assert!(p0 > 0.0 && p0 < 0.01);
        assert!(p1 < 1.0 && p1 > 0.99);
    }

    #[test]
    fn test_output_in_unit_interval() {
        let cal = Calibration {
            global: Some((1.7, -0.3)),
            per_zone: HashMap::new(),
        };
        for p in [0.0, 0.1, 0.5, 0.9, 1.0] {
            let c = cal.calibrate(p, "mixed");
            assert!((0.0..=1.0).contains(&c), "calibrate({}) = {}", p, c);
        }
    }
}
