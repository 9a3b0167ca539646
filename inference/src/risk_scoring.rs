//! risk_scoring.rs – calibrated weighted-logistic biofilm-risk model.
//!
//! Weights are domain data loaded from JSON, never hardcoded. Scoring is a
//! linear combination over the panel followed by a sigmoid; the confidence
//! band widens with the fraction of unresolved panel features so sparse
//! assemblies never look over-confident.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use tracing::debug;

use crate::config::PipelineConfig;
use crate::errors::{LoadError, PipelineError, PipelineResult};
use crate::models::{FeatureVector, RiskScore};

fn default_base_se() -> f64 {
    0.05
}

fn default_widen_factor() -> f64 {
    3.0
}

/// Stored model parameters (the same shape the consensus models persist:
/// version, intercept, per-marker betas).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskModel {
    pub version: String,
    pub intercept: f64,
    /// Marker → beta on the logit scale.
    pub weights: BTreeMap<String, f64>,
    /// Documented high-biofilm markers; their betas must be non-negative
    /// so adding one can never decrease the score.
    #[serde(default)]
    pub high_risk_markers: BTreeSet<String>,
    /// Standard error of the calibrated score with a fully resolved panel.
    #[serde(default = "default_base_se")]
    pub base_se: f64,
    /// How strongly unresolved features widen the band.
    #[serde(default = "default_widen_factor")]
    pub widen_factor: f64,
}

impl RiskModel {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, LoadError> {
        let raw = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let model: Self =
            Self::from_json_str(&raw).map_err(|source| LoadError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        model.validate()?;
        Ok(model)
    }

    /// Rejects any parameter set that would break the monotonicity
    /// guarantee for documented high-risk markers.
    pub fn validate(&self) -> Result<(), LoadError> {
        for marker in &self.high_risk_markers {
            if let Some(w) = self.weights.get(marker) {
                if *w < 0.0 {
                    return Err(LoadError::NegativeHighRiskWeight {
                        marker: marker.clone(),
                        weight: *w,
                    });
                }
            }
        }
        Ok(())
    }

    /// `score(featureVector) -> RiskScore`.
    pub fn score(
        &self,
        fv: &FeatureVector,
        config: &PipelineConfig,
    ) -> PipelineResult<RiskScore> {
        let resolved = fv.resolved_count();
        if resolved < config.min_features {
            return Err(PipelineError::InsufficientFeatures {
                resolved,
                required: config.min_features,
            });
        }

        // Model-order aligned vectors; unresolved or unknown markers
        // contribute nothing to the linear term but widen the band below.
        let mut x = Vec::with_capacity(self.weights.len());
        let mut w = Vec::with_capacity(self.weights.len());
        let mut missing = 0usize;
        for (marker, beta) in &self.weights {
            let value = match fv.value(marker) {
                Some(v) => v,
                None => {
                    missing += 1;
                    0.0
                }
            };
            x.push(value);
            w.push(*beta);
        }
        let linear = self.intercept + Array1::from_vec(w).dot(&Array1::from_vec(x));
        let score = 1.0 / (1.0 + (-linear).exp());

        let missing_fraction = if self.weights.is_empty() {
            0.0
        } else {
            missing as f64 / self.weights.len() as f64
        };
        let se = self.base_se * (1.0 + self.widen_factor * missing_fraction);
        let z = Normal::new(0.0, 1.0)
            .expect("unit normal")
            .inverse_cdf(0.975);
        let half = z * se;

        debug!(
            model = %self.version,
            score,
            missing_fraction,
            "risk score computed"
        );

        Ok(RiskScore {
            score,
            ci_low: (score - half).max(0.0),
            ci_high: (score + half).min(1.0),
            model_version: self.version.clone(),
            resolved_features: resolved,
        })
    }
}
