//! config.rs – explicit, immutable pipeline configuration.
//!
//! Everything the pipeline recognizes as tunable lives here and is passed
//! by value into the batch context; there are no ambient singletons.

use serde::{Deserialize, Serialize};

/// Time-window granularity used by the surveillance aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Granularity {
    Month,
    Quarter,
    Year,
}

/// Bounds for RNA candidate-region filtering and scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RnaConfig {
    /// Minimum region length in nucleotides.
    pub min_region_length: usize,
    /// Inclusive GC-content bounds, as fractions.
    pub gc_min: f64,
    pub gc_max: f64,
    /// Flank added on each side of a marker hit when deriving regions.
    pub flank: usize,
    /// Seed length used for the off-target specificity scan.
    pub seed_length: usize,
}

impl Default for RnaConfig {
    fn default() -> Self {
        Self {
            min_region_length: 21,
            gc_min: 0.30,
            gc_max: 0.70,
            flank: 30,
            seed_length: 20,
        }
    }
}

/// Recognized pipeline options (spec'd surface: model version selector,
/// minimum-feature threshold, RNA length/GC bounds, grouping granularity).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// When set, the loaded risk model must carry exactly this version.
    pub model_version: Option<String>,
    /// Minimum number of resolved panel features required for risk scoring.
    pub min_features: usize,
    /// Sequences shorter than this are rejected as truncated assemblies.
    pub min_sequence_length: usize,
    /// Above this N-fraction, unlocated optional markers are recorded as
    /// unresolved instead of absent.
    pub max_ambiguous_fraction: f64,
    pub rna: RnaConfig,
    pub granularity: Granularity,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_version: None,
            min_features: 5,
            min_sequence_length: 200,
            max_ambiguous_fraction: 0.05,
            rna: RnaConfig::default(),
            granularity: Granularity::Month,
        }
    }
}
