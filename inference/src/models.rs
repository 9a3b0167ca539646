//! models.rs – value objects shared across the pipeline stages.
//!
//! The `Isolate` is the root entity; everything else here is derived from
//! it and handed to the presentation layer as plain in-process values.
//! Ordered maps keep every derived artifact byte-stable across reruns.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single sequenced MRSA sample. Created on ingest, immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Isolate {
    pub id: String,
    /// Assembled genome sequence (IUPAC DNA alphabet).
    pub sequence: String,
    pub country: Option<String>,
    /// MLST lineage, e.g. "ST8" or "ST239".
    pub lineage: Option<String>,
    pub collected: Option<NaiveDate>,
    pub sccmec_type: Option<String>,
}

/// Fixed-schema marker vector derived once per isolate.
///
/// `values` holds every *resolved* marker (present markers > 0.0, absent
/// markers exactly 0.0); `unresolved` lists markers that could not be
/// called on this assembly. The panel version pins the schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub panel_version: String,
    pub values: BTreeMap<String, f64>,
    pub unresolved: BTreeSet<String>,
}

impl FeatureVector {
    /// A marker counts as present only when it resolved with intensity > 0.
    pub fn present(&self, marker: &str) -> bool {
        self.values.get(marker).is_some_and(|v| *v > 0.0)
    }

    pub fn value(&self, marker: &str) -> Option<f64> {
        self.values.get(marker).copied()
    }

    pub fn resolved_count(&self) -> usize {
        self.values.len()
    }

    /// Fraction of the panel schema that could not be called.
    pub fn unresolved_fraction(&self) -> f64 {
        let total = self.values.len() + self.unresolved.len();
        if total == 0 {
            return 0.0;
        }
        self.unresolved.len() as f64 / total as f64
    }
}

/// Calibrated biofilm-risk score with its confidence band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    /// Probability-scale score in [0, 1].
    pub score: f64,
    pub ci_low: f64,
    pub ci_high: f64,
    /// Version of the model that produced this score, kept so historical
    /// comparisons stay reproducible.
    pub model_version: String,
    pub resolved_features: usize,
}

/// Predicted coverage fraction per therapeutic agent, in [0, 1].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TherapeuticProfile {
    pub fractions: BTreeMap<String, f64>,
}

impl TherapeuticProfile {
    /// An isolate matching no agent is a valid, reportable outcome.
    pub fn is_all_zero(&self) -> bool {
        self.fractions.values().all(|f| *f == 0.0)
    }
}

/// A genomic region handed to the RNA designer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceRegion {
    /// Locus the region was derived from (usually a panel marker name).
    pub locus: String,
    pub start: usize,
    pub end: usize,
    pub sequence: String,
}

/// A ranked antisense / CRISPR-Cas13 target candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RnaCandidate {
    pub locus: String,
    pub start: usize,
    pub end: usize,
    /// Predicted duplex folding free energy, kcal/mol (more negative is
    /// more stable).
    pub free_energy: f64,
    /// 1.0 means the region is unlikely to be sequestered in secondary
    /// structure.
    pub accessibility: f64,
    /// Off-target similarity penalty in [0, 1].
    pub specificity_penalty: f64,
    /// Combined targeting suitability in [0, 1]; ranking key.
    pub suitability: f64,
}

/// Per-isolate result bundle handed to the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolateBundle {
    pub isolate_id: String,
    pub country: Option<String>,
    pub lineage: Option<String>,
    pub collected: Option<NaiveDate>,
    pub features: FeatureVector,
    pub risk: RiskScore,
    pub profile: TherapeuticProfile,
    /// Best single agent under the deterministic tie-break, if any covers.
    pub recommended_agent: Option<String>,
    /// Ordered by descending suitability.
    pub rna_candidates: Vec<RnaCandidate>,
}

/// Population-level aggregation over one (geography, lineage, window) cell.
/// Derived on demand and replaced wholesale, never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveillanceSummary {
    pub country: String,
    pub lineage: String,
    /// Window label, e.g. "2025-03", "2025-Q1" or "2025".
    pub window: String,
    pub count: usize,
    pub mean_risk: f64,
    /// Modal recommended agent within the cell, ties broken by agent id.
    pub dominant_agent: Option<String>,
}
