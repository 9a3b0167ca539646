//! MRSA biofilm-risk inference pipeline.
//!
//! Turns genome records into a calibrated biofilm-risk score, a phage /
//! antibiofilm-peptide coverage profile and a ranked list of antisense /
//! CRISPR-Cas13 targets, then aggregates batches into surveillance
//! summaries. The presentation layer consumes the value objects exposed
//! here; this crate defines no file format or wire protocol of its own.

pub mod batch;
pub mod config;
pub mod errors;
pub mod feature_extraction;
pub mod helper_functions;
pub mod models;
pub mod risk_scoring;
pub mod rna_design;
pub mod surveillance;
pub mod therapeutic_coverage;

pub use batch::{run_batch, run_isolate, BatchReport, CancelToken, PipelineContext};
pub use config::{Granularity, PipelineConfig, RnaConfig};
pub use errors::{LoadError, PipelineError, PipelineResult};
pub use feature_extraction::{extract, extract_with_hits, CompiledPanel, MarkerPanel};
pub use models::{
    FeatureVector, Isolate, IsolateBundle, RiskScore, RnaCandidate, SequenceRegion,
    SurveillanceSummary, TherapeuticProfile,
};
pub use risk_scoring::RiskModel;
pub use rna_design::{design, RnaCandidateRanking};
pub use surveillance::{aggregate, AggregationExclusion};
pub use therapeutic_coverage::{
    coverage, recommend, recommend_cocktail, TherapeuticAgent, TherapeuticCatalog,
};
