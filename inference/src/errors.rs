//! errors.rs – error taxonomy for the inference pipeline.
//!
//! Per-isolate failures are `PipelineError` and abort only that isolate's
//! run; they are recorded against the isolate id in the batch report.
//! `LoadError` covers catalog/model/panel loading and is fatal at process
//! start — no isolate can be scored without those resources.

/// Errors raised while running a single isolate through the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A required panel marker could not be located, or the input sequence
    /// is malformed/truncated below the minimum coverage threshold.
    #[error("unresolved marker panel: {0}")]
    UnresolvedMarker(String),

    /// Too few panel features resolved to score without over-confidence.
    #[error("{resolved} panel features resolved, minimum is {required}")]
    InsufficientFeatures { resolved: usize, required: usize },

    /// The therapeutic catalog contains no agents.
    #[error("therapeutic catalog contains no agents")]
    EmptyCatalog,

    /// Region filtering (length / GC bounds) left nothing to design against.
    #[error("no viable candidate regions after length/GC filtering")]
    NoCandidateRegions,
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors raised while loading the static resources a batch run depends on.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("marker '{marker}' has an invalid detection motif '{motif}'")]
    Motif {
        marker: String,
        motif: String,
        #[source]
        source: Box<regex::Error>,
    },

    #[error("marker '{marker}' motif '{motif}' contains non-IUPAC code '{code}'")]
    InvalidIupac {
        marker: String,
        motif: String,
        code: char,
    },

    /// A documented high-risk marker with a negative weight would break the
    /// monotonicity guarantee, so the model is rejected outright.
    #[error("high-risk marker '{marker}' carries negative weight {weight}")]
    NegativeHighRiskWeight { marker: String, weight: f64 },

    #[error("configured model version '{requested}' does not match loaded model '{loaded}'")]
    ModelVersionMismatch { requested: String, loaded: String },
}
