//! batch.rs – per-isolate pipeline wiring and the batch worker pool.
//!
//! Each isolate's run (extract → score → coverage → design) touches only
//! the shared read-only context, so the batch fans out over a rayon pool
//! with no locking. Per-isolate failures are collected, never batch-fatal;
//! aggregation happens after the pool drains.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::errors::{LoadError, PipelineResult};
use crate::feature_extraction::{extract_with_hits, CompiledPanel};
use crate::models::{Isolate, IsolateBundle};
use crate::risk_scoring::RiskModel;
use crate::rna_design::{design, regions_from_hits};
use crate::therapeutic_coverage::{coverage, recommend, TherapeuticCatalog};

/// Everything a batch run shares: loaded once, immutable for the run, read
/// concurrently without synchronization.
#[derive(Debug)]
pub struct PipelineContext {
    pub panel: CompiledPanel,
    pub model: RiskModel,
    pub catalog: TherapeuticCatalog,
    pub config: PipelineConfig,
}

impl PipelineContext {
    pub fn new(
        panel: CompiledPanel,
        model: RiskModel,
        catalog: TherapeuticCatalog,
        config: PipelineConfig,
    ) -> Result<Self, LoadError> {
        model.validate()?;
        if let Some(requested) = &config.model_version {
            if *requested != model.version {
                return Err(LoadError::ModelVersionMismatch {
                    requested: requested.clone(),
                    loaded: model.version.clone(),
                });
            }
        }
        Ok(Self {
            panel,
            model,
            catalog,
            config,
        })
    }
}

/// Cooperative batch-level cancellation: stops issuing new isolate tasks,
/// lets in-flight ones finish or fail cleanly.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolateFailure {
    pub isolate_id: String,
    pub error: String,
}

/// Outcome of one batch run. Failures are per-isolate and the surviving
/// bundles are what aggregation sees.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub bundles: Vec<IsolateBundle>,
    pub failures: Vec<IsolateFailure>,
    /// Isolates never issued because the batch was cancelled.
    pub skipped: Vec<String>,
}

enum Outcome {
    Done(Box<IsolateBundle>),
    Failed(IsolateFailure),
    Skipped(String),
}

/// Run one isolate through the full per-isolate pipeline.
pub fn run_isolate(isolate: &Isolate, ctx: &PipelineContext) -> PipelineResult<IsolateBundle> {
    let (features, hits) = extract_with_hits(isolate, &ctx.panel, &ctx.config)?;
    let risk = ctx.model.score(&features, &ctx.config)?;
    let profile = coverage(&features, &ctx.catalog)?;
    let recommended_agent = recommend(&profile, &ctx.catalog).map(|a| a.id.clone());

    let regions = regions_from_hits(isolate, &hits, &ctx.config.rna);
    let ranking = design(&features, &regions, &isolate.sequence, &ctx.config.rna)?;

    Ok(IsolateBundle {
        isolate_id: isolate.id.clone(),
        country: isolate.country.clone(),
        lineage: isolate.lineage.clone(),
        collected: isolate.collected,
        features,
        risk,
        profile,
        recommended_agent,
        rna_candidates: ranking.into_vec(),
    })
}

/// Fan a batch out over the worker pool. The collect below is the barrier
/// the aggregator needs: nothing downstream runs until every issued task
/// has finished or failed.
pub fn run_batch(
    isolates: &[Isolate],
    ctx: &PipelineContext,
    cancel: &CancelToken,
) -> BatchReport {
    info!(count = isolates.len(), "starting batch run");

    let outcomes: Vec<Outcome> = isolates
        .par_iter()
        .map(|isolate| {
            if cancel.is_cancelled() {
                return Outcome::Skipped(isolate.id.clone());
            }
            match run_isolate(isolate, ctx) {
                Ok(bundle) => Outcome::Done(Box::new(bundle)),
                Err(e) => Outcome::Failed(IsolateFailure {
                    isolate_id: isolate.id.clone(),
                    error: e.to_string(),
                }),
            }
        })
        .collect();

    let mut report = BatchReport::default();
    for outcome in outcomes {
        match outcome {
            Outcome::Done(bundle) => report.bundles.push(*bundle),
            Outcome::Failed(failure) => {
                warn!(isolate = %failure.isolate_id, error = %failure.error, "isolate failed");
                report.failures.push(failure);
            }
            Outcome::Skipped(id) => report.skipped.push(id),
        }
    }

    info!(
        ok = report.bundles.len(),
        failed = report.failures.len(),
        skipped = report.skipped.len(),
        "batch run finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_extraction::{Marker, MarkerCategory, MarkerPanel};
    use crate::therapeutic_coverage::{AgentClass, TherapeuticAgent};
    use std::collections::{BTreeMap, BTreeSet};

    fn context() -> PipelineContext {
        let panel = MarkerPanel {
            version: "panel-test".into(),
            markers: vec![
                Marker {
                    name: "mgeA".into(),
                    category: MarkerCategory::Mge,
                    motif: "GATTACAGATTACAGATTACA".into(),
                    required: false,
                    variants: vec![],
                },
                Marker {
                    name: "icaA".into(),
                    category: MarkerCategory::Adhesin,
                    motif: "ATGACCATTGGACCTTGACG".into(),
                    required: false,
                    variants: vec![],
                },
            ],
        }
        .compile()
        .unwrap();

        let model = RiskModel {
            version: "risk-v1".into(),
            intercept: -0.5,
            weights: BTreeMap::from([
                ("mgeA".to_string(), 1.2),
                ("icaA".to_string(), 1.6),
            ]),
            high_risk_markers: BTreeSet::from(["icaA".to_string()]),
            base_se: 0.05,
            widen_factor: 3.0,
        };

        let catalog = TherapeuticCatalog {
            agents: vec![TherapeuticAgent {
                id: "vB_SauM-C1".into(),
                name: "vB_SauM-C1".into(),
                class: AgentClass::Phage,
                target: "Cell Wall".into(),
                required_markers: BTreeSet::from(["icaA".to_string()]),
                excluding_markers: BTreeSet::new(),
                receptor_polymorphisms: BTreeMap::new(),
                resistance_emergence_rate: 0.12,
            }],
        };

        let config = PipelineConfig {
            min_features: 2,
            ..Default::default()
        };
        PipelineContext::new(panel, model, catalog, config).unwrap()
    }

    fn isolate(id: &str, core: &str) -> Isolate {
        Isolate {
            id: id.into(),
            sequence: format!("{}{}{}", "ACGT".repeat(30), core, "TCCA".repeat(30)),
            country: Some("Germany".into()),
            lineage: Some("ST8".into()),
            collected: None,
            sccmec_type: Some("IV".into()),
        }
    }

    #[test]
    fn bundle_carries_every_stage_output() {
        let ctx = context();
        let iso = isolate("MRSA_0001", "ATGACCATTGGACCTTGACG");
        let bundle = run_isolate(&iso, &ctx).unwrap();
        assert_eq!(bundle.risk.model_version, "risk-v1");
        assert!(bundle.profile.fractions["vB_SauM-C1"] > 0.0);
        assert_eq!(bundle.recommended_agent.as_deref(), Some("vB_SauM-C1"));
        assert!(!bundle.rna_candidates.is_empty());
    }

    #[test]
    fn failures_are_per_isolate_not_batch_fatal() {
        let ctx = context();
        let isolates = vec![
            isolate("MRSA_0001", "ATGACCATTGGACCTTGACG"),
            Isolate {
                id: "MRSA_0002".into(),
                sequence: "ACGT".into(), // truncated
                country: None,
                lineage: None,
                collected: None,
                sccmec_type: None,
            },
        ];
        let report = run_batch(&isolates, &ctx, &CancelToken::new());
        assert_eq!(report.bundles.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].isolate_id, "MRSA_0002");
    }

    #[test]
    fn cancelled_batch_skips_everything_cleanly() {
        let ctx = context();
        let isolates = vec![isolate("MRSA_0001", "ATGACCATTGGACCTTGACG")];
        let cancel = CancelToken::new();
        cancel.cancel();
        let report = run_batch(&isolates, &ctx, &cancel);
        assert!(report.bundles.is_empty());
        assert_eq!(report.skipped, vec!["MRSA_0001".to_string()]);
    }

    #[test]
    fn version_selector_must_match_loaded_model() {
        let base = context();
        let config = PipelineConfig {
            model_version: Some("risk-v9".into()),
            ..Default::default()
        };
        let err = PipelineContext::new(base.panel, base.model, base.catalog, config)
            .err()
            .unwrap();
        assert!(matches!(err, LoadError::ModelVersionMismatch { .. }));
    }
}
