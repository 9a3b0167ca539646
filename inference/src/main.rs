//! Batch runner: loads the static resources, streams isolates from CSV,
//! fans the batch out over the worker pool and writes the report JSON the
//! dashboard renders. All real work lives in the library.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use inference::{
    aggregate, recommend_cocktail, run_batch, CancelToken, Isolate, MarkerPanel,
    PipelineConfig, PipelineContext, RiskModel, TherapeuticCatalog,
};

/// One row of the ingest CSV.
#[derive(Debug, Deserialize)]
struct IsolateRecord {
    id: String,
    sequence: String,
    country: Option<String>,
    lineage: Option<String>,
    collected: Option<NaiveDate>,
    sccmec_type: Option<String>,
}

impl From<IsolateRecord> for Isolate {
    fn from(r: IsolateRecord) -> Self {
        Isolate {
            id: r.id,
            sequence: r.sequence,
            country: r.country,
            lineage: r.lineage,
            collected: r.collected,
            sccmec_type: r.sccmec_type,
        }
    }
}

fn data_dir() -> PathBuf {
    match std::env::var_os("PIPELINE_DATA_DIR") {
        Some(val) => PathBuf::from(val),
        None => PathBuf::from("./data"),
    }
}

fn load_config(dir: &Path) -> anyhow::Result<PipelineConfig> {
    let path = dir.join("pipeline_config.json");
    if !path.exists() {
        info!("no pipeline_config.json, using defaults");
        return Ok(PipelineConfig::default());
    }
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn read_isolates(path: &Path) -> anyhow::Result<Vec<Isolate>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let mut isolates = Vec::new();
    for record in reader.deserialize::<IsolateRecord>() {
        match record {
            Ok(r) => isolates.push(r.into()),
            // A bad CSV row is an ingest problem, not a batch-fatal one.
            Err(e) => warn!(error = %e, "skipping unreadable isolate row"),
        }
    }
    Ok(isolates)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("starting the biofilm inference pipeline");

    let dir = data_dir();
    let config = load_config(&dir)?;

    // Catalog and model load failures are fatal: nothing can be scored
    // without them.
    let panel = MarkerPanel::from_json_file(&dir.join("panel.json"))
        .context("loading marker panel")?
        .compile()
        .context("compiling marker panel")?;
    let model =
        RiskModel::from_json_file(&dir.join("risk_model.json")).context("loading risk model")?;
    let catalog = TherapeuticCatalog::from_json_file(&dir.join("catalog.json"))
        .context("loading therapeutic catalog")?;

    info!(
        panel = %panel.version,
        model = %model.version,
        agents = catalog.agents.len(),
        "resources loaded"
    );

    let isolates = read_isolates(&dir.join("isolates.csv"))?;
    let granularity = config.granularity;
    let ctx = PipelineContext::new(panel, model, catalog, config)
        .context("building pipeline context")?;

    let report = run_batch(&isolates, &ctx, &CancelToken::new());

    let (summaries, exclusions) = aggregate(&report.bundles, granularity);
    for summary in &summaries {
        info!(
            country = %summary.country,
            lineage = %summary.lineage,
            window = %summary.window,
            count = summary.count,
            mean_risk = summary.mean_risk,
            "surveillance cell"
        );
    }
    for exclusion in &exclusions {
        warn!(isolate = %exclusion.isolate_id, reason = %exclusion.reason, "aggregation exclusion");
    }

    let profiles: Vec<(&str, &inference::TherapeuticProfile)> = report
        .bundles
        .iter()
        .map(|b| (b.isolate_id.as_str(), &b.profile))
        .collect();
    let cocktail = recommend_cocktail(&profiles, &ctx.catalog, 0.9);
    info!(?cocktail, "recommended therapeutic cocktail");

    let out_dir = Path::new("./results");
    std::fs::create_dir_all(out_dir).context("creating results directory")?;
    let out_path = out_dir.join("batch_report.json");
    serde_json::to_writer_pretty(
        File::create(&out_path).with_context(|| format!("creating {}", out_path.display()))?,
        &serde_json::json!({
            "report": report,
            "summaries": summaries,
            "exclusions": exclusions,
            "cocktail": cocktail,
        }),
    )
    .context("writing batch report")?;
    info!(path = %out_path.display(), "batch report written");

    Ok(())
}
