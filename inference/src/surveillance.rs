//! surveillance.rs – population-level aggregation of per-isolate results.
//!
//! Pure reduction over an already-scored batch. Isolates missing any part
//! of the grouping key (geography, lineage, collection date) are excluded
//! and reported, never fatal. Rebuilding from the same batch yields the
//! same summaries; results are replaced wholesale, not patched.

use std::collections::BTreeMap;

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::Granularity;
use crate::models::{IsolateBundle, SurveillanceSummary};

/// Non-fatal exclusion, surfaced in the batch report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationExclusion {
    pub isolate_id: String,
    pub reason: String,
}

fn window_label(date: chrono::NaiveDate, granularity: Granularity) -> String {
    match granularity {
        Granularity::Month => format!("{:04}-{:02}", date.year(), date.month()),
        Granularity::Quarter => {
            format!("{:04}-Q{}", date.year(), (date.month0() / 3) + 1)
        }
        Granularity::Year => format!("{:04}", date.year()),
    }
}

/// `aggregate(isolates, groupingKey) -> summaries` plus the exclusion list.
pub fn aggregate(
    bundles: &[IsolateBundle],
    granularity: Granularity,
) -> (Vec<SurveillanceSummary>, Vec<AggregationExclusion>) {
    let mut exclusions = Vec::new();
    let mut groups: BTreeMap<(String, String, String), Vec<&IsolateBundle>> = BTreeMap::new();

    for bundle in bundles {
        let (Some(country), Some(lineage), Some(collected)) = (
            bundle.country.as_ref(),
            bundle.lineage.as_ref(),
            bundle.collected,
        ) else {
            let reason = match (
                bundle.country.is_none(),
                bundle.lineage.is_none(),
                bundle.collected.is_none(),
            ) {
                (true, _, _) => "missing geography",
                (_, true, _) => "missing lineage",
                _ => "missing collection date",
            };
            warn!(isolate = %bundle.isolate_id, reason, "excluded from aggregation");
            exclusions.push(AggregationExclusion {
                isolate_id: bundle.isolate_id.clone(),
                reason: reason.to_string(),
            });
            continue;
        };

        groups
            .entry((
                country.clone(),
                lineage.clone(),
                window_label(collected, granularity),
            ))
            .or_default()
            .push(bundle);
    }

    let summaries = groups
        .into_iter()
        .map(|((country, lineage, window), members)| {
            let mean_risk =
                members.iter().map(|b| b.risk.score).sum::<f64>() / members.len() as f64;

            // Modal recommended agent; BTreeMap iteration plus the strict
            // comparison makes ties fall to the smallest agent id.
            let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
            for b in &members {
                if let Some(agent) = &b.recommended_agent {
                    *counts.entry(agent.as_str()).or_default() += 1;
                }
            }
            let dominant_agent = counts
                .iter()
                .fold(None::<(&str, usize)>, |acc, (agent, n)| match acc {
                    Some((_, best)) if *n <= best => acc,
                    _ => Some((agent, *n)),
                })
                .map(|(agent, _)| agent.to_string());

            SurveillanceSummary {
                country,
                lineage,
                window,
                count: members.len(),
                mean_risk,
                dominant_agent,
            }
        })
        .collect();

    (summaries, exclusions)
}
