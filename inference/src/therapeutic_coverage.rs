//! therapeutic_coverage.rs – phage / antibiofilm-peptide coverage engine.
//!
//! The catalog is static data loaded once per process: each agent carries
//! a required-marker set, an excluding-marker set, optional receptor
//! polymorphism weights and a historical resistance-emergence rate. An
//! isolate matching no agent yields an all-zero profile, never an error.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::{LoadError, PipelineError, PipelineResult};
use crate::models::{FeatureVector, TherapeuticProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentClass {
    Phage,
    Peptide,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TherapeuticAgent {
    pub id: String,
    pub name: String,
    pub class: AgentClass,
    /// What the agent attacks, e.g. "Cell Wall" or "Biofilm EPS".
    pub target: String,
    #[serde(default)]
    pub required_markers: BTreeSet<String>,
    #[serde(default)]
    pub excluding_markers: BTreeSet<String>,
    /// Receptor-polymorphism sensitivity: marker → weight. When non-empty,
    /// coverage is the weighted polymorphism match instead of binary.
    #[serde(default)]
    pub receptor_polymorphisms: BTreeMap<String, f64>,
    /// Static catalog attribute used in the recommendation tie-break.
    pub resistance_emergence_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TherapeuticCatalog {
    pub agents: Vec<TherapeuticAgent>,
}

impl TherapeuticCatalog {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, LoadError> {
        let raw = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw).map_err(|source| LoadError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn agent(&self, id: &str) -> Option<&TherapeuticAgent> {
        self.agents.iter().find(|a| a.id == id)
    }
}

/// `coverage(featureVector, catalog) -> TherapeuticProfile`.
pub fn coverage(
    fv: &FeatureVector,
    catalog: &TherapeuticCatalog,
) -> PipelineResult<TherapeuticProfile> {
    if catalog.agents.is_empty() {
        return Err(PipelineError::EmptyCatalog);
    }

    let mut fractions = BTreeMap::new();
    for agent in &catalog.agents {
        fractions.insert(agent.id.clone(), agent_fraction(agent, fv));
    }
    Ok(TherapeuticProfile { fractions })
}

fn agent_fraction(agent: &TherapeuticAgent, fv: &FeatureVector) -> f64 {
    // Unresolved markers count as not-present on both sides: an agent is
    // never credited for a call that could not be made.
    if agent.excluding_markers.iter().any(|m| fv.present(m)) {
        return 0.0;
    }
    if !agent.required_markers.iter().all(|m| fv.present(m)) {
        return 0.0;
    }
    if agent.receptor_polymorphisms.is_empty() {
        return 1.0;
    }

    let total: f64 = agent.receptor_polymorphisms.values().sum();
    if total <= 0.0 {
        return 1.0;
    }
    let matched: f64 = agent
        .receptor_polymorphisms
        .iter()
        .map(|(marker, weight)| weight * fv.value(marker).unwrap_or(0.0))
        .sum();
    (matched / total).clamp(0.0, 1.0)
}

/// Single best agent: highest coverage fraction, ties broken by lowest
/// resistance-emergence rate, then by agent id. `None` when nothing covers.
pub fn recommend<'a>(
    profile: &TherapeuticProfile,
    catalog: &'a TherapeuticCatalog,
) -> Option<&'a TherapeuticAgent> {
    let mut best: Option<(&TherapeuticAgent, f64)> = None;
    for agent in &catalog.agents {
        let frac = *profile.fractions.get(&agent.id).unwrap_or(&0.0);
        if frac <= 0.0 {
            continue;
        }
        best = match best {
            None => Some((agent, frac)),
            Some((cur, cur_frac)) => {
                let better = match frac.total_cmp(&cur_frac) {
                    std::cmp::Ordering::Greater => true,
                    std::cmp::Ordering::Less => false,
                    std::cmp::Ordering::Equal => {
                        match agent
                            .resistance_emergence_rate
                            .total_cmp(&cur.resistance_emergence_rate)
                        {
                            std::cmp::Ordering::Less => true,
                            std::cmp::Ordering::Greater => false,
                            std::cmp::Ordering::Equal => agent.id < cur.id,
                        }
                    }
                };
                if better {
                    Some((agent, frac))
                } else {
                    Some((cur, cur_frac))
                }
            }
        };
    }
    best.map(|(agent, _)| agent)
}

/// Coverage an agent must reach on an isolate to count it as covered in
/// cocktail selection.
const COCKTAIL_COVERED_AT: f64 = 0.7;

/// Greedy minimal-cocktail selection over a batch of profiles: keep adding
/// the agent that covers the most still-uncovered isolates until the
/// requested fraction of the batch is covered or no agent helps. Ties fall
/// back to the same rate-then-id ordering as [`recommend`].
pub fn recommend_cocktail(
    profiles: &[(&str, &TherapeuticProfile)],
    catalog: &TherapeuticCatalog,
    coverage_threshold: f64,
) -> Vec<String> {
    let mut selected: Vec<String> = Vec::new();
    let mut covered: BTreeSet<&str> = BTreeSet::new();
    let goal = (profiles.len() as f64 * coverage_threshold).ceil() as usize;

    while covered.len() < goal {
        let mut best: Option<(&TherapeuticAgent, usize)> = None;
        for agent in &catalog.agents {
            if selected.iter().any(|id| *id == agent.id) {
                continue;
            }
            let gain = profiles
                .iter()
                .filter(|(id, profile)| {
                    !covered.contains(id)
                        && profile
                            .fractions
                            .get(&agent.id)
                            .is_some_and(|f| *f >= COCKTAIL_COVERED_AT)
                })
                .count();
            if gain == 0 {
                continue;
            }
            best = match best {
                None => Some((agent, gain)),
                Some((cur, cur_gain)) => {
                    let better = gain > cur_gain
                        || (gain == cur_gain
                            && (agent.resistance_emergence_rate, &agent.id)
                                < (cur.resistance_emergence_rate, &cur.id));
                    if better {
                        Some((agent, gain))
                    } else {
                        Some((cur, cur_gain))
                    }
                }
            };
        }

        let Some((agent, gain)) = best else {
            debug!("cocktail selection stalled before reaching threshold");
            break;
        };
        for (id, profile) in profiles {
            if profile
                .fractions
                .get(&agent.id)
                .is_some_and(|f| *f >= COCKTAIL_COVERED_AT)
            {
                covered.insert(*id);
            }
        }
        info!(agent = %agent.id, gain, "added agent to cocktail");
        selected.push(agent.id.clone());
    }

    selected
}
