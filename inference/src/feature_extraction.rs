//! feature_extraction.rs – fixed marker panel and the per-isolate extractor.
//!
//! The panel is domain data, not logic: each marker names an MGE, cassette
//! or regulatory locus together with an IUPAC-degenerate detection motif.
//! Extraction is pure and deterministic: one sequence + one panel version
//! always yields the same vector.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PipelineConfig;
use crate::errors::{LoadError, PipelineError, PipelineResult};
use crate::helper_functions::is_iupac_base;
use crate::models::{FeatureVector, Isolate};

/// Marker categories from the biofilm GWAS feature space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerCategory {
    Mge,
    SccMec,
    CoreRegulator,
    Adhesin,
    SurfaceProtein,
    Metabolic,
}

/// One allele of a polymorphism-sensitive marker, with the intensity it
/// contributes when matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolymorphismVariant {
    pub motif: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Marker {
    pub name: String,
    pub category: MarkerCategory,
    /// IUPAC-degenerate detection motif.
    pub motif: String,
    /// Required markers anchor the assembly; failing to locate one means
    /// the isolate cannot be resolved against this panel at all.
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub variants: Vec<PolymorphismVariant>,
}

/// The marker panel as shipped on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerPanel {
    pub version: String,
    pub markers: Vec<Marker>,
}

impl MarkerPanel {
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

    /// Compile every motif up front so a batch run shares one read-only
    /// panel with no per-isolate regex work.
    pub fn compile(self) -> Result<CompiledPanel, LoadError> {
        let mut entries = Vec::with_capacity(self.markers.len());
        for marker in &self.markers {
            let motif = compile_motif(&marker.name, &marker.motif)?;
            let mut variants = Vec::with_capacity(marker.variants.len());
            for v in &marker.variants {
                variants.push((compile_motif(&marker.name, &v.motif)?, v.weight));
            }
            entries.push(CompiledMarker {
                marker: marker.clone(),
                motif,
                variants,
            });
        }
        Ok(CompiledPanel {
            version: self.version,
            entries,
        })
    }
}

/// Panel with all motifs compiled; shared read-only across worker threads.
#[derive(Debug)]
pub struct CompiledPanel {
    pub version: String,
    entries: Vec<CompiledMarker>,
}

#[derive(Debug)]
struct CompiledMarker {
    marker: Marker,
    motif: Regex,
    variants: Vec<(Regex, f64)>,
}

impl CompiledPanel {
    pub fn marker_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.marker.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn compile_motif(marker: &str, motif: &str) -> Result<Regex, LoadError> {
    let mut pattern = String::with_capacity(motif.len() * 3);
    for c in motif.to_ascii_uppercase().chars() {
        match c {
            'A' | 'C' | 'G' | 'T' => pattern.push(c),
            'R' => pattern.push_str("[AG]"),
            'Y' => pattern.push_str("[CT]"),
            'S' => pattern.push_str("[GC]"),
            'W' => pattern.push_str("[AT]"),
            'K' => pattern.push_str("[GT]"),
            'M' => pattern.push_str("[AC]"),
            'B' => pattern.push_str("[CGT]"),
            'D' => pattern.push_str("[AGT]"),
            'H' => pattern.push_str("[ACT]"),
            'V' => pattern.push_str("[ACG]"),
            'N' => pattern.push_str("[ACGT]"),
            other => {
                return Err(LoadError::InvalidIupac {
                    marker: marker.to_string(),
                    motif: motif.to_string(),
                    code: other,
                });
            }
        }
    }
    Regex::new(&pattern).map_err(|source| LoadError::Motif {
        marker: marker.to_string(),
        motif: motif.to_string(),
        source: Box::new(source),
    })
}

/// Genomic location of a located marker; feeds candidate-region derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerHit {
    pub marker: String,
    pub start: usize,
    pub end: usize,
}

/// `extract(isolate) -> FeatureVector`, discarding hit coordinates.
pub fn extract(
    isolate: &Isolate,
    panel: &CompiledPanel,
    config: &PipelineConfig,
) -> PipelineResult<FeatureVector> {
    extract_with_hits(isolate, panel, config).map(|(fv, _)| fv)
}

/// Resolve the isolate against the marker panel, also reporting where each
/// located marker sits on the assembly.
pub fn extract_with_hits(
    isolate: &Isolate,
    panel: &CompiledPanel,
    config: &PipelineConfig,
) -> PipelineResult<(FeatureVector, Vec<MarkerHit>)> {
    let seq = isolate.sequence.trim().to_ascii_uppercase();

    if seq.len() < config.min_sequence_length {
        return Err(PipelineError::UnresolvedMarker(format!(
            "sequence truncated to {} nt, minimum coverage is {} nt",
            seq.len(),
            config.min_sequence_length
        )));
    }
    if let Some((pos, bad)) = seq.chars().enumerate().find(|(_, c)| !is_iupac_base(*c)) {
        return Err(PipelineError::UnresolvedMarker(format!(
            "malformed sequence: non-IUPAC character '{bad}' at position {pos}"
        )));
    }

    let n_fraction =
        seq.chars().filter(|c| *c == 'N').count() as f64 / seq.len() as f64;
    let ambiguous = n_fraction > config.max_ambiguous_fraction;
    if ambiguous {
        debug!(
            isolate = %isolate.id,
            n_fraction,
            "ambiguous assembly; unlocated optional markers will be unresolved"
        );
    }

    let mut values = BTreeMap::new();
    let mut unresolved = BTreeSet::new();
    let mut hits = Vec::new();

    for entry in &panel.entries {
        match entry.motif.find(&seq) {
            Some(m) => {
                // Polymorphism-sensitive markers take the strongest
                // matching allele; plain markers are presence/absence.
                let value = if entry.variants.is_empty() {
                    1.0
                } else {
                    let best = entry
                        .variants
                        .iter()
                        .filter(|(re, _)| re.is_match(&seq))
                        .map(|(_, w)| *w)
                        .fold(f64::NEG_INFINITY, f64::max);
                    // Located but matching no catalogued allele: presence
                    // is established by the motif itself.
                    if best.is_finite() {
                        best.clamp(0.0, 1.0)
                    } else {
                        1.0
                    }
                };
                values.insert(entry.marker.name.clone(), value);
                hits.push(MarkerHit {
                    marker: entry.marker.name.clone(),
                    start: m.start(),
                    end: m.end(),
                });
            }
            None if entry.marker.required => {
                return Err(PipelineError::UnresolvedMarker(format!(
                    "required marker '{}' not found on assembly",
                    entry.marker.name
                )));
            }
            None => {
                if ambiguous {
                    unresolved.insert(entry.marker.name.clone());
                } else {
                    values.insert(entry.marker.name.clone(), 0.0);
                }
            }
        }
    }

    Ok((
        FeatureVector {
            panel_version: panel.version.clone(),
            values,
            unresolved,
        },
        hits,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_panel() -> CompiledPanel {
        MarkerPanel {
            version: "panel-test".into(),
            markers: vec![
                Marker {
                    name: "mgeA".into(),
                    category: MarkerCategory::Mge,
                    motif: "GATTACAGATTACA".into(),
                    required: false,
                    variants: vec![],
                },
                Marker {
                    name: "sarA_switch".into(),
                    category: MarkerCategory::CoreRegulator,
                    motif: "TTGCARYTTGCAA".into(),
                    required: false,
                    variants: vec![
                        PolymorphismVariant {
                            motif: "TTGCAACTTGCAA".into(),
                            weight: 0.4,
                        },
                        PolymorphismVariant {
                            motif: "TTGCAGTTTGCAA".into(),
                            weight: 0.9,
                        },
                    ],
                },
            ],
        }
        .compile()
        .unwrap()
    }

    fn isolate(seq: &str) -> Isolate {
        Isolate {
            id: "MRSA_0001".into(),
            sequence: seq.into(),
            country: None,
            lineage: None,
            collected: None,
            sccmec_type: None,
        }
    }

    fn padded(core: &str) -> String {
        format!("{}{}{}", "ACGT".repeat(40), core, "TGCA".repeat(40))
    }

    #[test]
    fn extraction_is_deterministic() {
        let panel = test_panel();
        let cfg = PipelineConfig::default();
        let iso = isolate(&padded("GATTACAGATTACA"));
        let a = extract(&iso, &panel, &cfg).unwrap();
        let b = extract(&iso, &panel, &cfg).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn present_and_absent_markers_are_both_resolved() {
        let panel = test_panel();
        let cfg = PipelineConfig::default();
        let fv = extract(&isolate(&padded("GATTACAGATTACA")), &panel, &cfg).unwrap();
        assert!(fv.present("mgeA"));
        assert_eq!(fv.value("sarA_switch"), Some(0.0));
        assert!(fv.unresolved.is_empty());
    }

    #[test]
    fn degenerate_motif_matches_and_variant_weight_applies() {
        let panel = test_panel();
        let cfg = PipelineConfig::default();
        let fv = extract(&isolate(&padded("TTGCAGTTTGCAA")), &panel, &cfg).unwrap();
        assert_eq!(fv.value("sarA_switch"), Some(0.9));
    }

    #[test]
    fn truncated_sequence_is_an_unresolved_marker_error() {
        let panel = test_panel();
        let cfg = PipelineConfig::default();
        let err = extract(&isolate("ACGTACGT"), &panel, &cfg).unwrap_err();
        assert!(matches!(err, PipelineError::UnresolvedMarker(_)));
    }

    #[test]
    fn malformed_sequence_is_rejected() {
        let panel = test_panel();
        let cfg = PipelineConfig::default();
        let seq = format!("{}X{}", "ACGT".repeat(30), "ACGT".repeat(30));
        let err = extract(&isolate(&seq), &panel, &cfg).unwrap_err();
        assert!(matches!(err, PipelineError::UnresolvedMarker(_)));
    }

    #[test]
    fn required_marker_missing_fails_extraction() {
        let panel = MarkerPanel {
            version: "panel-test".into(),
            markers: vec![Marker {
                name: "femA_anchor".into(),
                category: MarkerCategory::CoreRegulator,
                motif: "CCCCCCCCCCCC".into(),
                required: true,
                variants: vec![],
            }],
        }
        .compile()
        .unwrap();
        let cfg = PipelineConfig::default();
        let err = extract(&isolate(&"ACGT".repeat(100)), &panel, &cfg).unwrap_err();
        assert!(matches!(err, PipelineError::UnresolvedMarker(_)));
    }

    #[test]
    fn ambiguous_assembly_records_unresolved_markers() {
        let panel = test_panel();
        let cfg = PipelineConfig::default();
        let seq = format!("{}{}", "ACGT".repeat(50), "N".repeat(100));
        let fv = extract(&isolate(&seq), &panel, &cfg).unwrap();
        assert!(fv.unresolved.contains("mgeA"));
        assert!(fv.unresolved_fraction() > 0.0);
    }
}
