//! rna_design.rs – RNA stability scoring and antisense / Cas13 target ranking.
//!
//! Candidate regions are derived around located panel markers, filtered by
//! length and GC bounds, then scored on three axes: duplex stability from
//! a dinucleotide stacking-energy table, accessibility (how unlikely the
//! region is to be sequestered in secondary structure) and an off-target
//! specificity penalty from near-matches elsewhere in the genome.

use tracing::debug;

use crate::config::RnaConfig;
use crate::errors::{PipelineError, PipelineResult};
use crate::feature_extraction::MarkerHit;
use crate::helper_functions::{gc_fraction, hamming, reverse_complement};
use crate::models::{FeatureVector, Isolate, RnaCandidate, SequenceRegion};

/// Nearest-neighbor stacking free energies, kcal/mol, for an antisense
/// duplex. Row = first base, column = second base, order A C G T.
/// More negative means a more stable stack.
const STACK_ENERGY: [[f64; 4]; 4] = [
    // A         C      G      T
    [-0.93, -2.24, -2.08, -1.10], // A
    [-2.11, -3.26, -2.36, -2.08], // C
    [-2.35, -3.42, -3.26, -2.24], // G
    [-1.33, -2.35, -2.11, -0.93], // T
];

const STACK_MIN: f64 = -3.42;
const STACK_MAX: f64 = -0.93;

/// Window used when estimating hairpin (self-pairing) propensity.
const HAIRPIN_K: usize = 8;

/// Mismatches tolerated in the off-target seed scan.
const OFF_TARGET_MISMATCHES: usize = 2;

fn base_index(c: u8) -> Option<usize> {
    match c {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' => Some(3),
        _ => None,
    }
}

/// Total stacking free energy of the region, kcal/mol. Pairs touching an
/// ambiguous base contribute nothing.
pub fn duplex_free_energy(seq: &str) -> f64 {
    let bytes = seq.as_bytes();
    let mut dg = 0.0;
    for pair in bytes.windows(2) {
        if let (Some(i), Some(j)) = (base_index(pair[0]), base_index(pair[1])) {
            dg += STACK_ENERGY[i][j];
        }
    }
    dg
}

/// Normalized stability in [0, 1]: lower free energy per stack → higher.
fn stability_score(seq: &str, dg: f64) -> f64 {
    if seq.len() < 2 {
        return 0.0;
    }
    let per_stack = dg / (seq.len() - 1) as f64;
    ((-per_stack) - (-STACK_MAX)) / ((-STACK_MIN) - (-STACK_MAX)).max(1e-9)
}

/// 1 − hairpin propensity: the fraction of k-mers whose reverse complement
/// also occurs within the region approximates self-pairing.
fn accessibility_score(seq: &str) -> f64 {
    if seq.len() < HAIRPIN_K + 1 {
        return 1.0;
    }
    let total = seq.len() - HAIRPIN_K + 1;
    let mut paired = 0usize;
    for i in 0..total {
        let kmer = &seq[i..i + HAIRPIN_K];
        let rc = reverse_complement(kmer);
        if seq.contains(&rc) {
            paired += 1;
        }
    }
    1.0 - paired as f64 / total as f64
}

/// Near-match occurrences of the region's central seed elsewhere in the
/// genome, mapped onto [0, 1): zero hits → no penalty, each additional hit
/// pushes the penalty toward 1.
fn specificity_penalty(region: &SequenceRegion, genome: &str, seed_length: usize) -> f64 {
    let seq = region.sequence.as_bytes();
    let seed_len = seed_length.min(seq.len());
    if seed_len == 0 {
        return 0.0;
    }
    let mid = (seq.len() - seed_len) / 2;
    let seed = &seq[mid..mid + seed_len];
    let seed_genome_start = region.start + mid;

    let genome = genome.as_bytes();
    if genome.len() < seed_len {
        return 0.0;
    }
    let mut hits = 0usize;
    for pos in 0..=genome.len() - seed_len {
        // Skip the seed's own locus.
        if pos + seed_len > seed_genome_start && pos < seed_genome_start + seed_len {
            continue;
        }
        if hamming(&genome[pos..pos + seed_len], seed) <= OFF_TARGET_MISMATCHES {
            hits += 1;
        }
    }
    1.0 - 1.0 / (1.0 + hits as f64)
}

/// Finite, re-iterable ranking of RNA candidates, ordered by descending
/// suitability with ties broken by leftmost genomic coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct RnaCandidateRanking {
    candidates: Vec<RnaCandidate>,
}

impl RnaCandidateRanking {
    /// Restartable: every call starts a fresh pass over the same order.
    pub fn iter(&self) -> std::slice::Iter<'_, RnaCandidate> {
        self.candidates.iter()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn top(&self, n: usize) -> &[RnaCandidate] {
        &self.candidates[..n.min(self.candidates.len())]
    }

    pub fn into_vec(self) -> Vec<RnaCandidate> {
        self.candidates
    }
}

impl<'a> IntoIterator for &'a RnaCandidateRanking {
    type Item = &'a RnaCandidate;
    type IntoIter = std::slice::Iter<'a, RnaCandidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Derive candidate regions around every located marker: the hit plus a
/// configured flank on each side.
pub fn regions_from_hits(
    isolate: &Isolate,
    hits: &[MarkerHit],
    config: &RnaConfig,
) -> Vec<SequenceRegion> {
    let seq = isolate.sequence.trim().to_ascii_uppercase();
    hits.iter()
        .map(|hit| {
            let start = hit.start.saturating_sub(config.flank);
            let end = (hit.end + config.flank).min(seq.len());
            SequenceRegion {
                locus: hit.marker.clone(),
                start,
                end,
                sequence: seq[start..end].to_string(),
            }
        })
        .collect()
}

/// `design(featureVector, sequenceRegions) -> ordered RNA candidates`.
///
/// Regions whose locus resolved as absent on this isolate are dropped —
/// there is nothing to knock down. The genome is only consulted for the
/// off-target scan.
pub fn design(
    fv: &FeatureVector,
    regions: &[SequenceRegion],
    genome: &str,
    config: &RnaConfig,
) -> PipelineResult<RnaCandidateRanking> {
    let genome_upper = genome.trim().to_ascii_uppercase();

    let mut candidates: Vec<RnaCandidate> = Vec::new();
    for region in regions {
        if region.sequence.len() < config.min_region_length {
            continue;
        }
        let gc = gc_fraction(&region.sequence);
        if gc < config.gc_min || gc > config.gc_max {
            continue;
        }
        if fv.value(&region.locus) == Some(0.0) {
            continue;
        }

        let dg = duplex_free_energy(&region.sequence);
        let stability = stability_score(&region.sequence, dg).clamp(0.0, 1.0);
        let accessibility = accessibility_score(&region.sequence);
        let penalty = specificity_penalty(region, &genome_upper, config.seed_length);
        let suitability =
            (0.45 * stability + 0.35 * accessibility - 0.20 * penalty).clamp(0.0, 1.0);

        candidates.push(RnaCandidate {
            locus: region.locus.clone(),
            start: region.start,
            end: region.end,
            free_energy: dg,
            accessibility,
            specificity_penalty: penalty,
            suitability,
        });
    }

    if candidates.is_empty() {
        return Err(PipelineError::NoCandidateRegions);
    }

    candidates.sort_by(|a, b| {
        b.suitability
            .total_cmp(&a.suitability)
            .then_with(|| a.start.cmp(&b.start))
            .then_with(|| a.locus.cmp(&b.locus))
    });
    debug!(count = candidates.len(), "ranked RNA candidates");

    Ok(RnaCandidateRanking { candidates })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    fn vector_with(locus: &str, value: f64) -> FeatureVector {
        FeatureVector {
            panel_version: "panel-test".into(),
            values: BTreeMap::from([(locus.to_string(), value)]),
            unresolved: BTreeSet::new(),
        }
    }

    fn region(locus: &str, start: usize, seq: &str) -> SequenceRegion {
        SequenceRegion {
            locus: locus.into(),
            start,
            end: start + seq.len(),
            sequence: seq.into(),
        }
    }

    fn cfg() -> RnaConfig {
        RnaConfig {
            min_region_length: 10,
            gc_min: 0.2,
            gc_max: 0.8,
            flank: 5,
            seed_length: 10,
        }
    }

    #[test]
    fn gc_rich_stacks_are_more_stable() {
        let gc = duplex_free_energy("GCGCGCGCGC");
        let at = duplex_free_energy("ATATATATAT");
        assert!(gc < at, "GC stacking should be lower free energy");
    }

    #[test]
    fn ranking_is_sorted_and_deterministic() {
        let fv = vector_with("icaA", 1.0);
        let genome = "ATGACCATTGGACCTTGACGGTTACCGGATATTGCACCTAGGTTAACCGGTT";
        let regions = vec![
            region("icaA", 0, "ATGACCATTGGACCTTGACG"),
            region("icaA", 20, "GTTACCGGATATTGCACCTA"),
        ];
        let a = design(&fv, &regions, genome, &cfg()).unwrap();
        let b = design(&fv, &regions, genome, &cfg()).unwrap();
        assert_eq!(a, b);
        let suits: Vec<f64> = a.iter().map(|c| c.suitability).collect();
        assert!(suits.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn equal_suitability_breaks_ties_leftmost() {
        let fv = vector_with("icaA", 1.0);
        let seq = "ATGACCATTGGACCTTGACG";
        // Identical sequences far apart: identical scores, so the ranking
        // must fall back to the genomic coordinate.
        let genome = format!("{}{}{}", seq, "A".repeat(40), seq);
        let regions = vec![
            region("icaA", 60, seq),
            region("icaA", 0, seq),
        ];
        let ranking = design(&fv, &regions, &genome, &cfg()).unwrap();
        let starts: Vec<usize> = ranking.iter().map(|c| c.start).collect();
        assert_eq!(starts, vec![0, 60]);
    }

    #[test]
    fn filtering_everything_is_an_error() {
        let fv = vector_with("icaA", 1.0);
        let regions = vec![
            region("icaA", 0, "AT"),                     // too short
            region("icaA", 10, "GGGGGGGGGGGGGGGGGGGG"),  // GC out of bounds
        ];
        let err = design(&fv, &regions, "ACGTACGTACGT", &cfg()).unwrap_err();
        assert!(matches!(err, PipelineError::NoCandidateRegions));
    }

    #[test]
    fn absent_locus_regions_are_dropped() {
        let fv = vector_with("icaA", 0.0);
        let regions = vec![region("icaA", 0, "ATGACCATTGGACCTTGACG")];
        let err = design(&fv, &regions, "ATGACCATTGGACCTTGACG", &cfg()).unwrap_err();
        assert!(matches!(err, PipelineError::NoCandidateRegions));
    }

    #[test]
    fn ranking_iter_is_restartable() {
        let fv = vector_with("icaA", 1.0);
        let regions = vec![region("icaA", 0, "ATGACCATTGGACCTTGACG")];
        let ranking = design(&fv, &regions, "ATGACCATTGGACCTTGACG", &cfg()).unwrap();
        let first: Vec<_> = ranking.iter().collect();
        let second: Vec<_> = ranking.iter().collect();
        assert_eq!(first, second);
        assert_eq!(ranking.len(), 1);
    }

    #[test]
    fn repeated_seed_raises_penalty() {
        let fv = vector_with("icaA", 1.0);
        let seq = "ATGACCATTGGACCTTGACG";
        let unique_genome = seq.to_string();
        let repeat_genome = format!("{}{}{}", seq, "T".repeat(30), seq);
        let regions = vec![region("icaA", 0, seq)];
        let unique = design(&fv, &regions, &unique_genome, &cfg()).unwrap();
        let repeated = design(&fv, &regions, &repeat_genome, &cfg()).unwrap();
        assert!(
            repeated.iter().next().unwrap().specificity_penalty
                > unique.iter().next().unwrap().specificity_penalty
        );
    }
}
