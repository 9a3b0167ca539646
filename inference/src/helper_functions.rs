//! helper_functions.rs – small sequence utilities shared by the stages.

/// Characters accepted in input assemblies (IUPAC DNA, including N).
pub fn is_iupac_base(c: char) -> bool {
    matches!(
        c,
        'A' | 'C' | 'G' | 'T' | 'R' | 'Y' | 'S' | 'W' | 'K' | 'M' | 'B' | 'D' | 'H' | 'V' | 'N'
    )
}

/// GC fraction over A/C/G/T calls only; ambiguous bases are ignored.
pub fn gc_fraction(seq: &str) -> f64 {
    let mut gc = 0usize;
    let mut acgt = 0usize;
    for c in seq.chars() {
        match c {
            'G' | 'C' | 'g' | 'c' => {
                gc += 1;
                acgt += 1;
            }
            'A' | 'T' | 'a' | 't' => acgt += 1,
            _ => {}
        }
    }
    if acgt == 0 {
        return 0.0;
    }
    gc as f64 / acgt as f64
}

pub fn reverse_complement(seq: &str) -> String {
    seq.chars()
        .rev()
        .map(|c| match c {
            'A' => 'T',
            'C' => 'G',
            'G' => 'C',
            'T' => 'A',
            other => other,
        })
        .collect()
}

/// Hamming distance over equal-length byte slices.
pub fn hamming(a: &[u8], b: &[u8]) -> usize {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).filter(|(x, y)| x != y).count()
}
