//! Distance functions driving ranking: L2, Hamming and Levenshtein
//!
//! Smaller is better for every metric used by the retriever, matching the
//! BM25 convention of the FTS engine.

use crate::error::{Result, WikiliteError};

/// Euclidean (L2) distance between two vectors of equal length.
pub fn l2(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(WikiliteError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let sum: f32 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum();

    Ok(sum.sqrt())
}

/// Hamming distance between two byte slices of equal length, counting
/// differing bits via popcount.
pub fn hamming(a: &[u8], b: &[u8]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(WikiliteError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let count: u32 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (x ^ y).count_ones())
        .sum();

    Ok(count as f32)
}

/// Levenshtein edit distance over Unicode scalar values, cost 1 per
/// insertion, deletion or substitution.
pub fn levenshtein(s1: &str, s2: &str) -> i32 {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();

    if a.is_empty() {
        return b.len() as i32;
    }
    if b.is_empty() {
        return a.len() as i32;
    }

    // Single-row Wagner-Fischer: prev holds the previous row of the DP table.
    let mut prev: Vec<i32> = (0..=b.len() as i32).collect();
    let mut current = vec![0i32; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i as i32 + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + if ca == cb { 0 } else { 1 };
            current[j + 1] = substitution.min(prev[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut prev, &mut current);
    }

    prev[b.len()]
}
