//! Name similarity used to flag low-confidence matches.

/// Similarity below this is logged as a low-confidence match.
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.5;

/// Normalized Levenshtein similarity (`1 - distance / max_len`) in `[0, 1]`,
/// compared case-insensitively on trimmed input.
#[must_use]
pub fn name_similarity(query: &str, candidate: &str) -> f64 {
    let a = query.trim().to_lowercase();
    let b = candidate.trim().to_lowercase();
    strsim::normalized_levenshtein(&a, &b)
}
