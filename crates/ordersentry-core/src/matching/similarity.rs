//! Fuzzy string similarity.

/// Similarity between two already-normalized strings, in `0.0..=1.0`.
///
/// Containment short-circuits to the length ratio (so "acme" inside
/// "acme tools group" still scores well); otherwise Levenshtein distance
/// normalized by the longer length.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let (min_len, max_len) = if a.len() <= b.len() {
        (a.len(), b.len())
    } else {
        (b.len(), a.len())
    };

    if a.contains(b) || b.contains(a) {
        return min_len as f64 / max_len as f64;
    }

    let distance = strsim::levenshtein(a, b);
    1.0 - distance as f64 / max_len as f64
}
