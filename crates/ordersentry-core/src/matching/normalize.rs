//! Entity-name normalization and variation testing.

/// Legal suffixes that carry no identity: "Acme" and "Acme Inc" are the
/// same entity.
const LEGAL_SUFFIXES: &[&str] = &[
    "inc",
    "llc",
    "ltd",
    "corp",
    "corporation",
    "co",
    "company",
    "limited",
    "incorporated",
];

/// Normalizes an entity name for comparison.
///
/// Lowercases, removes punctuation (so "T.N.T." becomes "tnt"), drops
/// legal-suffix tokens, and collapses whitespace.
#[must_use]
pub fn normalize_entity_name(name: &str) -> String {
    let cleaned: String = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    cleaned
        .split_whitespace()
        .filter(|token| !LEGAL_SUFFIXES.contains(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strips everything but letters and digits.
#[must_use]
pub fn alphanumeric_only(s: &str) -> String {
    s.chars().filter(|c| c.is_alphanumeric()).collect()
}

/// Whether two names are plausibly variations of the same entity.
///
/// True when the normalized forms are equal, when they are equal ignoring
/// all non-alphanumerics, or when the shorter alphanumeric form (at least
/// 4 characters, to keep initials from matching everything) is contained
/// in the longer.
#[must_use]
pub fn is_entity_variation(a: &str, b: &str) -> bool {
    let norm_a = normalize_entity_name(a);
    let norm_b = normalize_entity_name(b);
    if norm_a.is_empty() || norm_b.is_empty() {
        return false;
    }
    if norm_a == norm_b {
        return true;
    }

    let alnum_a = alphanumeric_only(&norm_a);
    let alnum_b = alphanumeric_only(&norm_b);
    if alnum_a == alnum_b {
        return true;
    }

    let (shorter, longer) = if alnum_a.len() <= alnum_b.len() {
        (&alnum_a, &alnum_b)
    } else {
        (&alnum_b, &alnum_a)
    };
    shorter.len() >= 4 && longer.contains(shorter.as_str())
}
