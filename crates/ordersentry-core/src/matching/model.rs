//! Match result data models.

/// How certain a customer match is.
///
/// Variant order is the ranking: `Exact` sorts before `High`, and so on,
/// so a plain ascending sort on confidence puts the best match first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchConfidence {
    /// Exact email equality.
    Exact,
    /// Name variation or very close fuzzy match.
    High,
    /// Moderate fuzzy match or strong domain inference.
    Medium,
    /// Weak domain inference.
    Low,
}

impl MatchConfidence {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "exact" => Self::Exact,
            "high" => Self::High,
            "low" => Self::Low,
            _ => Self::Medium,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Which candidate field produced the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    /// Candidate email.
    Email,
    /// Customer name.
    Name,
    /// Company name.
    Company,
}

impl MatchType {
    /// Convert to string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Name => "name",
            Self::Company => "company",
        }
    }
}

/// One ranked customer-match candidate.
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// Accounting-system customer id.
    pub customer_id: String,
    /// Certainty tier.
    pub confidence: MatchConfidence,
    /// Field that matched.
    pub match_type: MatchType,
    /// The candidate value that matched.
    pub matched_value: String,
}
