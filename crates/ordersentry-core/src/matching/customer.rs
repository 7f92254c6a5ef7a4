//! Customer matching against the accounting system's customer list.

use crate::accounting::{AccountingClient, AccountingResult, Customer};
use crate::trust::is_free_mail_domain;

use super::model::{MatchConfidence, MatchResult, MatchType};
use super::normalize::{is_entity_variation, normalize_entity_name};
use super::similarity::similarity;

const FUZZY_HIGH: f64 = 0.85;
const FUZZY_MEDIUM: f64 = 0.70;
const DOMAIN_MEDIUM: f64 = 0.80;
const DOMAIN_LOW: f64 = 0.60;

/// Matches inbound contacts against a cached customer list.
///
/// The candidate cache lives for the lifetime of one matcher instance and
/// is only replaced by an explicit [`refresh`](Self::refresh); callers
/// needing fresh data own that decision. The matcher itself is pure
/// lookup and never talks to the network.
#[derive(Debug, Default)]
pub struct CustomerMatcher {
    candidates: Vec<Customer>,
    primed: bool,
}

impl CustomerMatcher {
    /// Creates an unprimed matcher with no candidates.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            candidates: Vec::new(),
            primed: false,
        }
    }

    /// Creates a matcher over a fixed candidate list.
    #[must_use]
    pub const fn with_candidates(candidates: Vec<Customer>) -> Self {
        Self {
            candidates,
            primed: true,
        }
    }

    /// Whether the candidate cache has been populated.
    #[must_use]
    pub const fn is_primed(&self) -> bool {
        self.primed
    }

    /// Replaces the candidate cache from the accounting system.
    ///
    /// # Errors
    ///
    /// Returns an error if the customer fetch fails; the existing cache is
    /// kept in that case.
    pub async fn refresh<C: AccountingClient>(&mut self, client: &C) -> AccountingResult<()> {
        let customers = client.fetch_customers().await?;
        self.candidates = customers;
        self.primed = true;
        Ok(())
    }

    /// Known customer emails, for trusted-domain construction.
    #[must_use]
    pub fn customer_emails(&self) -> Vec<String> {
        self.candidates
            .iter()
            .filter_map(|c| c.email.clone())
            .collect()
    }

    /// All qualifying matches, best first.
    ///
    /// Every candidate is scored through the cascade (exact email, name
    /// variation, fuzzy similarity, domain inference) and the qualifiers
    /// are stable-sorted by confidence rank, so results are non-increasing
    /// in confidence and candidate order is preserved within a tier.
    #[must_use]
    pub fn match_all(&self, contact_email: &str, contact_name: Option<&str>) -> Vec<MatchResult> {
        let mut results: Vec<MatchResult> = self
            .candidates
            .iter()
            .filter_map(|candidate| match_candidate(candidate, contact_email, contact_name))
            .collect();
        results.sort_by_key(|r| r.confidence);
        results
    }

    /// The single best match, if any.
    #[must_use]
    pub fn best_match(&self, contact_email: &str, contact_name: Option<&str>) -> Option<MatchResult> {
        self.match_all(contact_email, contact_name).into_iter().next()
    }
}

/// Runs one candidate through the matching cascade.
fn match_candidate(
    candidate: &Customer,
    contact_email: &str,
    contact_name: Option<&str>,
) -> Option<MatchResult> {
    let contact_email = contact_email.trim();

    // 1. Exact email match short-circuits.
    if let Some(email) = candidate.email.as_deref() {
        if !email.is_empty() && email.trim().eq_ignore_ascii_case(contact_email) {
            return Some(MatchResult {
                customer_id: candidate.id.clone(),
                confidence: MatchConfidence::Exact,
                match_type: MatchType::Email,
                matched_value: email.trim().to_string(),
            });
        }
    }

    let name_fields = candidate_name_fields(candidate);

    // 2. Name/company variation.
    if let Some(contact_name) = contact_name.filter(|n| !n.trim().is_empty()) {
        for (value, match_type) in &name_fields {
            if is_entity_variation(contact_name, value) {
                return Some(MatchResult {
                    customer_id: candidate.id.clone(),
                    confidence: MatchConfidence::High,
                    match_type: *match_type,
                    matched_value: (*value).to_string(),
                });
            }
        }

        // 3. Fuzzy similarity fallback.
        let normalized_contact = normalize_entity_name(contact_name);
        let mut best: Option<(f64, MatchType, &str)> = None;
        for (value, match_type) in &name_fields {
            let score = similarity(&normalized_contact, &normalize_entity_name(value));
            if best.is_none_or(|(top, _, _)| score > top) {
                best = Some((score, *match_type, value));
            }
        }
        if let Some((score, match_type, value)) = best {
            let confidence = if score >= FUZZY_HIGH {
                Some(MatchConfidence::High)
            } else if score >= FUZZY_MEDIUM {
                Some(MatchConfidence::Medium)
            } else {
                None
            };
            if let Some(confidence) = confidence {
                return Some(MatchResult {
                    customer_id: candidate.id.clone(),
                    confidence,
                    match_type,
                    matched_value: value.to_string(),
                });
            }
        }
    }

    // 4. Email-domain-to-company inference.
    let inferred = domain_company_hint(contact_email)?;
    let mut best: Option<(f64, MatchType, &str)> = None;
    for (value, match_type) in &name_fields {
        let score = similarity(&inferred, &normalize_entity_name(value));
        if best.is_none_or(|(top, _, _)| score > top) {
            best = Some((score, *match_type, value));
        }
    }
    let (score, match_type, value) = best?;
    let confidence = if score >= DOMAIN_MEDIUM {
        MatchConfidence::Medium
    } else if score >= DOMAIN_LOW {
        MatchConfidence::Low
    } else {
        return None;
    };
    Some(MatchResult {
        customer_id: candidate.id.clone(),
        confidence,
        match_type,
        matched_value: value.to_string(),
    })
}

/// The candidate's name fields, in match priority order.
fn candidate_name_fields(candidate: &Customer) -> Vec<(&str, MatchType)> {
    let mut fields = vec![(candidate.name.as_str(), MatchType::Name)];
    if candidate.full_name != candidate.name && !candidate.full_name.is_empty() {
        fields.push((candidate.full_name.as_str(), MatchType::Name));
    }
    if let Some(company) = candidate.company_name.as_deref().filter(|c| !c.is_empty()) {
        fields.push((company, MatchType::Company));
    }
    fields
}

/// A company-name guess from the sender's domain, e.g. `acme-tools.com`
/// becomes "acme tools". Free-mail domains carry no company signal.
fn domain_company_hint(contact_email: &str) -> Option<String> {
    let domain = crate::email::domain_of(contact_email)?;
    if is_free_mail_domain(&domain) {
        return None;
    }
    let label = domain.split('.').next()?;
    let hint = normalize_entity_name(&label.replace(['-', '_'], " "));
    if hint.len() < 2 { None } else { Some(hint) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer(id: &str, name: &str, company: Option<&str>, email: Option<&str>) -> Customer {
        Customer {
            id: id.into(),
            name: name.into(),
            full_name: name.into(),
            company_name: company.map(ToString::to_string),
            email: email.map(ToString::to_string),
        }
    }

    #[test]
    fn test_exact_email_match() {
        let matcher = CustomerMatcher::with_candidates(vec![customer(
            "c1",
            "Acme Tools",
            None,
            Some("buyer@acme.com"),
        )]);
        let best = matcher.best_match("Buyer@ACME.com", None);
        let best = best.as_ref();
        assert_eq!(best.map(|m| m.confidence), Some(MatchConfidence::Exact));
        assert_eq!(best.map(|m| m.match_type), Some(MatchType::Email));
    }

    #[test]
    fn test_name_variation_beats_fuzzy() {
        // "TNT Tools" vs "T.N.T. TOOLS 2025 INC" is a variation,
        // not merely a medium fuzzy match.
        let matcher = CustomerMatcher::with_candidates(vec![customer(
            "c1",
            "TNT Tools",
            Some("T.N.T. TOOLS 2025 INC"),
            None,
        )]);
        let best = matcher.best_match("orders@tnttools.com", Some("TNT Tools"));
        assert_eq!(best.map(|m| m.confidence), Some(MatchConfidence::High));
    }

    #[test]
    fn test_domain_inference() {
        let matcher = CustomerMatcher::with_candidates(vec![customer(
            "c1",
            "Acme Tools",
            None,
            None,
        )]);
        let best = matcher.best_match("purchasing@acme-tools.com", None);
        let best = best.as_ref();
        assert_eq!(best.map(|m| m.confidence), Some(MatchConfidence::Medium));
        assert_eq!(best.map(|m| m.match_type), Some(MatchType::Name));
    }

    #[test]
    fn test_free_mail_domain_is_skipped() {
        let matcher = CustomerMatcher::with_candidates(vec![customer("c1", "Gmail Fabrication", None, None)]);
        assert!(matcher.best_match("someone@gmail.com", None).is_none());
    }

    #[test]
    fn test_match_all_sorted_by_confidence_rank() {
        let matcher = CustomerMatcher::with_candidates(vec![
            customer("weak", "Acme Industrial Holdings", None, None),
            customer("exact", "Whoever", None, Some("buyer@acme-tools.com")),
            customer("strong", "Acme Tools", None, None),
        ]);
        let results = matcher.match_all("buyer@acme-tools.com", Some("Acme Tools"));
        assert!(results.len() >= 2);
        for pair in results.windows(2) {
            assert!(pair[0].confidence <= pair[1].confidence);
        }
        assert_eq!(results[0].customer_id, "exact");
    }

    #[test]
    fn test_no_match_for_strangers() {
        let matcher = CustomerMatcher::with_candidates(vec![customer("c1", "Acme Tools", None, None)]);
        assert!(matcher.best_match("stranger@zenithplastics.com", Some("Zenith Plastics")).is_none());
    }

    #[test]
    fn test_unprimed_matcher_is_empty() {
        let matcher = CustomerMatcher::new();
        assert!(!matcher.is_primed());
        assert!(matcher.best_match("a@b.com", None).is_none());
    }
}
