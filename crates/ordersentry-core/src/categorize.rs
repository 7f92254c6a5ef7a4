//! Categorized-thread input contract.
//!
//! Thread categorization (and PO field extraction) happens upstream in an
//! AI collaborator; this core consumes its output and never reclassifies.
//! Missing fields mean "proceed with defaults", never an error.

use serde::Deserialize;

/// PO fields extracted from a thread.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoDetails {
    /// The customer's PO number, if one was found.
    #[serde(default)]
    pub po_number: Option<String>,
    /// PO total in cents, if stated.
    #[serde(default)]
    pub total_cents: Option<i64>,
}

/// A thread the categorizer marked as PO-received.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorizedThread {
    /// Canonical thread key from thread resolution.
    pub thread_key: String,
    /// Categorizer's label (e.g. "po_received").
    #[serde(default)]
    pub category: Option<String>,
    /// Item type the categorizer inferred.
    #[serde(default)]
    pub item_type: Option<String>,
    /// Resolved contact email, if any.
    #[serde(default)]
    pub contact_email: Option<String>,
    /// Resolved contact display name.
    #[serde(default)]
    pub contact_name: Option<String>,
    /// Extracted PO fields.
    #[serde(default)]
    pub po_details: Option<PoDetails>,
    /// Set upstream when the sender failed the trust filter.
    #[serde(default)]
    pub is_suspicious: bool,
}

impl CategorizedThread {
    /// The contact email, trimmed, if usable.
    #[must_use]
    pub fn resolved_contact_email(&self) -> Option<&str> {
        self.contact_email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty() && e.contains('@'))
    }
}
