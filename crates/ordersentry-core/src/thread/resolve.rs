//! Canonical thread key resolution.

use crate::email::EmailRecord;

/// Subjects too generic to merge threads on.
///
/// Unrelated customers routinely reuse these short business phrases, so a
/// bare subject match on them must never join two conversations.
const GENERIC_SUBJECTS: &[&str] = &[
    "rfq",
    "po",
    "purchase order",
    "quote",
    "quotation",
    "quote request",
    "invoice",
    "order",
    "new order",
    "inquiry",
    "enquiry",
    "question",
    "thanks",
    "thank you",
    "hello",
    "hi",
    "follow up",
    "following up",
    "update",
    "fyi",
    "urgent",
    "status",
    "reminder",
    "payment",
    "receipt",
];

/// Normalizes a subject line for comparison.
///
/// Strips leading `Re:`/`Fwd:`/`Fw:` markers and `[tag]` prefixes
/// (repeatedly, in any combination), lowercases, and trims.
#[must_use]
pub fn normalize_subject(subject: &str) -> String {
    let mut s = subject.trim();
    loop {
        let mut changed = false;
        for prefix in ["re:", "fwd:", "fw:"] {
            if s.get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
            {
                s = s[prefix.len()..].trim_start();
                changed = true;
            }
        }
        if s.starts_with('[') {
            if let Some(end) = s.find(']') {
                s = s[end + 1..].trim_start();
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    s.to_lowercase().trim().to_string()
}

/// Whether a normalized subject is specific enough to merge threads on.
///
/// Short subjects and the generic-subject denylist are excluded: "PO" or
/// "Invoice" from two different senders is coincidence, not a conversation.
#[must_use]
pub fn is_specific_subject(normalized: &str) -> bool {
    normalized.len() > 10 && !GENERIC_SUBJECTS.contains(&normalized)
}

/// Produces the canonical grouping key for an email.
///
/// Priority: oldest ancestor in `References`, then `In-Reply-To`, then the
/// message's own id, then a normalized-subject key as last resort. Pure and
/// deterministic; header-broken mail degrades to the subject key and relies
/// on the grouping merge passes.
#[must_use]
pub fn resolve_thread_id(email: &EmailRecord) -> String {
    if let Some(root) = email.reference_ids().next() {
        return root.to_string();
    }
    if let Some(parent) = email
        .in_reply_to
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return parent.to_string();
    }
    if let Some(own) = email
        .message_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return own.to_string();
    }
    format!("subject:{}", normalize_subject(&email.subject))
}
