//! Backing-store abstraction for email lookups.

use std::collections::BTreeSet;

use crate::Result;
use crate::thread::normalize_subject;

use super::model::EmailRecord;

/// Read access to the synced email corpus.
///
/// Thread expansion only needs two lookup shapes, so the trait stays small:
/// the SQLite repository implements it for production and
/// [`MemoryEmailStore`] backs tests.
#[allow(async_fn_in_trait)]
pub trait EmailStore {
    /// Emails whose `message_id` or `in_reply_to` is in `ids`, or whose
    /// `references` header contains any id in `ids` as a substring.
    async fn emails_matching_ids(&self, ids: &BTreeSet<String>) -> Result<Vec<EmailRecord>>;

    /// Emails whose normalized subject is in `subjects`.
    async fn emails_with_subjects(&self, subjects: &BTreeSet<String>) -> Result<Vec<EmailRecord>>;
}

/// In-memory [`EmailStore`] over a fixed record list.
#[derive(Debug, Default)]
pub struct MemoryEmailStore {
    emails: Vec<EmailRecord>,
}

impl MemoryEmailStore {
    /// Creates a store over the given records.
    #[must_use]
    pub fn new(emails: Vec<EmailRecord>) -> Self {
        Self { emails }
    }
}

impl EmailStore for MemoryEmailStore {
    async fn emails_matching_ids(&self, ids: &BTreeSet<String>) -> Result<Vec<EmailRecord>> {
        let matches = self
            .emails
            .iter()
            .filter(|e| {
                let by_message_id = e
                    .message_id
                    .as_deref()
                    .is_some_and(|m| ids.contains(m.trim()));
                let by_reply = e
                    .in_reply_to
                    .as_deref()
                    .is_some_and(|m| ids.contains(m.trim()));
                let by_references = e
                    .references
                    .as_deref()
                    .is_some_and(|refs| ids.iter().any(|id| refs.contains(id.as_str())));
                by_message_id || by_reply || by_references
            })
            .cloned()
            .collect();
        Ok(matches)
    }

    async fn emails_with_subjects(&self, subjects: &BTreeSet<String>) -> Result<Vec<EmailRecord>> {
        let matches = self
            .emails
            .iter()
            .filter(|e| subjects.contains(&normalize_subject(&e.subject)))
            .cloned()
            .collect();
        Ok(matches)
    }
}
