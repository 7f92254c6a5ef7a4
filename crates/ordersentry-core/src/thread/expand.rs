//! Expansion of a windowed email subset to full thread history.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use super::resolve::{is_specific_subject, normalize_subject};
use crate::Result;
use crate::email::{EmailRecord, EmailStore};

/// Expands a time-windowed email subset to its complete thread history.
///
/// Categorization and alerting need the whole conversation even when only
/// the latest reply falls inside a reporting window. The expansion is a
/// bounded closure, not a fixpoint:
///
/// 1. collect every message id the window mentions (`Message-ID`,
///    `In-Reply-To`, all `References` tokens) plus the window's specific
///    normalized subjects;
/// 2. look up emails matching that id set (pass 1), then repeat once with
///    ids newly seen in the results (pass 2) to catch two-hop reference
///    chains;
/// 3. separately fetch everything sharing a specific subject (pass 3) to
///    repair broken-header replies.
///
/// Reference chains deeper than two hops are not chased; that bound is a
/// deliberate trade of recall for lookup cost. With `cutoff` set, emails
/// dated after it are dropped so historical reports never see future
/// replies.
///
/// # Errors
///
/// Returns an error if a backing-store lookup fails.
pub async fn fetch_full_thread_emails<S: EmailStore>(
    store: &S,
    window: &[EmailRecord],
    cutoff: Option<DateTime<Utc>>,
) -> Result<Vec<EmailRecord>> {
    let mut ids = BTreeSet::new();
    let mut subjects = BTreeSet::new();
    for email in window {
        collect_ids(email, &mut ids);
        let subject = normalize_subject(&email.subject);
        if is_specific_subject(&subject) {
            subjects.insert(subject);
        }
    }

    let mut result: BTreeMap<i64, EmailRecord> = BTreeMap::new();
    for email in window {
        result.insert(email.id, email.clone());
    }

    if !ids.is_empty() {
        let pass1 = store.emails_matching_ids(&ids).await?;

        // Ids first seen in pass-1 results feed one more lookup.
        let mut new_ids = BTreeSet::new();
        for email in &pass1 {
            let mut email_ids = BTreeSet::new();
            collect_ids(email, &mut email_ids);
            for id in email_ids {
                if !ids.contains(&id) {
                    new_ids.insert(id);
                }
            }
        }
        for email in pass1 {
            result.entry(email.id).or_insert(email);
        }

        if !new_ids.is_empty() {
            let pass2 = store.emails_matching_ids(&new_ids).await?;
            for email in pass2 {
                result.entry(email.id).or_insert(email);
            }
        }
    }

    if !subjects.is_empty() {
        let pass3 = store.emails_with_subjects(&subjects).await?;
        for email in pass3 {
            result.entry(email.id).or_insert(email);
        }
    }

    let mut emails: Vec<EmailRecord> = result
        .into_values()
        .filter(|e| cutoff.is_none_or(|limit| e.date <= limit))
        .collect();
    emails.sort_by_key(|e| (e.date, e.id));
    Ok(emails)
}

fn collect_ids(email: &EmailRecord, ids: &mut BTreeSet<String>) {
    if let Some(mid) = email.message_id.as_deref().map(str::trim) {
        if !mid.is_empty() {
            ids.insert(mid.to_string());
        }
    }
    if let Some(parent) = email.in_reply_to.as_deref().map(str::trim) {
        if !parent.is_empty() {
            ids.insert(parent.to_string());
        }
    }
    for reference in email.reference_ids() {
        ids.insert(reference.to_string());
    }
}
