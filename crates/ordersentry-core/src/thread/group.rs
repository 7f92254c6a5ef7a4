//! Three-pass thread grouping.

use std::collections::{BTreeMap, HashMap, hash_map::Entry};

use super::dsu::DisjointSet;
use super::resolve::{is_specific_subject, normalize_subject, resolve_thread_id};
use crate::email::EmailRecord;

/// Groups a flat email collection into conversational threads.
///
/// Three passes:
///
/// 1. bucket every email by its canonical key ([`resolve_thread_id`]);
/// 2. merge buckets linked by `In-Reply-To` headers, so two messages of one
///    conversation that independently produced different canonical keys end
///    up together;
/// 3. merge buckets whose chronologically-first members share a specific
///    normalized subject, repairing replies with broken headers. Generic or
///    short subjects never merge (see
///    [`is_specific_subject`]).
///
/// Merge chains in passes 2 and 3 are resolved through a shared
/// [`DisjointSet`], and buckets are visited in sorted-key order, which makes
/// the result deterministic and idempotent regardless of input order.
///
/// Members of each returned thread are sorted by date (ties broken by id);
/// the thread key is the canonical key of the earliest member.
#[must_use]
pub fn group_emails_into_threads(emails: &[EmailRecord]) -> BTreeMap<String, Vec<EmailRecord>> {
    // Pass 1: bucket by canonical key.
    let mut buckets: BTreeMap<String, Vec<&EmailRecord>> = BTreeMap::new();
    for email in emails {
        buckets.entry(resolve_thread_id(email)).or_default().push(email);
    }

    let keys: Vec<&String> = buckets.keys().collect();
    let mut dsu = DisjointSet::new(keys.len());

    // Message-id -> bucket index, first bucket (in key order) wins.
    let mut message_to_bucket: HashMap<&str, usize> = HashMap::new();
    for (i, key) in keys.iter().enumerate() {
        for email in &buckets[*key] {
            if let Some(mid) = email
                .message_id
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
            {
                message_to_bucket.entry(mid).or_insert(i);
            }
        }
    }

    // Pass 2: header-linked merge. A bucket whose member replies to a
    // message held by another bucket belongs to that bucket.
    for (i, key) in keys.iter().enumerate() {
        for email in &buckets[*key] {
            let Some(parent) = email
                .in_reply_to
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
            else {
                continue;
            };
            if let Some(&j) = message_to_bucket.get(parent) {
                if j != i {
                    dsu.union(i, j);
                }
            }
        }
    }

    // Pass 3: subject-fallback merge over the already-merged groups.
    let mut groups: BTreeMap<usize, Vec<&EmailRecord>> = BTreeMap::new();
    for (i, key) in keys.iter().enumerate() {
        groups
            .entry(dsu.find(i))
            .or_default()
            .extend(buckets[*key].iter().copied());
    }

    let mut subject_owner: HashMap<String, usize> = HashMap::new();
    for (&root, members) in &groups {
        let Some(first) = members.iter().min_by_key(|e| (e.date, e.id)) else {
            continue;
        };
        let subject = normalize_subject(&first.subject);
        if !is_specific_subject(&subject) {
            continue;
        }
        match subject_owner.entry(subject) {
            Entry::Occupied(owner) => dsu.union(root, *owner.get()),
            Entry::Vacant(slot) => {
                slot.insert(root);
            }
        }
    }

    // Materialize the final grouping.
    let mut merged: BTreeMap<usize, Vec<&EmailRecord>> = BTreeMap::new();
    for (i, key) in keys.iter().enumerate() {
        merged
            .entry(dsu.find(i))
            .or_default()
            .extend(buckets[*key].iter().copied());
    }

    let mut threads = BTreeMap::new();
    for members in merged.values_mut() {
        members.sort_by_key(|e| (e.date, e.id));
        let key = resolve_thread_id(members[0]);
        threads.insert(key, members.iter().map(|e| (*e).clone()).collect());
    }
    threads
}
