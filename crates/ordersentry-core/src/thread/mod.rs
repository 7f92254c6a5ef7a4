//! Thread resolution engine.
//!
//! Reconstructs conversational threads from unreliable headers: a
//! deterministic canonical key per email, three-pass grouping with
//! union-find merge resolution, and bounded expansion of a windowed
//! subset back to full thread history.

mod dsu;
mod expand;
mod group;
mod resolve;

pub use expand::fetch_full_thread_emails;
pub use group::group_emails_into_threads;
pub use resolve::{is_specific_subject, normalize_subject, resolve_thread_id};
