//! # ordersentry-core
//!
//! Core business logic for `OrderSentry` purchase-order monitoring.
//!
//! This crate provides:
//! - Email thread reconstruction from unreliable headers
//! - Customer matching against the accounting system
//! - Purchase-order to sales-order/estimate document matching
//! - Sender trust screening for suspicious PO detection
//! - Alert lifecycle management (`SQLite` persistence, escalation, auto-resolution)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod accounting;
pub mod alerts;
pub mod categorize;
pub mod documents;
pub mod email;
mod error;
pub mod matching;
pub mod thread;
pub mod trust;

pub use accounting::{
    AccountingClient, AccountingError, AccountingResult, Customer, DocumentQuery, Estimate,
    HttpAccountingClient, Invoice, JobDocuments, NullAccountingClient, SalesOrder,
};
pub use alerts::{
    Alert, AlertLifecycleManager, AlertRepository, AlertStatus, AlertType, CycleReport,
    EscalationOutcome, NewAlert, ResolvedBy,
};
pub use categorize::{CategorizedThread, PoDetails};
pub use documents::{find_closeable_orders, find_matching_estimate, find_matching_sales_order};
pub use email::{EmailRecord, EmailRepository, EmailStore, Mailbox, MemoryEmailStore};
pub use error::{Error, Result};
pub use matching::{CustomerMatcher, MatchConfidence, MatchResult, MatchType};
pub use thread::{fetch_full_thread_emails, group_emails_into_threads, resolve_thread_id};
pub use trust::TrustedDomains;
