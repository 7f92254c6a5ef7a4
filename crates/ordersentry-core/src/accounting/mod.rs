//! Accounting-system integration: document models and API clients.

mod client;
mod model;

pub use client::{
    AccountingClient, AccountingError, AccountingResult, DocumentQuery, HttpAccountingClient,
    NullAccountingClient,
};
pub use model::{Customer, Estimate, Invoice, JobDocuments, SalesOrder};
