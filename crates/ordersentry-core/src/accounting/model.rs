//! Accounting-system document models.
//!
//! All monetary totals are integer minor units (cents). The wire format
//! carries them the same way, so no floating point enters the pipeline.

use serde::{Deserialize, Serialize};

/// A customer record projected from the accounting system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    /// Accounting-system customer id.
    pub id: String,
    /// Short customer name.
    pub name: String,
    /// Full display name.
    pub full_name: String,
    /// Company name, if distinct from the customer name.
    #[serde(default)]
    pub company_name: Option<String>,
    /// Primary email on file.
    #[serde(default)]
    pub email: Option<String>,
}

/// A sales order (the accounting side's confirmation of an accepted PO).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesOrder {
    /// Accounting-system id.
    pub id: String,
    /// Reference number, where customer PO numbers usually end up.
    pub ref_number: String,
    /// Free-text memo.
    #[serde(default)]
    pub memo: Option<String>,
    /// Order total in cents.
    pub total_cents: i64,
    /// Whether the order has been fully invoiced.
    #[serde(default)]
    pub is_fully_invoiced: bool,
    /// Whether the order was closed by hand.
    #[serde(default)]
    pub is_manually_closed: bool,
}

impl SalesOrder {
    /// An order still awaiting fulfillment: not fully invoiced, not closed.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        !self.is_fully_invoiced && !self.is_manually_closed
    }
}

/// An invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    /// Accounting-system id.
    pub id: String,
    /// Reference number.
    pub ref_number: String,
    /// Free-text memo.
    #[serde(default)]
    pub memo: Option<String>,
    /// Invoice total in cents.
    pub total_cents: i64,
    /// Outstanding balance in cents.
    #[serde(default)]
    pub balance_cents: i64,
    /// Sales order this invoice was generated from, when the accounting
    /// system kept the link.
    #[serde(default)]
    pub sales_order_id: Option<String>,
}

/// A pre-confirmation estimate. Fallback signal only, never primary
/// confirmation of a PO.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Estimate {
    /// Accounting-system id.
    pub id: String,
    /// Reference number.
    pub ref_number: String,
    /// Free-text memo.
    #[serde(default)]
    pub memo: Option<String>,
    /// Estimate total in cents.
    pub total_cents: i64,
}

/// One customer's job documents, fetched fresh per request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDocuments {
    /// Sales orders. Depending on the query, either open-only or all.
    #[serde(default)]
    pub sales_orders: Vec<SalesOrder>,
    /// Invoices. Depending on the query, either unpaid-only or all.
    #[serde(default)]
    pub invoices: Vec<Invoice>,
    /// Estimates.
    #[serde(default)]
    pub estimates: Vec<Estimate>,
}

impl JobDocuments {
    /// Iterates over open sales orders only.
    pub fn open_sales_orders(&self) -> impl Iterator<Item = &SalesOrder> {
        self.sales_orders.iter().filter(|so| so.is_open())
    }
}
