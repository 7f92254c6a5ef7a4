//! Document matching: POs against sales orders, estimates, and invoices.

use std::collections::HashSet;

use crate::accounting::{Estimate, Invoice, JobDocuments, SalesOrder};
use crate::matching::alphanumeric_only;

/// Relative tolerance for amount matching: 5% of the PO amount.
const AMOUNT_TOLERANCE_PERCENT: i64 = 5;

/// Whether a PO number appears inside a document reference or memo,
/// comparing alphanumeric characters only, case-insensitively.
fn reference_contains(haystack: Option<&str>, po_number: &str) -> bool {
    let needle = alphanumeric_only(&po_number.to_lowercase());
    if needle.is_empty() {
        return false;
    }
    haystack.is_some_and(|h| alphanumeric_only(&h.to_lowercase()).contains(&needle))
}

/// Whether a document total is within tolerance of the PO amount.
///
/// Integer cents throughout: `diff * 20 <= po_total` is `diff <= 5%`.
fn amount_within_tolerance(document_total_cents: i64, po_total_cents: i64) -> bool {
    if po_total_cents <= 0 {
        return false;
    }
    let diff = (document_total_cents - po_total_cents).abs();
    diff * (100 / AMOUNT_TOLERANCE_PERCENT) <= po_total_cents
}

fn document_matches(
    ref_number: &str,
    memo: Option<&str>,
    total_cents: i64,
    po_number: Option<&str>,
    po_total_cents: Option<i64>,
) -> bool {
    if let Some(po_number) = po_number {
        if reference_contains(Some(ref_number), po_number) || reference_contains(memo, po_number) {
            return true;
        }
    }
    po_total_cents.is_some_and(|po_total| amount_within_tolerance(total_cents, po_total))
}

/// Finds an open sales order matching a PO by reference or amount.
///
/// Orders are scanned in the order the accounting system returned them and
/// the first qualifying order wins; there is no re-ranking.
#[must_use]
pub fn find_matching_sales_order<'a>(
    docs: &'a JobDocuments,
    po_number: Option<&str>,
    po_total_cents: Option<i64>,
) -> Option<&'a SalesOrder> {
    docs.open_sales_orders().find(|so| {
        document_matches(
            &so.ref_number,
            so.memo.as_deref(),
            so.total_cents,
            po_number,
            po_total_cents,
        )
    })
}

/// Finds an estimate matching a PO, same algorithm as sales orders.
///
/// Estimates are a fallback signal only; an estimate match never counts as
/// order confirmation.
#[must_use]
pub fn find_matching_estimate<'a>(
    docs: &'a JobDocuments,
    po_number: Option<&str>,
    po_total_cents: Option<i64>,
) -> Option<&'a Estimate> {
    docs.estimates.iter().find(|estimate| {
        document_matches(
            &estimate.ref_number,
            estimate.memo.as_deref(),
            estimate.total_cents,
            po_number,
            po_total_cents,
        )
    })
}

/// Sales orders that look fully invoiced but are still open.
///
/// An invoice counts toward an order when the accounting system linked
/// them, or when the invoice's reference or memo cites the order's
/// reference number. Orders whose counted invoice total meets or exceeds
/// the order total while the order remains open should have been closed;
/// results are deduplicated by sales-order id.
#[must_use]
pub fn find_closeable_orders<'a>(
    sales_orders: &'a [SalesOrder],
    invoices: &[Invoice],
) -> Vec<&'a SalesOrder> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut closeable = Vec::new();

    for so in sales_orders {
        if !so.is_open() || !seen.insert(so.id.as_str()) {
            continue;
        }

        let invoiced_total: i64 = invoices
            .iter()
            .filter(|invoice| {
                invoice.sales_order_id.as_deref() == Some(so.id.as_str())
                    || reference_contains(Some(&invoice.ref_number), &so.ref_number)
                    || reference_contains(invoice.memo.as_deref(), &so.ref_number)
            })
            .map(|invoice| invoice.total_cents)
            .sum();

        if invoiced_total >= so.total_cents && so.total_cents > 0 {
            closeable.push(so);
        }
    }

    closeable
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sales_order(id: &str, ref_number: &str, total_cents: i64) -> SalesOrder {
        SalesOrder {
            id: id.into(),
            ref_number: ref_number.into(),
            memo: None,
            total_cents,
            is_fully_invoiced: false,
            is_manually_closed: false,
        }
    }

    fn invoice(id: &str, ref_number: &str, total_cents: i64, so_id: Option<&str>) -> Invoice {
        Invoice {
            id: id.into(),
            ref_number: ref_number.into(),
            memo: None,
            total_cents,
            balance_cents: total_cents,
            sales_order_id: so_id.map(ToString::to_string),
        }
    }

    fn docs(sales_orders: Vec<SalesOrder>) -> JobDocuments {
        JobDocuments {
            sales_orders,
            invoices: vec![],
            estimates: vec![],
        }
    }

    #[test]
    fn test_reference_match_ignores_punctuation_and_case() {
        let documents = docs(vec![sales_order("so1", "SO-998 (PO-4521)", 500_000)]);
        let found = find_matching_sales_order(&documents, Some("po 4521"), None);
        assert_eq!(found.map(|so| so.id.as_str()), Some("so1"));
    }

    #[test]
    fn test_amount_tolerance_boundary() {
        // $10,000 PO: $10,400 is within 5%, $10,600 is not
        let documents = docs(vec![sales_order("so1", "SO-1", 1_040_000)]);
        assert!(find_matching_sales_order(&documents, None, Some(1_000_000)).is_some());

        let documents = docs(vec![sales_order("so2", "SO-2", 1_060_000)]);
        assert!(find_matching_sales_order(&documents, None, Some(1_000_000)).is_none());
    }

    #[test]
    fn test_closed_orders_never_match() {
        let mut so = sales_order("so1", "SO-1 (PO-77)", 100_000);
        so.is_manually_closed = true;
        let documents = docs(vec![so]);
        assert!(find_matching_sales_order(&documents, Some("PO-77"), None).is_none());
    }

    #[test]
    fn test_first_qualifying_order_wins() {
        let documents = docs(vec![
            sales_order("so1", "SO-1 (PO-77)", 100_000),
            sales_order("so2", "SO-2 (PO-77)", 100_000),
        ]);
        let found = find_matching_sales_order(&documents, Some("PO-77"), None);
        assert_eq!(found.map(|so| so.id.as_str()), Some("so1"));
    }

    #[test]
    fn test_estimate_fallback_matches() {
        let documents = JobDocuments {
            sales_orders: vec![],
            invoices: vec![],
            estimates: vec![Estimate {
                id: "est1".into(),
                ref_number: "EST-12 (PO-4521)".into(),
                memo: None,
                total_cents: 500_000,
            }],
        };
        let found = find_matching_estimate(&documents, Some("PO-4521"), None);
        assert_eq!(found.map(|e| e.id.as_str()), Some("est1"));
    }

    #[test]
    fn test_closeable_detection_by_link_and_reference() {
        let orders = vec![
            sales_order("so1", "SO-100", 100_000),
            sales_order("so2", "SO-200", 100_000),
        ];
        let invoices = vec![
            invoice("inv1", "INV-1", 100_000, Some("so1")),
            invoice("inv2", "INV-2 for SO-200", 60_000, None),
        ];
        let closeable = find_closeable_orders(&orders, &invoices);
        // so1 fully invoiced via link; so2 only 60% invoiced
        assert_eq!(closeable.iter().map(|so| so.id.as_str()).collect::<Vec<_>>(), vec!["so1"]);
    }

    #[test]
    fn test_closeable_dedups_by_order_id() {
        let orders = vec![
            sales_order("so1", "SO-100", 100_000),
            sales_order("so1", "SO-100", 100_000),
        ];
        let invoices = vec![invoice("inv1", "INV-1", 100_000, Some("so1"))];
        let closeable = find_closeable_orders(&orders, &invoices);
        assert_eq!(closeable.len(), 1);
    }

    #[test]
    fn test_fully_invoiced_orders_are_not_closeable() {
        let mut so = sales_order("so1", "SO-100", 100_000);
        so.is_fully_invoiced = true;
        let invoices = vec![invoice("inv1", "INV-1", 100_000, Some("so1"))];
        assert!(find_closeable_orders(&[so], &invoices).is_empty());
    }
}
