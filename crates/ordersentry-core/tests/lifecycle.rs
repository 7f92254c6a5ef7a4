//! End-to-end alert lifecycle: detection, escalation, auto-resolution.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};

use ordersentry_core::{
    AccountingClient, AccountingError, AccountingResult, AlertLifecycleManager, AlertRepository,
    AlertStatus, AlertType, CategorizedThread, Customer, DocumentQuery, JobDocuments, PoDetails,
    ResolvedBy, SalesOrder,
};

#[derive(Default)]
struct State {
    customers: Vec<Customer>,
    documents: HashMap<String, JobDocuments>,
    offline: bool,
}

#[derive(Clone, Default)]
struct FakeAccounting {
    state: Arc<Mutex<State>>,
}

impl AccountingClient for FakeAccounting {
    async fn fetch_customers(&self) -> AccountingResult<Vec<Customer>> {
        let state = self.state.lock().unwrap();
        if state.offline {
            return Err(AccountingError::Unavailable("offline".into()));
        }
        Ok(state.customers.clone())
    }

    async fn fetch_job_documents(
        &self,
        customer_id: &str,
        _query: &DocumentQuery,
    ) -> AccountingResult<JobDocuments> {
        let state = self.state.lock().unwrap();
        if state.offline {
            return Err(AccountingError::Unavailable("offline".into()));
        }
        Ok(state.documents.get(customer_id).cloned().unwrap_or_default())
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 8, 30, 0).unwrap()
}

fn acme() -> Customer {
    Customer {
        id: "cust-acme".into(),
        name: "Acme Fabrication".into(),
        full_name: "Acme Fabrication".into(),
        company_name: None,
        email: Some("purchasing@acmefab.com".into()),
    }
}

fn po_thread() -> CategorizedThread {
    CategorizedThread {
        thread_key: "<po-4521@acmefab.com>".into(),
        category: Some("purchase_order".into()),
        item_type: None,
        contact_email: Some("purchasing@acmefab.com".into()),
        contact_name: Some("Acme Fabrication".into()),
        po_details: Some(PoDetails {
            po_number: Some("PO-4521".into()),
            total_cents: Some(500_000),
        }),
        is_suspicious: false,
    }
}

/// A PO arrives with no sales order, ages past the escalation window, then
/// the sales order shows up and the alert resolves itself.
#[tokio::test]
async fn test_detection_escalation_then_auto_resolution() {
    let client = FakeAccounting::default();
    client.state.lock().unwrap().customers.push(acme());

    let repo = AlertRepository::in_memory().await.unwrap();
    let mut manager = AlertLifecycleManager::new(repo, client.clone());

    // Day one, 08:30: the PO email lands.
    let report = manager.run_cycle_at(&[po_thread()], t0()).await;
    assert_eq!(report.created, 1);
    assert_eq!(report.open_alerts.len(), 1);
    let alert = &report.open_alerts[0];
    assert_eq!(alert.alert_type, AlertType::PoDetected);
    assert_eq!(alert.po_number.as_deref(), Some("PO-4521"));
    assert_eq!(alert.qb_customer_id.as_deref(), Some("cust-acme"));

    // Five hours later, still no sales order: escalate.
    let report = manager
        .run_cycle_at(&[po_thread()], t0() + Duration::hours(5))
        .await;
    assert_eq!(report.created, 0);
    assert_eq!(report.escalated, 1);
    assert_eq!(report.open_alerts[0].alert_type, AlertType::PoMissingSo);
    assert!(report.open_alerts[0].escalated_at.is_some());

    // The office keys in SO-998 citing the PO, total within tolerance.
    client.state.lock().unwrap().documents.insert(
        "cust-acme".into(),
        JobDocuments {
            sales_orders: vec![SalesOrder {
                id: "so-998".into(),
                ref_number: "SO-998".into(),
                memo: Some("SO-998 (PO-4521)".into()),
                total_cents: 505_000,
                is_fully_invoiced: false,
                is_manually_closed: false,
            }],
            invoices: Vec::new(),
            estimates: Vec::new(),
        },
    );

    let report = manager
        .run_cycle_at(&[po_thread()], t0() + Duration::hours(7))
        .await;
    assert_eq!(report.auto_resolved, 1);
    assert!(report.open_alerts.is_empty());

    let alert = manager.repository().get_alert(1).await.unwrap().unwrap();
    assert_eq!(alert.status, AlertStatus::Resolved);
    assert_eq!(alert.resolved_by, Some(ResolvedBy::Auto));
    assert_eq!(alert.sales_order_ref.as_deref(), Some("SO-998"));
    assert!(alert.resolved_at.is_some());
}

/// Degraded intake while offline, then a full match once accounting is back.
#[tokio::test]
async fn test_offline_intake_recovers_on_reconnect() {
    let client = FakeAccounting::default();
    client.state.lock().unwrap().offline = true;

    let repo = AlertRepository::in_memory().await.unwrap();
    let mut manager = AlertLifecycleManager::new(repo, client.clone());

    let report = manager.run_cycle_at(&[po_thread()], t0()).await;
    assert_eq!(report.created, 1);
    let alert = &report.open_alerts[0];
    assert_eq!(alert.alert_type, AlertType::PoDetected);
    assert!(alert.qb_customer_id.is_none());

    // Back online with the customer and a matching sales order.
    {
        let mut state = client.state.lock().unwrap();
        state.offline = false;
        state.customers.push(acme());
        state.documents.insert(
            "cust-acme".into(),
            JobDocuments {
                sales_orders: vec![SalesOrder {
                    id: "so-1".into(),
                    ref_number: "SO-1".into(),
                    memo: Some("per PO-4521".into()),
                    total_cents: 500_000,
                    is_fully_invoiced: false,
                    is_manually_closed: false,
                }],
                invoices: Vec::new(),
                estimates: Vec::new(),
            },
        );
    }

    let report = manager
        .run_cycle_at(&[], t0() + Duration::hours(1))
        .await;
    assert_eq!(report.auto_resolved, 1);
    assert!(report.open_alerts.is_empty());

    let alert = manager.repository().get_alert(1).await.unwrap().unwrap();
    assert_eq!(alert.qb_customer_id.as_deref(), Some("cust-acme"));
    assert_eq!(alert.resolved_by, Some(ResolvedBy::Auto));
}

/// Manual dismissal is terminal; the thread never re-alerts.
#[tokio::test]
async fn test_dismissed_alert_stays_down() {
    let client = FakeAccounting::default();
    client.state.lock().unwrap().customers.push(acme());

    let repo = AlertRepository::in_memory().await.unwrap();
    let mut manager = AlertLifecycleManager::new(repo, client);

    manager.run_cycle_at(&[po_thread()], t0()).await;
    assert!(manager.dismiss_alert(1).await.unwrap());

    let report = manager
        .run_cycle_at(&[po_thread()], t0() + Duration::hours(6))
        .await;
    assert_eq!(report.created, 0);
    assert_eq!(report.escalated, 0);
    assert!(report.open_alerts.is_empty());

    let alert = manager.repository().get_alert(1).await.unwrap().unwrap();
    assert_eq!(alert.status, AlertStatus::Dismissed);
    assert_eq!(alert.resolved_by, Some(ResolvedBy::Manual));
}
