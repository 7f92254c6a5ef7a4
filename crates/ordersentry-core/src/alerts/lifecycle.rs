//! Alert lifecycle manager: the top-level state machine.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, warn};

use super::model::{Alert, AlertType, NewAlert, ResolvedBy};
use super::repository::AlertRepository;
use crate::Result;
use crate::accounting::{AccountingClient, DocumentQuery, JobDocuments};
use crate::categorize::CategorizedThread;
use crate::documents::{find_closeable_orders, find_matching_estimate, find_matching_sales_order};
use crate::matching::CustomerMatcher;

/// Hours a `po_detected` alert may age before Stage 2 escalates it.
const ESCALATION_THRESHOLD_HOURS: i64 = 4;

/// What one cycle did, even when some phases failed.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Alerts created by Stage 1.
    pub created: usize,
    /// Alerts escalated to `po_missing_so` by Stage 2.
    pub escalated: usize,
    /// Alerts auto-resolved (Stage 2 and the resolution pass combined).
    pub auto_resolved: usize,
    /// New close-suggestion alerts from the invoice/SO integrity check.
    pub closeable_flagged: usize,
    /// All alerts still open after the cycle, for notification.
    pub open_alerts: Vec<Alert>,
}

/// Outcome of one escalation pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct EscalationOutcome {
    /// Alerts that aged into `po_missing_so`.
    pub escalated: usize,
    /// Alerts resolved instead, because a sales order turned up.
    pub resolved: usize,
}

/// Drives alert state from categorized PO threads and the accounting
/// system.
///
/// Owns the customer-match cache for the duration of a batch run; callers
/// needing fresh customer data call [`refresh_customers`](Self::refresh_customers).
/// Refreshes are not synchronized, so a manager must not be shared across
/// concurrently running cycles.
pub struct AlertLifecycleManager<C: AccountingClient> {
    repository: AlertRepository,
    client: C,
    matcher: CustomerMatcher,
    escalation_threshold: Duration,
}

impl<C: AccountingClient> AlertLifecycleManager<C> {
    /// Creates a manager over the given repository and accounting client.
    #[must_use]
    pub fn new(repository: AlertRepository, client: C) -> Self {
        Self {
            repository,
            client,
            matcher: CustomerMatcher::new(),
            escalation_threshold: Duration::hours(ESCALATION_THRESHOLD_HOURS),
        }
    }

    /// Overrides the escalation threshold.
    #[must_use]
    pub fn with_escalation_threshold(mut self, threshold: Duration) -> Self {
        self.escalation_threshold = threshold;
        self
    }

    /// The underlying alert repository.
    #[must_use]
    pub const fn repository(&self) -> &AlertRepository {
        &self.repository
    }

    /// The customer matcher (for trusted-domain construction and the like).
    #[must_use]
    pub const fn matcher(&self) -> &CustomerMatcher {
        &self.matcher
    }

    /// Forces a customer-cache refresh from the accounting system.
    ///
    /// # Errors
    ///
    /// Returns an error if the customer fetch fails.
    pub async fn refresh_customers(&mut self) -> Result<()> {
        self.matcher.refresh(&self.client).await?;
        Ok(())
    }

    /// Primes the customer cache if needed. `Ok(false)` means the
    /// accounting system is unreachable and matching must degrade.
    async fn ensure_primed(&mut self) -> Result<bool> {
        if self.matcher.is_primed() {
            return Ok(true);
        }
        match self.matcher.refresh(&self.client).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_unavailable() => {
                warn!("customer list unavailable, continuing degraded: {e}");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Stage 1: create alerts for newly categorized PO threads.
    ///
    /// Per-thread errors are logged and do not stop the batch. Returns the
    /// number of alerts created.
    pub async fn analyze_new_po_emails_at(
        &mut self,
        threads: &[CategorizedThread],
        now: DateTime<Utc>,
    ) -> usize {
        let mut created = 0;
        for thread in threads {
            match self.analyze_thread(thread, now).await {
                Ok(Some(alert)) => {
                    info!(
                        thread_key = %alert.thread_key,
                        alert_type = alert.alert_type.as_str(),
                        "alert created"
                    );
                    created += 1;
                }
                Ok(None) => debug!(thread_key = %thread.thread_key, "no alert needed"),
                Err(e) => error!(thread_key = %thread.thread_key, "thread analysis failed: {e}"),
            }
        }
        created
    }

    /// Stage 1 with the current time.
    pub async fn analyze_new_po_emails(&mut self, threads: &[CategorizedThread]) -> usize {
        self.analyze_new_po_emails_at(threads, Utc::now()).await
    }

    async fn analyze_thread(
        &mut self,
        thread: &CategorizedThread,
        now: DateTime<Utc>,
    ) -> Result<Option<Alert>> {
        // Idempotent intake: one alert per thread, ever.
        if self.repository.has_alert_for_thread(&thread.thread_key).await? {
            return Ok(None);
        }

        let contact_name = thread.contact_name.clone().unwrap_or_default();
        let (po_number, po_total_cents) = thread
            .po_details
            .as_ref()
            .map_or((None, None), |po| (po.po_number.clone(), po.total_cents));

        let Some(contact_email) = thread.resolved_contact_email() else {
            return self
                .create(thread, AlertType::SuspiciousPoEmail, String::new(), contact_name, now, |_| {})
                .await;
        };
        let contact_email = contact_email.to_string();

        if thread.is_suspicious {
            return self
                .create(thread, AlertType::SuspiciousPoEmail, contact_email, contact_name, now, |a| {
                    a.po_number = po_number.clone();
                    a.po_total_cents = po_total_cents;
                })
                .await;
        }

        if !self.ensure_primed().await? {
            // Degraded: no customer data, record the PO and move on.
            return self
                .create(thread, AlertType::PoDetected, contact_email, contact_name, now, |a| {
                    a.po_number = po_number.clone();
                    a.po_total_cents = po_total_cents;
                })
                .await;
        }

        let Some(matched) = self.matcher.best_match(&contact_email, Some(&contact_name)) else {
            return self
                .create(thread, AlertType::NoQbCustomer, contact_email, contact_name, now, |a| {
                    a.po_number = po_number.clone();
                    a.po_total_cents = po_total_cents;
                })
                .await;
        };

        let customer_id = matched.customer_id.clone();
        let docs = match self
            .client
            .fetch_job_documents(&customer_id, &DocumentQuery::default())
            .await
        {
            Ok(docs) => docs,
            Err(e) if e.is_unavailable() => {
                warn!(customer_id = %customer_id, "documents unavailable, creating degraded alert: {e}");
                return self
                    .create(thread, AlertType::PoDetected, contact_email, contact_name, now, |a| {
                        a.qb_customer_id = Some(customer_id.clone());
                        a.po_number = po_number.clone();
                        a.po_total_cents = po_total_cents;
                    })
                    .await;
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(so) = find_matching_sales_order(&docs, po_number.as_deref(), po_total_cents) {
            // PO already has its confirmation; informational alert.
            return self
                .create(thread, AlertType::PoDetectedWithSo, contact_email, contact_name, now, |a| {
                    a.qb_customer_id = Some(customer_id.clone());
                    a.po_number = po_number.clone();
                    a.po_total_cents = po_total_cents;
                    a.sales_order_id = Some(so.id.clone());
                    a.sales_order_ref = Some(so.ref_number.clone());
                    a.sales_order_total_cents = Some(so.total_cents);
                })
                .await;
        }

        let estimate = find_matching_estimate(&docs, po_number.as_deref(), po_total_cents);
        self.create(thread, AlertType::PoDetected, contact_email, contact_name, now, |a| {
            a.qb_customer_id = Some(customer_id.clone());
            a.po_number = po_number.clone();
            a.po_total_cents = po_total_cents;
            if let Some(estimate) = estimate {
                a.estimate_id = Some(estimate.id.clone());
                a.estimate_ref = Some(estimate.ref_number.clone());
            }
        })
        .await
    }

    async fn create(
        &self,
        thread: &CategorizedThread,
        alert_type: AlertType,
        contact_email: String,
        contact_name: String,
        now: DateTime<Utc>,
        fill: impl FnOnce(&mut NewAlert),
    ) -> Result<Option<Alert>> {
        let mut new = NewAlert::new(alert_type, &thread.thread_key);
        new.contact_email = contact_email;
        new.contact_name = contact_name;
        fill(&mut new);
        self.repository.create_alert_at(&new, now).await
    }

    /// Stage 2: escalate aged `po_detected` alerts, or resolve them if a
    /// sales order has appeared in the meantime.
    ///
    /// Documents are fetched once per distinct customer, not per alert.
    /// When the accounting system is unreachable, every candidate is
    /// escalated without re-verification: a missed PO costs more than a
    /// spurious escalation.
    ///
    /// # Errors
    ///
    /// Returns an error if an alert query or update fails.
    pub async fn check_escalations_at(&mut self, now: DateTime<Utc>) -> Result<EscalationOutcome> {
        let cutoff = now - self.escalation_threshold;
        let candidates = self.repository.escalation_candidates(cutoff).await?;
        if candidates.is_empty() {
            return Ok(EscalationOutcome::default());
        }

        let customer_ids = candidates.iter().filter_map(|a| a.qb_customer_id.clone());
        let documents = self
            .batch_documents(customer_ids, &DocumentQuery::default())
            .await;

        let mut outcome = EscalationOutcome::default();
        for alert in candidates {
            let matched_so = alert
                .qb_customer_id
                .as_deref()
                .and_then(|cid| documents.get(cid))
                .and_then(|docs| {
                    find_matching_sales_order(docs, alert.po_number.as_deref(), alert.po_total_cents)
                });

            if let Some(so) = matched_so {
                self.repository.attach_sales_order(alert.id, so).await?;
                if self.repository.resolve_at(alert.id, ResolvedBy::Auto, now).await? {
                    info!(alert_id = alert.id, so_ref = %so.ref_number, "sales order found, auto-resolved");
                    outcome.resolved += 1;
                }
            } else if self.repository.escalate_at(alert.id, now).await? {
                info!(alert_id = alert.id, thread_key = %alert.thread_key, "escalated to po_missing_so");
                outcome.escalated += 1;
            }
        }
        Ok(outcome)
    }

    /// Stage 2 with the current time.
    ///
    /// # Errors
    ///
    /// Returns an error if an alert query or update fails.
    pub async fn check_escalations(&mut self) -> Result<EscalationOutcome> {
        self.check_escalations_at(Utc::now()).await
    }

    /// Auto-resolution: re-check open alerts whose condition may have
    /// cleared. Returns the number resolved.
    ///
    /// # Errors
    ///
    /// Returns an error if an alert query or update fails.
    pub async fn check_and_resolve_alerts_at(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let mut resolved = 0;
        let primed = self.ensure_primed().await?;

        // po_detected / po_missing_so: does a sales order exist now?
        let mut candidates = self
            .repository
            .open_alerts_of_types(&[AlertType::PoDetected, AlertType::PoMissingSo])
            .await?;

        // Backfill customer matches that failed while degraded.
        if primed {
            for alert in &mut candidates {
                if alert.qb_customer_id.is_some() {
                    continue;
                }
                let name = (!alert.contact_name.is_empty()).then_some(alert.contact_name.as_str());
                if let Some(matched) = self.matcher.best_match(&alert.contact_email, name) {
                    self.repository.attach_customer(alert.id, &matched.customer_id).await?;
                    alert.qb_customer_id = Some(matched.customer_id);
                }
            }
        }

        let customer_ids = candidates.iter().filter_map(|a| a.qb_customer_id.clone());
        let documents = self
            .batch_documents(customer_ids, &DocumentQuery::default())
            .await;

        for alert in candidates {
            let matched_so = alert
                .qb_customer_id
                .as_deref()
                .and_then(|cid| documents.get(cid))
                .and_then(|docs| {
                    find_matching_sales_order(docs, alert.po_number.as_deref(), alert.po_total_cents)
                });
            if let Some(so) = matched_so {
                self.repository.attach_sales_order(alert.id, so).await?;
                if self.repository.resolve_at(alert.id, ResolvedBy::Auto, now).await? {
                    info!(alert_id = alert.id, so_ref = %so.ref_number, "auto-resolved");
                    resolved += 1;
                }
            }
        }

        // no_qb_customer: is the contact matchable now?
        if primed {
            let orphans = self
                .repository
                .open_alerts_of_types(&[AlertType::NoQbCustomer])
                .await?;
            for alert in orphans {
                let name = (!alert.contact_name.is_empty()).then_some(alert.contact_name.as_str());
                if let Some(matched) = self.matcher.best_match(&alert.contact_email, name) {
                    self.repository.attach_customer(alert.id, &matched.customer_id).await?;
                    if self.repository.resolve_at(alert.id, ResolvedBy::Auto, now).await? {
                        info!(alert_id = alert.id, customer_id = %matched.customer_id, "customer now matchable, auto-resolved");
                        resolved += 1;
                    }
                }
            }
        }

        Ok(resolved)
    }

    /// Auto-resolution with the current time.
    ///
    /// # Errors
    ///
    /// Returns an error if an alert query or update fails.
    pub async fn check_and_resolve_alerts(&mut self) -> Result<usize> {
        self.check_and_resolve_alerts_at(Utc::now()).await
    }

    /// Invoice/SO integrity: flag sales orders that are fully invoiced but
    /// still open, for customers with an open `po_detected_with_so` alert.
    /// Returns the number of new close-suggestion alerts.
    ///
    /// # Errors
    ///
    /// Returns an error if an alert query or insert fails.
    pub async fn check_invoice_so_mismatch_at(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let carriers = self
            .repository
            .open_alerts_of_types(&[AlertType::PoDetectedWithSo])
            .await?;
        if carriers.is_empty() {
            return Ok(0);
        }

        let query = DocumentQuery {
            include_fully_invoiced: true,
            include_paid: true,
            updated_after: None,
        };
        let customer_ids = carriers.iter().filter_map(|a| a.qb_customer_id.clone());
        let documents = self.batch_documents(customer_ids, &query).await;

        let mut created = 0;
        for alert in &carriers {
            let Some(customer_id) = alert.qb_customer_id.as_deref() else {
                continue;
            };
            let Some(docs) = documents.get(customer_id) else {
                continue;
            };

            for so in find_closeable_orders(&docs.sales_orders, &docs.invoices) {
                // One suggestion per sales order, ever; the synthetic
                // thread key carries the dedup.
                let mut new = NewAlert::new(
                    AlertType::SoShouldBeClosed,
                    format!("so-close:{}", so.id),
                );
                new.contact_email = alert.contact_email.clone();
                new.contact_name = alert.contact_name.clone();
                new.qb_customer_id = Some(customer_id.to_string());
                new.sales_order_id = Some(so.id.clone());
                new.sales_order_ref = Some(so.ref_number.clone());
                new.sales_order_total_cents = Some(so.total_cents);
                if let Some(invoice) = docs
                    .invoices
                    .iter()
                    .find(|i| i.sales_order_id.as_deref() == Some(so.id.as_str()))
                {
                    new.invoice_id = Some(invoice.id.clone());
                    new.invoice_ref = Some(invoice.ref_number.clone());
                    new.invoice_total_cents = Some(invoice.total_cents);
                }

                if self.repository.create_alert_at(&new, now).await?.is_some() {
                    info!(so_ref = %so.ref_number, "sales order should be closed");
                    created += 1;
                }
            }
        }
        Ok(created)
    }

    /// Integrity check with the current time.
    ///
    /// # Errors
    ///
    /// Returns an error if an alert query or insert fails.
    pub async fn check_invoice_so_mismatch(&mut self) -> Result<usize> {
        self.check_invoice_so_mismatch_at(Utc::now()).await
    }

    /// Manually dismiss an alert, independent of type.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn dismiss_alert(&self, id: i64) -> Result<bool> {
        self.repository.dismiss_at(id, Utc::now()).await
    }

    /// Runs a full cycle: Stage 1, Stage 2, auto-resolution, and the
    /// integrity check, each isolated so one failing phase does not stop
    /// the others. The report carries whatever counts were achieved.
    pub async fn run_cycle_at(
        &mut self,
        threads: &[CategorizedThread],
        now: DateTime<Utc>,
    ) -> CycleReport {
        let mut report = CycleReport::default();

        report.created = self.analyze_new_po_emails_at(threads, now).await;

        match self.check_escalations_at(now).await {
            Ok(outcome) => {
                report.escalated = outcome.escalated;
                report.auto_resolved += outcome.resolved;
            }
            Err(e) => error!("escalation check failed: {e}"),
        }

        match self.check_and_resolve_alerts_at(now).await {
            Ok(resolved) => report.auto_resolved += resolved,
            Err(e) => error!("auto-resolution check failed: {e}"),
        }

        match self.check_invoice_so_mismatch_at(now).await {
            Ok(created) => report.closeable_flagged = created,
            Err(e) => error!("invoice/SO integrity check failed: {e}"),
        }

        match self.repository.open_alerts().await {
            Ok(open) => report.open_alerts = open,
            Err(e) => error!("open-alert query failed: {e}"),
        }

        report
    }

    /// A full cycle with the current time.
    pub async fn run_cycle(&mut self, threads: &[CategorizedThread]) -> CycleReport {
        self.run_cycle_at(threads, Utc::now()).await
    }

    /// Fetches documents once per distinct customer id.
    ///
    /// Missing entries mean the fetch failed; with the accounting system
    /// down, remaining fetches are skipped entirely.
    async fn batch_documents(
        &self,
        customer_ids: impl IntoIterator<Item = String>,
        query: &DocumentQuery,
    ) -> HashMap<String, JobDocuments> {
        let mut documents = HashMap::new();
        let mut unavailable = false;
        for customer_id in customer_ids {
            if unavailable || documents.contains_key(&customer_id) {
                continue;
            }
            match self.client.fetch_job_documents(&customer_id, query).await {
                Ok(docs) => {
                    documents.insert(customer_id, docs);
                }
                Err(e) if e.is_unavailable() => {
                    warn!("accounting unreachable, skipping remaining document fetches: {e}");
                    unavailable = true;
                }
                Err(e) => warn!(customer_id = %customer_id, "document fetch failed: {e}"),
            }
        }
        documents
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use chrono::TimeZone;

    use super::*;
    use crate::accounting::{AccountingError, AccountingResult, Customer, Estimate, Invoice, SalesOrder};
    use crate::alerts::model::AlertStatus;
    use crate::categorize::PoDetails;

    #[derive(Default)]
    struct ScriptedState {
        customers: Vec<Customer>,
        documents: HashMap<String, JobDocuments>,
        offline: bool,
        document_fetches: usize,
    }

    /// Test double with mutable scripted responses.
    #[derive(Clone, Default)]
    struct ScriptedClient {
        state: Arc<Mutex<ScriptedState>>,
    }

    impl ScriptedClient {
        fn set_offline(&self, offline: bool) {
            self.state.lock().unwrap().offline = offline;
        }

        fn add_customer(&self, customer: Customer) {
            self.state.lock().unwrap().customers.push(customer);
        }

        fn set_documents(&self, customer_id: &str, docs: JobDocuments) {
            self.state
                .lock()
                .unwrap()
                .documents
                .insert(customer_id.to_string(), docs);
        }

        fn document_fetches(&self) -> usize {
            self.state.lock().unwrap().document_fetches
        }
    }

    impl AccountingClient for ScriptedClient {
        async fn fetch_customers(&self) -> AccountingResult<Vec<Customer>> {
            let state = self.state.lock().unwrap();
            if state.offline {
                return Err(AccountingError::Unavailable("scripted outage".into()));
            }
            Ok(state.customers.clone())
        }

        async fn fetch_job_documents(
            &self,
            customer_id: &str,
            _query: &DocumentQuery,
        ) -> AccountingResult<JobDocuments> {
            let mut state = self.state.lock().unwrap();
            if state.offline {
                return Err(AccountingError::Unavailable("scripted outage".into()));
            }
            state.document_fetches += 1;
            Ok(state.documents.get(customer_id).cloned().unwrap_or_default())
        }
    }

    fn customer(id: &str, name: &str, email: &str) -> Customer {
        Customer {
            id: id.into(),
            name: name.into(),
            full_name: name.into(),
            company_name: None,
            email: Some(email.into()),
        }
    }

    fn sales_order(id: &str, ref_number: &str, memo: &str, total_cents: i64) -> SalesOrder {
        SalesOrder {
            id: id.into(),
            ref_number: ref_number.into(),
            memo: (!memo.is_empty()).then(|| memo.to_string()),
            total_cents,
            is_fully_invoiced: false,
            is_manually_closed: false,
        }
    }

    fn po_thread(thread_key: &str, email: &str, name: &str, po: &str, cents: i64) -> CategorizedThread {
        CategorizedThread {
            thread_key: thread_key.into(),
            category: Some("purchase_order".into()),
            item_type: None,
            contact_email: Some(email.into()),
            contact_name: Some(name.into()),
            po_details: Some(PoDetails {
                po_number: Some(po.into()),
                total_cents: Some(cents),
            }),
            is_suspicious: false,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
    }

    async fn manager(client: ScriptedClient) -> AlertLifecycleManager<ScriptedClient> {
        let repo = AlertRepository::in_memory().await.unwrap();
        AlertLifecycleManager::new(repo, client)
    }

    #[tokio::test]
    async fn test_po_without_so_raises_po_detected() {
        let client = ScriptedClient::default();
        client.add_customer(customer("c1", "Acme Tools", "buyer@acme.com"));
        let mut manager = manager(client).await;

        let threads = vec![po_thread("<t1@x>", "buyer@acme.com", "Acme Tools", "PO-100", 500_000)];
        assert_eq!(manager.analyze_new_po_emails_at(&threads, t0()).await, 1);

        let open = manager.repository().open_alerts().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].alert_type, AlertType::PoDetected);
        assert_eq!(open[0].qb_customer_id.as_deref(), Some("c1"));
        assert_eq!(open[0].po_number.as_deref(), Some("PO-100"));
    }

    #[tokio::test]
    async fn test_po_with_matching_so_is_informational() {
        let client = ScriptedClient::default();
        client.add_customer(customer("c1", "Acme Tools", "buyer@acme.com"));
        let mut docs = JobDocuments::default();
        docs.sales_orders.push(sales_order("so1", "SO-55", "PO-100", 500_000));
        client.set_documents("c1", docs);
        let mut manager = manager(client).await;

        let threads = vec![po_thread("<t1@x>", "buyer@acme.com", "Acme Tools", "PO-100", 500_000)];
        manager.analyze_new_po_emails_at(&threads, t0()).await;

        let open = manager.repository().open_alerts().await.unwrap();
        assert_eq!(open[0].alert_type, AlertType::PoDetectedWithSo);
        assert_eq!(open[0].sales_order_ref.as_deref(), Some("SO-55"));
    }

    #[tokio::test]
    async fn test_unknown_sender_raises_no_customer_alert() {
        let client = ScriptedClient::default();
        client.add_customer(customer("c1", "Acme Tools", "buyer@acme.com"));
        let mut manager = manager(client).await;

        let threads = vec![po_thread("<t1@x>", "who@nowhere.net", "Nowhere Industrial", "PO-7", 1000)];
        manager.analyze_new_po_emails_at(&threads, t0()).await;

        let open = manager.repository().open_alerts().await.unwrap();
        assert_eq!(open[0].alert_type, AlertType::NoQbCustomer);
    }

    #[tokio::test]
    async fn test_suspicious_thread_raises_suspicious_alert() {
        let client = ScriptedClient::default();
        let mut manager = manager(client).await;

        let mut thread = po_thread("<t1@x>", "buyer@acme.com", "Acme Tools", "PO-100", 500_000);
        thread.is_suspicious = true;
        manager.analyze_new_po_emails_at(&[thread], t0()).await;

        let open = manager.repository().open_alerts().await.unwrap();
        assert_eq!(open[0].alert_type, AlertType::SuspiciousPoEmail);
    }

    #[tokio::test]
    async fn test_offline_accounting_degrades_to_bare_po_alert() {
        let client = ScriptedClient::default();
        client.set_offline(true);
        let mut manager = manager(client).await;

        let threads = vec![po_thread("<t1@x>", "buyer@acme.com", "Acme Tools", "PO-100", 500_000)];
        assert_eq!(manager.analyze_new_po_emails_at(&threads, t0()).await, 1);

        let open = manager.repository().open_alerts().await.unwrap();
        assert_eq!(open[0].alert_type, AlertType::PoDetected);
        assert!(open[0].qb_customer_id.is_none());
    }

    #[tokio::test]
    async fn test_reprocessed_thread_creates_no_second_alert() {
        let client = ScriptedClient::default();
        client.add_customer(customer("c1", "Acme Tools", "buyer@acme.com"));
        let mut manager = manager(client).await;

        let threads = vec![po_thread("<t1@x>", "buyer@acme.com", "Acme Tools", "PO-100", 500_000)];
        assert_eq!(manager.analyze_new_po_emails_at(&threads, t0()).await, 1);
        assert_eq!(manager.analyze_new_po_emails_at(&threads, t0()).await, 0);
        assert_eq!(manager.repository().open_alerts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_escalation_after_threshold() {
        let client = ScriptedClient::default();
        client.add_customer(customer("c1", "Acme Tools", "buyer@acme.com"));
        let mut manager = manager(client).await;

        let threads = vec![po_thread("<t1@x>", "buyer@acme.com", "Acme Tools", "PO-100", 500_000)];
        manager.analyze_new_po_emails_at(&threads, t0()).await;

        // Under four hours: nothing moves.
        let outcome = manager
            .check_escalations_at(t0() + Duration::hours(3))
            .await
            .unwrap();
        assert_eq!(outcome.escalated, 0);

        let outcome = manager
            .check_escalations_at(t0() + Duration::hours(5))
            .await
            .unwrap();
        assert_eq!(outcome.escalated, 1);

        let open = manager.repository().open_alerts().await.unwrap();
        assert_eq!(open[0].alert_type, AlertType::PoMissingSo);
        assert!(open[0].escalated_at.is_some());
    }

    #[tokio::test]
    async fn test_escalation_resolves_when_so_appeared() {
        let client = ScriptedClient::default();
        client.add_customer(customer("c1", "Acme Tools", "buyer@acme.com"));
        let mut manager = manager(client.clone()).await;

        let threads = vec![po_thread("<t1@x>", "buyer@acme.com", "Acme Tools", "PO-100", 500_000)];
        manager.analyze_new_po_emails_at(&threads, t0()).await;

        let mut docs = JobDocuments::default();
        docs.sales_orders.push(sales_order("so1", "SO-55", "PO-100", 500_000));
        client.set_documents("c1", docs);

        let outcome = manager
            .check_escalations_at(t0() + Duration::hours(5))
            .await
            .unwrap();
        assert_eq!(outcome.escalated, 0);
        assert_eq!(outcome.resolved, 1);

        let alert = manager.repository().get_alert(1).await.unwrap().unwrap();
        assert_eq!(alert.status, AlertStatus::Resolved);
        assert_eq!(alert.resolved_by, Some(ResolvedBy::Auto));
        assert_eq!(alert.sales_order_ref.as_deref(), Some("SO-55"));
    }

    #[tokio::test]
    async fn test_escalation_fetches_documents_once_per_customer() {
        let client = ScriptedClient::default();
        client.add_customer(customer("c1", "Acme Tools", "buyer@acme.com"));
        let mut manager = manager(client.clone()).await;

        let threads = vec![
            po_thread("<t1@x>", "buyer@acme.com", "Acme Tools", "PO-1", 1000),
            po_thread("<t2@x>", "buyer@acme.com", "Acme Tools", "PO-2", 2000),
            po_thread("<t3@x>", "buyer@acme.com", "Acme Tools", "PO-3", 3000),
        ];
        manager.analyze_new_po_emails_at(&threads, t0()).await;

        let before = client.document_fetches();
        manager
            .check_escalations_at(t0() + Duration::hours(5))
            .await
            .unwrap();
        assert_eq!(client.document_fetches() - before, 1);
    }

    #[tokio::test]
    async fn test_no_customer_alert_resolves_once_customer_exists() {
        let client = ScriptedClient::default();
        let mut manager = manager(client.clone()).await;
        manager.refresh_customers().await.unwrap();

        let threads = vec![po_thread("<t1@x>", "buyer@acme.com", "Acme Tools", "PO-1", 1000)];
        manager.analyze_new_po_emails_at(&threads, t0()).await;
        assert_eq!(
            manager.repository().open_alerts().await.unwrap()[0].alert_type,
            AlertType::NoQbCustomer
        );

        client.add_customer(customer("c1", "Acme Tools", "buyer@acme.com"));
        manager.refresh_customers().await.unwrap();

        let resolved = manager
            .check_and_resolve_alerts_at(t0() + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(resolved, 1);

        let alert = manager.repository().get_alert(1).await.unwrap().unwrap();
        assert_eq!(alert.status, AlertStatus::Resolved);
        assert_eq!(alert.qb_customer_id.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn test_invoice_so_mismatch_flags_closeable_order() {
        let client = ScriptedClient::default();
        client.add_customer(customer("c1", "Acme Tools", "buyer@acme.com"));

        let mut so = sales_order("so1", "SO-55", "PO-100", 500_000);
        so.is_fully_invoiced = false;
        let invoice = Invoice {
            id: "inv1".into(),
            ref_number: "INV-9".into(),
            memo: None,
            total_cents: 500_000,
            balance_cents: 0,
            sales_order_id: Some("so1".into()),
        };
        let mut docs = JobDocuments::default();
        docs.sales_orders.push(so);
        docs.invoices.push(invoice);
        client.set_documents("c1", docs);
        let mut manager = manager(client).await;

        let threads = vec![po_thread("<t1@x>", "buyer@acme.com", "Acme Tools", "PO-100", 500_000)];
        manager.analyze_new_po_emails_at(&threads, t0()).await;

        let created = manager.check_invoice_so_mismatch_at(t0()).await.unwrap();
        assert_eq!(created, 1);
        // Re-running suggests nothing new.
        assert_eq!(manager.check_invoice_so_mismatch_at(t0()).await.unwrap(), 0);

        let open = manager.repository().open_alerts().await.unwrap();
        let suggestion = open
            .iter()
            .find(|a| a.alert_type == AlertType::SoShouldBeClosed)
            .unwrap();
        assert_eq!(suggestion.thread_key, "so-close:so1");
        assert_eq!(suggestion.invoice_ref.as_deref(), Some("INV-9"));
    }

    #[tokio::test]
    async fn test_run_cycle_reports_each_phase() {
        let client = ScriptedClient::default();
        client.add_customer(customer("c1", "Acme Tools", "buyer@acme.com"));
        let mut manager = manager(client).await;

        let threads = vec![po_thread("<t1@x>", "buyer@acme.com", "Acme Tools", "PO-100", 500_000)];
        let report = manager.run_cycle_at(&threads, t0()).await;
        assert_eq!(report.created, 1);
        assert_eq!(report.escalated, 0);
        assert_eq!(report.open_alerts.len(), 1);

        let report = manager.run_cycle_at(&threads, t0() + Duration::hours(5)).await;
        assert_eq!(report.created, 0);
        assert_eq!(report.escalated, 1);
    }

    #[tokio::test]
    async fn test_estimate_recorded_on_po_detected() {
        let client = ScriptedClient::default();
        client.add_customer(customer("c1", "Acme Tools", "buyer@acme.com"));
        let mut docs = JobDocuments::default();
        docs.estimates.push(Estimate {
            id: "est1".into(),
            ref_number: "EST-3".into(),
            memo: Some("PO-100".into()),
            total_cents: 500_000,
        });
        client.set_documents("c1", docs);
        let mut manager = manager(client).await;

        let threads = vec![po_thread("<t1@x>", "buyer@acme.com", "Acme Tools", "PO-100", 500_000)];
        manager.analyze_new_po_emails_at(&threads, t0()).await;

        let open = manager.repository().open_alerts().await.unwrap();
        assert_eq!(open[0].alert_type, AlertType::PoDetected);
        assert_eq!(open[0].estimate_ref.as_deref(), Some("EST-3"));
    }
}
