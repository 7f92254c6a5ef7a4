//! Accounting API clients.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use super::model::{Customer, JobDocuments};

/// Errors from accounting-system calls.
#[derive(Debug, thiserror::Error)]
pub enum AccountingError {
    /// The accounting system cannot be reached; callers degrade rather
    /// than abort.
    #[error("Accounting system unavailable: {0}")]
    Unavailable(String),

    /// The API answered with an error.
    #[error("Accounting API error: {0}")]
    Api(String),

    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl AccountingError {
    /// Whether this error means the accounting system is unreachable,
    /// as opposed to a bad request or a data problem.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::Http(e) => e.is_connect() || e.is_timeout(),
            Self::Api(_) => false,
        }
    }
}

/// Result alias for accounting calls.
pub type AccountingResult<T> = std::result::Result<T, AccountingError>;

/// Filters for a job-document fetch.
#[derive(Debug, Clone, Default)]
pub struct DocumentQuery {
    /// Only documents updated after this instant.
    pub updated_after: Option<DateTime<Utc>>,
    /// Include sales orders that are already fully invoiced.
    pub include_fully_invoiced: bool,
    /// Include invoices that are already paid.
    pub include_paid: bool,
}

/// Read access to the accounting system.
///
/// The lifecycle manager is generic over this trait; production uses
/// [`HttpAccountingClient`], the offline path uses
/// [`NullAccountingClient`], and tests script their own doubles.
#[allow(async_fn_in_trait)]
pub trait AccountingClient {
    /// The full customer list (paged internally).
    async fn fetch_customers(&self) -> AccountingResult<Vec<Customer>>;

    /// One customer's sales orders, invoices, and estimates.
    async fn fetch_job_documents(
        &self,
        customer_id: &str,
        query: &DocumentQuery,
    ) -> AccountingResult<JobDocuments>;
}

/// HTTP client for the accounting API.
#[derive(Debug, Clone)]
pub struct HttpAccountingClient {
    base_url: String,
    token: Option<String>,
    http_client: Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomerPage {
    customers: Vec<Customer>,
    #[serde(default)]
    has_more: bool,
}

const PAGE_SIZE: usize = 100;

impl HttpAccountingClient {
    /// Creates a client against the given API base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            http_client: Client::new(),
        }
    }

    /// Sets the bearer token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{path}", self.base_url.trim_end_matches('/'));
        let mut request = self.http_client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request
    }
}

impl AccountingClient for HttpAccountingClient {
    async fn fetch_customers(&self) -> AccountingResult<Vec<Customer>> {
        let mut customers = Vec::new();
        let mut page = 1usize;
        loop {
            let response = self
                .get("customers")
                .query(&[("page", page.to_string()), ("pageSize", PAGE_SIZE.to_string())])
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(AccountingError::Api(format!(
                    "customer list returned {}",
                    response.status()
                )));
            }
            let body: CustomerPage = response.json().await?;
            customers.extend(body.customers);
            if !body.has_more {
                break;
            }
            page += 1;
        }
        Ok(customers)
    }

    async fn fetch_job_documents(
        &self,
        customer_id: &str,
        query: &DocumentQuery,
    ) -> AccountingResult<JobDocuments> {
        let mut params: Vec<(&str, String)> = vec![
            (
                "includeFullyInvoiced",
                query.include_fully_invoiced.to_string(),
            ),
            ("includePaid", query.include_paid.to_string()),
        ];
        if let Some(updated_after) = query.updated_after {
            params.push(("updatedAfter", updated_after.to_rfc3339()));
        }

        let response = self
            .get(&format!("customers/{customer_id}/documents"))
            .query(&params)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AccountingError::Api(format!(
                "document fetch for {customer_id} returned {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }
}

/// The degraded-mode client: every call reports the system unavailable.
///
/// Wiring this in (instead of branching on caught errors at each call
/// site) makes the offline behavior of the alert lifecycle an explicit,
/// testable code path.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAccountingClient;

impl AccountingClient for NullAccountingClient {
    async fn fetch_customers(&self) -> AccountingResult<Vec<Customer>> {
        Err(AccountingError::Unavailable(
            "accounting integration disabled".into(),
        ))
    }

    async fn fetch_job_documents(
        &self,
        _customer_id: &str,
        _query: &DocumentQuery,
    ) -> AccountingResult<JobDocuments> {
        Err(AccountingError::Unavailable(
            "accounting integration disabled".into(),
        ))
    }
}
