//! Alert persistence.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use super::model::{Alert, AlertStatus, AlertType, NewAlert, ResolvedBy};
use crate::Result;
use crate::accounting::SalesOrder;

/// Repository for alert storage and lifecycle updates.
///
/// A partial unique index on `thread_key` for open alerts backs the
/// one-open-alert-per-thread invariant at the storage layer, so two
/// overlapping cycle runs cannot both insert; the loser's insert is
/// reported as "already exists".
pub struct AlertRepository {
    pool: SqlitePool,
}

const ALERT_COLUMNS: &str = "id, alert_type, thread_key, contact_email, contact_name, \
     qb_customer_id, po_number, po_total_cents, \
     sales_order_id, sales_order_ref, sales_order_total_cents, \
     estimate_id, estimate_ref, invoice_id, invoice_ref, invoice_total_cents, \
     status, detected_at, escalated_at, resolved_at, resolved_by, \
     last_notified_at, notification_count";

impl AlertRepository {
    /// Create a new repository with the given database path.
    ///
    /// Creates the database and tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Create an in-memory repository for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS alerts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                alert_type TEXT NOT NULL,
                thread_key TEXT NOT NULL,
                contact_email TEXT NOT NULL DEFAULT '',
                contact_name TEXT NOT NULL DEFAULT '',
                qb_customer_id TEXT,
                po_number TEXT,
                po_total_cents INTEGER,
                sales_order_id TEXT,
                sales_order_ref TEXT,
                sales_order_total_cents INTEGER,
                estimate_id TEXT,
                estimate_ref TEXT,
                invoice_id TEXT,
                invoice_ref TEXT,
                invoice_total_cents INTEGER,
                status TEXT NOT NULL DEFAULT 'open',
                detected_at TEXT NOT NULL,
                escalated_at TEXT,
                resolved_at TEXT,
                resolved_by TEXT,
                last_notified_at TEXT,
                notification_count INTEGER NOT NULL DEFAULT 0
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        // One open alert per thread, enforced by the database so that
        // concurrent cycle runs cannot double-insert.
        sqlx::query(
            r"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_alerts_open_thread
            ON alerts(thread_key) WHERE status = 'open'
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_alerts_status_type
            ON alerts(status, alert_type)
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Create an alert, unless an alert for its thread already exists.
    ///
    /// Returns the stored alert, or `None` when the open-alert constraint
    /// or the idempotent-intake check suppressed the insert.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn create_alert_at(
        &self,
        new: &NewAlert,
        now: DateTime<Utc>,
    ) -> Result<Option<Alert>> {
        if self.has_alert_for_thread(&new.thread_key).await? {
            return Ok(None);
        }

        let result = sqlx::query(
            r"
            INSERT OR IGNORE INTO alerts
                (alert_type, thread_key, contact_email, contact_name,
                 qb_customer_id, po_number, po_total_cents,
                 sales_order_id, sales_order_ref, sales_order_total_cents,
                 estimate_id, estimate_ref, invoice_id, invoice_ref, invoice_total_cents,
                 status, detected_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'open', ?)
            ",
        )
        .bind(new.alert_type.as_str())
        .bind(&new.thread_key)
        .bind(&new.contact_email)
        .bind(&new.contact_name)
        .bind(&new.qb_customer_id)
        .bind(&new.po_number)
        .bind(new.po_total_cents)
        .bind(&new.sales_order_id)
        .bind(&new.sales_order_ref)
        .bind(new.sales_order_total_cents)
        .bind(&new.estimate_id)
        .bind(&new.estimate_ref)
        .bind(&new.invoice_id)
        .bind(&new.invoice_ref)
        .bind(new.invoice_total_cents)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Lost the race against a concurrent cycle
            return Ok(None);
        }
        self.get_alert(result.last_insert_rowid()).await
    }

    /// Fetch an alert by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_alert(&self, id: i64) -> Result<Option<Alert>> {
        let sql = format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(|r| row_to_alert(&r)))
    }

    /// Whether any alert (open or terminal) exists for a thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn has_alert_for_thread(&self, thread_key: &str) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM alerts WHERE thread_key = ?")
            .bind(thread_key)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n") > 0)
    }

    /// All open alerts, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn open_alerts(&self) -> Result<Vec<Alert>> {
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM alerts WHERE status = 'open' \
             ORDER BY detected_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_alert).collect())
    }

    /// Open alerts of the given types, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn open_alerts_of_types(&self, types: &[AlertType]) -> Result<Vec<Alert>> {
        if types.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; types.len()].join(", ");
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM alerts \
             WHERE status = 'open' AND alert_type IN ({placeholders}) \
             ORDER BY detected_at ASC, id ASC"
        );
        let mut query = sqlx::query(&sql);
        for alert_type in types {
            query = query.bind(alert_type.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_alert).collect())
    }

    /// Open `po_detected` alerts old enough to escalate and not yet
    /// escalated: `detected_at <= cutoff`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn escalation_candidates(&self, cutoff: DateTime<Utc>) -> Result<Vec<Alert>> {
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM alerts \
             WHERE status = 'open' AND alert_type = 'po_detected' \
               AND escalated_at IS NULL AND detected_at <= ? \
             ORDER BY detected_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(cutoff.to_rfc3339())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_alert).collect())
    }

    /// Escalate a `po_detected` alert to `po_missing_so`.
    ///
    /// Guarded so `escalated_at` is set at most once, even if escalation
    /// runs repeatedly; returns whether the row changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn escalate_at(&self, id: i64, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE alerts
            SET alert_type = 'po_missing_so',
                escalated_at = ?
            WHERE id = ? AND status = 'open'
              AND alert_type = 'po_detected' AND escalated_at IS NULL
            ",
        )
        .bind(now.to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Resolve an open alert; returns whether the row changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn resolve_at(
        &self,
        id: i64,
        resolved_by: ResolvedBy,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE alerts
            SET status = 'resolved',
                resolved_at = ?,
                resolved_by = ?
            WHERE id = ? AND status = 'open'
            ",
        )
        .bind(now.to_rfc3339())
        .bind(resolved_by.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Dismiss an open alert by hand; returns whether the row changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn dismiss_at(&self, id: i64, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE alerts
            SET status = 'dismissed',
                resolved_at = ?,
                resolved_by = 'manual'
            WHERE id = ? AND status = 'open'
            ",
        )
        .bind(now.to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record the sales order that satisfied an alert.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn attach_sales_order(&self, id: i64, sales_order: &SalesOrder) -> Result<()> {
        sqlx::query(
            r"
            UPDATE alerts
            SET sales_order_id = ?,
                sales_order_ref = ?,
                sales_order_total_cents = ?
            WHERE id = ?
            ",
        )
        .bind(&sales_order.id)
        .bind(&sales_order.ref_number)
        .bind(sales_order.total_cents)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a late customer match on an alert.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn attach_customer(&self, id: i64, customer_id: &str) -> Result<()> {
        sqlx::query("UPDATE alerts SET qb_customer_id = ? WHERE id = ?")
            .bind(customer_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record that a notification went out for an alert.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn mark_notified_at(&self, id: i64, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r"
            UPDATE alerts
            SET last_notified_at = ?,
                notification_count = notification_count + 1
            WHERE id = ?
            ",
        )
        .bind(now.to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Open alert counts grouped by type, for notification summaries.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn open_summary(&self) -> Result<Vec<(AlertType, u32)>> {
        let rows = sqlx::query(
            r"
            SELECT alert_type, COUNT(*) AS n
            FROM alerts
            WHERE status = 'open'
            GROUP BY alert_type
            ORDER BY alert_type
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Ok(rows
            .iter()
            .map(|row| {
                let alert_type: String = row.get("alert_type");
                (AlertType::parse(&alert_type), row.get::<i64, _>("n") as u32)
            })
            .collect())
    }
}

fn parse_optional_datetime(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
}

/// Convert a database row to an `Alert`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn row_to_alert(row: &sqlx::sqlite::SqliteRow) -> Alert {
    let alert_type: String = row.get("alert_type");
    let status: String = row.get("status");
    let resolved_by: Option<String> = row.get("resolved_by");
    let detected_at: String = row.get("detected_at");

    Alert {
        id: row.get("id"),
        alert_type: AlertType::parse(&alert_type),
        thread_key: row.get("thread_key"),
        contact_email: row.get("contact_email"),
        contact_name: row.get("contact_name"),
        qb_customer_id: row.get("qb_customer_id"),
        po_number: row.get("po_number"),
        po_total_cents: row.get("po_total_cents"),
        sales_order_id: row.get("sales_order_id"),
        sales_order_ref: row.get("sales_order_ref"),
        sales_order_total_cents: row.get("sales_order_total_cents"),
        estimate_id: row.get("estimate_id"),
        estimate_ref: row.get("estimate_ref"),
        invoice_id: row.get("invoice_id"),
        invoice_ref: row.get("invoice_ref"),
        invoice_total_cents: row.get("invoice_total_cents"),
        status: AlertStatus::parse(&status),
        detected_at: parse_optional_datetime(Some(detected_at)).unwrap_or_default(),
        escalated_at: parse_optional_datetime(row.get("escalated_at")),
        resolved_at: parse_optional_datetime(row.get("resolved_at")),
        resolved_by: resolved_by.as_deref().map(ResolvedBy::parse),
        last_notified_at: parse_optional_datetime(row.get("last_notified_at")),
        notification_count: row.get::<i64, _>("notification_count") as u32,
    }
}
