//! SQLite storage for synced emails.

use std::collections::BTreeSet;

use chrono::DateTime;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use super::model::{EmailRecord, Mailbox, parse_recipients};
use super::store::EmailStore;
use crate::Result;
use crate::thread::normalize_subject;

/// Repository over the synced email corpus.
///
/// The normalized subject is computed once at insert time so the
/// thread-expansion subject pass stays a plain indexed lookup.
pub struct EmailRepository {
    pool: SqlitePool,
}

const EMAIL_COLUMNS: &str = "id, message_id, in_reply_to, references_ids, subject, \
                             from_address, to_addresses, date, mailbox";

impl EmailRepository {
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
            CREATE TABLE IF NOT EXISTS emails (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id TEXT,
                in_reply_to TEXT,
                references_ids TEXT,
                subject TEXT NOT NULL DEFAULT '',
                normalized_subject TEXT NOT NULL DEFAULT '',
                from_address TEXT NOT NULL DEFAULT '',
                to_addresses TEXT NOT NULL DEFAULT '[]',
                date TEXT NOT NULL,
                mailbox TEXT NOT NULL DEFAULT 'inbound'
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        // Lookups used by thread expansion
        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_emails_message_id
            ON emails(message_id)
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_emails_in_reply_to
            ON emails(in_reply_to)
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_emails_normalized_subject
            ON emails(normalized_subject)
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_emails_mailbox_date
            ON emails(mailbox, date)
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a synced email.
    ///
    /// The record's `id` field is ignored; the assigned row id is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn insert_email(&self, email: &EmailRecord) -> Result<i64> {
        let to_json = serde_json::to_string(&email.to_addresses)?;
        let result = sqlx::query(
            r"
            INSERT INTO emails (message_id, in_reply_to, references_ids, subject,
                                normalized_subject, from_address, to_addresses, date, mailbox)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&email.message_id)
        .bind(&email.in_reply_to)
        .bind(&email.references)
        .bind(&email.subject)
        .bind(normalize_subject(&email.subject))
        .bind(&email.from_address)
        .bind(to_json)
        .bind(email.date.to_rfc3339())
        .bind(email.mailbox.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Fetch every stored email, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn fetch_all(&self) -> Result<Vec<EmailRecord>> {
        let sql = format!("SELECT {EMAIL_COLUMNS} FROM emails ORDER BY date ASC, id ASC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_email).collect())
    }

    /// Fetch emails from one side of the mailbox, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn fetch_by_mailbox(&self, mailbox: Mailbox) -> Result<Vec<EmailRecord>> {
        let sql = format!(
            "SELECT {EMAIL_COLUMNS} FROM emails WHERE mailbox = ? ORDER BY date ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(mailbox.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_email).collect())
    }

    /// Fetch emails dated at or after `since`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn fetch_since(&self, since: chrono::DateTime<chrono::Utc>) -> Result<Vec<EmailRecord>> {
        let sql = format!(
            "SELECT {EMAIL_COLUMNS} FROM emails WHERE date >= ? ORDER BY date ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(since.to_rfc3339())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_email).collect())
    }
}

impl EmailStore for EmailRepository {
    async fn emails_matching_ids(&self, ids: &BTreeSet<String>) -> Result<Vec<EmailRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let reference_clauses = vec!["instr(references_ids, ?) > 0"; ids.len()].join(" OR ");
        let sql = format!(
            "SELECT {EMAIL_COLUMNS} FROM emails \
             WHERE message_id IN ({placeholders}) \
                OR in_reply_to IN ({placeholders}) \
                OR {reference_clauses} \
             ORDER BY date ASC, id ASC"
        );

        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        for id in ids {
            query = query.bind(id);
        }
        for id in ids {
            query = query.bind(id);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_email).collect())
    }

    async fn emails_with_subjects(&self, subjects: &BTreeSet<String>) -> Result<Vec<EmailRecord>> {
        if subjects.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; subjects.len()].join(", ");
        let sql = format!(
            "SELECT {EMAIL_COLUMNS} FROM emails \
             WHERE normalized_subject IN ({placeholders}) \
             ORDER BY date ASC, id ASC"
        );

        let mut query = sqlx::query(&sql);
        for subject in subjects {
            query = query.bind(subject);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_email).collect())
    }
}

/// Convert a database row to an `EmailRecord`.
fn row_to_email(row: &sqlx::sqlite::SqliteRow) -> EmailRecord {
    let date_str: String = row.get("date");
    let date = DateTime::parse_from_rfc3339(&date_str)
        .map(|d| d.with_timezone(&chrono::Utc))
        .unwrap_or_default();
    let to_raw: String = row.get("to_addresses");
    let mailbox: String = row.get("mailbox");

    EmailRecord {
        id: row.get("id"),
        message_id: row.get("message_id"),
        in_reply_to: row.get("in_reply_to"),
        references: row.get("references_ids"),
        subject: row.get("subject"),
        from_address: row.get("from_address"),
        to_addresses: parse_recipients(&to_raw),
        date,
        mailbox: Mailbox::parse(&mailbox),
    }
}
