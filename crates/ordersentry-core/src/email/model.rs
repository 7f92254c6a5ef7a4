//! Email data models.

use chrono::{DateTime, Utc};

/// Which side of the mailbox a message was synced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mailbox {
    /// Received mail.
    #[default]
    Inbound,
    /// Sent mail.
    Outbound,
}

impl Mailbox {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "outbound" | "sent" => Self::Outbound,
            _ => Self::Inbound,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

/// A synced email message, as supplied by the mailbox collaborator.
///
/// Records are immutable inputs: the core never writes back to them.
/// Header fields (`message_id`, `in_reply_to`, `references`) are taken
/// as-is and may be missing or inconsistent; thread resolution is built
/// to tolerate that.
#[derive(Debug, Clone)]
pub struct EmailRecord {
    /// Primary key in the backing store.
    pub id: i64,
    /// RFC 5322 Message-ID header, if present.
    pub message_id: Option<String>,
    /// In-Reply-To header, if present.
    pub in_reply_to: Option<String>,
    /// References header: space-separated message ids, oldest first.
    pub references: Option<String>,
    /// Subject line (may be empty).
    pub subject: String,
    /// Sender address.
    pub from_address: String,
    /// Recipient addresses (To).
    pub to_addresses: Vec<String>,
    /// Message date.
    pub date: DateTime<Utc>,
    /// Inbound or outbound.
    pub mailbox: Mailbox,
}

impl EmailRecord {
    /// Message ids referenced by this email, in header order.
    pub fn reference_ids(&self) -> impl Iterator<Item = &str> {
        self.references
            .as_deref()
            .unwrap_or("")
            .split_whitespace()
            .filter(|s| !s.is_empty())
    }

    /// The domain of the sender address, lowercased, if the address has one.
    #[must_use]
    pub fn from_domain(&self) -> Option<String> {
        domain_of(&self.from_address)
    }
}

/// Extracts the domain part of an email address, lowercased.
#[must_use]
pub fn domain_of(address: &str) -> Option<String> {
    let (_, domain) = address.trim().rsplit_once('@')?;
    if domain.is_empty() {
        None
    } else {
        Some(domain.trim_end_matches('>').to_lowercase())
    }
}

/// Parses a stored recipient list.
///
/// Mailbox syncs store recipients as a JSON array, but older rows hold a
/// bare comma-separated string. Total parse failure yields an empty list,
/// never an error.
#[must_use]
pub fn parse_recipients(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    if let Ok(list) = serde_json::from_str::<Vec<String>>(trimmed) {
        return list
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
    }

    // Comma-split fallback for legacy rows
    trimmed
        .split(',')
        .map(|a| a.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
        .filter(|a| !a.is_empty())
        .collect()
}
