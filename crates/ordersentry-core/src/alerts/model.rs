//! Alert data models.

use chrono::{DateTime, Utc};

/// What an alert is telling the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AlertType {
    /// A PO arrived and no confirming sales order exists yet.
    #[default]
    PoDetected,
    /// A PO arrived and a matching sales order already exists
    /// (informational).
    PoDetectedWithSo,
    /// A `PoDetected` alert aged past the escalation threshold without a
    /// sales order appearing.
    PoMissingSo,
    /// The contact could not be matched to any accounting customer.
    NoQbCustomer,
    /// The sender was untrusted or had no resolvable contact email.
    SuspiciousPoEmail,
    /// A sales order is fully invoiced but still open in the accounting
    /// system.
    SoShouldBeClosed,
}

impl AlertType {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "po_detected_with_so" => Self::PoDetectedWithSo,
            "po_missing_so" => Self::PoMissingSo,
            "no_qb_customer" => Self::NoQbCustomer,
            "suspicious_po_email" => Self::SuspiciousPoEmail,
            "so_should_be_closed" => Self::SoShouldBeClosed,
            _ => Self::PoDetected,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PoDetected => "po_detected",
            Self::PoDetectedWithSo => "po_detected_with_so",
            Self::PoMissingSo => "po_missing_so",
            Self::NoQbCustomer => "no_qb_customer",
            Self::SuspiciousPoEmail => "suspicious_po_email",
            Self::SoShouldBeClosed => "so_should_be_closed",
        }
    }
}

/// Alert status. Transitions are monotonic: `Open` may become `Resolved`
/// or `Dismissed`, both terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlertStatus {
    /// Needs attention.
    #[default]
    Open,
    /// Closed because the condition cleared.
    Resolved,
    /// Closed by hand.
    Dismissed,
}

impl AlertStatus {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "resolved" => Self::Resolved,
            "dismissed" => Self::Dismissed,
            _ => Self::Open,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Resolved => "resolved",
            Self::Dismissed => "dismissed",
        }
    }
}

/// Who closed an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedBy {
    /// An automatic check found the condition cleared.
    Auto,
    /// An operator dismissed it.
    Manual,
}

impl ResolvedBy {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "manual" => Self::Manual,
            _ => Self::Auto,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
        }
    }
}

/// A persisted alert. Monetary totals are integer cents.
#[derive(Debug, Clone)]
pub struct Alert {
    /// Row id.
    pub id: i64,
    /// Current alert type.
    pub alert_type: AlertType,
    /// Thread this alert tracks. At most one open alert per thread key.
    pub thread_key: String,
    /// Contact email resolved for the thread (may be empty for
    /// suspicious alerts).
    pub contact_email: String,
    /// Contact display name.
    pub contact_name: String,
    /// Matched accounting customer id, if any.
    pub qb_customer_id: Option<String>,
    /// PO number extracted upstream, if any.
    pub po_number: Option<String>,
    /// PO total in cents, if extracted.
    pub po_total_cents: Option<i64>,
    /// Matching sales order id.
    pub sales_order_id: Option<String>,
    /// Matching sales order reference number.
    pub sales_order_ref: Option<String>,
    /// Matching sales order total in cents.
    pub sales_order_total_cents: Option<i64>,
    /// Fallback estimate id (informational only).
    pub estimate_id: Option<String>,
    /// Fallback estimate reference.
    pub estimate_ref: Option<String>,
    /// Related invoice id (for close-suggestion alerts).
    pub invoice_id: Option<String>,
    /// Related invoice reference.
    pub invoice_ref: Option<String>,
    /// Related invoice total in cents.
    pub invoice_total_cents: Option<i64>,
    /// Status; monotonic, see [`AlertStatus`].
    pub status: AlertStatus,
    /// When Stage 1 created the alert.
    pub detected_at: DateTime<Utc>,
    /// When the alert escalated to `PoMissingSo`; set at most once.
    pub escalated_at: Option<DateTime<Utc>>,
    /// When the alert left `Open`.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Who closed it.
    pub resolved_by: Option<ResolvedBy>,
    /// Last notification timestamp.
    pub last_notified_at: Option<DateTime<Utc>>,
    /// How many notifications went out.
    pub notification_count: u32,
}

impl Alert {
    /// Whether the alert still needs attention.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self.status, AlertStatus::Open)
    }

    /// Whether Stage 2 may escalate this alert: open, still `PoDetected`,
    /// and never escalated before.
    #[must_use]
    pub const fn can_escalate(&self) -> bool {
        self.is_open()
            && matches!(self.alert_type, AlertType::PoDetected)
            && self.escalated_at.is_none()
    }
}

/// Field set for creating an alert. The repository assigns id, status,
/// and timestamps.
#[derive(Debug, Clone, Default)]
pub struct NewAlert {
    /// Initial alert type.
    pub alert_type: AlertType,
    /// Thread key; the open-alert dedup key.
    pub thread_key: String,
    /// Contact email.
    pub contact_email: String,
    /// Contact display name.
    pub contact_name: String,
    /// Matched customer id.
    pub qb_customer_id: Option<String>,
    /// PO number.
    pub po_number: Option<String>,
    /// PO total in cents.
    pub po_total_cents: Option<i64>,
    /// Sales order id.
    pub sales_order_id: Option<String>,
    /// Sales order reference.
    pub sales_order_ref: Option<String>,
    /// Sales order total in cents.
    pub sales_order_total_cents: Option<i64>,
    /// Estimate id.
    pub estimate_id: Option<String>,
    /// Estimate reference.
    pub estimate_ref: Option<String>,
    /// Invoice id.
    pub invoice_id: Option<String>,
    /// Invoice reference.
    pub invoice_ref: Option<String>,
    /// Invoice total in cents.
    pub invoice_total_cents: Option<i64>,
}

impl NewAlert {
    /// Starts a new alert of the given type for a thread.
    #[must_use]
    pub fn new(alert_type: AlertType, thread_key: impl Into<String>) -> Self {
        Self {
            alert_type,
            thread_key: thread_key.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_alert_type_roundtrip() {
        for alert_type in [
            AlertType::PoDetected,
            AlertType::PoDetectedWithSo,
            AlertType::PoMissingSo,
            AlertType::NoQbCustomer,
            AlertType::SuspiciousPoEmail,
            AlertType::SoShouldBeClosed,
        ] {
            assert_eq!(AlertType::parse(alert_type.as_str()), alert_type);
        }
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [AlertStatus::Open, AlertStatus::Resolved, AlertStatus::Dismissed] {
            assert_eq!(AlertStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn test_can_escalate_guards() {
        let mut alert = Alert {
            id: 1,
            alert_type: AlertType::PoDetected,
            thread_key: "<m1@x>".into(),
            contact_email: "buyer@acme.com".into(),
            contact_name: "Acme".into(),
            qb_customer_id: None,
            po_number: None,
            po_total_cents: None,
            sales_order_id: None,
            sales_order_ref: None,
            sales_order_total_cents: None,
            estimate_id: None,
            estimate_ref: None,
            invoice_id: None,
            invoice_ref: None,
            invoice_total_cents: None,
            status: AlertStatus::Open,
            detected_at: Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).single().unwrap_or_default(),
            escalated_at: None,
            resolved_at: None,
            resolved_by: None,
            last_notified_at: None,
            notification_count: 0,
        };
        assert!(alert.can_escalate());

        alert.escalated_at = Some(alert.detected_at);
        assert!(!alert.can_escalate());

        alert.escalated_at = None;
        alert.status = AlertStatus::Resolved;
        assert!(!alert.can_escalate());

        alert.status = AlertStatus::Open;
        alert.alert_type = AlertType::NoQbCustomer;
        assert!(!alert.can_escalate());
    }
}
