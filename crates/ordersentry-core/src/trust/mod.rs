//! Trusted-domain filter.
//!
//! Computes the set of sender domains considered safe to process, from
//! historical outbound recipients plus a manual allow-list and (optionally)
//! the accounting system's known customer emails.

use std::collections::BTreeSet;

use crate::email::{EmailRecord, domain_of};

/// First labels of common free-mail providers.
///
/// Shared with the entity matcher's domain-to-company inference: a free-mail
/// domain says nothing about which company sent the mail.
pub const FREE_MAIL_PROVIDERS: &[&str] = &[
    "gmail", "yahoo", "hotmail", "outlook", "aol", "icloud", "mail",
];

/// Whether a domain belongs to a free-mail provider.
#[must_use]
pub fn is_free_mail_domain(domain: &str) -> bool {
    domain
        .split('.')
        .next()
        .is_some_and(|label| FREE_MAIL_PROVIDERS.contains(&label.to_lowercase().as_str()))
}

/// The set of domains (and individual addresses) trusted for processing.
#[derive(Debug, Clone, Default)]
pub struct TrustedDomains {
    domains: BTreeSet<String>,
    addresses: BTreeSet<String>,
}

impl TrustedDomains {
    /// Builds the trusted set.
    ///
    /// Every domain we have historically sent mail to is trusted, as is the
    /// manual allow-list. Customer emails from the accounting system trust
    /// their domain, except free-mail addresses, which only trust the exact
    /// address: one customer on Gmail must not whitelist all of Gmail.
    #[must_use]
    pub fn build(
        outbound_history: &[EmailRecord],
        allow_list: &[String],
        customer_emails: &[String],
    ) -> Self {
        let mut domains = BTreeSet::new();
        let mut addresses = BTreeSet::new();

        for email in outbound_history {
            for recipient in &email.to_addresses {
                if let Some(domain) = domain_of(recipient) {
                    domains.insert(domain);
                }
            }
        }

        for domain in allow_list {
            let trimmed = domain.trim().trim_start_matches('@').to_lowercase();
            if !trimmed.is_empty() {
                domains.insert(trimmed);
            }
        }

        for address in customer_emails {
            let Some(domain) = domain_of(address) else {
                continue;
            };
            if is_free_mail_domain(&domain) {
                addresses.insert(address.trim().to_lowercase());
            } else {
                domains.insert(domain);
            }
        }

        Self { domains, addresses }
    }

    /// Whether mail from this address is safe to process.
    #[must_use]
    pub fn is_trusted(&self, email: &str) -> bool {
        if self.addresses.contains(&email.trim().to_lowercase()) {
            return true;
        }
        domain_of(email).is_some_and(|domain| self.domains.contains(&domain))
    }

    /// Number of trusted domains.
    #[must_use]
    pub fn domain_count(&self) -> usize {
        self.domains.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::email::Mailbox;
    use chrono::{TimeZone, Utc};

    fn outbound(to: &[&str]) -> EmailRecord {
        EmailRecord {
            id: 1,
            message_id: Some("<m@x>".into()),
            in_reply_to: None,
            references: None,
            subject: "Quote".into(),
            from_address: "sales@shop.com".into(),
            to_addresses: to.iter().map(ToString::to_string).collect(),
            date: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            mailbox: Mailbox::Outbound,
        }
    }

    #[test]
    fn test_outbound_recipients_are_trusted() {
        let trusted = TrustedDomains::build(&[outbound(&["buyer@acme.com"])], &[], &[]);
        assert!(trusted.is_trusted("anyone@acme.com"));
        assert!(!trusted.is_trusted("anyone@stranger.com"));
    }

    #[test]
    fn test_allow_list_normalization() {
        let trusted = TrustedDomains::build(&[], &["@Acme.COM ".into()], &[]);
        assert!(trusted.is_trusted("Buyer@acme.com"));
    }

    #[test]
    fn test_free_mail_customer_trusts_address_not_domain() {
        let trusted = TrustedDomains::build(&[], &[], &["owner@gmail.com".into()]);
        assert!(trusted.is_trusted("owner@gmail.com"));
        assert!(!trusted.is_trusted("stranger@gmail.com"));
    }

    #[test]
    fn test_company_customer_trusts_domain() {
        let trusted = TrustedDomains::build(&[], &[], &["po@tnt-tools.com".into()]);
        assert!(trusted.is_trusted("other@tnt-tools.com"));
    }

    #[test]
    fn test_is_free_mail_domain() {
        assert!(is_free_mail_domain("gmail.com"));
        assert!(is_free_mail_domain("Outlook.com"));
        assert!(!is_free_mail_domain("acme-tools.com"));
    }
}
