//! Notification intents produced by order and payment transitions.
//!
//! Delivery (email templates, push) happens elsewhere. This module decides
//! *whether* a customer should hear about a change and resolves the address,
//! turning decryption failures into an explicit skip instead of a fallback.

use std::fmt;

use beniken_crypto::{CryptoError, FieldCipher, FieldValue};
use tracing::warn;

use crate::types::{OrderRecord, OrderStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    OrderConfirmation,
    StatusUpdate(OrderStatus),
    PaymentConfirmation,
}

#[derive(Debug)]
pub enum SkipReason {
    /// The order carries no customer email.
    NoEmail,
    /// The stored email could not be decrypted.
    Undecryptable(CryptoError),
    /// Decrypted, but not something we can send to.
    InvalidAddress,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoEmail => f.write_str("no customer email"),
            Self::Undecryptable(e) => write!(f, "customer email undecryptable: {e}"),
            Self::InvalidAddress => f.write_str("customer email is not a valid address"),
        }
    }
}

#[derive(Debug)]
pub enum Recipient {
    Deliver(String),
    Skip(SkipReason),
}

impl Recipient {
    pub fn address(&self) -> Option<&str> {
        match self {
            Self::Deliver(email) => Some(email),
            Self::Skip(_) => None,
        }
    }
}

#[derive(Debug)]
pub struct Notification {
    pub kind: NotificationKind,
    pub order_id: String,
    pub order_number: String,
    pub recipient: Recipient,
}

impl Notification {
    pub(crate) fn for_order(cipher: &FieldCipher, kind: NotificationKind, order: &OrderRecord) -> Self {
        let recipient = resolve_recipient(cipher, order.customer_email.as_ref());
        if let Recipient::Skip(reason) = &recipient {
            warn!(order_id = %order.id, ?kind, %reason, "customer notification skipped");
        }
        Self {
            kind,
            order_id: order.id.clone(),
            order_number: order.order_number.clone(),
            recipient,
        }
    }
}

/// Resolve the address a notification should go to.
pub fn resolve_recipient(cipher: &FieldCipher, email: Option<&FieldValue>) -> Recipient {
    let Some(value) = email else {
        return Recipient::Skip(SkipReason::NoEmail);
    };
    match cipher.reveal(value) {
        Ok(address) if looks_like_email(&address) => Recipient::Deliver(address),
        Ok(_) => Recipient::Skip(SkipReason::InvalidAddress),
        Err(e) => Recipient::Skip(SkipReason::Undecryptable(e)),
    }
}

fn looks_like_email(address: &str) -> bool {
    match address.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !address.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beniken_crypto::CryptoConfig;

    fn cipher() -> FieldCipher {
        FieldCipher::new(&CryptoConfig::from_keys(&[9u8; 32], None).unwrap()).unwrap()
    }

    #[test]
    fn delivers_decrypted_address() {
        let fc = cipher();
        let value = fc.encrypt_value("cliente@example.com").unwrap();
        let recipient = resolve_recipient(&fc, Some(&value));
        assert_eq!(recipient.address(), Some("cliente@example.com"));
    }

    #[test]
    fn delivers_plain_address() {
        let fc = cipher();
        let value = FieldValue::Plain("cliente@example.com".into());
        assert!(matches!(
            resolve_recipient(&fc, Some(&value)),
            Recipient::Deliver(_)
        ));
    }

    #[test]
    fn missing_email_is_skipped() {
        assert!(matches!(
            resolve_recipient(&cipher(), None),
            Recipient::Skip(SkipReason::NoEmail)
        ));
    }

    #[test]
    fn corrupted_email_is_skipped_not_stringified() {
        let fc = cipher();
        let mut field = fc.encrypt("cliente@example.com").unwrap();
        field.tag = "00".repeat(16);
        let recipient = resolve_recipient(&fc, Some(&FieldValue::Encrypted(field)));
        match recipient {
            Recipient::Skip(SkipReason::Undecryptable(e)) => assert!(e.is_integrity()),
            other => panic!("expected undecryptable skip, got {other:?}"),
        }
    }

    #[test]
    fn email_from_other_key_is_skipped() {
        let other = FieldCipher::new(&CryptoConfig::from_keys(&[1u8; 32], None).unwrap()).unwrap();
        let value = other.encrypt_value("cliente@example.com").unwrap();
        assert!(resolve_recipient(&cipher(), Some(&value)).address().is_none());
    }

    #[test]
    fn invalid_address_is_skipped() {
        let fc = cipher();
        for bad in ["", "no-at-sign", "@example.com", "ana@", "a b@example.com"] {
            let value = fc.encrypt_value(bad).unwrap();
            assert!(matches!(
                resolve_recipient(&fc, Some(&value)),
                Recipient::Skip(SkipReason::InvalidAddress)
            ));
        }
    }

    #[test]
    fn skip_reason_display() {
        assert_eq!(SkipReason::NoEmail.to_string(), "no customer email");
        let reason = SkipReason::Undecryptable(CryptoError::Integrity);
        assert!(reason.to_string().contains("undecryptable"));
    }
}
