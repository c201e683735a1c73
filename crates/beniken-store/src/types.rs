use std::fmt;

use beniken_crypto::FieldValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Collection holding customer and staff accounts.
pub const USERS: &str = "users";

/// Collection holding orders.
pub const ORDERS: &str = "orders";

/// A customer becomes frequent once they reach this many purchases.
pub const FREQUENT_PURCHASE_THRESHOLD: u32 = 2;

/// Payment method recorded when a payment is confirmed without one.
pub const DEFAULT_PAYMENT_METHOD: &str = "transfer";

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[serde(rename = "cliente")]
    Customer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub name: FieldValue,
    pub email: FieldValue,
    /// Lookup hash of the normalized name.
    pub name_hash: String,
    /// Lookup hash of the normalized email; the deduplication key.
    pub email_hash: String,
    pub role: Role,
    pub purchases: u32,
    pub is_frequent: bool,
    pub created_at: DateTime<Utc>,
}

/// Decrypted contact details of a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub name: String,
    pub email: String,
}

/// Decrypted customer details of an order. Absent fields are empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerContact {
    pub name: String,
    pub email: String,
    pub phone: String,
}

// ============================================================================
// Orders
// ============================================================================

/// Lifecycle of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OrderStatus {
    #[default]
    #[serde(rename = "Pendiente")]
    Pendiente,
    #[serde(rename = "Pendiente pago")]
    PendientePago,
    #[serde(rename = "Confirmado")]
    Confirmado,
    #[serde(rename = "En preparación")]
    EnPreparacion,
    #[serde(rename = "Listo")]
    Listo,
    #[serde(rename = "Entregado")]
    Entregado,
}

impl OrderStatus {
    /// Map free-form status text onto a known status.
    ///
    /// Matching is case-insensitive and by substring, "pendiente pago" before
    /// "pendiente". Unknown or empty input is `Pendiente`.
    pub fn normalize(input: &str) -> Self {
        let s = input.trim().to_lowercase();
        if s.contains("pendiente pago") {
            Self::PendientePago
        } else if s.contains("pendiente") {
            Self::Pendiente
        } else if s.contains("confirmado") {
            Self::Confirmado
        } else if s.contains("preparacion") || s.contains("preparación") {
            Self::EnPreparacion
        } else if s.contains("listo") {
            Self::Listo
        } else if s.contains("entregado") {
            Self::Entregado
        } else {
            Self::Pendiente
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pendiente => "Pendiente",
            Self::PendientePago => "Pendiente pago",
            Self::Confirmado => "Confirmado",
            Self::EnPreparacion => "En preparación",
            Self::Listo => "Listo",
            Self::Entregado => "Entregado",
        }
    }

    /// Whether moving into this status sends the customer an update.
    pub fn notifies_customer(&self) -> bool {
        matches!(
            self,
            Self::EnPreparacion | Self::Listo | Self::PendientePago | Self::Entregado
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Approved,
    Rejected,
}

/// Staff review of a bank-transfer receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptValidation {
    pub status: ReceiptStatus,
    pub validated_at: DateTime<Utc>,
    pub admin_notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product: String,
    /// Kilograms or units, depending on the product.
    pub quantity: f64,
    /// Unit of `quantity`, e.g. `kg`.
    pub unit: Option<String>,
    /// Price per unit of `quantity`, in pesos.
    pub unit_price: u64,
}

impl OrderItem {
    /// Rounded line total in pesos.
    ///
    /// `None` when the quantity is negative or not finite, or the result does
    /// not fit in a `u64`.
    pub fn subtotal(&self) -> Option<u64> {
        if !self.quantity.is_finite() || self.quantity < 0.0 {
            return None;
        }
        let total = (self.quantity * self.unit_price as f64).round();
        // u64::MAX rounds up to 2^64 as f64, so `<` keeps the cast exact.
        (total < u64::MAX as f64).then_some(total as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: String,
    pub order_number: String,
    pub customer_name: Option<FieldValue>,
    pub customer_email: Option<FieldValue>,
    pub customer_phone: Option<FieldValue>,
    /// Requested pickup time as entered, e.g. `15:30`.
    pub pickup_time: Option<String>,
    pub note: Option<String>,
    pub items: Vec<OrderItem>,
    pub total: u64,
    pub status: OrderStatus,
    pub payment_method: Option<String>,
    pub payment_status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub receipt: Option<ReceiptValidation>,
    pub reviewed: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for creating an order. Customer fields arrive in plaintext.
#[derive(Debug, Clone, Default)]
pub struct NewOrder {
    /// Generated when absent.
    pub order_number: Option<String>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub pickup_time: Option<String>,
    pub note: Option<String>,
    pub items: Vec<OrderItem>,
    /// Free-form status text, normalized on write.
    pub status: Option<String>,
    pub payment_method: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_known_statuses() {
        assert_eq!(OrderStatus::normalize("Pendiente"), OrderStatus::Pendiente);
        assert_eq!(
            OrderStatus::normalize("PENDIENTE PAGO"),
            OrderStatus::PendientePago
        );
        assert_eq!(
            OrderStatus::normalize("en preparacion"),
            OrderStatus::EnPreparacion
        );
        assert_eq!(
            OrderStatus::normalize("En preparación"),
            OrderStatus::EnPreparacion
        );
        assert_eq!(OrderStatus::normalize("Listo"), OrderStatus::Listo);
        assert_eq!(OrderStatus::normalize(" entregado "), OrderStatus::Entregado);
        assert_eq!(OrderStatus::normalize("Confirmado"), OrderStatus::Confirmado);
    }

    #[test]
    fn normalize_falls_back_to_pendiente() {
        assert_eq!(OrderStatus::normalize(""), OrderStatus::Pendiente);
        assert_eq!(OrderStatus::normalize("cancelado"), OrderStatus::Pendiente);
    }

    #[test]
    fn normalize_is_idempotent_over_labels() {
        for status in [
            OrderStatus::Pendiente,
            OrderStatus::PendientePago,
            OrderStatus::Confirmado,
            OrderStatus::EnPreparacion,
            OrderStatus::Listo,
            OrderStatus::Entregado,
        ] {
            assert_eq!(OrderStatus::normalize(status.label()), status);
        }
    }

    #[test]
    fn status_serializes_as_label() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::EnPreparacion).unwrap(),
            "\"En preparación\""
        );
    }

    #[test]
    fn notifying_statuses() {
        assert!(OrderStatus::Listo.notifies_customer());
        assert!(OrderStatus::PendientePago.notifies_customer());
        assert!(!OrderStatus::Pendiente.notifies_customer());
        assert!(!OrderStatus::Confirmado.notifies_customer());
    }

    #[test]
    fn subtotal_rounds() {
        let item = OrderItem {
            product: "Lomo vetado".into(),
            quantity: 1.25,
            unit: Some("kg".into()),
            unit_price: 15990,
        };
        assert_eq!(item.subtotal(), Some(19988));
    }

    #[test]
    fn subtotal_rejects_unusable_quantities() {
        let item = |quantity: f64| OrderItem {
            product: "Chorizo".into(),
            quantity,
            unit: None,
            unit_price: 1000,
        };
        assert_eq!(item(f64::NAN).subtotal(), None);
        assert_eq!(item(f64::INFINITY).subtotal(), None);
        assert_eq!(item(-1.0).subtotal(), None);
        assert_eq!(item(1e20).subtotal(), None);
        assert_eq!(item(0.0).subtotal(), Some(0));
    }

    #[test]
    fn item_without_unit_deserializes() {
        let item: OrderItem = serde_json::from_value(serde_json::json!({
            "product": "Asado de tira",
            "quantity": 1.5,
            "unit_price": 10000
        }))
        .unwrap();
        assert_eq!(item.unit, None);
        assert_eq!(item.subtotal(), Some(15000));
    }

    #[test]
    fn role_serialization() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        assert_eq!(serde_json::to_string(&Role::Customer).unwrap(), "\"cliente\"");
    }
}
