//! Orders, their status lifecycle and payment confirmation.
//!
//! Customer name, email and phone are encrypted before an order reaches the
//! backend.
//! Transitions that should reach the customer return a [`Notification`].

use std::sync::Arc;

use beniken_crypto::{FieldCipher, FieldValue};
use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::notify::{Notification, NotificationKind};
use crate::storage::traits::{StorageBackend, StoredRecord};
use crate::types::{
    CustomerContact, NewOrder, OrderItem, OrderRecord, OrderStatus, PaymentStatus, ReceiptStatus,
    ReceiptValidation, DEFAULT_PAYMENT_METHOD, ORDERS,
};

/// Result of a transition that may or may not notify the customer.
#[derive(Debug)]
pub struct Transition {
    pub order: OrderRecord,
    pub notification: Option<Notification>,
}

pub struct OrderBook<B: StorageBackend> {
    backend: Arc<B>,
    cipher: FieldCipher,
}

impl<B: StorageBackend> OrderBook<B> {
    pub fn new(backend: Arc<B>, cipher: FieldCipher) -> Self {
        Self { backend, cipher }
    }

    /// Store a new order and produce its confirmation notice.
    ///
    /// Items must have a finite, non-negative quantity. Fails with
    /// [`StoreError::DuplicateOrderNumber`] if the number is taken, including
    /// by a concurrent `create`.
    pub fn create(&self, new: NewOrder) -> Result<(OrderRecord, Notification)> {
        let total = order_total(&new.items)?;
        let order_number = match new.order_number {
            Some(n) if !n.trim().is_empty() => n.trim().to_string(),
            _ => generate_order_number(),
        };

        let customer_name = self.encrypt_optional(new.customer_name.as_deref().map(str::trim))?;
        let customer_email = self.encrypt_optional(
            new.customer_email
                .as_deref()
                .map(|s| s.trim().to_lowercase())
                .as_deref(),
        )?;
        let customer_phone = self.encrypt_optional(new.customer_phone.as_deref().map(str::trim))?;

        let order = OrderRecord {
            id: Uuid::new_v4().to_string(),
            order_number,
            customer_name,
            customer_email,
            customer_phone,
            pickup_time: new.pickup_time,
            note: new.note,
            total,
            items: new.items,
            status: new
                .status
                .as_deref()
                .map(OrderStatus::normalize)
                .unwrap_or_default(),
            payment_method: new.payment_method,
            payment_status: PaymentStatus::Pending,
            paid_at: None,
            receipt: None,
            reviewed: false,
            created_at: Utc::now(),
        };
        match self.backend.insert(&stored(&order)?) {
            Err(StoreError::LookupConflict { .. }) => {
                return Err(StoreError::DuplicateOrderNumber(order.order_number));
            }
            other => other?,
        }
        info!(order_id = %order.id, order_number = %order.order_number, total = order.total, "order created");

        let notification =
            Notification::for_order(&self.cipher, NotificationKind::OrderConfirmation, &order);
        Ok((order, notification))
    }

    pub fn get(&self, id: &str) -> Result<Option<OrderRecord>> {
        self.backend
            .get(ORDERS, id)?
            .map(|r| serde_json::from_value(r.body).map_err(StoreError::from))
            .transpose()
    }

    pub fn find_by_number(&self, order_number: &str) -> Result<Option<OrderRecord>> {
        self.backend
            .find_by_lookup(ORDERS, order_number.trim())?
            .map(|r| serde_json::from_value(r.body).map_err(StoreError::from))
            .transpose()
    }

    /// All orders, newest first.
    pub fn list(&self) -> Result<Vec<OrderRecord>> {
        let mut orders = self
            .backend
            .scan(ORDERS)?
            .into_iter()
            .map(|r| serde_json::from_value(r.body).map_err(StoreError::from))
            .collect::<Result<Vec<OrderRecord>>>()?;
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        if !self.backend.delete(ORDERS, id)? {
            return Err(StoreError::not_found(ORDERS, id));
        }
        info!(order_id = %id, "order deleted");
        Ok(())
    }

    /// Move an order to a new status.
    ///
    /// The status text is normalized first. A payment method, if given,
    /// replaces the stored one. Only customer-facing statuses notify.
    pub fn update_status(
        &self,
        id: &str,
        status: &str,
        payment_method: Option<&str>,
    ) -> Result<Transition> {
        let mut order = self.require(id)?;
        let status = OrderStatus::normalize(status);
        order.status = status;
        if let Some(method) = payment_method {
            order.payment_method = Some(method.to_string());
        }
        self.save(&order)?;
        debug!(order_id = %order.id, %status, "order status updated");

        let notification = status.notifies_customer().then(|| {
            Notification::for_order(&self.cipher, NotificationKind::StatusUpdate(status), &order)
        });
        Ok(Transition {
            order,
            notification,
        })
    }

    /// Mark an order as paid.
    ///
    /// A `Pendiente` order becomes `Confirmado`; later statuses are kept. The
    /// payment method is always recorded, `transfer` when none is given.
    pub fn confirm_payment(&self, id: &str, payment_method: Option<&str>) -> Result<Transition> {
        let mut order = self.require(id)?;
        mark_paid(&mut order);
        order.payment_method = Some(payment_method.unwrap_or(DEFAULT_PAYMENT_METHOD).to_string());
        self.save(&order)?;
        info!(order_id = %order.id, status = %order.status, "payment confirmed");

        let notification =
            Notification::for_order(&self.cipher, NotificationKind::PaymentConfirmation, &order);
        Ok(Transition {
            order,
            notification: Some(notification),
        })
    }

    /// Record staff review of a transfer receipt.
    ///
    /// Approval confirms the payment and notifies; rejection only records the
    /// review.
    pub fn validate_receipt(&self, id: &str, approved: bool, admin_notes: &str) -> Result<Transition> {
        let mut order = self.require(id)?;
        order.receipt = Some(ReceiptValidation {
            status: if approved {
                ReceiptStatus::Approved
            } else {
                ReceiptStatus::Rejected
            },
            validated_at: Utc::now(),
            admin_notes: admin_notes.to_string(),
        });
        order.reviewed = true;
        if approved {
            mark_paid(&mut order);
        }
        self.save(&order)?;
        info!(order_id = %order.id, approved, "receipt validated");

        let notification = approved.then(|| {
            Notification::for_order(&self.cipher, NotificationKind::PaymentConfirmation, &order)
        });
        Ok(Transition {
            order,
            notification,
        })
    }

    /// Decrypt the customer's name, email and phone on an order.
    ///
    /// Absent fields come back empty.
    pub fn customer_contact(&self, order: &OrderRecord) -> Result<CustomerContact> {
        let reveal = |field: Option<&FieldValue>| -> Result<String> {
            match field {
                Some(value) => Ok(self.cipher.reveal(value)?),
                None => Ok(String::new()),
            }
        };
        Ok(CustomerContact {
            name: reveal(order.customer_name.as_ref())?,
            email: reveal(order.customer_email.as_ref())?,
            phone: reveal(order.customer_phone.as_ref())?,
        })
    }

    fn encrypt_optional(&self, value: Option<&str>) -> Result<Option<FieldValue>> {
        Ok(value
            .filter(|s| !s.is_empty())
            .map(|s| self.cipher.encrypt_value(s))
            .transpose()?)
    }

    fn require(&self, id: &str) -> Result<OrderRecord> {
        self.get(id)?.ok_or_else(|| StoreError::not_found(ORDERS, id))
    }

    fn save(&self, order: &OrderRecord) -> Result<()> {
        self.backend.put(&stored(order)?)
    }
}

fn stored(order: &OrderRecord) -> Result<StoredRecord> {
    Ok(StoredRecord {
        collection: ORDERS.to_string(),
        id: order.id.clone(),
        lookup_key: Some(order.order_number.clone()),
        body: serde_json::to_value(order)?,
    })
}

/// Sum of item subtotals, rejecting unusable quantities and overflow.
fn order_total(items: &[OrderItem]) -> Result<u64> {
    items.iter().try_fold(0u64, |total, item| {
        let subtotal = item.subtotal().ok_or_else(|| StoreError::InvalidItem {
            product: item.product.clone(),
            reason: "quantity must be a finite, non-negative number within range",
        })?;
        total.checked_add(subtotal).ok_or(StoreError::TotalOverflow)
    })
}

fn mark_paid(order: &mut OrderRecord) {
    order.payment_status = PaymentStatus::Paid;
    order.paid_at = Some(Utc::now());
    if order.status == OrderStatus::Pendiente {
        order.status = OrderStatus::Confirmado;
    }
}

/// Order numbers look like `BNK-20261017-1A2B3C`.
fn generate_order_number() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "BNK-{}-{}",
        Utc::now().format("%Y%m%d"),
        suffix[..6].to_uppercase()
    )
}
