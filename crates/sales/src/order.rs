use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use storefront_core::{
    CustomerId, DomainError, DomainResult, Entity, Money, OrderId, OrderItemId, Ordering, VariantId, nullable,
};

pub const PAYMENT_REF_MAX: usize = 80;

/// Order status lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Paid,
    Fulfilled,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Fulfilled => "fulfilled",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "fulfilled" => Ok(Self::Fulfilled),
            "cancelled" => Ok(Self::Cancelled),
            "refunded" => Ok(Self::Refunded),
            other => Err(DomainError::field("status", format!("\"{other}\" is not a valid choice."))),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Refunded)
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Paid) | (Pending, Cancelled) | (Paid, Fulfilled) | (Paid, Refunded) | (Paid, Cancelled)
                | (Fulfilled, Refunded)
        )
    }
}

/// Human-facing order reference: `ORD-` followed by 8 uppercase hex digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    pub fn generate() -> Self {
        let hex = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("ORD-{}", hex[..8].to_uppercase()))
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    #[serde(rename = "order")]
    pub order_id: OrderId,
    #[serde(rename = "variant")]
    pub variant_id: VariantId,
    pub qty: i64,
    pub unit_price: Money,
    pub line_total: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: OrderNumber,
    #[serde(rename = "customer")]
    pub customer_id: Option<CustomerId>,
    pub status: OrderStatus,
    pub subtotal: Money,
    pub discount_total: Money,
    pub shipping_total: Money,
    pub tax_total: Money,
    pub grand_total: Money,
    pub currency: String,
    pub payment_ref: Option<String>,
    pub promotion_code: Option<String>,
    pub shipping_address: Value,
    pub billing_address: Value,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> OrderId {
        self.id
    }
}

impl Order {
    /// Move to `next`; re-setting the current status is a no-op.
    pub fn transition(&mut self, next: OrderStatus, now: DateTime<Utc>) -> DomainResult<()> {
        if next == self.status {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(DomainError::field(
                "status",
                format!(
                    "Cannot change order status from {} to {}.",
                    self.status.as_str(),
                    next.as_str()
                ),
            ));
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    pub fn apply(&mut self, patch: OrderPatch, now: DateTime<Utc>) -> DomainResult<()> {
        if let Some(Some(r)) = &patch.payment_ref {
            if r.chars().count() > PAYMENT_REF_MAX {
                return Err(DomainError::field(
                    "payment_ref",
                    format!("Ensure this field has no more than {PAYMENT_REF_MAX} characters."),
                ));
            }
        }
        for (field, value) in [
            ("shipping_address", &patch.shipping_address),
            ("billing_address", &patch.billing_address),
        ] {
            if value.as_ref().is_some_and(|v| !v.is_object()) {
                return Err(DomainError::field(field, "Expected a JSON object."));
            }
        }

        if let Some(status) = patch.status {
            self.transition(status, now)?;
        }
        if let Some(r) = patch.payment_ref {
            self.payment_ref = r;
        }
        if let Some(a) = patch.shipping_address {
            self.shipping_address = a;
        }
        if let Some(a) = patch.billing_address {
            self.billing_address = a;
        }
        self.updated_at = now;
        Ok(())
    }
}

/// Staff edits to an order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    #[serde(default, deserialize_with = "nullable")]
    pub payment_ref: Option<Option<String>>,
    pub shipping_address: Option<Value>,
    pub billing_address: Option<Value>,
}

/// Order plus the customer's display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub customer_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    /// Restrict to one customer's orders; `None` means all (staff).
    pub customer: Option<CustomerId>,
    pub status: Option<OrderStatus>,
}

impl OrderFilter {
    pub fn matches(&self, o: &Order) -> bool {
        self.customer.is_none_or(|c| o.customer_id == Some(c)) && self.status.is_none_or(|s| s == o.status)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OrderSort {
    CreatedAt,
    GrandTotal,
}

impl OrderSort {
    pub fn lookup(name: &str) -> Option<Self> {
        match name {
            "created_at" => Some(Self::CreatedAt),
            "grand_total" => Some(Self::GrandTotal),
            _ => None,
        }
    }

    pub fn default_ordering() -> Ordering<Self> {
        Ordering::desc(Self::CreatedAt)
    }

    pub fn compare(ordering: &Ordering<Self>, a: &Order, b: &Order) -> core::cmp::Ordering {
        let ord = match ordering.field {
            Self::CreatedAt => a.created_at.cmp(&b.created_at),
            Self::GrandTotal => a.grand_total.cmp(&b.grand_total),
        };
        ordering.apply(ord.then_with(|| a.id.cmp(&b.id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(status: OrderStatus) -> Order {
        let now = Utc::now();
        Order {
            id: OrderId::new(),
            order_number: OrderNumber::generate(),
            customer_id: None,
            status,
            subtotal: Money::from_minor(1000),
            discount_total: Money::ZERO,
            shipping_total: Money::ZERO,
            tax_total: Money::ZERO,
            grand_total: Money::from_minor(1000),
            currency: "USD".to_string(),
            payment_ref: None,
            promotion_code: None,
            shipping_address: serde_json::json!({}),
            billing_address: serde_json::json!({}),
            items: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn order_number_format() {
        let n = OrderNumber::generate();
        let s = n.as_str();
        assert_eq!(s.len(), 12);
        assert!(s.starts_with("ORD-"));
        assert!(s[4..].chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    }

    #[test]
    fn allowed_transitions() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Paid));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Paid.can_transition_to(Fulfilled));
        assert!(Paid.can_transition_to(Refunded));
        assert!(Fulfilled.can_transition_to(Refunded));

        assert!(!Pending.can_transition_to(Fulfilled));
        assert!(!Fulfilled.can_transition_to(Cancelled));
        for next in [Pending, Paid, Fulfilled] {
            assert!(!Cancelled.can_transition_to(next));
            assert!(!Refunded.can_transition_to(next));
        }
    }

    #[test]
    fn terminal_orders_reject_changes() {
        let mut o = order(OrderStatus::Cancelled);
        let err = o.transition(OrderStatus::Paid, Utc::now()).unwrap_err();
        assert_eq!(err.to_string(), "status: Cannot change order status from cancelled to paid.");
        assert!(o.transition(OrderStatus::Cancelled, Utc::now()).is_ok());
    }

    #[test]
    fn patch_updates_status_and_payment_ref() {
        let mut o = order(OrderStatus::Pending);
        let patch: OrderPatch =
            serde_json::from_value(serde_json::json!({"status": "paid", "payment_ref": "pi_123"})).unwrap();
        o.apply(patch, Utc::now()).unwrap();
        assert_eq!(o.status, OrderStatus::Paid);
        assert_eq!(o.payment_ref.as_deref(), Some("pi_123"));
    }

    #[test]
    fn patch_rejects_non_object_address() {
        let mut o = order(OrderStatus::Pending);
        let patch = OrderPatch {
            shipping_address: Some(serde_json::json!("street")),
            ..OrderPatch::default()
        };
        assert!(o.apply(patch, Utc::now()).is_err());
        assert_eq!(o.status, OrderStatus::Pending);
    }
}
