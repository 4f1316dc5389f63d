use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::{DomainError, DomainResult, Entity, JsonObject, MovementId, VariantId};

/// Why stock changed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementReason {
    Sale,
    Refund,
    Adjustment,
    Supplier,
}

impl MovementReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sale => "sale",
            Self::Refund => "refund",
            Self::Adjustment => "adjustment",
            Self::Supplier => "supplier",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "sale" => Ok(Self::Sale),
            "refund" => Ok(Self::Refund),
            "adjustment" => Ok(Self::Adjustment),
            "supplier" => Ok(Self::Supplier),
            other => Err(DomainError::field("reason", format!("\"{other}\" is not a valid choice."))),
        }
    }
}

/// Audit record of a stock change: positive is inbound, negative outbound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryMovement {
    pub id: MovementId,
    #[serde(rename = "variant")]
    pub variant_id: VariantId,
    pub change: i64,
    pub reason: MovementReason,
    pub metadata: JsonObject,
    pub created_at: DateTime<Utc>,
}

impl Entity for InventoryMovement {
    type Id = MovementId;

    fn id(&self) -> MovementId {
        self.id
    }
}

/// Manual movement submitted by staff.
#[derive(Debug, Clone, Deserialize)]
pub struct MovementDraft {
    pub variant: VariantId,
    pub change: i64,
    pub reason: MovementReason,
    #[serde(default)]
    pub metadata: JsonObject,
}

impl MovementDraft {
    pub fn validate(&self) -> DomainResult<()> {
        if self.change == 0 {
            return Err(DomainError::field("change", "change cannot be zero"));
        }
        Ok(())
    }

    pub fn into_movement(self, now: DateTime<Utc>) -> DomainResult<InventoryMovement> {
        self.validate()?;
        Ok(InventoryMovement {
            id: MovementId::new(),
            variant_id: self.variant,
            change: self.change,
            reason: self.reason,
            metadata: self.metadata,
            created_at: now,
        })
    }
}

/// New stock level after `change`; stock may not go negative.
pub fn apply_to_stock(stock: i64, change: i64) -> DomainResult<i64> {
    let next = stock
        .checked_add(change)
        .ok_or_else(|| DomainError::field("change", "change is out of range"))?;
    if next < 0 {
        return Err(DomainError::field(
            "change",
            format!("Insufficient stock. Available: {stock}"),
        ));
    }
    Ok(next)
}

/// Outbound movement recorded when an order consumes `qty` units.
pub fn sale_movement(
    variant_id: VariantId,
    qty: i64,
    order_number: &str,
    now: DateTime<Utc>,
) -> InventoryMovement {
    let mut metadata = JsonObject::new();
    metadata.insert("order_number".to_string(), order_number.into());
    InventoryMovement {
        id: MovementId::new(),
        variant_id,
        change: -qty,
        reason: MovementReason::Sale,
        metadata,
        created_at: now,
    }
}

/// Movement plus the variant's SKU.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovementView {
    #[serde(flatten)]
    pub movement: InventoryMovement,
    pub variant_sku: String,
}

#[derive(Debug, Clone, Default)]
pub struct MovementFilter {
    pub variant: Option<VariantId>,
    pub reason: Option<MovementReason>,
}

impl MovementFilter {
    pub fn matches(&self, m: &InventoryMovement) -> bool {
        self.variant.is_none_or(|v| v == m.variant_id) && self.reason.is_none_or(|r| r == m.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zero_change_is_rejected() {
        let draft = MovementDraft {
            variant: VariantId::new(),
            change: 0,
            reason: MovementReason::Adjustment,
            metadata: JsonObject::new(),
        };
        assert!(draft.into_movement(Utc::now()).is_err());
    }

    #[test]
    fn stock_cannot_go_negative() {
        assert_eq!(apply_to_stock(10, -4).unwrap(), 6);
        assert_eq!(apply_to_stock(0, 25).unwrap(), 25);
        let err = apply_to_stock(3, -4).unwrap_err();
        assert_eq!(err.to_string(), "change: Insufficient stock. Available: 3");
    }

    #[test]
    fn sale_movement_records_order_number() {
        let m = sale_movement(VariantId::new(), 2, "ORD-ABCDEF12", Utc::now());
        assert_eq!(m.change, -2);
        assert_eq!(m.reason, MovementReason::Sale);
        assert_eq!(m.metadata["order_number"], "ORD-ABCDEF12");
    }

    #[test]
    fn reason_parses_lowercase_names() {
        assert_eq!(MovementReason::parse("supplier").unwrap(), MovementReason::Supplier);
        assert!(MovementReason::parse("theft").is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: applying a sequence of changes never yields negative stock,
        /// and accepted changes sum to the final level.
        #[test]
        fn accepted_changes_sum_to_stock(changes in prop::collection::vec(-50i64..50i64, 0..40)) {
            let mut stock = 0i64;
            let mut accepted = 0i64;
            for change in changes {
                if let Ok(next) = apply_to_stock(stock, change) {
                    stock = next;
                    accepted += change;
                }
                prop_assert!(stock >= 0);
            }
            prop_assert_eq!(stock, accepted);
        }
    }
}
