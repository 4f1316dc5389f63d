//! Checkout: turn an open cart into an order.
//!
//! [`plan_checkout`] is pure. The store locks the cart, the variants and the
//! promotion, calls it, then writes the plan inside one transaction.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use storefront_catalog::Variant;
use storefront_catalog::variant::DEFAULT_CURRENCY;
use storefront_core::{CategoryId, DomainError, DomainResult, Money, OrderId, OrderItemId, ValidationErrors, VariantId};
use storefront_inventory::{InventoryMovement, sale_movement};
use storefront_pricing::{PricedLine, PricingRule, Promotion, compute_discount};

use crate::order::PAYMENT_REF_MAX;
use crate::{Cart, Order, OrderItem, OrderNumber, OrderStatus};

pub const EMPTY_CART: &str = "Cart is empty.";
pub const PROMOTION_NOT_FOUND: &str = "Promotion not found or inactive.";
pub const TOTAL_OUT_OF_RANGE: &str = "Order total is out of range.";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutRequest {
    pub shipping_address: Option<Value>,
    /// Defaults to the shipping address.
    pub billing_address: Option<Value>,
    pub payment_ref: Option<String>,
    pub promotion_code: Option<String>,
    #[serde(default)]
    pub shipping_total: Money,
    #[serde(default)]
    pub tax_total: Money,
}

impl CheckoutRequest {
    pub fn validate(&self) -> DomainResult<()> {
        let mut errors = ValidationErrors::new();
        match &self.shipping_address {
            None | Some(Value::Null) => errors.add("shipping_address", "This field is required."),
            Some(v) if !v.is_object() => errors.add("shipping_address", "Expected a JSON object."),
            Some(_) => {}
        }
        errors.check(
            self.billing_address.as_ref().is_some_and(|v| !v.is_object() && !v.is_null()),
            "billing_address",
            "Expected a JSON object.",
        );
        errors.check(
            self.payment_ref.as_ref().is_some_and(|r| r.chars().count() > PAYMENT_REF_MAX),
            "payment_ref",
            format!("Ensure this field has no more than {PAYMENT_REF_MAX} characters."),
        );
        errors.check(
            self.shipping_total.is_negative(),
            "shipping_total",
            "Ensure this value is greater than or equal to 0.",
        );
        errors.check(self.tax_total.is_negative(), "tax_total", "Ensure this value is greater than or equal to 0.");
        errors.into_result()
    }

    /// Promotion code with blanks treated as absent.
    pub fn promotion_code(&self) -> Option<&str> {
        self.promotion_code.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }
}

/// A variant row locked for the duration of checkout, with the category of
/// its product for promotion scoping.
#[derive(Debug, Clone, PartialEq)]
pub struct LockedVariant {
    pub variant: Variant,
    pub category_id: CategoryId,
}

/// New stock level to write for one variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockChange {
    pub variant_id: VariantId,
    pub stock: i64,
}

/// Everything checkout writes.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutPlan {
    pub order: Order,
    pub stock: Vec<StockChange>,
    pub movements: Vec<InventoryMovement>,
    /// The promotion with its use recorded, when one was applied.
    pub promotion: Option<Promotion>,
}

/// Build the order, stock decrements and sale movements for `cart`.
///
/// `promotion` is the promotion (and its rule) found for
/// `request.promotion_code`, if any.
pub fn plan_checkout(
    cart: &Cart,
    variants: &HashMap<VariantId, LockedVariant>,
    request: &CheckoutRequest,
    promotion: Option<(&Promotion, &PricingRule)>,
    now: DateTime<Utc>,
) -> DomainResult<CheckoutPlan> {
    if cart.is_empty() {
        return Err(DomainError::rule(EMPTY_CART));
    }
    request.validate()?;

    let mut lines = Vec::with_capacity(cart.items.len());
    for item in &cart.items {
        let locked = variants
            .get(&item.variant_id)
            .ok_or_else(|| DomainError::not_found(format!("variant {}", item.variant_id)))?;
        let v = &locked.variant;
        if v.stock < item.qty {
            return Err(DomainError::rule(format!(
                "Insufficient stock for {}. Available: {}",
                v.sku, v.stock
            )));
        }
        lines.push((item, locked));
    }

    let currency = lines
        .first()
        .map(|(_, l)| l.variant.currency.clone())
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
    if lines.iter().any(|(_, l)| l.variant.currency != currency) {
        return Err(DomainError::rule("Cart contains items in more than one currency."));
    }

    let priced: Vec<PricedLine> = lines
        .iter()
        .map(|(item, l)| PricedLine {
            variant_id: item.variant_id,
            product_id: l.variant.product_id,
            category_id: l.category_id,
            unit_price: item.price_at_add,
            qty: item.qty,
        })
        .collect();
    let line_totals = priced
        .iter()
        .map(PricedLine::checked_line_total)
        .collect::<DomainResult<Vec<_>>>()?;
    let subtotal = Money::checked_sum(line_totals.iter().copied())?;

    let (discount_total, redeemed) = match (request.promotion_code(), promotion) {
        (None, _) => (Money::ZERO, None),
        (Some(_), None) => return Err(DomainError::field("promotion_code", PROMOTION_NOT_FOUND)),
        (Some(code), Some((promo, rule))) => {
            if !promo.matches_code(code) || promo.rule_id != rule.id {
                return Err(DomainError::field("promotion_code", PROMOTION_NOT_FOUND));
            }
            promo.ensure_usable(rule, now)?;
            let mut redeemed = promo.clone();
            redeemed.redeem()?;
            (compute_discount(rule, &priced), Some(redeemed))
        }
    };

    let grand_total = subtotal
        .checked_sub(discount_total)?
        .checked_add(request.shipping_total)
        .and_then(|t| t.checked_add(request.tax_total))
        .map_err(|_| DomainError::rule(TOTAL_OUT_OF_RANGE))?;

    let order_id = OrderId::new();
    let order_number = OrderNumber::generate();
    let shipping_address = request.shipping_address.clone().unwrap_or(Value::Null);
    let billing_address = match &request.billing_address {
        Some(v) if v.is_object() => v.clone(),
        _ => shipping_address.clone(),
    };

    let mut items = Vec::with_capacity(lines.len());
    let mut stock = Vec::with_capacity(lines.len());
    let mut movements = Vec::with_capacity(lines.len());
    for ((item, locked), line_total) in lines.iter().zip(line_totals) {
        items.push(OrderItem {
            id: OrderItemId::new(),
            order_id,
            variant_id: item.variant_id,
            qty: item.qty,
            unit_price: item.price_at_add,
            line_total,
        });
        stock.push(StockChange {
            variant_id: item.variant_id,
            stock: locked.variant.stock - item.qty,
        });
        movements.push(sale_movement(item.variant_id, item.qty, order_number.as_str(), now));
    }

    let order = Order {
        id: order_id,
        order_number,
        customer_id: cart.customer_id,
        status: OrderStatus::Pending,
        subtotal,
        discount_total,
        shipping_total: request.shipping_total,
        tax_total: request.tax_total,
        grand_total,
        currency,
        payment_ref: request.payment_ref.clone().filter(|r| !r.is_empty()),
        promotion_code: redeemed.as_ref().map(|p| p.code.clone()),
        shipping_address,
        billing_address,
        items,
        created_at: now,
        updated_at: now,
    };

    Ok(CheckoutPlan {
        order,
        stock,
        movements,
        promotion: redeemed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use storefront_core::{CustomerId, JsonObject, PricingRuleId, ProductId};
    use storefront_pricing::{PromotionDraft, RuleScope, RuleType};

    fn locked(stock: i64, price: i64) -> LockedVariant {
        LockedVariant {
            variant: Variant {
                id: VariantId::new(),
                product_id: ProductId::new(),
                sku: format!("SKU-{price}"),
                name: None,
                price: Money::from_minor(price),
                sale_price: None,
                currency: "USD".to_string(),
                stock,
                attributes: JsonObject::new(),
            },
            category_id: CategoryId::new(),
        }
    }

    fn request() -> CheckoutRequest {
        CheckoutRequest {
            shipping_address: Some(json!({"street": "123 Test St", "city": "Test City"})),
            ..CheckoutRequest::default()
        }
    }

    fn cart_with(lines: &[(&LockedVariant, i64)]) -> (Cart, HashMap<VariantId, LockedVariant>) {
        let mut cart = Cart::open(CustomerId::new(), Utc::now());
        let mut map = HashMap::new();
        for (l, qty) in lines {
            cart.add_item(&l.variant, *qty, Utc::now()).unwrap();
            map.insert(l.variant.id, (*l).clone());
        }
        (cart, map)
    }

    fn rule(value: i64) -> PricingRule {
        PricingRule {
            id: PricingRuleId::new(),
            name: "10% off".to_string(),
            rule_type: RuleType::Percentage,
            value,
            applies_to: RuleScope::default(),
            active: true,
            starts_at: None,
            ends_at: None,
        }
    }

    fn promotion(rule: &PricingRule, limit: Option<i64>) -> Promotion {
        Promotion::create(PromotionDraft {
            code: "SAVE10".to_string(),
            name: "Save".to_string(),
            description: None,
            rule: rule.id,
            active: true,
            usage_limit: limit,
        })
        .unwrap()
    }

    #[test]
    fn empty_cart_is_rejected() {
        let cart = Cart::open(CustomerId::new(), Utc::now());
        let err = plan_checkout(&cart, &HashMap::new(), &request(), None, Utc::now()).unwrap_err();
        assert_eq!(err.to_string(), EMPTY_CART);
    }

    #[test]
    fn shipping_address_is_required() {
        let v = locked(10, 2999);
        let (cart, map) = cart_with(&[(&v, 1)]);
        let err = plan_checkout(&cart, &map, &CheckoutRequest::default(), None, Utc::now()).unwrap_err();
        assert!(err.to_string().starts_with("shipping_address"));
    }

    #[test]
    fn builds_order_items_stock_and_movements() {
        let v = locked(10, 2999);
        let (cart, map) = cart_with(&[(&v, 2)]);
        let plan = plan_checkout(&cart, &map, &request(), None, Utc::now()).unwrap();

        assert_eq!(plan.order.subtotal, Money::from_minor(5998));
        assert_eq!(plan.order.grand_total, Money::from_minor(5998));
        assert_eq!(plan.order.status, OrderStatus::Pending);
        assert_eq!(plan.order.billing_address, plan.order.shipping_address);
        assert_eq!(plan.order.items.len(), 1);
        assert_eq!(plan.stock, vec![StockChange { variant_id: v.variant.id, stock: 8 }]);
        assert_eq!(plan.movements[0].change, -2);
        assert_eq!(
            plan.movements[0].metadata["order_number"],
            plan.order.order_number.as_str()
        );
    }

    #[test]
    fn stock_is_rechecked_at_checkout() {
        let mut v = locked(10, 1000);
        let (cart, mut map) = cart_with(&[(&v, 5)]);
        v.variant.stock = 3;
        map.insert(v.variant.id, v.clone());
        let err = plan_checkout(&cart, &map, &request(), None, Utc::now()).unwrap_err();
        assert_eq!(err.to_string(), "Insufficient stock for SKU-1000. Available: 3");
    }

    #[test]
    fn promotion_discounts_and_is_redeemed() {
        let v = locked(10, 2999);
        let (cart, map) = cart_with(&[(&v, 2)]);
        let rule = rule(1000);
        let promo = promotion(&rule, Some(1));
        let mut req = request();
        req.promotion_code = Some("save10".to_string());
        req.shipping_total = Money::from_minor(500);
        req.tax_total = Money::from_minor(100);

        let plan = plan_checkout(&cart, &map, &req, Some((&promo, &rule)), Utc::now()).unwrap();
        assert_eq!(plan.order.discount_total, Money::from_minor(600));
        assert_eq!(plan.order.grand_total, Money::from_minor(5998 - 600 + 500 + 100));
        assert_eq!(plan.order.promotion_code.as_deref(), Some("SAVE10"));
        let redeemed = plan.promotion.unwrap();
        assert_eq!(redeemed.used_count, 1);
        assert!(!redeemed.is_available());
    }

    #[test]
    fn exhausted_or_missing_promotion_fails() {
        let v = locked(10, 2999);
        let (cart, map) = cart_with(&[(&v, 1)]);
        let rule = rule(1000);
        let mut promo = promotion(&rule, Some(1));
        promo.used_count = 1;
        let mut req = request();
        req.promotion_code = Some("SAVE10".to_string());

        let err = plan_checkout(&cart, &map, &req, Some((&promo, &rule)), Utc::now()).unwrap_err();
        assert_eq!(err.to_string(), "This promotion is no longer available.");

        let err = plan_checkout(&cart, &map, &req, None, Utc::now()).unwrap_err();
        assert_eq!(err.to_string(), format!("promotion_code: {PROMOTION_NOT_FOUND}"));
    }

    #[test]
    fn oversized_shipping_or_tax_is_rejected() {
        let v = locked(10, 2999);
        let (cart, map) = cart_with(&[(&v, 1)]);

        let mut req = request();
        req.shipping_total = Money::from_minor(i64::MAX);
        let err = plan_checkout(&cart, &map, &req, None, Utc::now()).unwrap_err();
        assert_eq!(err.to_string(), TOTAL_OUT_OF_RANGE);

        let mut req = request();
        req.shipping_total = Money::from_minor(i64::MAX / 2);
        req.tax_total = Money::from_minor(i64::MAX / 2);
        let err = plan_checkout(&cart, &map, &req, None, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn oversized_line_total_is_rejected() {
        let v = locked(i64::MAX, i64::MAX / 2);
        let (mut cart, map) = cart_with(&[(&v, 1)]);
        cart.items[0].qty = 3;
        let err = plan_checkout(&cart, &map, &request(), None, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: for every line, new stock plus the sold quantity equals
        /// the stock before checkout, and the movements record exactly the
        /// sold quantities.
        #[test]
        fn checkout_conserves_stock(lines in prop::collection::vec((1i64..50i64, 1i64..20i64, 1i64..10_000i64), 1..6)) {
            let variants: Vec<_> = lines.iter().map(|&(stock, _, price)| locked(stock + 20, price)).collect();
            let pairs: Vec<_> = variants.iter().zip(&lines).map(|(v, &(_, qty, _))| (v, qty)).collect();
            let (cart, map) = cart_with(&pairs);

            let plan = plan_checkout(&cart, &map, &request(), None, Utc::now()).unwrap();
            for (change, movement) in plan.stock.iter().zip(&plan.movements) {
                let before = map[&change.variant_id].variant.stock;
                let item = cart.items.iter().find(|i| i.variant_id == change.variant_id).unwrap();
                prop_assert_eq!(change.stock + item.qty, before);
                prop_assert!(change.stock >= 0);
                prop_assert_eq!(movement.change, -item.qty);
            }
            let lines_total: Money = plan.order.items.iter().map(|i| i.line_total).sum();
            prop_assert_eq!(lines_total, plan.order.subtotal);
        }
    }
}
