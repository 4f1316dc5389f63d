use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_catalog::{Variant, VariantView};
use storefront_core::{
    CartId, CartItemId, CustomerId, DomainError, DomainResult, Entity, Money, VariantId,
};

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CartStatus {
    #[default]
    Open,
    Converted,
    Abandoned,
}

impl CartStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Converted => "converted",
            Self::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "open" => Ok(Self::Open),
            "converted" => Ok(Self::Converted),
            "abandoned" => Ok(Self::Abandoned),
            other => Err(DomainError::field("status", format!("\"{other}\" is not a valid choice."))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    #[serde(rename = "cart")]
    pub cart_id: CartId,
    #[serde(rename = "variant")]
    pub variant_id: VariantId,
    pub qty: i64,
    /// Unit price captured when the variant was first added.
    pub price_at_add: Money,
}

impl CartItem {
    pub fn line_total(&self) -> Money {
        self.price_at_add.times(self.qty)
    }
}

/// Shopping cart with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    #[serde(rename = "customer")]
    pub customer_id: Option<CustomerId>,
    pub status: CartStatus,
    pub items: Vec<CartItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Cart {
    type Id = CartId;

    fn id(&self) -> CartId {
        self.id
    }
}

pub const QTY_OUT_OF_RANGE: &str = "Ensure the quantity fits the cart limits.";

fn check_qty(qty: i64) -> DomainResult<()> {
    if qty < 1 {
        return Err(DomainError::field("qty", "Ensure this value is greater than or equal to 1."));
    }
    Ok(())
}

fn qty_out_of_range(_: DomainError) -> DomainError {
    DomainError::field("qty", QTY_OUT_OF_RANGE)
}

impl Cart {
    pub fn open(customer_id: CustomerId, now: DateTime<Utc>) -> Self {
        Self {
            id: CartId::new(),
            customer_id: Some(customer_id),
            status: CartStatus::Open,
            items: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn total(&self) -> Money {
        self.items.iter().map(CartItem::line_total).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self, item_id: CartItemId) -> Option<&CartItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    /// Checks that the cart total still fits a `Money` once the line at
    /// `replacing` (or a new line) holds `qty` at `unit_price`.
    fn check_totals(&self, replacing: Option<usize>, unit_price: Money, qty: i64) -> DomainResult<()> {
        let line = unit_price.checked_mul(qty).map_err(qty_out_of_range)?;
        self.items
            .iter()
            .enumerate()
            .filter(|(idx, _)| Some(*idx) != replacing)
            .try_fold(line, |acc, (_, item)| acc.checked_add(item.line_total()))
            .map(|_| ())
            .map_err(qty_out_of_range)
    }

    fn ensure_open(&self) -> DomainResult<()> {
        if self.status != CartStatus::Open {
            return Err(DomainError::rule(format!("Cart is {}.", self.status.as_str())));
        }
        Ok(())
    }

    /// Add `qty` of `variant`, merging into an existing line for the same
    /// variant. The merged quantity must fit in the variant's stock.
    pub fn add_item(&mut self, variant: &Variant, qty: i64, now: DateTime<Utc>) -> DomainResult<CartItem> {
        self.ensure_open()?;
        check_qty(qty)?;

        let existing = self.items.iter().position(|i| i.variant_id == variant.id);
        let total_qty = existing
            .map(|idx| self.items[idx].qty)
            .unwrap_or(0)
            .checked_add(qty)
            .ok_or_else(|| DomainError::field("qty", QTY_OUT_OF_RANGE))?;
        if variant.stock < total_qty {
            return Err(DomainError::rule(format!(
                "Insufficient stock. Available: {}, requested total: {}",
                variant.stock, total_qty
            )));
        }
        let unit_price = existing
            .map(|idx| self.items[idx].price_at_add)
            .unwrap_or_else(|| variant.effective_price());
        self.check_totals(existing, unit_price, total_qty)?;

        let item = match existing {
            Some(idx) => {
                self.items[idx].qty = total_qty;
                self.items[idx].clone()
            }
            None => {
                let item = CartItem {
                    id: CartItemId::new(),
                    cart_id: self.id,
                    variant_id: variant.id,
                    qty,
                    price_at_add: variant.effective_price(),
                };
                self.items.push(item.clone());
                item
            }
        };
        self.updated_at = now;
        Ok(item)
    }

    pub fn update_item_qty(
        &mut self,
        item_id: CartItemId,
        qty: i64,
        variant: &Variant,
        now: DateTime<Utc>,
    ) -> DomainResult<CartItem> {
        self.ensure_open()?;
        check_qty(qty)?;
        let idx = self
            .items
            .iter()
            .position(|i| i.id == item_id)
            .ok_or_else(|| DomainError::not_found("cart item"))?;
        if variant.stock < qty {
            return Err(DomainError::rule(format!("Insufficient stock. Available: {}", variant.stock)));
        }
        self.check_totals(Some(idx), self.items[idx].price_at_add, qty)?;
        let item = &mut self.items[idx];
        item.qty = qty;
        let item = item.clone();
        self.updated_at = now;
        Ok(item)
    }

    pub fn remove_item(&mut self, item_id: CartItemId, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_open()?;
        let before = self.items.len();
        self.items.retain(|i| i.id != item_id);
        if self.items.len() == before {
            return Err(DomainError::not_found("cart item"));
        }
        self.updated_at = now;
        Ok(())
    }
}

/// Cart line with the variant inlined and the line total computed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartItemView {
    #[serde(flatten)]
    pub item: CartItem,
    pub variant_details: Option<VariantView>,
    pub line_total: Money,
}

impl CartItemView {
    pub fn new(item: CartItem, variant: Option<Variant>) -> Self {
        let line_total = item.line_total();
        Self {
            item,
            variant_details: variant.map(VariantView::from),
            line_total,
        }
    }
}

/// API shape of a cart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartView {
    pub id: CartId,
    pub customer: Option<CustomerId>,
    pub status: CartStatus,
    pub items: Vec<CartItemView>,
    pub total: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartView {
    /// `lookup` resolves the current variant row for each line.
    pub fn new(cart: Cart, mut lookup: impl FnMut(VariantId) -> Option<Variant>) -> Self {
        let total = cart.total();
        Self {
            id: cart.id,
            customer: cart.customer_id,
            status: cart.status,
            items: cart
                .items
                .into_iter()
                .map(|item| {
                    let variant = lookup(item.variant_id);
                    CartItemView::new(item, variant)
                })
                .collect(),
            total,
            created_at: cart.created_at,
            updated_at: cart.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storefront_core::{JsonObject, ProductId};

    fn variant(stock: i64, price: i64, sale: Option<i64>) -> Variant {
        Variant {
            id: VariantId::new(),
            product_id: ProductId::new(),
            sku: "TEST-001".to_string(),
            name: None,
            price: Money::from_minor(price),
            sale_price: sale.map(Money::from_minor),
            currency: "USD".to_string(),
            stock,
            attributes: JsonObject::new(),
        }
    }

    #[test]
    fn add_item_captures_effective_price() {
        let mut cart = Cart::open(CustomerId::new(), Utc::now());
        let v = variant(10, 2999, Some(2499));
        let item = cart.add_item(&v, 2, Utc::now()).unwrap();
        assert_eq!(item.price_at_add, Money::from_minor(2499));
        assert_eq!(cart.total(), Money::from_minor(4998));
    }

    #[test]
    fn adding_same_variant_merges_lines() {
        let mut cart = Cart::open(CustomerId::new(), Utc::now());
        let v = variant(10, 1000, None);
        let first = cart.add_item(&v, 2, Utc::now()).unwrap();
        let second = cart.add_item(&v, 3, Utc::now()).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.qty, 5);
        assert_eq!(cart.items.len(), 1);
    }

    #[test]
    fn merged_quantity_is_checked_against_stock() {
        let mut cart = Cart::open(CustomerId::new(), Utc::now());
        let v = variant(5, 1000, None);
        cart.add_item(&v, 3, Utc::now()).unwrap();
        let err = cart.add_item(&v, 3, Utc::now()).unwrap_err();
        assert_eq!(err.to_string(), "Insufficient stock. Available: 5, requested total: 6");
        assert_eq!(cart.items[0].qty, 3);
    }

    #[test]
    fn qty_must_be_positive() {
        let mut cart = Cart::open(CustomerId::new(), Utc::now());
        let v = variant(5, 1000, None);
        assert!(cart.add_item(&v, 0, Utc::now()).is_err());
    }

    #[test]
    fn update_and_remove_items() {
        let mut cart = Cart::open(CustomerId::new(), Utc::now());
        let v = variant(5, 1000, None);
        let item = cart.add_item(&v, 1, Utc::now()).unwrap();

        let updated = cart.update_item_qty(item.id, 4, &v, Utc::now()).unwrap();
        assert_eq!(updated.qty, 4);
        let err = cart.update_item_qty(item.id, 6, &v, Utc::now()).unwrap_err();
        assert_eq!(err.to_string(), "Insufficient stock. Available: 5");

        cart.remove_item(item.id, Utc::now()).unwrap();
        assert!(cart.is_empty());
        assert!(matches!(
            cart.remove_item(item.id, Utc::now()),
            Err(DomainError::NotFound(_))
        ));
    }

    #[test]
    fn merging_a_huge_quantity_is_rejected() {
        let mut cart = Cart::open(CustomerId::new(), Utc::now());
        let v = variant(5, 1000, None);
        cart.add_item(&v, 1, Utc::now()).unwrap();

        let err = cart.add_item(&v, i64::MAX, Utc::now()).unwrap_err();
        assert_eq!(err, DomainError::field("qty", QTY_OUT_OF_RANGE));
        assert_eq!(cart.items[0].qty, 1);
    }

    #[test]
    fn cart_total_must_fit_in_money() {
        let mut cart = Cart::open(CustomerId::new(), Utc::now());
        let pricey = variant(i64::MAX, i64::MAX / 2, None);
        cart.add_item(&pricey, 1, Utc::now()).unwrap();

        let err = cart.add_item(&pricey, 2, Utc::now()).unwrap_err();
        assert_eq!(err, DomainError::field("qty", QTY_OUT_OF_RANGE));
        let other = variant(i64::MAX, i64::MAX / 2 + 2, None);
        assert!(cart.add_item(&other, 1, Utc::now()).is_err());

        let item = cart.items[0].id;
        assert!(cart.update_item_qty(item, 3, &pricey, Utc::now()).is_err());
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].qty, 1);
    }

    #[test]
    fn converted_cart_is_read_only() {
        let mut cart = Cart::open(CustomerId::new(), Utc::now());
        cart.status = CartStatus::Converted;
        assert!(cart.add_item(&variant(5, 100, None), 1, Utc::now()).is_err());
    }

    #[test]
    fn view_includes_line_totals() {
        let mut cart = Cart::open(CustomerId::new(), Utc::now());
        let v = variant(5, 250, None);
        cart.add_item(&v, 2, Utc::now()).unwrap();
        let view = CartView::new(cart, |_| Some(v.clone()));
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["total"], 500);
        assert_eq!(json["items"][0]["line_total"], 500);
        assert_eq!(json["items"][0]["variant_details"]["sku"], "TEST-001");
    }
}
