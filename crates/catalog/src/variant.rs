use serde::{Deserialize, Serialize};

use storefront_core::validate::{is_currency, max_len, required_text};
use storefront_core::{
    DomainResult, Entity, JsonObject, Money, Ordering, ProductId, ValidationErrors, VariantId, nullable,
};

pub const SKU_MAX: usize = 80;
pub const NAME_MAX: usize = 160;
pub const DEFAULT_CURRENCY: &str = "USD";

/// A purchasable SKU of a product with its own price and on-hand stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub id: VariantId,
    #[serde(rename = "product")]
    pub product_id: ProductId,
    pub sku: String,
    pub name: Option<String>,
    pub price: Money,
    pub sale_price: Option<Money>,
    pub currency: String,
    pub stock: i64,
    pub attributes: JsonObject,
}

impl Entity for Variant {
    type Id = VariantId;

    fn id(&self) -> VariantId {
        self.id
    }
}

impl Variant {
    /// Sale price when set and non-zero, otherwise the list price.
    pub fn effective_price(&self) -> Money {
        match self.sale_price {
            Some(sale) if !sale.is_zero() => sale,
            _ => self.price,
        }
    }

    pub fn create(draft: VariantDraft) -> DomainResult<Self> {
        let variant = Self {
            id: VariantId::new(),
            product_id: draft.product,
            sku: draft.sku.trim().to_string(),
            name: draft.name,
            price: draft.price,
            sale_price: draft.sale_price,
            currency: draft.currency.unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            stock: draft.stock,
            attributes: draft.attributes,
        };
        let mut errors = variant.check();
        errors.check(variant.stock < 0, "stock", "Ensure this value is greater than or equal to 0.");
        errors.into_result()?;
        Ok(variant)
    }

    pub fn apply(&mut self, patch: VariantPatch) -> DomainResult<()> {
        if let Some(product) = patch.product {
            self.product_id = product;
        }
        if let Some(sku) = patch.sku {
            self.sku = sku.trim().to_string();
        }
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(price) = patch.price {
            self.price = price;
        }
        if let Some(sale) = patch.sale_price {
            self.sale_price = sale;
        }
        if let Some(currency) = patch.currency {
            self.currency = currency;
        }
        if let Some(stock) = patch.stock {
            self.stock = stock;
        }
        if let Some(attributes) = patch.attributes {
            self.attributes = attributes;
        }
        self.check().into_result()
    }

    fn check(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        required_text(&mut errors, "sku", &self.sku, SKU_MAX);
        if let Some(name) = &self.name {
            max_len(&mut errors, "name", name, NAME_MAX);
        }
        errors.check(self.price.is_negative(), "price", "Ensure this value is greater than or equal to 0.");
        errors.check(
            self.sale_price.is_some_and(Money::is_negative),
            "sale_price",
            "Ensure this value is greater than or equal to 0.",
        );
        errors.check(!is_currency(&self.currency), "currency", "Enter a 3-letter ISO currency code.");
        errors
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VariantDraft {
    pub product: ProductId,
    #[serde(default)]
    pub sku: String,
    pub name: Option<String>,
    pub price: Money,
    pub sale_price: Option<Money>,
    pub currency: Option<String>,
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub attributes: JsonObject,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VariantPatch {
    pub product: Option<ProductId>,
    pub sku: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub name: Option<Option<String>>,
    pub price: Option<Money>,
    #[serde(default, deserialize_with = "nullable")]
    pub sale_price: Option<Option<Money>>,
    pub currency: Option<String>,
    pub stock: Option<i64>,
    pub attributes: Option<JsonObject>,
}

/// Variant plus its computed effective price.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantView {
    #[serde(flatten)]
    pub variant: Variant,
    pub effective_price: Money,
}

impl From<Variant> for VariantView {
    fn from(variant: Variant) -> Self {
        let effective_price = variant.effective_price();
        Self {
            variant,
            effective_price,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VariantSort {
    Sku,
    Price,
}

impl VariantSort {
    pub fn lookup(name: &str) -> Option<Self> {
        match name {
            "sku" => Some(Self::Sku),
            "price" => Some(Self::Price),
            _ => None,
        }
    }

    pub fn compare(ordering: &Ordering<Self>, a: &Variant, b: &Variant) -> core::cmp::Ordering {
        let ord = match ordering.field {
            Self::Sku => a.sku.cmp(&b.sku),
            Self::Price => a.price.cmp(&b.price).then_with(|| a.sku.cmp(&b.sku)),
        };
        ordering.apply(ord)
    }
}

#[derive(Debug, Clone, Default)]
pub struct VariantFilter {
    pub product: Option<ProductId>,
    pub search: Option<String>,
}

impl VariantFilter {
    pub fn matches(&self, v: &Variant) -> bool {
        if self.product.is_some_and(|p| p != v.product_id) {
            return false;
        }
        if let Some(term) = &self.search {
            let term = term.to_lowercase();
            let in_name = v.name.as_deref().is_some_and(|n| n.to_lowercase().contains(&term));
            if !v.sku.to_lowercase().contains(&term) && !in_name {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> VariantDraft {
        VariantDraft {
            product: ProductId::new(),
            sku: "TEST-001".to_string(),
            name: Some("Blue / M".to_string()),
            price: Money::from_minor(2999),
            sale_price: None,
            currency: None,
            stock: 10,
            attributes: JsonObject::new(),
        }
    }

    #[test]
    fn effective_price_prefers_non_zero_sale_price() {
        let mut v = Variant::create(draft()).unwrap();
        assert_eq!(v.effective_price(), Money::from_minor(2999));

        v.sale_price = Some(Money::from_minor(1999));
        assert_eq!(v.effective_price(), Money::from_minor(1999));

        v.sale_price = Some(Money::ZERO);
        assert_eq!(v.effective_price(), Money::from_minor(2999));
    }

    #[test]
    fn defaults_currency_and_rejects_negative_stock() {
        let v = Variant::create(draft()).unwrap();
        assert_eq!(v.currency, "USD");

        let mut bad = draft();
        bad.stock = -1;
        bad.currency = Some("usd".to_string());
        let err = Variant::create(bad).unwrap_err().to_string();
        assert!(err.contains("stock"));
        assert!(err.contains("currency"));
    }

    #[test]
    fn view_serialises_effective_price() {
        let mut v = Variant::create(draft()).unwrap();
        v.sale_price = Some(Money::from_minor(1500));
        let json = serde_json::to_value(VariantView::from(v)).unwrap();
        assert_eq!(json["effective_price"], 1500);
        assert_eq!(json["price"], 2999);
        assert!(json.get("product").is_some());
    }

    #[test]
    fn patch_can_clear_sale_price() {
        let mut v = Variant::create(draft()).unwrap();
        v.sale_price = Some(Money::from_minor(100));
        let patch: VariantPatch = serde_json::from_str(r#"{"sale_price": null}"#).unwrap();
        v.apply(patch).unwrap();
        assert_eq!(v.sale_price, None);
    }
}
