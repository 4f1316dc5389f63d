//! Query strings, request bodies and the parsing helpers handlers share.

use core::str::FromStr;

use serde::Deserialize;

use storefront_analytics::SnapshotFilter;
use storefront_catalog::{CategoryFilter, ProductFilter, ProductStatus, ReviewFilter, VariantFilter};
use storefront_core::{DomainError, DomainResult, Money, Ordering, PageRequest, VariantId};
use storefront_inventory::{MovementFilter, MovementReason};
use storefront_pricing::{PricingRuleFilter, PromotionFilter, RuleType};
use storefront_sales::{CustomerFilter, OrderFilter, OrderStatus};

// -------------------------
// Paging and ordering
// -------------------------

#[derive(Debug, Default, Deserialize)]
pub struct Paging {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub ordering: Option<String>,
}

impl Paging {
    pub fn request(&self, default_size: u32) -> DomainResult<PageRequest> {
        PageRequest::new(self.page, self.page_size, default_size)
    }

    /// Parsed `ordering`, or `default` when absent.
    pub fn ordering<F: Copy>(
        &self,
        lookup: impl Fn(&str) -> Option<F>,
        default: Ordering<F>,
    ) -> DomainResult<Ordering<F>> {
        match self.ordering.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => Ordering::parse(raw, lookup),
            None => Ok(default),
        }
    }
}

// -------------------------
// Parsing helpers
// -------------------------

/// Parse a path identifier; failures are `invalid_id`.
pub fn parse_id<T>(raw: &str) -> DomainResult<T>
where
    T: FromStr<Err = DomainError>,
{
    raw.trim().parse()
}

fn present(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn filter_id<T>(field: &str, raw: Option<String>) -> DomainResult<Option<T>>
where
    T: FromStr<Err = DomainError>,
{
    present(raw)
        .map(|s| {
            s.parse()
                .map_err(|_| DomainError::field(field, format!("\"{s}\" is not a valid UUID.")))
        })
        .transpose()
}

fn filter_bool(field: &str, raw: Option<String>) -> DomainResult<Option<bool>> {
    present(raw)
        .map(|s| match s.to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(DomainError::field(field, "Must be a valid boolean.")),
        })
        .transpose()
}

fn filter_int<T: FromStr>(field: &str, raw: Option<String>) -> DomainResult<Option<T>> {
    present(raw)
        .map(|s| s.parse().map_err(|_| DomainError::field(field, "Enter a number.")))
        .transpose()
}

// -------------------------
// List filters
// -------------------------

#[derive(Debug, Default, Deserialize)]
pub struct CustomerQuery {
    pub search: Option<String>,
}

impl CustomerQuery {
    pub fn into_filter(self) -> CustomerFilter {
        CustomerFilter {
            search: present(self.search),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CategoryQuery {
    pub parent: Option<String>,
    pub search: Option<String>,
}

impl CategoryQuery {
    pub fn into_filter(self) -> DomainResult<CategoryFilter> {
        Ok(CategoryFilter {
            parent: filter_id("parent", self.parent)?,
            search: present(self.search),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub category: Option<String>,
    pub category_slug: Option<String>,
    pub status: Option<String>,
    pub search: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
}

impl ProductQuery {
    pub fn into_filter(self, active_only: bool) -> DomainResult<ProductFilter> {
        Ok(ProductFilter {
            category: filter_id("category", self.category)?,
            category_slug: present(self.category_slug),
            status: present(self.status).map(|s| ProductStatus::parse(&s)).transpose()?,
            search: present(self.search),
            min_price: filter_int("min_price", self.min_price)?.map(Money::from_minor),
            max_price: filter_int("max_price", self.max_price)?.map(Money::from_minor),
            active_only,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct VariantQuery {
    pub product: Option<String>,
    pub search: Option<String>,
}

impl VariantQuery {
    pub fn into_filter(self) -> DomainResult<VariantFilter> {
        Ok(VariantFilter {
            product: filter_id("product", self.product)?,
            search: present(self.search),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ReviewQuery {
    pub product: Option<String>,
    pub rating: Option<String>,
}

impl ReviewQuery {
    pub fn into_filter(self) -> DomainResult<ReviewFilter> {
        Ok(ReviewFilter {
            product: filter_id("product", self.product)?,
            rating: filter_int("rating", self.rating)?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PricingRuleQuery {
    pub active: Option<String>,
    #[serde(rename = "type")]
    pub rule_type: Option<String>,
}

impl PricingRuleQuery {
    pub fn into_filter(self) -> DomainResult<PricingRuleFilter> {
        Ok(PricingRuleFilter {
            active: filter_bool("active", self.active)?,
            rule_type: present(self.rule_type).map(|s| RuleType::parse(&s)).transpose()?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PromotionQuery {
    pub active: Option<String>,
    pub search: Option<String>,
}

impl PromotionQuery {
    pub fn into_filter(self) -> DomainResult<PromotionFilter> {
        Ok(PromotionFilter {
            active: filter_bool("active", self.active)?,
            search: present(self.search),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MovementQuery {
    pub variant: Option<String>,
    pub reason: Option<String>,
}

impl MovementQuery {
    pub fn into_filter(self) -> DomainResult<MovementFilter> {
        Ok(MovementFilter {
            variant: filter_id("variant", self.variant)?,
            reason: present(self.reason).map(|s| MovementReason::parse(&s)).transpose()?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderQuery {
    pub status: Option<String>,
}

impl OrderQuery {
    pub fn status(self) -> DomainResult<Option<OrderStatus>> {
        present(self.status).map(|s| OrderStatus::parse(&s)).transpose()
    }

    pub fn into_filter(self, customer: Option<storefront_core::CustomerId>) -> DomainResult<OrderFilter> {
        Ok(OrderFilter {
            customer,
            status: self.status()?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SnapshotQuery {
    pub metric: Option<String>,
    pub period: Option<String>,
}

impl SnapshotQuery {
    pub fn into_filter(self) -> SnapshotFilter {
        SnapshotFilter {
            metric: present(self.metric),
            period: present(self.period),
        }
    }
}

// -------------------------
// Request bodies
// -------------------------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh: String,
}

#[derive(Debug, Deserialize)]
pub struct AddCartItemRequest {
    pub variant: VariantId,
    #[serde(default = "one")]
    pub qty: i64,
}

fn one() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
pub struct UpdateCartItemRequest {
    pub qty: i64,
}

#[derive(Debug, Deserialize)]
pub struct PromotionCodeRequest {
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct PreviewItem {
    pub variant: VariantId,
    #[serde(default = "one")]
    pub qty: i64,
}

/// Promotion preview; `items` are optional lines to quote against.
#[derive(Debug, Deserialize)]
pub struct ApplyPromotionRequest {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub items: Vec<PreviewItem>,
}

/// Non-blank promotion code, or a field error on `code`.
pub fn required_code(code: &str) -> DomainResult<&str> {
    let code = code.trim();
    if code.is_empty() {
        return Err(DomainError::field("code", "This field is required."));
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use storefront_catalog::ProductSort;
    use storefront_core::ProductId;

    #[test]
    fn blank_filters_are_ignored() {
        let filter = ProductQuery {
            search: Some("  ".to_string()),
            category: Some(String::new()),
            ..Default::default()
        }
        .into_filter(true)
        .unwrap();
        assert!(filter.search.is_none());
        assert!(filter.category.is_none());
        assert!(filter.active_only);
    }

    #[test]
    fn malformed_filter_ids_are_field_errors() {
        let err = VariantQuery {
            product: Some("not-a-uuid".to_string()),
            search: None,
        }
        .into_filter()
        .unwrap_err();
        match err {
            DomainError::Validation(fields) => assert!(fields.get("product").is_some()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn path_ids_parse_or_report_invalid_id() {
        let id = ProductId::new();
        assert_eq!(parse_id::<ProductId>(&id.to_string()).unwrap(), id);
        assert!(matches!(parse_id::<ProductId>("42"), Err(DomainError::InvalidId(_))));
    }

    #[test]
    fn boolean_filters_accept_common_spellings() {
        assert_eq!(filter_bool("active", Some("True".into())).unwrap(), Some(true));
        assert_eq!(filter_bool("active", Some("0".into())).unwrap(), Some(false));
        assert!(filter_bool("active", Some("maybe".into())).is_err());
    }

    #[test]
    fn ordering_falls_back_to_default() {
        let paging = Paging::default();
        let ordering = paging.ordering(ProductSort::lookup, ProductSort::default_ordering()).unwrap();
        assert_eq!(ordering, ProductSort::default_ordering());

        let paging = Paging {
            ordering: Some("-bogus".to_string()),
            ..Default::default()
        };
        assert!(paging.ordering(ProductSort::lookup, ProductSort::default_ordering()).is_err());
    }
}
