use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::validate::{required_text, slug};
use storefront_core::{
    CategoryId, DomainError, DomainResult, Entity, JsonObject, Money, Ordering, ProductId, ValidationErrors,
};

use crate::{Category, Variant, VariantView};

pub const SLUG_MAX: usize = 160;
pub const NAME_MAX: usize = 160;

/// Product status lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    #[default]
    Draft,
    Active,
    Archived,
}

impl ProductStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "archived" => Ok(Self::Archived),
            other => Err(DomainError::field(
                "status",
                format!("\"{other}\" is not a valid choice."),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub slug: String,
    pub name: String,
    pub summary: String,
    pub description: String,
    #[serde(rename = "category")]
    pub category_id: CategoryId,
    pub images: Vec<String>,
    pub attributes: JsonObject,
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> ProductId {
        self.id
    }
}

impl Product {
    pub fn create(draft: ProductDraft, now: DateTime<Utc>) -> DomainResult<Self> {
        let product = Self {
            id: ProductId::new(),
            slug: draft.slug.trim().to_string(),
            name: draft.name.trim().to_string(),
            summary: draft.summary,
            description: draft.description,
            category_id: draft.category,
            images: draft.images,
            attributes: draft.attributes,
            status: draft.status,
            created_at: now,
            updated_at: now,
        };
        product.validate()?;
        Ok(product)
    }

    pub fn apply(&mut self, patch: ProductPatch, now: DateTime<Utc>) -> DomainResult<()> {
        if let Some(s) = patch.slug {
            self.slug = s.trim().to_string();
        }
        if let Some(n) = patch.name {
            self.name = n.trim().to_string();
        }
        if let Some(s) = patch.summary {
            self.summary = s;
        }
        if let Some(d) = patch.description {
            self.description = d;
        }
        if let Some(c) = patch.category {
            self.category_id = c;
        }
        if let Some(i) = patch.images {
            self.images = i;
        }
        if let Some(a) = patch.attributes {
            self.attributes = a;
        }
        if let Some(s) = patch.status {
            self.status = s;
        }
        self.updated_at = now;
        self.validate()
    }

    pub fn validate(&self) -> DomainResult<()> {
        let mut errors = ValidationErrors::new();
        slug(&mut errors, "slug", &self.slug, SLUG_MAX);
        required_text(&mut errors, "name", &self.name, NAME_MAX);
        for image in &self.images {
            if !(image.starts_with("http://") || image.starts_with("https://")) {
                errors.add("images", format!("\"{image}\" is not a valid URL."));
            }
        }
        errors.into_result()
    }

    pub fn is_active(&self) -> bool {
        self.status == ProductStatus::Active
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductDraft {
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    pub category: CategoryId,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub attributes: JsonObject,
    #[serde(default)]
    pub status: ProductStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductPatch {
    pub slug: Option<String>,
    pub name: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub category: Option<CategoryId>,
    pub images: Option<Vec<String>>,
    pub attributes: Option<JsonObject>,
    pub status: Option<ProductStatus>,
}

/// Product list filters.
///
/// Price bounds match when any variant's list price satisfies them.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub category: Option<CategoryId>,
    pub category_slug: Option<String>,
    pub status: Option<ProductStatus>,
    pub search: Option<String>,
    pub min_price: Option<Money>,
    pub max_price: Option<Money>,
    /// Restrict to `active` products (anonymous and non-staff callers).
    pub active_only: bool,
}

impl ProductFilter {
    pub fn matches(&self, product: &Product, category: Option<&Category>, variants: &[Variant]) -> bool {
        if self.active_only && !product.is_active() {
            return false;
        }
        if self.category.is_some_and(|c| c != product.category_id) {
            return false;
        }
        if let Some(slug) = &self.category_slug {
            if category.is_none_or(|c| &c.slug != slug) {
                return false;
            }
        }
        if self.status.is_some_and(|s| s != product.status) {
            return false;
        }
        if let Some(term) = &self.search {
            if !product.name.to_lowercase().contains(&term.to_lowercase()) {
                return false;
            }
        }
        if let Some(min) = self.min_price {
            if !variants.iter().any(|v| v.price >= min) {
                return false;
            }
        }
        if let Some(max) = self.max_price {
            if !variants.iter().any(|v| v.price <= max) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ProductSort {
    Name,
    CreatedAt,
    UpdatedAt,
}

impl ProductSort {
    pub fn lookup(name: &str) -> Option<Self> {
        match name {
            "name" => Some(Self::Name),
            "created_at" => Some(Self::CreatedAt),
            "updated_at" => Some(Self::UpdatedAt),
            _ => None,
        }
    }

    /// Newest first.
    pub fn default_ordering() -> Ordering<Self> {
        Ordering::desc(Self::CreatedAt)
    }

    pub fn compare(ordering: &Ordering<Self>, a: &Product, b: &Product) -> core::cmp::Ordering {
        let ord = match ordering.field {
            Self::Name => a.name.cmp(&b.name),
            Self::CreatedAt => a.created_at.cmp(&b.created_at),
            Self::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        };
        ordering.apply(ord.then_with(|| a.id.cmp(&b.id)))
    }
}

/// List shape of a product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductSummary {
    pub id: ProductId,
    pub slug: String,
    pub name: String,
    pub summary: String,
    pub category: CategoryId,
    pub category_name: String,
    pub images: Vec<String>,
    pub status: ProductStatus,
    pub variant_count: u64,
    /// Lowest effective price across variants; `None` without variants.
    pub min_price: Option<Money>,
    pub created_at: DateTime<Utc>,
}

impl ProductSummary {
    pub fn new(product: &Product, category_name: impl Into<String>, variants: &[Variant]) -> Self {
        Self {
            id: product.id,
            slug: product.slug.clone(),
            name: product.name.clone(),
            summary: product.summary.clone(),
            category: product.category_id,
            category_name: category_name.into(),
            images: product.images.clone(),
            status: product.status,
            variant_count: variants.len() as u64,
            min_price: variants.iter().map(Variant::effective_price).min(),
            created_at: product.created_at,
        }
    }
}

/// Detail shape of a product, with its variants.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub category_name: String,
    pub variants: Vec<VariantView>,
}

impl ProductDetail {
    pub fn new(product: Product, category_name: impl Into<String>, mut variants: Vec<Variant>) -> Self {
        variants.sort_by(|a, b| a.sku.cmp(&b.sku));
        Self {
            product,
            category_name: category_name.into(),
            variants: variants.into_iter().map(VariantView::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storefront_core::VariantId;

    fn product(status: ProductStatus) -> Product {
        Product::create(
            ProductDraft {
                slug: "test-product".to_string(),
                name: "Test Product".to_string(),
                summary: "A test product".to_string(),
                description: "Full description".to_string(),
                category: CategoryId::new(),
                images: vec![],
                attributes: JsonObject::new(),
                status,
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn variant(product: &Product, price: i64, sale: Option<i64>) -> Variant {
        Variant {
            id: VariantId::new(),
            product_id: product.id,
            sku: format!("SKU-{price}"),
            name: None,
            price: Money::from_minor(price),
            sale_price: sale.map(Money::from_minor),
            currency: "USD".to_string(),
            stock: 5,
            attributes: JsonObject::new(),
        }
    }

    #[test]
    fn defaults_to_draft() {
        let draft: ProductDraft = serde_json::from_value(serde_json::json!({
            "slug": "p", "name": "P", "category": CategoryId::new(),
        }))
        .unwrap();
        assert_eq!(draft.status, ProductStatus::Draft);
    }

    #[test]
    fn rejects_bad_images() {
        let mut p = product(ProductStatus::Active);
        let patch = ProductPatch {
            images: Some(vec!["not a url".to_string()]),
            ..ProductPatch::default()
        };
        assert!(p.apply(patch, Utc::now()).is_err());
    }

    #[test]
    fn summary_uses_min_effective_price() {
        let p = product(ProductStatus::Active);
        let variants = vec![variant(&p, 3000, Some(1200)), variant(&p, 1500, None)];
        let summary = ProductSummary::new(&p, "Electronics", &variants);
        assert_eq!(summary.variant_count, 2);
        assert_eq!(summary.min_price, Some(Money::from_minor(1200)));

        let empty = ProductSummary::new(&p, "Electronics", &[]);
        assert_eq!(empty.min_price, None);
    }

    #[test]
    fn active_only_hides_drafts() {
        let filter = ProductFilter {
            active_only: true,
            ..ProductFilter::default()
        };
        assert!(filter.matches(&product(ProductStatus::Active), None, &[]));
        assert!(!filter.matches(&product(ProductStatus::Draft), None, &[]));
    }

    #[test]
    fn price_bounds_check_variant_list_prices() {
        let p = product(ProductStatus::Active);
        let variants = vec![variant(&p, 1000, None), variant(&p, 5000, None)];
        let filter = ProductFilter {
            min_price: Some(Money::from_minor(4000)),
            max_price: Some(Money::from_minor(1500)),
            ..ProductFilter::default()
        };
        assert!(filter.matches(&p, None, &variants));

        let too_high = ProductFilter {
            min_price: Some(Money::from_minor(6000)),
            ..ProductFilter::default()
        };
        assert!(!too_high.matches(&p, None, &variants));
        assert!(!too_high.matches(&p, None, &[]));
    }

    #[test]
    fn search_is_case_insensitive() {
        let p = product(ProductStatus::Active);
        let filter = ProductFilter {
            search: Some("test PROD".to_string()),
            ..ProductFilter::default()
        };
        assert!(filter.matches(&p, None, &[]));
    }
}
