//! `storefront-catalog`: categories, products, variants and reviews.
//!
//! Pure domain code: validation, list filters, ordering and the read shapes
//! the API serialises. Persistence lives in `storefront-infra`.

pub mod category;
pub mod product;
pub mod review;
pub mod variant;

pub use category::{
    Category, CategoryDraft, CategoryFilter, CategoryNode, CategoryPatch, CategorySort, build_tree,
    ensure_no_cycle, subtree_ids,
};
pub use product::{
    Product, ProductDetail, ProductDraft, ProductFilter, ProductPatch, ProductSort, ProductStatus,
    ProductSummary,
};
pub use review::{Review, ReviewDraft, ReviewFilter, ReviewSort, ReviewView};
pub use variant::{Variant, VariantDraft, VariantFilter, VariantPatch, VariantSort, VariantView};
