use async_trait::async_trait;
use chrono::{DateTime, Utc};

use storefront_catalog::{
    Category, CategoryFilter, CategoryNode, CategoryPatch, CategorySort, Product, ProductDetail, ProductFilter,
    ProductPatch, ProductSort, ProductSummary, Review, ReviewFilter, ReviewSort, ReviewView, Variant, VariantFilter,
    VariantPatch, VariantSort, VariantView, build_tree, ensure_no_cycle, subtree_ids,
};
use storefront_core::{
    CategoryId, DomainError, Ordering, Page, PageRequest, ProductId, ReviewId, VariantId,
};
use storefront_pricing::PricedLine;

use super::{InMemoryStore, State, protected, sorted_page};
use crate::error::{StoreError, StoreResult, unique_message};
use crate::store::{CatalogStore, category_page, check_category_exists, invalid_pk};

impl State {
    fn category_node(&self, id: CategoryId) -> StoreResult<CategoryNode> {
        let all: Vec<Category> = self.categories.values().cloned().collect();
        let root = self.categories.get(&id).ok_or_else(|| StoreError::not_found("category"))?;
        Ok(build_tree(&all, root))
    }

    fn check_category_slug(&self, category: &Category) -> StoreResult<()> {
        if self
            .categories
            .values()
            .any(|c| c.id != category.id && c.slug == category.slug)
        {
            return Err(DomainError::conflict(unique_message("categories_slug_key")).into());
        }
        Ok(())
    }

    fn check_product(&self, product: &Product) -> StoreResult<()> {
        let all: Vec<Category> = self.categories.values().cloned().collect();
        check_category_exists(&all, product.category_id, "category")?;
        if self
            .products
            .values()
            .any(|p| p.id != product.id && p.slug == product.slug)
        {
            return Err(DomainError::conflict(unique_message("products_slug_key")).into());
        }
        Ok(())
    }

    fn check_variant(&self, variant: &Variant) -> StoreResult<()> {
        if !self.products.contains_key(&variant.product_id) {
            return Err(invalid_pk("product", variant.product_id).into());
        }
        if self
            .variants
            .values()
            .any(|v| v.id != variant.id && v.sku == variant.sku)
        {
            return Err(DomainError::conflict(unique_message("variants_sku_key")).into());
        }
        Ok(())
    }

    fn review_view(&self, review: Review) -> ReviewView {
        let customer_name = self.customer_name(review.customer_id);
        ReviewView { review, customer_name }
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn list_categories(
        &self,
        filter: CategoryFilter,
        ordering: Ordering<CategorySort>,
        page: PageRequest,
    ) -> StoreResult<Page<CategoryNode>> {
        let state = self.read();
        let all: Vec<Category> = state.categories.values().cloned().collect();
        Ok(category_page(&all, &filter, &ordering, page))
    }

    async fn get_category(&self, id: CategoryId) -> StoreResult<CategoryNode> {
        self.read().category_node(id)
    }

    async fn create_category(&self, category: Category) -> StoreResult<CategoryNode> {
        let mut state = self.write();
        let all: Vec<Category> = state.categories.values().cloned().collect();
        ensure_no_cycle(&all, category.id, category.parent_id)?;
        state.check_category_slug(&category)?;
        let id = category.id;
        state.categories.insert(id, category);
        state.category_node(id)
    }

    async fn update_category(&self, id: CategoryId, patch: CategoryPatch) -> StoreResult<CategoryNode> {
        let mut state = self.write();
        let mut category = state
            .categories
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("category"))?;
        let reparented = patch.parent.is_some();
        category.apply(patch)?;
        if reparented {
            let all: Vec<Category> = state.categories.values().cloned().collect();
            ensure_no_cycle(&all, id, category.parent_id)?;
        }
        state.check_category_slug(&category)?;
        state.categories.insert(id, category);
        state.category_node(id)
    }

    async fn delete_category(&self, id: CategoryId) -> StoreResult<()> {
        let mut state = self.write();
        if !state.categories.contains_key(&id) {
            return Err(StoreError::not_found("category"));
        }
        let all: Vec<Category> = state.categories.values().cloned().collect();
        let subtree = subtree_ids(&all, id);
        if state.products.values().any(|p| subtree.contains(&p.category_id)) {
            return Err(protected("category"));
        }
        for cid in subtree {
            state.categories.remove(&cid);
        }
        Ok(())
    }

    async fn list_products(
        &self,
        filter: ProductFilter,
        ordering: Ordering<ProductSort>,
        page: PageRequest,
    ) -> StoreResult<Page<ProductSummary>> {
        let state = self.read();
        let matching: Vec<&Product> = state
            .products
            .values()
            .filter(|p| {
                let variants = state.variants_of(p.id);
                filter.matches(p, state.categories.get(&p.category_id), &variants)
            })
            .collect();
        let page = sorted_page(matching, |a, b| ProductSort::compare(&ordering, a, b), page);
        Ok(page.map(|p| ProductSummary::new(p, state.category_name(p.category_id), &state.variants_of(p.id))))
    }

    async fn get_product(&self, id: ProductId, active_only: bool) -> StoreResult<ProductDetail> {
        let state = self.read();
        let product = state
            .products
            .get(&id)
            .filter(|p| !active_only || p.is_active())
            .cloned()
            .ok_or_else(|| StoreError::not_found("product"))?;
        Ok(state.product_detail(product))
    }

    async fn create_product(&self, product: Product) -> StoreResult<ProductDetail> {
        let mut state = self.write();
        state.check_product(&product)?;
        state.products.insert(product.id, product.clone());
        Ok(state.product_detail(product))
    }

    async fn update_product(&self, id: ProductId, patch: ProductPatch, now: DateTime<Utc>) -> StoreResult<ProductDetail> {
        let mut state = self.write();
        let mut product = state
            .products
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("product"))?;
        product.apply(patch, now)?;
        state.check_product(&product)?;
        state.products.insert(id, product.clone());
        Ok(state.product_detail(product))
    }

    async fn delete_product(&self, id: ProductId) -> StoreResult<()> {
        let mut state = self.write();
        if !state.products.contains_key(&id) {
            return Err(StoreError::not_found("product"));
        }
        let variant_ids: Vec<VariantId> = state.variants_of(id).iter().map(|v| v.id).collect();
        if variant_ids.iter().any(|v| state.variant_is_ordered(*v)) {
            return Err(protected("product"));
        }
        for vid in variant_ids {
            state.remove_variant(vid);
        }
        state.reviews.retain(|_, r| r.product_id != id);
        state.products.remove(&id);
        Ok(())
    }

    async fn list_variants(
        &self,
        filter: VariantFilter,
        ordering: Ordering<VariantSort>,
        page: PageRequest,
    ) -> StoreResult<Page<VariantView>> {
        let state = self.read();
        let matching = state.variants.values().filter(|v| filter.matches(v)).cloned().collect();
        let page = sorted_page(
            matching,
            |a: &Variant, b: &Variant| VariantSort::compare(&ordering, a, b).then_with(|| a.id.cmp(&b.id)),
            page,
        );
        Ok(page.map(VariantView::from))
    }

    async fn get_variant(&self, id: VariantId) -> StoreResult<VariantView> {
        let state = self.read();
        state
            .variants
            .get(&id)
            .cloned()
            .map(VariantView::from)
            .ok_or_else(|| StoreError::not_found("variant"))
    }

    async fn create_variant(&self, variant: Variant) -> StoreResult<VariantView> {
        let mut state = self.write();
        state.check_variant(&variant)?;
        state.variants.insert(variant.id, variant.clone());
        Ok(variant.into())
    }

    async fn update_variant(&self, id: VariantId, patch: VariantPatch) -> StoreResult<VariantView> {
        let mut state = self.write();
        let mut variant = state
            .variants
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("variant"))?;
        variant.apply(patch)?;
        state.check_variant(&variant)?;
        state.variants.insert(id, variant.clone());
        Ok(variant.into())
    }

    async fn delete_variant(&self, id: VariantId) -> StoreResult<()> {
        let mut state = self.write();
        if !state.variants.contains_key(&id) {
            return Err(StoreError::not_found("variant"));
        }
        if state.variant_is_ordered(id) {
            return Err(protected("variant"));
        }
        state.remove_variant(id);
        Ok(())
    }

    async fn price_lines(&self, items: Vec<(VariantId, i64)>) -> StoreResult<Vec<PricedLine>> {
        let state = self.read();
        items
            .into_iter()
            .map(|(variant_id, qty)| -> StoreResult<PricedLine> {
                if qty < 1 {
                    return Err(DomainError::field("items", "Ensure this value is greater than or equal to 1.").into());
                }
                let variant = state
                    .variants
                    .get(&variant_id)
                    .ok_or_else(|| invalid_pk("items", variant_id))?;
                let product = state
                    .products
                    .get(&variant.product_id)
                    .ok_or_else(|| invalid_pk("items", variant_id))?;
                Ok(PricedLine {
                    variant_id,
                    product_id: product.id,
                    category_id: product.category_id,
                    unit_price: variant.effective_price(),
                    qty,
                })
            })
            .collect()
    }

    async fn list_reviews(
        &self,
        filter: ReviewFilter,
        ordering: Ordering<ReviewSort>,
        page: PageRequest,
    ) -> StoreResult<Page<ReviewView>> {
        let state = self.read();
        let matching = state.reviews.values().filter(|r| filter.matches(r)).cloned().collect();
        let page = sorted_page(matching, |a: &Review, b: &Review| ReviewSort::compare(&ordering, a, b), page);
        Ok(page.map(|r| state.review_view(r)))
    }

    async fn get_review(&self, id: ReviewId) -> StoreResult<ReviewView> {
        let state = self.read();
        let review = state.reviews.get(&id).cloned().ok_or_else(|| StoreError::not_found("review"))?;
        Ok(state.review_view(review))
    }

    async fn create_review(&self, review: Review) -> StoreResult<ReviewView> {
        let mut state = self.write();
        if !state.products.contains_key(&review.product_id) {
            return Err(invalid_pk("product", review.product_id).into());
        }
        state.reviews.insert(review.id, review.clone());
        Ok(state.review_view(review))
    }

    async fn delete_review(&self, id: ReviewId) -> StoreResult<()> {
        let mut state = self.write();
        state
            .reviews
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("review"))
    }
}
