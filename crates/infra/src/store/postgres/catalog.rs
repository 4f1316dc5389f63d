use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgConnection, Row};
use tracing::instrument;
use uuid::Uuid;

use storefront_catalog::{
    Category, CategoryFilter, CategoryNode, CategoryPatch, CategorySort, Product, ProductDetail, ProductFilter,
    ProductPatch, ProductSort, ProductStatus, ProductSummary, Review, ReviewFilter, ReviewSort, ReviewView, Variant,
    VariantFilter, VariantPatch, VariantSort, VariantView, build_tree, ensure_no_cycle, subtree_ids,
};
use storefront_core::{CategoryId, DomainError, Ordering, Page, PageRequest, ProductId, ReviewId, VariantId};
use storefront_pricing::PricedLine;

use super::rows::{category_from_row, product_from_row, review_from_row, variant_from_row};
use super::{PostgresStore, order_by, protected, push_search};
use crate::error::{StoreError, StoreResult, map_sqlx_error};
use crate::store::{CatalogStore, category_page, check_category_exists, invalid_pk};

async fn all_categories(conn: &mut PgConnection, operation: &'static str) -> StoreResult<Vec<Category>> {
    let rows = sqlx::query(r#"SELECT * FROM categories"#)
        .fetch_all(conn)
        .await
        .map_err(|e| map_sqlx_error(operation, e))?;
    rows.iter()
        .map(category_from_row)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| map_sqlx_error(operation, e))
}

fn category_node(all: &[Category], id: CategoryId) -> StoreResult<CategoryNode> {
    let root = all
        .iter()
        .find(|c| c.id == id)
        .ok_or_else(|| StoreError::not_found("category"))?;
    Ok(build_tree(all, root))
}

async fn category_exists(conn: &mut PgConnection, id: CategoryId) -> StoreResult<bool> {
    sqlx::query_scalar(r#"SELECT EXISTS (SELECT 1 FROM categories WHERE id = $1)"#)
        .bind(id.as_uuid())
        .fetch_one(conn)
        .await
        .map_err(|e| map_sqlx_error("category_exists", e))
}

async fn product_exists(conn: &mut PgConnection, id: ProductId) -> StoreResult<bool> {
    sqlx::query_scalar(r#"SELECT EXISTS (SELECT 1 FROM products WHERE id = $1)"#)
        .bind(id.as_uuid())
        .fetch_one(conn)
        .await
        .map_err(|e| map_sqlx_error("product_exists", e))
}

async fn variants_of(conn: &mut PgConnection, products: &[ProductId]) -> StoreResult<HashMap<ProductId, Vec<Variant>>> {
    let ids: Vec<Uuid> = products.iter().map(|p| *p.as_uuid()).collect();
    let rows = sqlx::query(r#"SELECT * FROM variants WHERE product_id = ANY($1)"#)
        .bind(ids)
        .fetch_all(conn)
        .await
        .map_err(|e| map_sqlx_error("variants_of", e))?;
    let mut grouped: HashMap<ProductId, Vec<Variant>> = HashMap::new();
    for row in &rows {
        let v = variant_from_row(row).map_err(|e| map_sqlx_error("variants_of", e))?;
        grouped.entry(v.product_id).or_default().push(v);
    }
    Ok(grouped)
}

async fn product_detail(conn: &mut PgConnection, id: ProductId, active_only: bool) -> StoreResult<ProductDetail> {
    let row = sqlx::query(
        r#"
        SELECT p.*, c.name AS category_name
        FROM products p
        JOIN categories c ON c.id = p.category_id
        WHERE p.id = $1
        "#,
    )
    .bind(id.as_uuid())
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("get_product", e))?
    .ok_or_else(|| StoreError::not_found("product"))?;
    let product = product_from_row(&row).map_err(|e| map_sqlx_error("get_product", e))?;
    if active_only && !product.is_active() {
        return Err(StoreError::not_found("product"));
    }
    let category_name: String = row.try_get("category_name").map_err(|e| map_sqlx_error("get_product", e))?;
    let variants = variants_of(conn, &[id]).await?.remove(&id).unwrap_or_default();
    Ok(ProductDetail::new(product, category_name, variants))
}

async fn variant_is_ordered(conn: &mut PgConnection, id: VariantId) -> StoreResult<bool> {
    sqlx::query_scalar(r#"SELECT EXISTS (SELECT 1 FROM order_items WHERE variant_id = $1)"#)
        .bind(id.as_uuid())
        .fetch_one(conn)
        .await
        .map_err(|e| map_sqlx_error("variant_is_ordered", e))
}

async fn write_product(conn: &mut PgConnection, product: &Product, insert: bool) -> StoreResult<()> {
    let sql = if insert {
        r#"
        INSERT INTO products
            (id, slug, name, summary, description, category_id, images, attributes, status, updated_at, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#
    } else {
        r#"
        UPDATE products
        SET slug = $2, name = $3, summary = $4, description = $5, category_id = $6, images = $7,
            attributes = $8, status = $9, updated_at = $10
        WHERE id = $1
        "#
    };
    let mut query = sqlx::query(sql)
        .bind(product.id.as_uuid())
        .bind(&product.slug)
        .bind(&product.name)
        .bind(&product.summary)
        .bind(&product.description)
        .bind(product.category_id.as_uuid())
        .bind(&product.images)
        .bind(Json(&product.attributes))
        .bind(product.status.as_str())
        .bind(product.updated_at);
    if insert {
        query = query.bind(product.created_at);
    }
    query
        .execute(conn)
        .await
        .map_err(|e| map_sqlx_error("write_product", e))?;
    Ok(())
}

async fn write_variant(conn: &mut PgConnection, variant: &Variant, insert: bool) -> StoreResult<()> {
    let sql = if insert {
        r#"
        INSERT INTO variants (id, product_id, sku, name, price, sale_price, currency, stock, attributes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#
    } else {
        r#"
        UPDATE variants
        SET product_id = $2, sku = $3, name = $4, price = $5, sale_price = $6, currency = $7, stock = $8,
            attributes = $9
        WHERE id = $1
        "#
    };
    sqlx::query(sql)
        .bind(variant.id.as_uuid())
        .bind(variant.product_id.as_uuid())
        .bind(&variant.sku)
        .bind(&variant.name)
        .bind(variant.price.minor())
        .bind(variant.sale_price.map(|m| m.minor()))
        .bind(&variant.currency)
        .bind(variant.stock)
        .bind(Json(&variant.attributes))
        .execute(conn)
        .await
        .map_err(|e| map_sqlx_error("write_variant", e))?;
    Ok(())
}

fn review_view_from_row(row: &PgRow) -> Result<ReviewView, sqlx::Error> {
    Ok(ReviewView {
        review: review_from_row(row)?,
        customer_name: row.try_get("customer_name")?,
    })
}

#[async_trait]
impl CatalogStore for PostgresStore {
    #[instrument(skip(self, filter, ordering), err)]
    async fn list_categories(
        &self,
        filter: CategoryFilter,
        ordering: Ordering<CategorySort>,
        page: PageRequest,
    ) -> StoreResult<Page<CategoryNode>> {
        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("list_categories", e))?;
        let all = all_categories(&mut conn, "list_categories").await?;
        Ok(category_page(&all, &filter, &ordering, page))
    }

    #[instrument(skip(self), fields(category_id = %id), err)]
    async fn get_category(&self, id: CategoryId) -> StoreResult<CategoryNode> {
        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("get_category", e))?;
        let all = all_categories(&mut conn, "get_category").await?;
        category_node(&all, id)
    }

    #[instrument(skip(self, category), fields(slug = %category.slug), err)]
    async fn create_category(&self, category: Category) -> StoreResult<CategoryNode> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("create_category", e))?;
        let mut all = all_categories(&mut tx, "create_category").await?;
        ensure_no_cycle(&all, category.id, category.parent_id)?;
        sqlx::query(
            r#"
            INSERT INTO categories (id, slug, name, description, parent_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(category.id.as_uuid())
        .bind(&category.slug)
        .bind(&category.name)
        .bind(&category.description)
        .bind(category.parent_id.map(|p| *p.as_uuid()))
        .bind(category.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("create_category", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("create_category", e))?;
        let id = category.id;
        all.push(category);
        category_node(&all, id)
    }

    #[instrument(skip(self, patch), fields(category_id = %id), err)]
    async fn update_category(&self, id: CategoryId, patch: CategoryPatch) -> StoreResult<CategoryNode> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("update_category", e))?;
        sqlx::query(r#"LOCK TABLE categories IN SHARE ROW EXCLUSIVE MODE"#)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_category", e))?;
        let mut all = all_categories(&mut tx, "update_category").await?;
        let mut category = all
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("category"))?;
        let reparented = patch.parent.is_some();
        category.apply(patch)?;
        if reparented {
            ensure_no_cycle(&all, id, category.parent_id)?;
        }
        sqlx::query(
            r#"
            UPDATE categories SET slug = $2, name = $3, description = $4, parent_id = $5
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(&category.slug)
        .bind(&category.name)
        .bind(&category.description)
        .bind(category.parent_id.map(|p| *p.as_uuid()))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_category", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("update_category", e))?;
        if let Some(slot) = all.iter_mut().find(|c| c.id == id) {
            *slot = category;
        }
        category_node(&all, id)
    }

    #[instrument(skip(self), fields(category_id = %id), err)]
    async fn delete_category(&self, id: CategoryId) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("delete_category", e))?;
        let all = all_categories(&mut tx, "delete_category").await?;
        if !all.iter().any(|c| c.id == id) {
            return Err(StoreError::not_found("category"));
        }
        let subtree: Vec<Uuid> = subtree_ids(&all, id).iter().map(|c| *c.as_uuid()).collect();
        let in_use: bool = sqlx::query_scalar(r#"SELECT EXISTS (SELECT 1 FROM products WHERE category_id = ANY($1))"#)
            .bind(&subtree)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_category", e))?;
        if in_use {
            return Err(protected("category"));
        }
        sqlx::query(r#"DELETE FROM categories WHERE id = ANY($1)"#)
            .bind(&subtree)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_category", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("delete_category", e))?;
        Ok(())
    }

    #[instrument(skip(self, filter, ordering), err)]
    async fn list_products(
        &self,
        filter: ProductFilter,
        ordering: Ordering<ProductSort>,
        page: PageRequest,
    ) -> StoreResult<Page<ProductSummary>> {
        let column = match ordering.field {
            ProductSort::Name => "p.name",
            ProductSort::CreatedAt => "p.created_at",
            ProductSort::UpdatedAt => "p.updated_at",
        };
        let page = self
            .fetch_page(
                "list_products",
                "SELECT p.*, c.name AS category_name",
                "FROM products p JOIN categories c ON c.id = p.category_id",
                |q| {
                    if filter.active_only {
                        q.push(" AND p.status = ");
                        q.push_bind(ProductStatus::Active.as_str());
                    }
                    if let Some(category) = filter.category {
                        q.push(" AND p.category_id = ");
                        q.push_bind(*category.as_uuid());
                    }
                    if let Some(slug) = &filter.category_slug {
                        q.push(" AND c.slug = ");
                        q.push_bind(slug.clone());
                    }
                    if let Some(status) = filter.status {
                        q.push(" AND p.status = ");
                        q.push_bind(status.as_str());
                    }
                    if let Some(term) = &filter.search {
                        push_search(q, &["p.name"], term);
                    }
                    if let Some(min) = filter.min_price {
                        q.push(" AND EXISTS (SELECT 1 FROM variants v WHERE v.product_id = p.id AND v.price >= ");
                        q.push_bind(min.minor());
                        q.push(")");
                    }
                    if let Some(max) = filter.max_price {
                        q.push(" AND EXISTS (SELECT 1 FROM variants v WHERE v.product_id = p.id AND v.price <= ");
                        q.push_bind(max.minor());
                        q.push(")");
                    }
                },
                &order_by(column, "p.id", ordering.descending),
                page,
                |row| {
                    let product = product_from_row(row)?;
                    let category_name: String = row.try_get("category_name")?;
                    Ok((product, category_name))
                },
            )
            .await?;

        let ids: Vec<ProductId> = page.results.iter().map(|(p, _)| p.id).collect();
        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("list_products", e))?;
        let variants = variants_of(&mut conn, &ids).await?;
        Ok(page.map(|(product, category_name)| {
            let vs = variants.get(&product.id).map(Vec::as_slice).unwrap_or_default();
            ProductSummary::new(&product, category_name, vs)
        }))
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn get_product(&self, id: ProductId, active_only: bool) -> StoreResult<ProductDetail> {
        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("get_product", e))?;
        product_detail(&mut conn, id, active_only).await
    }

    #[instrument(skip(self, product), fields(slug = %product.slug), err)]
    async fn create_product(&self, product: Product) -> StoreResult<ProductDetail> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("create_product", e))?;
        if !category_exists(&mut tx, product.category_id).await? {
            return Err(invalid_pk("category", product.category_id).into());
        }
        write_product(&mut tx, &product, true).await?;
        let detail = product_detail(&mut tx, product.id, false).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("create_product", e))?;
        Ok(detail)
    }

    #[instrument(skip(self, patch), fields(product_id = %id), err)]
    async fn update_product(&self, id: ProductId, patch: ProductPatch, now: DateTime<Utc>) -> StoreResult<ProductDetail> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("update_product", e))?;
        let row = sqlx::query(r#"SELECT * FROM products WHERE id = $1 FOR UPDATE"#)
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_product", e))?
            .ok_or_else(|| StoreError::not_found("product"))?;
        let mut product = product_from_row(&row).map_err(|e| map_sqlx_error("update_product", e))?;
        product.apply(patch, now)?;
        let all = all_categories(&mut tx, "update_product").await?;
        check_category_exists(&all, product.category_id, "category")?;
        write_product(&mut tx, &product, false).await?;
        let detail = product_detail(&mut tx, id, false).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("update_product", e))?;
        Ok(detail)
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn delete_product(&self, id: ProductId) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("delete_product", e))?;
        sqlx::query(r#"SELECT id FROM products WHERE id = $1 FOR UPDATE"#)
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_product", e))?
            .ok_or_else(|| StoreError::not_found("product"))?;
        let ordered: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM order_items oi JOIN variants v ON v.id = oi.variant_id
                WHERE v.product_id = $1
            )
            "#,
        )
        .bind(id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("delete_product", e))?;
        if ordered {
            return Err(protected("product"));
        }
        sqlx::query(r#"DELETE FROM products WHERE id = $1"#)
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_product", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("delete_product", e))?;
        Ok(())
    }

    #[instrument(skip(self, filter, ordering), err)]
    async fn list_variants(
        &self,
        filter: VariantFilter,
        ordering: Ordering<VariantSort>,
        page: PageRequest,
    ) -> StoreResult<Page<VariantView>> {
        let dir = if ordering.descending { "DESC" } else { "ASC" };
        let order = match ordering.field {
            VariantSort::Sku => format!("sku {dir}, id ASC"),
            VariantSort::Price => format!("price {dir}, sku {dir}, id ASC"),
        };
        let page = self
            .fetch_page(
                "list_variants",
                "SELECT *",
                "FROM variants",
                |q| {
                    if let Some(product) = filter.product {
                        q.push(" AND product_id = ");
                        q.push_bind(*product.as_uuid());
                    }
                    if let Some(term) = &filter.search {
                        push_search(q, &["sku", "coalesce(name, '')"], term);
                    }
                },
                &order,
                page,
                variant_from_row,
            )
            .await?;
        Ok(page.map(VariantView::from))
    }

    #[instrument(skip(self), fields(variant_id = %id), err)]
    async fn get_variant(&self, id: VariantId) -> StoreResult<VariantView> {
        let row = sqlx::query(r#"SELECT * FROM variants WHERE id = $1"#)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_variant", e))?
            .ok_or_else(|| StoreError::not_found("variant"))?;
        let variant = variant_from_row(&row).map_err(|e| map_sqlx_error("get_variant", e))?;
        Ok(variant.into())
    }

    #[instrument(skip(self, variant), fields(sku = %variant.sku), err)]
    async fn create_variant(&self, variant: Variant) -> StoreResult<VariantView> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("create_variant", e))?;
        if !product_exists(&mut tx, variant.product_id).await? {
            return Err(invalid_pk("product", variant.product_id).into());
        }
        write_variant(&mut tx, &variant, true).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("create_variant", e))?;
        Ok(variant.into())
    }

    #[instrument(skip(self, patch), fields(variant_id = %id), err)]
    async fn update_variant(&self, id: VariantId, patch: VariantPatch) -> StoreResult<VariantView> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("update_variant", e))?;
        let row = sqlx::query(r#"SELECT * FROM variants WHERE id = $1 FOR UPDATE"#)
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_variant", e))?
            .ok_or_else(|| StoreError::not_found("variant"))?;
        let mut variant = variant_from_row(&row).map_err(|e| map_sqlx_error("update_variant", e))?;
        variant.apply(patch)?;
        if !product_exists(&mut tx, variant.product_id).await? {
            return Err(invalid_pk("product", variant.product_id).into());
        }
        write_variant(&mut tx, &variant, false).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("update_variant", e))?;
        Ok(variant.into())
    }

    #[instrument(skip(self), fields(variant_id = %id), err)]
    async fn delete_variant(&self, id: VariantId) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("delete_variant", e))?;
        sqlx::query(r#"SELECT id FROM variants WHERE id = $1 FOR UPDATE"#)
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_variant", e))?
            .ok_or_else(|| StoreError::not_found("variant"))?;
        if variant_is_ordered(&mut tx, id).await? {
            return Err(protected("variant"));
        }
        sqlx::query(r#"DELETE FROM variants WHERE id = $1"#)
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_variant", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("delete_variant", e))?;
        Ok(())
    }

    #[instrument(skip(self, items), fields(lines = items.len()), err)]
    async fn price_lines(&self, items: Vec<(VariantId, i64)>) -> StoreResult<Vec<PricedLine>> {
        let ids: Vec<Uuid> = items.iter().map(|(v, _)| *v.as_uuid()).collect();
        let rows = sqlx::query(
            r#"
            SELECT v.*, p.category_id
            FROM variants v
            JOIN products p ON p.id = v.product_id
            WHERE v.id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("price_lines", e))?;

        let mut found: HashMap<VariantId, (Variant, CategoryId)> = HashMap::new();
        for row in &rows {
            let variant = variant_from_row(row).map_err(|e| map_sqlx_error("price_lines", e))?;
            let category: Uuid = row.try_get("category_id").map_err(|e| map_sqlx_error("price_lines", e))?;
            found.insert(variant.id, (variant, CategoryId::from_uuid(category)));
        }

        items
            .into_iter()
            .map(|(variant_id, qty)| -> StoreResult<PricedLine> {
                if qty < 1 {
                    return Err(DomainError::field("items", "Ensure this value is greater than or equal to 1.").into());
                }
                let (variant, category_id) = found.get(&variant_id).ok_or_else(|| invalid_pk("items", variant_id))?;
                Ok(PricedLine {
                    variant_id,
                    product_id: variant.product_id,
                    category_id: *category_id,
                    unit_price: variant.effective_price(),
                    qty,
                })
            })
            .collect()
    }

    #[instrument(skip(self, filter, ordering), err)]
    async fn list_reviews(
        &self,
        filter: ReviewFilter,
        ordering: Ordering<ReviewSort>,
        page: PageRequest,
    ) -> StoreResult<Page<ReviewView>> {
        let dir = if ordering.descending { "DESC" } else { "ASC" };
        let order = match ordering.field {
            ReviewSort::CreatedAt => format!("r.created_at {dir}, r.id {dir}"),
            ReviewSort::Rating => format!("r.rating {dir}, r.created_at {dir}, r.id {dir}"),
        };
        self.fetch_page(
            "list_reviews",
            "SELECT r.*, cu.name AS customer_name",
            "FROM reviews r LEFT JOIN customers cu ON cu.id = r.customer_id",
            |q| {
                if let Some(product) = filter.product {
                    q.push(" AND r.product_id = ");
                    q.push_bind(*product.as_uuid());
                }
                if let Some(rating) = filter.rating {
                    q.push(" AND r.rating = ");
                    q.push_bind(rating);
                }
            },
            &order,
            page,
            review_view_from_row,
        )
        .await
    }

    #[instrument(skip(self), fields(review_id = %id), err)]
    async fn get_review(&self, id: ReviewId) -> StoreResult<ReviewView> {
        let row = sqlx::query(
            r#"
            SELECT r.*, cu.name AS customer_name
            FROM reviews r LEFT JOIN customers cu ON cu.id = r.customer_id
            WHERE r.id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_review", e))?
        .ok_or_else(|| StoreError::not_found("review"))?;
        review_view_from_row(&row).map_err(|e| map_sqlx_error("get_review", e))
    }

    #[instrument(skip(self, review), fields(product_id = %review.product_id), err)]
    async fn create_review(&self, review: Review) -> StoreResult<ReviewView> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("create_review", e))?;
        if !product_exists(&mut tx, review.product_id).await? {
            return Err(invalid_pk("product", review.product_id).into());
        }
        sqlx::query(
            r#"
            INSERT INTO reviews (id, product_id, customer_id, rating, comment, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(review.id.as_uuid())
        .bind(review.product_id.as_uuid())
        .bind(review.customer_id.map(|c| *c.as_uuid()))
        .bind(review.rating)
        .bind(&review.comment)
        .bind(review.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("create_review", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("create_review", e))?;
        self.get_review(review.id).await
    }

    #[instrument(skip(self), fields(review_id = %id), err)]
    async fn delete_review(&self, id: ReviewId) -> StoreResult<()> {
        let result = sqlx::query(r#"DELETE FROM reviews WHERE id = $1"#)
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_review", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("review"));
        }
        Ok(())
    }
}
