use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgConnection, Row};
use tracing::instrument;
use uuid::Uuid;

use storefront_catalog::Variant;
use storefront_core::{CartId, CartItemId, CategoryId, CustomerId, OrderId, Ordering, Page, PageRequest, VariantId};
use storefront_pricing::PricedLine;
use storefront_sales::{
    Cart, CartItem, CartItemView, CartStatus, CartView, CheckoutRequest, LockedVariant, Order, OrderFilter, OrderItem,
    OrderPatch, OrderSort, OrderView, plan_checkout,
};

use super::inventory::{insert_movement, set_stock};
use super::pricing::{promotion_by_code, save_promotion_usage};
use super::rows::{cart_from_row, cart_item_from_row, order_from_row, order_item_from_row, variant_from_row};
use super::{PostgresStore, order_by};
use crate::error::{StoreError, StoreResult, map_sqlx_error};
use crate::store::{CartQuote, SalesStore, invalid_pk};

const ORDER_SELECT: &str = "SELECT o.*, c.name AS customer_name";
const ORDER_FROM: &str = "FROM orders o LEFT JOIN customers c ON c.id = o.customer_id";

fn order_sort_column(field: OrderSort) -> &'static str {
    match field {
        OrderSort::CreatedAt => "o.created_at",
        OrderSort::GrandTotal => "o.grand_total",
    }
}

fn order_view_from_row(row: &PgRow) -> Result<OrderView, sqlx::Error> {
    Ok(OrderView {
        order: order_from_row(row)?,
        customer_name: row.try_get("customer_name")?,
    })
}

async fn cart_items(conn: &mut PgConnection, carts: &[CartId]) -> StoreResult<HashMap<CartId, Vec<CartItem>>> {
    let ids: Vec<Uuid> = carts.iter().map(|c| *c.as_uuid()).collect();
    let rows = sqlx::query(r#"SELECT * FROM cart_items WHERE cart_id = ANY($1) ORDER BY position"#)
        .bind(ids)
        .fetch_all(conn)
        .await
        .map_err(|e| map_sqlx_error("cart_items", e))?;
    let mut grouped: HashMap<CartId, Vec<CartItem>> = HashMap::new();
    for row in &rows {
        let item = cart_item_from_row(row).map_err(|e| map_sqlx_error("cart_items", e))?;
        grouped.entry(item.cart_id).or_default().push(item);
    }
    Ok(grouped)
}

async fn variants_by_id(conn: &mut PgConnection, ids: &[VariantId]) -> StoreResult<HashMap<VariantId, Variant>> {
    let ids: Vec<Uuid> = ids.iter().map(|v| *v.as_uuid()).collect();
    let rows = sqlx::query(r#"SELECT * FROM variants WHERE id = ANY($1)"#)
        .bind(ids)
        .fetch_all(conn)
        .await
        .map_err(|e| map_sqlx_error("variants_by_id", e))?;
    rows.iter()
        .map(|row| variant_from_row(row).map(|v| (v.id, v)))
        .collect::<Result<_, _>>()
        .map_err(|e| map_sqlx_error("variants_by_id", e))
}

/// Attach items to each cart and resolve their variants.
async fn cart_views(conn: &mut PgConnection, mut carts: Vec<Cart>) -> StoreResult<Vec<CartView>> {
    let ids: Vec<CartId> = carts.iter().map(|c| c.id).collect();
    let mut items = cart_items(&mut *conn, &ids).await?;
    for cart in &mut carts {
        cart.items = items.remove(&cart.id).unwrap_or_default();
    }
    let variant_ids: Vec<VariantId> = carts.iter().flat_map(|c| c.items.iter().map(|i| i.variant_id)).collect();
    let variants = variants_by_id(conn, &variant_ids).await?;
    Ok(carts
        .into_iter()
        .map(|cart| CartView::new(cart, |id| variants.get(&id).cloned()))
        .collect())
}

async fn cart_view(conn: &mut PgConnection, cart: Cart) -> StoreResult<CartView> {
    cart_views(conn, vec![cart])
        .await?
        .pop()
        .ok_or_else(|| StoreError::not_found("cart"))
}

/// Lock the customer's open cart, creating one when `create` is set.
///
/// The customer row is locked first so concurrent callers cannot both
/// open a cart.
async fn lock_open_cart(
    conn: &mut PgConnection,
    customer: CustomerId,
    now: DateTime<Utc>,
    create: bool,
) -> StoreResult<Option<Cart>> {
    sqlx::query(r#"SELECT id FROM customers WHERE id = $1 FOR UPDATE"#)
        .bind(customer.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("lock_open_cart", e))?
        .ok_or_else(|| StoreError::not_found("customer"))?;

    let row = sqlx::query(
        r#"
        SELECT * FROM carts
        WHERE customer_id = $1 AND status = 'open'
        ORDER BY updated_at DESC, id DESC
        LIMIT 1
        FOR UPDATE
        "#,
    )
    .bind(customer.as_uuid())
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("lock_open_cart", e))?;

    match row {
        Some(row) => {
            let mut cart = cart_from_row(&row).map_err(|e| map_sqlx_error("lock_open_cart", e))?;
            cart.items = cart_items(conn, &[cart.id]).await?.remove(&cart.id).unwrap_or_default();
            Ok(Some(cart))
        }
        None if create => {
            let cart = Cart::open(customer, now);
            sqlx::query(
                r#"
                INSERT INTO carts (id, customer_id, status, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(cart.id.as_uuid())
            .bind(customer.as_uuid())
            .bind(cart.status.as_str())
            .bind(cart.created_at)
            .bind(cart.updated_at)
            .execute(conn)
            .await
            .map_err(|e| map_sqlx_error("open_cart", e))?;
            Ok(Some(cart))
        }
        None => Ok(None),
    }
}

async fn save_cart_header(conn: &mut PgConnection, cart: &Cart) -> StoreResult<()> {
    sqlx::query(r#"UPDATE carts SET status = $2, updated_at = $3 WHERE id = $1"#)
        .bind(cart.id.as_uuid())
        .bind(cart.status.as_str())
        .bind(cart.updated_at)
        .execute(conn)
        .await
        .map_err(|e| map_sqlx_error("save_cart", e))?;
    Ok(())
}

async fn upsert_cart_item(conn: &mut PgConnection, item: &CartItem) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO cart_items (id, cart_id, variant_id, qty, price_at_add)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (id) DO UPDATE SET qty = EXCLUDED.qty
        "#,
    )
    .bind(item.id.as_uuid())
    .bind(item.cart_id.as_uuid())
    .bind(item.variant_id.as_uuid())
    .bind(item.qty)
    .bind(item.price_at_add.minor())
    .execute(conn)
    .await
    .map_err(|e| map_sqlx_error("upsert_cart_item", e))?;
    Ok(())
}

async fn lock_variant(conn: &mut PgConnection, id: VariantId) -> StoreResult<Option<Variant>> {
    let row = sqlx::query(r#"SELECT * FROM variants WHERE id = $1 FOR UPDATE"#)
        .bind(id.as_uuid())
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error("lock_variant", e))?;
    row.map(|r| variant_from_row(&r))
        .transpose()
        .map_err(|e| map_sqlx_error("lock_variant", e))
}

/// Lock every variant in `cart`, in id order, with its product's category.
async fn lock_cart_variants(conn: &mut PgConnection, cart: &Cart) -> StoreResult<HashMap<VariantId, LockedVariant>> {
    let ids: Vec<Uuid> = cart.items.iter().map(|i| *i.variant_id.as_uuid()).collect();
    let rows = sqlx::query(
        r#"
        SELECT v.*, p.category_id
        FROM variants v
        JOIN products p ON p.id = v.product_id
        WHERE v.id = ANY($1)
        ORDER BY v.id
        FOR UPDATE OF v
        "#,
    )
    .bind(ids)
    .fetch_all(conn)
    .await
    .map_err(|e| map_sqlx_error("lock_cart_variants", e))?;
    rows.iter()
        .map(|row| -> Result<(VariantId, LockedVariant), sqlx::Error> {
            let variant = variant_from_row(row)?;
            let category_id = CategoryId::from_uuid(row.try_get("category_id")?);
            Ok((variant.id, LockedVariant { variant, category_id }))
        })
        .collect::<Result<_, sqlx::Error>>()
        .map_err(|e| map_sqlx_error("lock_cart_variants", e))
}

async fn insert_order(conn: &mut PgConnection, order: &Order) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO orders (
            id, order_number, customer_id, status, subtotal, discount_total, shipping_total, tax_total,
            grand_total, currency, payment_ref, promotion_code, shipping_address, billing_address,
            created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        "#,
    )
    .bind(order.id.as_uuid())
    .bind(order.order_number.as_str())
    .bind(order.customer_id.map(|c| *c.as_uuid()))
    .bind(order.status.as_str())
    .bind(order.subtotal.minor())
    .bind(order.discount_total.minor())
    .bind(order.shipping_total.minor())
    .bind(order.tax_total.minor())
    .bind(order.grand_total.minor())
    .bind(&order.currency)
    .bind(&order.payment_ref)
    .bind(&order.promotion_code)
    .bind(Json(&order.shipping_address))
    .bind(Json(&order.billing_address))
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("insert_order", e))?;

    for item in &order.items {
        sqlx::query(
            r#"
            INSERT INTO order_items (id, order_id, variant_id, qty, unit_price, line_total)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(item.order_id.as_uuid())
        .bind(item.variant_id.as_uuid())
        .bind(item.qty)
        .bind(item.unit_price.minor())
        .bind(item.line_total.minor())
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;
    }
    Ok(())
}

async fn order_items(conn: &mut PgConnection, orders: &[OrderId]) -> StoreResult<HashMap<OrderId, Vec<OrderItem>>> {
    let ids: Vec<Uuid> = orders.iter().map(|o| *o.as_uuid()).collect();
    let rows = sqlx::query(r#"SELECT * FROM order_items WHERE order_id = ANY($1) ORDER BY position"#)
        .bind(ids)
        .fetch_all(conn)
        .await
        .map_err(|e| map_sqlx_error("order_items", e))?;
    let mut grouped: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
    for row in &rows {
        let item = order_item_from_row(row).map_err(|e| map_sqlx_error("order_items", e))?;
        grouped.entry(item.order_id).or_default().push(item);
    }
    Ok(grouped)
}

async fn fetch_order_view(conn: &mut PgConnection, id: OrderId, lock: bool) -> StoreResult<OrderView> {
    let sql = format!(
        "{ORDER_SELECT} {ORDER_FROM} WHERE o.id = $1{}",
        if lock { " FOR UPDATE OF o" } else { "" }
    );
    let row = sqlx::query(&sql)
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("get_order", e))?
        .ok_or_else(|| StoreError::not_found("order"))?;
    let mut view = order_view_from_row(&row).map_err(|e| map_sqlx_error("get_order", e))?;
    view.order.items = order_items(conn, &[id]).await?.remove(&id).unwrap_or_default();
    Ok(view)
}

impl PostgresStore {
    async fn acquire(&self, operation: &'static str) -> StoreResult<sqlx::pool::PoolConnection<sqlx::Postgres>> {
        self.pool.acquire().await.map_err(|e| map_sqlx_error(operation, e))
    }
}

#[async_trait]
impl SalesStore for PostgresStore {
    #[instrument(skip(self), err)]
    async fn list_carts(&self, customer: Option<CustomerId>, page: PageRequest) -> StoreResult<Page<CartView>> {
        let carts = self
            .fetch_page(
                "list_carts",
                "SELECT *",
                "FROM carts",
                |q| {
                    if let Some(customer) = customer {
                        q.push(" AND customer_id = ");
                        q.push_bind(*customer.as_uuid());
                    }
                },
                &order_by("updated_at", "id", true),
                page,
                cart_from_row,
            )
            .await?;
        let mut conn = self.acquire("list_carts").await?;
        let results = cart_views(&mut conn, carts.results).await?;
        Ok(Page {
            count: carts.count,
            page: carts.page,
            page_size: carts.page_size,
            results,
        })
    }

    #[instrument(skip(self), fields(cart_id = %id), err)]
    async fn get_cart(&self, id: CartId) -> StoreResult<CartView> {
        let mut conn = self.acquire("get_cart").await?;
        let row = sqlx::query(r#"SELECT * FROM carts WHERE id = $1"#)
            .bind(id.as_uuid())
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("get_cart", e))?
            .ok_or_else(|| StoreError::not_found("cart"))?;
        let cart = cart_from_row(&row).map_err(|e| map_sqlx_error("get_cart", e))?;
        cart_view(&mut conn, cart).await
    }

    #[instrument(skip(self), fields(customer_id = %customer), err)]
    async fn open_cart(&self, customer: CustomerId, now: DateTime<Utc>) -> StoreResult<CartView> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("open_cart", e))?;
        let cart = lock_open_cart(&mut tx, customer, now, true)
            .await?
            .ok_or_else(|| StoreError::not_found("cart"))?;
        let view = cart_view(&mut tx, cart).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("open_cart", e))?;
        Ok(view)
    }

    #[instrument(skip(self), fields(customer_id = %customer, variant_id = %variant), err)]
    async fn add_cart_item(
        &self,
        customer: CustomerId,
        variant: VariantId,
        qty: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<CartItemView> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("add_cart_item", e))?;
        let mut cart = lock_open_cart(&mut tx, customer, now, true)
            .await?
            .ok_or_else(|| StoreError::not_found("cart"))?;
        let variant = lock_variant(&mut tx, variant)
            .await?
            .ok_or_else(|| invalid_pk("variant", variant))?;
        let item = cart.add_item(&variant, qty, now)?;
        upsert_cart_item(&mut tx, &item).await?;
        save_cart_header(&mut tx, &cart).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("add_cart_item", e))?;
        Ok(CartItemView::new(item, Some(variant)))
    }

    #[instrument(skip(self), fields(customer_id = %customer, item_id = %item), err)]
    async fn update_cart_item(
        &self,
        customer: CustomerId,
        item: CartItemId,
        qty: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<CartItemView> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("update_cart_item", e))?;
        let mut cart = lock_open_cart(&mut tx, customer, now, false)
            .await?
            .ok_or_else(|| StoreError::not_found("cart item"))?;
        let variant_id = cart
            .item(item)
            .map(|i| i.variant_id)
            .ok_or_else(|| StoreError::not_found("cart item"))?;
        let variant = lock_variant(&mut tx, variant_id)
            .await?
            .ok_or_else(|| StoreError::not_found("variant"))?;
        let updated = cart.update_item_qty(item, qty, &variant, now)?;
        upsert_cart_item(&mut tx, &updated).await?;
        save_cart_header(&mut tx, &cart).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("update_cart_item", e))?;
        Ok(CartItemView::new(updated, Some(variant)))
    }

    #[instrument(skip(self), fields(customer_id = %customer, item_id = %item), err)]
    async fn remove_cart_item(&self, customer: CustomerId, item: CartItemId, now: DateTime<Utc>) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("remove_cart_item", e))?;
        let mut cart = lock_open_cart(&mut tx, customer, now, false)
            .await?
            .ok_or_else(|| StoreError::not_found("cart item"))?;
        cart.remove_item(item, now)?;
        sqlx::query(r#"DELETE FROM cart_items WHERE id = $1"#)
            .bind(item.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("remove_cart_item", e))?;
        save_cart_header(&mut tx, &cart).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("remove_cart_item", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(customer_id = %customer), err)]
    async fn quote_cart(&self, customer: CustomerId, now: DateTime<Utc>) -> StoreResult<CartQuote> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("quote_cart", e))?;
        let cart = lock_open_cart(&mut tx, customer, now, true)
            .await?
            .ok_or_else(|| StoreError::not_found("cart"))?;
        let variants = lock_cart_variants(&mut tx, &cart).await?;
        let lines = cart
            .items
            .iter()
            .filter_map(|item| {
                let locked = variants.get(&item.variant_id)?;
                Some(PricedLine {
                    variant_id: item.variant_id,
                    product_id: locked.variant.product_id,
                    category_id: locked.category_id,
                    unit_price: item.price_at_add,
                    qty: item.qty,
                })
            })
            .collect();
        let cart = CartView::new(cart, |id| variants.get(&id).map(|l| l.variant.clone()));
        tx.commit().await.map_err(|e| map_sqlx_error("quote_cart", e))?;
        Ok(CartQuote { cart, lines })
    }

    #[instrument(skip(self, request), fields(customer_id = %customer), err)]
    async fn checkout(&self, customer: CustomerId, request: CheckoutRequest, now: DateTime<Utc>) -> StoreResult<OrderView> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("checkout", e))?;
        let cart = lock_open_cart(&mut tx, customer, now, false)
            .await?
            .unwrap_or_else(|| Cart::open(customer, now));
        let variants = lock_cart_variants(&mut tx, &cart).await?;
        let promotion = match request.promotion_code() {
            Some(code) => promotion_by_code(&mut tx, code, true).await?,
            None => None,
        };

        let plan = plan_checkout(
            &cart,
            &variants,
            &request,
            promotion.as_ref().map(|(p, r)| (p, r)),
            now,
        )?;

        for change in &plan.stock {
            set_stock(&mut tx, change.variant_id, change.stock).await?;
        }
        for movement in &plan.movements {
            insert_movement(&mut tx, movement).await?;
        }
        if let Some(promotion) = &plan.promotion {
            save_promotion_usage(&mut tx, promotion).await?;
        }
        insert_order(&mut tx, &plan.order).await?;
        let mut converted = cart;
        converted.status = CartStatus::Converted;
        converted.updated_at = now;
        save_cart_header(&mut tx, &converted).await?;
        let view = fetch_order_view(&mut tx, plan.order.id, false).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("checkout", e))?;

        tracing::debug!(order_id = %view.order.id, lines = view.order.items.len(), "checkout committed");
        Ok(view)
    }

    #[instrument(skip(self, filter, ordering), err)]
    async fn list_orders(
        &self,
        filter: OrderFilter,
        ordering: Ordering<OrderSort>,
        page: PageRequest,
    ) -> StoreResult<Page<OrderView>> {
        let mut orders = self
            .fetch_page(
                "list_orders",
                ORDER_SELECT,
                ORDER_FROM,
                |q| {
                    if let Some(customer) = filter.customer {
                        q.push(" AND o.customer_id = ");
                        q.push_bind(*customer.as_uuid());
                    }
                    if let Some(status) = filter.status {
                        q.push(" AND o.status = ");
                        q.push_bind(status.as_str());
                    }
                },
                &order_by(order_sort_column(ordering.field), "o.id", ordering.descending),
                page,
                order_view_from_row,
            )
            .await?;
        let ids: Vec<OrderId> = orders.results.iter().map(|v| v.order.id).collect();
        let mut conn = self.acquire("list_orders").await?;
        let mut items = order_items(&mut conn, &ids).await?;
        for view in &mut orders.results {
            view.order.items = items.remove(&view.order.id).unwrap_or_default();
        }
        Ok(orders)
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn get_order(&self, id: OrderId) -> StoreResult<OrderView> {
        let mut conn = self.acquire("get_order").await?;
        fetch_order_view(&mut conn, id, false).await
    }

    #[instrument(skip(self, patch), fields(order_id = %id), err)]
    async fn update_order(&self, id: OrderId, patch: OrderPatch, now: DateTime<Utc>) -> StoreResult<OrderView> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("update_order", e))?;
        let mut view = fetch_order_view(&mut tx, id, true).await?;
        let previous = view.order.status;
        view.order.apply(patch, now)?;
        let order = &view.order;
        sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, payment_ref = $3, shipping_address = $4, billing_address = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(order.status.as_str())
        .bind(&order.payment_ref)
        .bind(Json(&order.shipping_address))
        .bind(Json(&order.billing_address))
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_order", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("update_order", e))?;

        if order.status != previous {
            tracing::info!(
                order_id = %id,
                from = previous.as_str(),
                to = order.status.as_str(),
                "order status changed"
            );
        }
        Ok(view)
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn delete_order(&self, id: OrderId) -> StoreResult<()> {
        let result = sqlx::query(r#"DELETE FROM orders WHERE id = $1"#)
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_order", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("order"));
        }
        Ok(())
    }
}
