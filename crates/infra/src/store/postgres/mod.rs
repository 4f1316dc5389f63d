//! Postgres-backed store.
//!
//! Every multi-row mutation runs in one transaction. Rows that a check reads
//! before writing (variant stock, the open cart, promotion usage) are locked
//! with `SELECT ... FOR UPDATE` so concurrent checkouts serialise on them.
//!
//! ## Error Mapping
//!
//! SQLx errors go through [`map_sqlx_error`]; unique and foreign-key
//! violations become domain conflicts, everything else is
//! `StoreError::Database` tagged with the operation name.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use tracing::instrument;

use storefront_auth::{ProfileUpdate, User};
use storefront_core::{CustomerId, DomainError, Page, PageRequest, UserId};
use storefront_sales::{Customer, CustomerFilter, CustomerPatch};

use crate::error::{StoreError, StoreResult, map_sqlx_error};
use crate::store::{CustomerStore, UserStore, invalid_pk};

mod analytics;
mod catalog;
mod inventory;
mod pricing;
mod rows;
mod sales;

use rows::{customer_from_row, user_from_row};

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Open a pool against `url`.
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the bundled migrations.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&*self.pool).await?;
        tracing::info!("database migrations applied");
        Ok(())
    }

    /// Count plus one page of a filtered query.
    ///
    /// `from` is everything between the select list and `WHERE`; `filter`
    /// appends ` AND ...` clauses and is run once per query.
    #[allow(clippy::too_many_arguments)]
    async fn fetch_page<T>(
        &self,
        operation: &'static str,
        select: &str,
        from: &str,
        filter: impl Fn(&mut QueryBuilder<'static, Postgres>),
        order_by: &str,
        page: PageRequest,
        decode: impl Fn(&PgRow) -> Result<T, sqlx::Error>,
    ) -> StoreResult<Page<T>> {
        let mut count_query = QueryBuilder::new(format!("SELECT COUNT(*) {from} WHERE TRUE"));
        filter(&mut count_query);
        let count: i64 = count_query
            .build_query_scalar()
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;

        let mut query = QueryBuilder::new(format!("{select} {from} WHERE TRUE"));
        filter(&mut query);
        query.push(format!(" ORDER BY {order_by} LIMIT "));
        query.push_bind(page.limit() as i64);
        query.push(" OFFSET ");
        query.push_bind(page.offset() as i64);
        let rows = query
            .build()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        let results = rows
            .iter()
            .map(&decode)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error(operation, e))?;

        Ok(Page {
            count: count.max(0) as u64,
            page: page.page,
            page_size: page.page_size,
            results,
        })
    }
}

/// `ORDER BY` body for `column`, tie-broken on `id` in the same direction.
fn order_by(column: &str, id: &str, descending: bool) -> String {
    let dir = if descending { "DESC" } else { "ASC" };
    format!("{column} {dir}, {id} {dir}")
}

/// Case-insensitive substring match of `term` against any of `columns`.
fn push_search(query: &mut QueryBuilder<'static, Postgres>, columns: &[&str], term: &str) {
    query.push(" AND (");
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            query.push(" OR ");
        }
        query.push(format!("strpos(lower({column}), lower("));
        query.push_bind(term.to_string());
        query.push(")) > 0");
    }
    query.push(")");
}

fn protected(what: &str) -> StoreError {
    DomainError::conflict(crate::error::protected_message(what)).into()
}

async fn user_exists(conn: &mut PgConnection, id: UserId) -> StoreResult<bool> {
    sqlx::query_scalar(r#"SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)"#)
        .bind(id.as_uuid())
        .fetch_one(conn)
        .await
        .map_err(|e| map_sqlx_error("user_exists", e))
}

async fn insert_customer(conn: &mut PgConnection, customer: &Customer) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO customers (id, user_id, email, name, phone, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(customer.id.as_uuid())
    .bind(customer.user_id.map(|u| *u.as_uuid()))
    .bind(&customer.email)
    .bind(&customer.name)
    .bind(&customer.phone)
    .bind(customer.created_at)
    .bind(customer.updated_at)
    .execute(conn)
    .await
    .map_err(|e| map_sqlx_error("insert_customer", e))?;
    Ok(())
}

async fn fetch_customer_by_user(conn: &mut PgConnection, user_id: UserId) -> StoreResult<Option<Customer>> {
    let row = sqlx::query(r#"SELECT * FROM customers WHERE user_id = $1"#)
        .bind(user_id.as_uuid())
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error("customer_for_user", e))?;
    row.map(|r| customer_from_row(&r))
        .transpose()
        .map_err(|e| map_sqlx_error("customer_for_user", e))
}

#[async_trait]
impl UserStore for PostgresStore {
    #[instrument(skip(self, user, customer), fields(username = %user.username), err)]
    async fn create_account(&self, user: User, mut customer: Customer) -> StoreResult<(User, Customer)> {
        customer.user_id = Some(user.id);
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("create_account", e))?;
        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password_hash, first_name, last_name, is_staff, date_joined)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.is_staff)
        .bind(user.date_joined)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("create_account", e))?;
        insert_customer(&mut *tx, &customer).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("create_account", e))?;
        Ok((user, customer))
    }

    #[instrument(skip(self), err)]
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query(r#"SELECT * FROM users WHERE username = $1"#)
            .bind(username)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_user_by_username", e))?;
        row.map(|r| user_from_row(&r))
            .transpose()
            .map_err(|e| map_sqlx_error("find_user_by_username", e))
    }

    async fn get_user(&self, id: UserId) -> StoreResult<User> {
        self.find_user(id).await?.ok_or_else(|| StoreError::not_found("user"))
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn find_user(&self, id: UserId) -> StoreResult<Option<User>> {
        let row = sqlx::query(r#"SELECT * FROM users WHERE id = $1"#)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_user", e))?;
        row.map(|r| user_from_row(&r))
            .transpose()
            .map_err(|e| map_sqlx_error("find_user", e))
    }

    #[instrument(skip(self, update), fields(user_id = %id), err)]
    async fn update_user(&self, id: UserId, update: ProfileUpdate) -> StoreResult<User> {
        update.validate()?;
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("update_user", e))?;
        let row = sqlx::query(r#"SELECT * FROM users WHERE id = $1 FOR UPDATE"#)
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_user", e))?
            .ok_or_else(|| StoreError::not_found("user"))?;
        let mut user = user_from_row(&row).map_err(|e| map_sqlx_error("update_user", e))?;
        user.apply(&update);
        sqlx::query(r#"UPDATE users SET email = $2, first_name = $3, last_name = $4 WHERE id = $1"#)
            .bind(id.as_uuid())
            .bind(&user.email)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_user", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("update_user", e))?;
        Ok(user)
    }
}

#[async_trait]
impl CustomerStore for PostgresStore {
    #[instrument(skip(self, filter), err)]
    async fn list_customers(&self, filter: CustomerFilter, page: PageRequest) -> StoreResult<Page<Customer>> {
        self.fetch_page(
            "list_customers",
            "SELECT *",
            "FROM customers",
            |q| {
                if let Some(term) = &filter.search {
                    push_search(q, &["name", "email"], term);
                }
            },
            &order_by("created_at", "id", true),
            page,
            customer_from_row,
        )
        .await
    }

    #[instrument(skip(self), fields(customer_id = %id), err)]
    async fn get_customer(&self, id: CustomerId) -> StoreResult<Customer> {
        let row = sqlx::query(r#"SELECT * FROM customers WHERE id = $1"#)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_customer", e))?
            .ok_or_else(|| StoreError::not_found("customer"))?;
        customer_from_row(&row).map_err(|e| map_sqlx_error("get_customer", e))
    }

    async fn customer_for_user(&self, user_id: UserId) -> StoreResult<Option<Customer>> {
        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("customer_for_user", e))?;
        fetch_customer_by_user(&mut *conn, user_id).await
    }

    #[instrument(skip(self, fallback), fields(user_id = %user_id), err)]
    async fn ensure_customer(&self, user_id: UserId, mut fallback: Customer) -> StoreResult<Customer> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("ensure_customer", e))?;
        if let Some(existing) = fetch_customer_by_user(&mut *tx, user_id).await? {
            return Ok(existing);
        }
        if !user_exists(&mut *tx, user_id).await? {
            return Err(StoreError::not_found("user"));
        }
        fallback.user_id = Some(user_id);
        sqlx::query(
            r#"
            INSERT INTO customers (id, user_id, email, name, phone, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT ON CONSTRAINT customers_user_id_key DO NOTHING
            "#,
        )
        .bind(fallback.id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(&fallback.email)
        .bind(&fallback.name)
        .bind(&fallback.phone)
        .bind(fallback.created_at)
        .bind(fallback.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("ensure_customer", e))?;
        let customer = fetch_customer_by_user(&mut *tx, user_id)
            .await?
            .ok_or_else(|| StoreError::not_found("customer"))?;
        tx.commit().await.map_err(|e| map_sqlx_error("ensure_customer", e))?;
        Ok(customer)
    }

    #[instrument(skip(self, customer), fields(customer_id = %customer.id), err)]
    async fn create_customer(&self, customer: Customer) -> StoreResult<Customer> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("create_customer", e))?;
        if let Some(user_id) = customer.user_id {
            if !user_exists(&mut *tx, user_id).await? {
                return Err(invalid_pk("user", user_id).into());
            }
        }
        insert_customer(&mut *tx, &customer).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("create_customer", e))?;
        Ok(customer)
    }

    #[instrument(skip(self, patch), fields(customer_id = %id), err)]
    async fn update_customer(&self, id: CustomerId, patch: CustomerPatch, now: DateTime<Utc>) -> StoreResult<Customer> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("update_customer", e))?;
        let row = sqlx::query(r#"SELECT * FROM customers WHERE id = $1 FOR UPDATE"#)
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_customer", e))?
            .ok_or_else(|| StoreError::not_found("customer"))?;
        let mut customer = customer_from_row(&row).map_err(|e| map_sqlx_error("update_customer", e))?;
        let relinked = patch.user.is_some();
        customer.apply(patch, now)?;
        if let (true, Some(user_id)) = (relinked, customer.user_id) {
            if !user_exists(&mut *tx, user_id).await? {
                return Err(invalid_pk("user", user_id).into());
            }
        }
        sqlx::query(
            r#"
            UPDATE customers
            SET user_id = $2, email = $3, name = $4, phone = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(customer.user_id.map(|u| *u.as_uuid()))
        .bind(&customer.email)
        .bind(&customer.name)
        .bind(&customer.phone)
        .bind(customer.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_customer", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("update_customer", e))?;
        Ok(customer)
    }

    #[instrument(skip(self), fields(customer_id = %id), err)]
    async fn delete_customer(&self, id: CustomerId) -> StoreResult<()> {
        let result = sqlx::query(r#"DELETE FROM customers WHERE id = $1"#)
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_customer", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("customer"));
        }
        Ok(())
    }
}
