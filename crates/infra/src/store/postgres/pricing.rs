use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::PgConnection;
use tracing::instrument;

use storefront_core::{Page, PageRequest, PricingRuleId, PromotionId};
use storefront_pricing::{
    PricingRule, PricingRuleFilter, PricingRulePatch, Promotion, PromotionFilter, PromotionPatch, PromotionView,
    normalize_code,
};

use super::rows::{promotion_from_row, rule_from_row};
use super::{PostgresStore, protected, push_search};
use crate::error::{StoreError, StoreResult, map_sqlx_error};
use crate::store::{PricingStore, invalid_pk};

/// Promotion columns aliased for [`promotion_from_row`], joined with the rule's.
const PROMOTION_SELECT: &str = r#"
    SELECT pr.id AS p_id, pr.code AS p_code, pr.name AS p_name, pr.description AS p_description,
           pr.rule_id AS p_rule_id, pr.active AS p_active, pr.usage_limit AS p_usage_limit,
           pr.used_count AS p_used_count, r.*"#;

const PROMOTION_FROM: &str = "FROM promotions pr JOIN pricing_rules r ON r.id = pr.rule_id";

const ACTIVE_THEN_NAME: &str = "active DESC, name ASC, id ASC";

fn promotion_view_from_row(row: &PgRow) -> Result<PromotionView, sqlx::Error> {
    Ok(PromotionView::new(promotion_from_row(row)?, rule_from_row(row)?))
}

async fn write_rule(conn: &mut PgConnection, rule: &PricingRule, insert: bool) -> StoreResult<()> {
    let sql = if insert {
        r#"
        INSERT INTO pricing_rules (id, name, rule_type, value, applies_to, active, starts_at, ends_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#
    } else {
        r#"
        UPDATE pricing_rules
        SET name = $2, rule_type = $3, value = $4, applies_to = $5, active = $6, starts_at = $7, ends_at = $8
        WHERE id = $1
        "#
    };
    sqlx::query(sql)
        .bind(rule.id.as_uuid())
        .bind(&rule.name)
        .bind(rule.rule_type.as_str())
        .bind(rule.value)
        .bind(Json(&rule.applies_to))
        .bind(rule.active)
        .bind(rule.starts_at)
        .bind(rule.ends_at)
        .execute(conn)
        .await
        .map_err(|e| map_sqlx_error("write_rule", e))?;
    Ok(())
}

async fn write_promotion(conn: &mut PgConnection, promotion: &Promotion, insert: bool) -> StoreResult<()> {
    let sql = if insert {
        r#"
        INSERT INTO promotions (id, code, name, description, rule_id, active, usage_limit, used_count)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#
    } else {
        r#"
        UPDATE promotions
        SET code = $2, name = $3, description = $4, rule_id = $5, active = $6, usage_limit = $7, used_count = $8
        WHERE id = $1
        "#
    };
    sqlx::query(sql)
        .bind(promotion.id.as_uuid())
        .bind(&promotion.code)
        .bind(&promotion.name)
        .bind(&promotion.description)
        .bind(promotion.rule_id.as_uuid())
        .bind(promotion.active)
        .bind(promotion.usage_limit)
        .bind(promotion.used_count)
        .execute(conn)
        .await
        .map_err(|e| map_sqlx_error("write_promotion", e))?;
    Ok(())
}

async fn rule_exists(conn: &mut PgConnection, id: PricingRuleId) -> StoreResult<bool> {
    sqlx::query_scalar(r#"SELECT EXISTS (SELECT 1 FROM pricing_rules WHERE id = $1)"#)
        .bind(id.as_uuid())
        .fetch_one(conn)
        .await
        .map_err(|e| map_sqlx_error("rule_exists", e))
}

/// Promotion and rule by code, locking the promotion row when `lock` is set.
pub(super) async fn promotion_by_code(
    conn: &mut PgConnection,
    code: &str,
    lock: bool,
) -> StoreResult<Option<(Promotion, PricingRule)>> {
    let sql = format!(
        "{PROMOTION_SELECT} {PROMOTION_FROM} WHERE upper(pr.code) = $1{}",
        if lock { " FOR UPDATE OF pr" } else { "" }
    );
    let row = sqlx::query(&sql)
        .bind(normalize_code(code))
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error("find_promotion", e))?;
    row.map(|r| Ok((promotion_from_row(&r)?, rule_from_row(&r)?)))
        .transpose()
        .map_err(|e| map_sqlx_error("find_promotion", e))
}

pub(super) async fn save_promotion_usage(conn: &mut PgConnection, promotion: &Promotion) -> StoreResult<()> {
    sqlx::query(r#"UPDATE promotions SET used_count = $2 WHERE id = $1"#)
        .bind(promotion.id.as_uuid())
        .bind(promotion.used_count)
        .execute(conn)
        .await
        .map_err(|e| map_sqlx_error("save_promotion_usage", e))?;
    Ok(())
}

impl PostgresStore {
    async fn promotion_view(&self, id: PromotionId) -> StoreResult<PromotionView> {
        let sql = format!("{PROMOTION_SELECT} {PROMOTION_FROM} WHERE pr.id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_promotion", e))?
            .ok_or_else(|| StoreError::not_found("promotion"))?;
        promotion_view_from_row(&row).map_err(|e| map_sqlx_error("get_promotion", e))
    }
}

#[async_trait]
impl PricingStore for PostgresStore {
    #[instrument(skip(self, filter), err)]
    async fn list_rules(&self, filter: PricingRuleFilter, page: PageRequest) -> StoreResult<Page<PricingRule>> {
        self.fetch_page(
            "list_rules",
            "SELECT *",
            "FROM pricing_rules",
            |q| {
                if let Some(active) = filter.active {
                    q.push(" AND active = ");
                    q.push_bind(active);
                }
                if let Some(rule_type) = filter.rule_type {
                    q.push(" AND rule_type = ");
                    q.push_bind(rule_type.as_str());
                }
            },
            ACTIVE_THEN_NAME,
            page,
            rule_from_row,
        )
        .await
    }

    #[instrument(skip(self), fields(rule_id = %id), err)]
    async fn get_rule(&self, id: PricingRuleId) -> StoreResult<PricingRule> {
        let row = sqlx::query(r#"SELECT * FROM pricing_rules WHERE id = $1"#)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_rule", e))?
            .ok_or_else(|| StoreError::not_found("pricing rule"))?;
        rule_from_row(&row).map_err(|e| map_sqlx_error("get_rule", e))
    }

    #[instrument(skip(self, rule), fields(rule_id = %rule.id), err)]
    async fn create_rule(&self, rule: PricingRule) -> StoreResult<PricingRule> {
        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("create_rule", e))?;
        write_rule(&mut conn, &rule, true).await?;
        Ok(rule)
    }

    #[instrument(skip(self, patch), fields(rule_id = %id), err)]
    async fn update_rule(&self, id: PricingRuleId, patch: PricingRulePatch) -> StoreResult<PricingRule> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("update_rule", e))?;
        let row = sqlx::query(r#"SELECT * FROM pricing_rules WHERE id = $1 FOR UPDATE"#)
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_rule", e))?
            .ok_or_else(|| StoreError::not_found("pricing rule"))?;
        let mut rule = rule_from_row(&row).map_err(|e| map_sqlx_error("update_rule", e))?;
        rule.apply(patch)?;
        write_rule(&mut tx, &rule, false).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("update_rule", e))?;
        Ok(rule)
    }

    #[instrument(skip(self), fields(rule_id = %id), err)]
    async fn delete_rule(&self, id: PricingRuleId) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("delete_rule", e))?;
        sqlx::query(r#"SELECT id FROM pricing_rules WHERE id = $1 FOR UPDATE"#)
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_rule", e))?
            .ok_or_else(|| StoreError::not_found("pricing rule"))?;
        let in_use: bool = sqlx::query_scalar(r#"SELECT EXISTS (SELECT 1 FROM promotions WHERE rule_id = $1)"#)
            .bind(id.as_uuid())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_rule", e))?;
        if in_use {
            return Err(protected("pricing rule"));
        }
        sqlx::query(r#"DELETE FROM pricing_rules WHERE id = $1"#)
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_rule", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("delete_rule", e))?;
        Ok(())
    }

    #[instrument(skip(self, filter), err)]
    async fn list_promotions(&self, filter: PromotionFilter, page: PageRequest) -> StoreResult<Page<PromotionView>> {
        self.fetch_page(
            "list_promotions",
            PROMOTION_SELECT,
            PROMOTION_FROM,
            |q| {
                if let Some(active) = filter.active {
                    q.push(" AND pr.active = ");
                    q.push_bind(active);
                }
                if let Some(term) = &filter.search {
                    push_search(q, &["pr.code", "pr.name"], term);
                }
            },
            "pr.active DESC, pr.name ASC, pr.id ASC",
            page,
            promotion_view_from_row,
        )
        .await
    }

    #[instrument(skip(self), fields(promotion_id = %id), err)]
    async fn get_promotion(&self, id: PromotionId) -> StoreResult<PromotionView> {
        self.promotion_view(id).await
    }

    #[instrument(skip(self), err)]
    async fn find_promotion(&self, code: &str) -> StoreResult<Option<(Promotion, PricingRule)>> {
        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("find_promotion", e))?;
        promotion_by_code(&mut conn, code, false).await
    }

    #[instrument(skip(self, promotion), fields(code = %promotion.code), err)]
    async fn create_promotion(&self, promotion: Promotion) -> StoreResult<PromotionView> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("create_promotion", e))?;
        if !rule_exists(&mut tx, promotion.rule_id).await? {
            return Err(invalid_pk("rule", promotion.rule_id).into());
        }
        write_promotion(&mut tx, &promotion, true).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("create_promotion", e))?;
        self.promotion_view(promotion.id).await
    }

    #[instrument(skip(self, patch), fields(promotion_id = %id), err)]
    async fn update_promotion(&self, id: PromotionId, patch: PromotionPatch) -> StoreResult<PromotionView> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("update_promotion", e))?;
        let sql = format!("{PROMOTION_SELECT} {PROMOTION_FROM} WHERE pr.id = $1 FOR UPDATE OF pr");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_promotion", e))?
            .ok_or_else(|| StoreError::not_found("promotion"))?;
        let mut promotion = promotion_from_row(&row).map_err(|e| map_sqlx_error("update_promotion", e))?;
        promotion.apply(patch)?;
        if !rule_exists(&mut tx, promotion.rule_id).await? {
            return Err(invalid_pk("rule", promotion.rule_id).into());
        }
        write_promotion(&mut tx, &promotion, false).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("update_promotion", e))?;
        self.promotion_view(id).await
    }

    #[instrument(skip(self), fields(promotion_id = %id), err)]
    async fn delete_promotion(&self, id: PromotionId) -> StoreResult<()> {
        let result = sqlx::query(r#"DELETE FROM promotions WHERE id = $1"#)
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_promotion", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("promotion"));
        }
        Ok(())
    }
}
