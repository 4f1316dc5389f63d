use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::types::Json;
use tracing::instrument;

use storefront_analytics::{AnalyticsSnapshot, MetricSummary, SnapshotFilter, SnapshotSort, dashboard};
use storefront_core::{Ordering, Page, PageRequest, SnapshotId};

use super::rows::snapshot_from_row;
use super::{PostgresStore, order_by};
use crate::error::{StoreError, StoreResult, map_sqlx_error};
use crate::store::AnalyticsStore;

fn sort_column(field: SnapshotSort) -> &'static str {
    match field {
        SnapshotSort::CreatedAt => "created_at",
        SnapshotSort::Value => "value",
    }
}

#[async_trait]
impl AnalyticsStore for PostgresStore {
    #[instrument(skip(self, filter, ordering), err)]
    async fn list_snapshots(
        &self,
        filter: SnapshotFilter,
        ordering: Ordering<SnapshotSort>,
        page: PageRequest,
    ) -> StoreResult<Page<AnalyticsSnapshot>> {
        self.fetch_page(
            "list_snapshots",
            "SELECT *",
            "FROM analytics_snapshots",
            |q| {
                if let Some(metric) = &filter.metric {
                    q.push(" AND metric = ");
                    q.push_bind(metric.clone());
                }
                if let Some(period) = &filter.period {
                    q.push(" AND period = ");
                    q.push_bind(period.clone());
                }
            },
            &order_by(sort_column(ordering.field), "id", ordering.descending),
            page,
            snapshot_from_row,
        )
        .await
    }

    #[instrument(skip(self), fields(snapshot_id = %id), err)]
    async fn get_snapshot(&self, id: SnapshotId) -> StoreResult<AnalyticsSnapshot> {
        let row = sqlx::query(r#"SELECT * FROM analytics_snapshots WHERE id = $1"#)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_snapshot", e))?
            .ok_or_else(|| StoreError::not_found("analytics snapshot"))?;
        snapshot_from_row(&row).map_err(|e| map_sqlx_error("get_snapshot", e))
    }

    #[instrument(skip(self, snapshot), fields(metric = %snapshot.metric), err)]
    async fn create_snapshot(&self, snapshot: AnalyticsSnapshot) -> StoreResult<AnalyticsSnapshot> {
        sqlx::query(
            r#"
            INSERT INTO analytics_snapshots (id, metric, value, breakdown, period, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(snapshot.id.as_uuid())
        .bind(&snapshot.metric)
        .bind(snapshot.value)
        .bind(Json(&snapshot.breakdown))
        .bind(&snapshot.period)
        .bind(snapshot.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_snapshot", e))?;
        Ok(snapshot)
    }

    #[instrument(skip(self), fields(snapshot_id = %id), err)]
    async fn delete_snapshot(&self, id: SnapshotId) -> StoreResult<()> {
        let result = sqlx::query(r#"DELETE FROM analytics_snapshots WHERE id = $1"#)
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_snapshot", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("analytics snapshot"));
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn metrics(&self) -> StoreResult<BTreeMap<String, MetricSummary>> {
        // Latest row per metric is all the dashboard reads.
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT ON (metric) *
            FROM analytics_snapshots
            ORDER BY metric, created_at DESC, id DESC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("metrics", e))?;
        let latest = rows
            .iter()
            .map(snapshot_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error("metrics", e))?;
        Ok(dashboard(&latest))
    }
}
