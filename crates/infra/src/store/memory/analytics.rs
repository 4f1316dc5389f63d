use std::collections::BTreeMap;

use async_trait::async_trait;

use storefront_analytics::{AnalyticsSnapshot, MetricSummary, SnapshotFilter, SnapshotSort, dashboard};
use storefront_core::{Ordering, Page, PageRequest, SnapshotId};

use super::{InMemoryStore, sorted_page};
use crate::error::{StoreError, StoreResult};
use crate::store::AnalyticsStore;

#[async_trait]
impl AnalyticsStore for InMemoryStore {
    async fn list_snapshots(
        &self,
        filter: SnapshotFilter,
        ordering: Ordering<SnapshotSort>,
        page: PageRequest,
    ) -> StoreResult<Page<AnalyticsSnapshot>> {
        let state = self.read();
        let matching = state.snapshots.values().filter(|s| filter.matches(s)).cloned().collect();
        Ok(sorted_page(
            matching,
            |a: &AnalyticsSnapshot, b: &AnalyticsSnapshot| SnapshotSort::compare(&ordering, a, b),
            page,
        ))
    }

    async fn get_snapshot(&self, id: SnapshotId) -> StoreResult<AnalyticsSnapshot> {
        let state = self.read();
        state
            .snapshots
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("analytics snapshot"))
    }

    async fn create_snapshot(&self, snapshot: AnalyticsSnapshot) -> StoreResult<AnalyticsSnapshot> {
        let mut state = self.write();
        state.snapshots.insert(snapshot.id, snapshot.clone());
        Ok(snapshot)
    }

    async fn delete_snapshot(&self, id: SnapshotId) -> StoreResult<()> {
        let mut state = self.write();
        state
            .snapshots
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("analytics snapshot"))
    }

    async fn metrics(&self) -> StoreResult<BTreeMap<String, MetricSummary>> {
        let state = self.read();
        let all: Vec<AnalyticsSnapshot> = state.snapshots.values().cloned().collect();
        Ok(dashboard(&all))
    }
}
