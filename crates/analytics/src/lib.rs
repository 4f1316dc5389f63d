//! `storefront-analytics`: recorded metric snapshots and the dashboard view
//! built from them.

pub mod snapshot;

pub use snapshot::{
    AnalyticsSnapshot, MetricSummary, SnapshotDraft, SnapshotFilter, SnapshotSort, TRACKED_METRICS, dashboard,
};
