use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::validate::required_text;
use storefront_core::{DomainResult, Entity, JsonObject, Ordering, SnapshotId, ValidationErrors};

pub const METRIC_MAX: usize = 40;
pub const PERIOD_MAX: usize = 20;

/// Metrics the dashboard reports on.
pub const TRACKED_METRICS: [&str; 4] = ["visibility", "conversion_rate", "engagement", "revenue"];

/// A recorded metric value for a period. `value` is in hundredths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    pub id: SnapshotId,
    pub metric: String,
    pub value: i64,
    pub breakdown: JsonObject,
    pub period: String,
    pub created_at: DateTime<Utc>,
}

impl Entity for AnalyticsSnapshot {
    type Id = SnapshotId;

    fn id(&self) -> SnapshotId {
        self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotDraft {
    #[serde(default)]
    pub metric: String,
    pub value: i64,
    #[serde(default)]
    pub breakdown: JsonObject,
    #[serde(default)]
    pub period: String,
}

impl AnalyticsSnapshot {
    pub fn create(draft: SnapshotDraft, now: DateTime<Utc>) -> DomainResult<Self> {
        let snapshot = Self {
            id: SnapshotId::new(),
            metric: draft.metric.trim().to_string(),
            value: draft.value,
            breakdown: draft.breakdown,
            period: draft.period.trim().to_string(),
            created_at: now,
        };
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn validate(&self) -> DomainResult<()> {
        let mut errors = ValidationErrors::new();
        required_text(&mut errors, "metric", &self.metric, METRIC_MAX);
        required_text(&mut errors, "period", &self.period, PERIOD_MAX);
        errors.into_result()
    }
}

/// Dashboard entry for one metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub value: i64,
    pub period: String,
    pub breakdown: JsonObject,
}

/// Latest snapshot of each tracked metric, keyed by metric name. Metrics
/// with no snapshot are left out.
pub fn dashboard(snapshots: &[AnalyticsSnapshot]) -> BTreeMap<String, MetricSummary> {
    let mut latest: BTreeMap<&str, &AnalyticsSnapshot> = BTreeMap::new();
    for s in snapshots {
        let Some(metric) = TRACKED_METRICS.iter().copied().find(|m| *m == s.metric) else {
            continue;
        };
        let newer = latest
            .get(&metric)
            .is_none_or(|cur| (s.created_at, s.id) > (cur.created_at, cur.id));
        if newer {
            latest.insert(metric, s);
        }
    }
    latest
        .into_iter()
        .map(|(metric, s)| {
            (
                metric.to_string(),
                MetricSummary {
                    value: s.value,
                    period: s.period.clone(),
                    breakdown: s.breakdown.clone(),
                },
            )
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct SnapshotFilter {
    pub metric: Option<String>,
    pub period: Option<String>,
}

impl SnapshotFilter {
    pub fn matches(&self, s: &AnalyticsSnapshot) -> bool {
        self.metric.as_ref().is_none_or(|m| *m == s.metric) && self.period.as_ref().is_none_or(|p| *p == s.period)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SnapshotSort {
    CreatedAt,
    Value,
}

impl SnapshotSort {
    pub fn lookup(name: &str) -> Option<Self> {
        match name {
            "created_at" => Some(Self::CreatedAt),
            "value" => Some(Self::Value),
            _ => None,
        }
    }

    pub fn default_ordering() -> Ordering<Self> {
        Ordering::desc(Self::CreatedAt)
    }

    pub fn compare(ordering: &Ordering<Self>, a: &AnalyticsSnapshot, b: &AnalyticsSnapshot) -> core::cmp::Ordering {
        let ord = match ordering.field {
            Self::CreatedAt => a.created_at.cmp(&b.created_at),
            Self::Value => a.value.cmp(&b.value),
        };
        ordering.apply(ord.then_with(|| a.id.cmp(&b.id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn snap(metric: &str, value: i64, age_mins: i64) -> AnalyticsSnapshot {
        let mut s = AnalyticsSnapshot::create(
            SnapshotDraft {
                metric: metric.to_string(),
                value,
                breakdown: JsonObject::new(),
                period: "daily".to_string(),
            },
            Utc::now() - Duration::minutes(age_mins),
        )
        .unwrap();
        s.breakdown.insert("source".to_string(), metric.into());
        s
    }

    #[test]
    fn metric_and_period_are_required() {
        let err = AnalyticsSnapshot::create(
            SnapshotDraft {
                metric: " ".to_string(),
                value: 1,
                breakdown: JsonObject::new(),
                period: "x".repeat(PERIOD_MAX + 1),
            },
            Utc::now(),
        )
        .unwrap_err()
        .to_string();
        assert!(err.contains("metric"));
        assert!(err.contains("period"));
    }

    #[test]
    fn dashboard_picks_latest_per_tracked_metric() {
        let snapshots = vec![
            snap("revenue", 100_00, 30),
            snap("revenue", 250_00, 5),
            snap("engagement", 42, 10),
            snap("bounce_rate", 7, 1),
        ];
        let board = dashboard(&snapshots);
        assert_eq!(board.len(), 2);
        assert_eq!(board["revenue"].value, 250_00);
        assert_eq!(board["engagement"].period, "daily");
        assert!(!board.contains_key("bounce_rate"));
        assert!(!board.contains_key("visibility"));
    }

    #[test]
    fn filter_by_metric() {
        let f = SnapshotFilter {
            metric: Some("revenue".to_string()),
            period: None,
        };
        assert!(f.matches(&snap("revenue", 1, 0)));
        assert!(!f.matches(&snap("engagement", 1, 0)));
    }
}
