use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregate delivery figures over terminal results resolved since `since`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryStats {
    pub since: DateTime<Utc>,
    pub total_sent: u64,
    pub success_rate: f64,
    pub retry_rate: f64,
    pub average_delivery_time_seconds: f64,
}

impl DeliveryStats {
    pub fn empty(since: DateTime<Utc>) -> Self {
        Self {
            since,
            total_sent: 0,
            success_rate: 0.0,
            retry_rate: 0.0,
            average_delivery_time_seconds: 0.0,
        }
    }

    pub fn from_counts(
        since: DateTime<Utc>,
        total: u64,
        delivered: u64,
        retried: u64,
        average_delivery_time_seconds: Option<f64>,
    ) -> Self {
        if total == 0 {
            return Self::empty(since);
        }

        Self {
            since,
            total_sent: total,
            success_rate: delivered as f64 / total as f64,
            retry_rate: retried as f64 / total as f64,
            average_delivery_time_seconds: average_delivery_time_seconds.unwrap_or(0.0),
        }
    }
}
