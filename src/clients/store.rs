use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    delivery::{DeliveryAttempt, DeliveryResult},
    notification::NotificationRecord,
    stats::DeliveryStats,
};

/// Append-only delivery bookkeeping.
#[async_trait]
pub trait StatsStore: Send + Sync {
    async fn record_attempt(&self, attempt: &DeliveryAttempt) -> Result<()>;

    async fn record_result(&self, result: &DeliveryResult) -> Result<()>;

    async fn report_window(&self, since: DateTime<Utc>) -> Result<DeliveryStats>;

    /// Returns `true` once any attempt or result was stored for the request.
    async fn has_record(&self, request_id: &str) -> Result<bool>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Inserts the record, or refreshes its content when the id already exists.
    async fn save(&self, record: &NotificationRecord) -> Result<()>;

    async fn mark_sent(&self, id: &str, sent_at: DateTime<Utc>) -> Result<()>;

    /// Returns `true` when a record with this id was found and updated.
    async fn mark_as_read(&self, id: &str) -> Result<bool>;

    async fn history(&self, recipient_id: &str, limit: usize) -> Result<Vec<NotificationRecord>>;
}

#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    async fn phone_number(&self, recipient_id: &str) -> Result<Option<String>>;
}

#[derive(Clone)]
pub struct Stores {
    pub stats: Arc<dyn StatsStore>,
    pub notifications: Arc<dyn NotificationStore>,
}

impl Stores {
    pub fn new(stats: Arc<dyn StatsStore>, notifications: Arc<dyn NotificationStore>) -> Self {
        Self {
            stats,
            notifications,
        }
    }
}
