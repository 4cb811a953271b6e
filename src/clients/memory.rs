//! In-process stores for embedding the engine without PostgreSQL, and for tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::{
    clients::store::{NotificationStore, RecipientDirectory, StatsStore},
    models::{
        delivery::{DeliveryAttempt, DeliveryResult, FinalOutcome},
        notification::NotificationRecord,
        stats::DeliveryStats,
    },
};

#[derive(Default)]
pub struct MemoryStatsStore {
    attempts: DashMap<String, Vec<DeliveryAttempt>>,
    results: DashMap<String, DeliveryResult>,
}

impl MemoryStatsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts for one request in the order they were recorded.
    pub fn attempts_for(&self, request_id: &str) -> Vec<DeliveryAttempt> {
        self.attempts
            .get(request_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn result_for(&self, request_id: &str) -> Option<DeliveryResult> {
        self.results.get(request_id).map(|entry| entry.value().clone())
    }

    pub fn result_count(&self) -> usize {
        self.results.len()
    }
}

#[async_trait]
impl StatsStore for MemoryStatsStore {
    async fn record_attempt(&self, attempt: &DeliveryAttempt) -> Result<()> {
        self.attempts
            .entry(attempt.request_id.clone())
            .or_default()
            .push(attempt.clone());
        Ok(())
    }

    async fn record_result(&self, result: &DeliveryResult) -> Result<()> {
        if result.final_outcome.is_terminal() {
            self.results
                .insert(result.request_id.clone(), result.clone());
        }
        Ok(())
    }

    async fn report_window(&self, since: DateTime<Utc>) -> Result<DeliveryStats> {
        let mut total = 0u64;
        let mut delivered = 0u64;
        let mut retried = 0u64;
        let mut delivery_seconds = 0.0f64;

        for entry in self.results.iter() {
            let result = entry.value();
            let Some(resolved_at) = result.resolved_at else {
                continue;
            };
            if resolved_at < since {
                continue;
            }

            total += 1;
            if result.total_attempts > 1 {
                retried += 1;
            }
            if result.final_outcome == FinalOutcome::Delivered {
                delivered += 1;
                delivery_seconds +=
                    (resolved_at - result.created_at).num_milliseconds() as f64 / 1000.0;
            }
        }

        let average = (delivered > 0).then(|| delivery_seconds / delivered as f64);

        Ok(DeliveryStats::from_counts(
            since, total, delivered, retried, average,
        ))
    }

    async fn has_record(&self, request_id: &str) -> Result<bool> {
        Ok(self.attempts.contains_key(request_id) || self.results.contains_key(request_id))
    }
}

#[derive(Default)]
pub struct MemoryNotificationStore {
    records: DashMap<String, NotificationRecord>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<NotificationRecord> {
        self.records.get(id).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn save(&self, record: &NotificationRecord) -> Result<()> {
        self.records
            .entry(record.id.clone())
            .and_modify(|existing| {
                existing.title = record.title.clone();
                existing.message = record.message.clone();
                existing.payload = record.payload.clone();
            })
            .or_insert_with(|| record.clone());
        Ok(())
    }

    async fn mark_sent(&self, id: &str, sent_at: DateTime<Utc>) -> Result<()> {
        if let Some(mut record) = self.records.get_mut(id) {
            record.is_sent = true;
            record.sent_at = Some(sent_at);
        }
        Ok(())
    }

    async fn mark_as_read(&self, id: &str) -> Result<bool> {
        match self.records.get_mut(id) {
            Some(mut record) => {
                record.read_at.get_or_insert_with(Utc::now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn history(&self, recipient_id: &str, limit: usize) -> Result<Vec<NotificationRecord>> {
        let mut records: Vec<NotificationRecord> = self
            .records
            .iter()
            .filter(|entry| entry.recipient_id == recipient_id)
            .map(|entry| entry.value().clone())
            .collect();

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        Ok(records)
    }
}

/// Fixed recipient to phone number table.
#[derive(Default)]
pub struct StaticDirectory {
    numbers: DashMap<String, String>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_number(self, recipient_id: impl Into<String>, phone_number: impl Into<String>) -> Self {
        self.numbers.insert(recipient_id.into(), phone_number.into());
        self
    }
}

#[async_trait]
impl RecipientDirectory for StaticDirectory {
    async fn phone_number(&self, recipient_id: &str) -> Result<Option<String>> {
        Ok(self.numbers.get(recipient_id).map(|entry| entry.value().clone()))
    }
}
