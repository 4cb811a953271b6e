use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, error, info};

use crate::{
    clients::store::{NotificationStore, RecipientDirectory, StatsStore},
    models::{
        delivery::{DeliveryAttempt, DeliveryResult},
        notification::{Category, NotificationRecord, Priority},
        stats::DeliveryStats,
    },
};

const SCHEMA: &str = include_str!("../../migrations/0001_delivery_engine.sql");

/// PostgreSQL-backed notification records, delivery bookkeeping and the
/// recipient phone directory.
pub struct DatabaseClient {
    client: Client,
}

impl DatabaseClient {
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        info!("Connecting to PostgreSQL database");

        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .map_err(|e| anyhow!("Failed to connect to database: {}", e))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "PostgreSQL connection closed with error");
            }
        });

        info!("PostgreSQL connection established");

        Ok(Self { client })
    }

    pub async fn migrate(&self) -> Result<(), Error> {
        self.client
            .batch_execute(SCHEMA)
            .await
            .map_err(|e| anyhow!("Failed to apply schema: {}", e))?;

        info!("Database schema applied");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), Error> {
        self.client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| anyhow!("Database health check failed: {}", e))?;

        Ok(())
    }

    pub async fn upsert_recipient(
        &self,
        recipient_id: &str,
        phone_number: Option<&str>,
    ) -> Result<(), Error> {
        self.client
            .execute(
                r#"
                INSERT INTO recipients (id, phone_number)
                VALUES ($1, $2)
                ON CONFLICT (id) DO UPDATE SET phone_number = EXCLUDED.phone_number
                "#,
                &[&recipient_id, &phone_number],
            )
            .await
            .map_err(|e| anyhow!("Failed to upsert recipient: {}", e))?;

        Ok(())
    }

    fn record_from_row(row: &Row) -> Result<NotificationRecord, Error> {
        let category: String = row.try_get("category")?;
        let priority: String = row.try_get("priority")?;

        Ok(NotificationRecord {
            id: row.try_get("id")?,
            recipient_id: row.try_get("recipient_id")?,
            title: row.try_get("title")?,
            message: row.try_get("message")?,
            category: category.parse::<Category>()?,
            priority: priority.parse::<Priority>()?,
            payload: row.try_get("payload")?,
            is_sent: row.try_get("is_sent")?,
            sent_at: row.try_get("sent_at")?,
            created_at: row.try_get("created_at")?,
            read_at: row.try_get("read_at")?,
        })
    }
}

#[async_trait]
impl NotificationStore for DatabaseClient {
    async fn save(&self, record: &NotificationRecord) -> Result<()> {
        self.client
            .execute(
                r#"
                INSERT INTO notifications (
                    id,
                    recipient_id,
                    title,
                    message,
                    category,
                    priority,
                    payload,
                    is_sent,
                    sent_at,
                    created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (id) DO UPDATE SET
                    title = EXCLUDED.title,
                    message = EXCLUDED.message,
                    payload = EXCLUDED.payload
                "#,
                &[
                    &record.id,
                    &record.recipient_id,
                    &record.title,
                    &record.message,
                    &record.category.as_str(),
                    &record.priority.as_str(),
                    &record.payload,
                    &record.is_sent,
                    &record.sent_at,
                    &record.created_at,
                ],
            )
            .await
            .map_err(|e| {
                error!(error = %e, request_id = %record.id, "Failed to write notification record");
                anyhow!("Database write failed: {}", e)
            })?;

        Ok(())
    }

    async fn mark_sent(&self, id: &str, sent_at: DateTime<Utc>) -> Result<()> {
        self.client
            .execute(
                "UPDATE notifications SET is_sent = TRUE, sent_at = $2 WHERE id = $1",
                &[&id, &sent_at],
            )
            .await
            .map_err(|e| anyhow!("Failed to mark notification sent: {}", e))?;

        Ok(())
    }

    async fn mark_as_read(&self, id: &str) -> Result<bool> {
        let updated = self
            .client
            .execute(
                "UPDATE notifications SET read_at = COALESCE(read_at, NOW()) WHERE id = $1",
                &[&id],
            )
            .await
            .map_err(|e| anyhow!("Failed to mark notification read: {}", e))?;

        Ok(updated > 0)
    }

    async fn history(&self, recipient_id: &str, limit: usize) -> Result<Vec<NotificationRecord>> {
        let limit = limit as i64;
        let rows = self
            .client
            .query(
                r#"
                SELECT id, recipient_id, title, message, category, priority, payload,
                       is_sent, sent_at, created_at, read_at
                FROM notifications
                WHERE recipient_id = $1
                ORDER BY created_at DESC
                LIMIT $2
                "#,
                &[&recipient_id, &limit],
            )
            .await
            .map_err(|e| anyhow!("Failed to load notification history: {}", e))?;

        rows.iter().map(Self::record_from_row).collect()
    }
}

#[async_trait]
impl StatsStore for DatabaseClient {
    async fn record_attempt(&self, attempt: &DeliveryAttempt) -> Result<()> {
        let attempt_number = attempt.attempt_number as i32;
        let outcome = attempt.outcome.to_string();

        self.client
            .execute(
                r#"
                INSERT INTO delivery_attempts (
                    request_id,
                    channel,
                    attempt_number,
                    started_at,
                    finished_at,
                    outcome,
                    error_detail
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (request_id, attempt_number) DO NOTHING
                "#,
                &[
                    &attempt.request_id,
                    &attempt.channel.as_str(),
                    &attempt_number,
                    &attempt.started_at,
                    &attempt.finished_at,
                    &outcome,
                    &attempt.error_detail,
                ],
            )
            .await
            .map_err(|e| anyhow!("Failed to record delivery attempt: {}", e))?;

        debug!(
            request_id = %attempt.request_id,
            attempt_number = attempt.attempt_number,
            "Delivery attempt written to database"
        );

        Ok(())
    }

    async fn record_result(&self, result: &DeliveryResult) -> Result<()> {
        let resolved_at = result
            .resolved_at
            .ok_or_else(|| anyhow!("Only terminal results are persisted"))?;
        let total_attempts = result.total_attempts as i32;
        let delivery_method = result.delivery_method.map(|c| c.as_str().to_string());

        self.client
            .execute(
                r#"
                INSERT INTO delivery_results (
                    request_id,
                    final_outcome,
                    delivery_method,
                    total_attempts,
                    created_at,
                    resolved_at,
                    error_detail
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (request_id) DO UPDATE SET
                    final_outcome = EXCLUDED.final_outcome,
                    delivery_method = EXCLUDED.delivery_method,
                    total_attempts = EXCLUDED.total_attempts,
                    resolved_at = EXCLUDED.resolved_at,
                    error_detail = EXCLUDED.error_detail
                "#,
                &[
                    &result.request_id,
                    &result.final_outcome.as_str(),
                    &delivery_method,
                    &total_attempts,
                    &result.created_at,
                    &resolved_at,
                    &result.error_detail,
                ],
            )
            .await
            .map_err(|e| anyhow!("Failed to record delivery result: {}", e))?;

        debug!(
            request_id = %result.request_id,
            final_outcome = %result.final_outcome,
            "Delivery result written to database"
        );

        Ok(())
    }

    async fn report_window(&self, since: DateTime<Utc>) -> Result<DeliveryStats> {
        let row = self
            .client
            .query_one(
                r#"
                SELECT
                    COUNT(*) AS total,
                    COUNT(*) FILTER (WHERE final_outcome = 'delivered') AS delivered,
                    COUNT(*) FILTER (WHERE total_attempts > 1) AS retried,
                    CAST(
                        AVG(EXTRACT(EPOCH FROM (resolved_at - created_at)))
                            FILTER (WHERE final_outcome = 'delivered')
                        AS DOUBLE PRECISION
                    ) AS average_seconds
                FROM delivery_results
                WHERE resolved_at >= $1
                "#,
                &[&since],
            )
            .await
            .map_err(|e| anyhow!("Failed to aggregate delivery stats: {}", e))?;

        let total: i64 = row.try_get("total")?;
        let delivered: i64 = row.try_get("delivered")?;
        let retried: i64 = row.try_get("retried")?;
        let average_seconds: Option<f64> = row.try_get("average_seconds")?;

        Ok(DeliveryStats::from_counts(
            since,
            total as u64,
            delivered as u64,
            retried as u64,
            average_seconds,
        ))
    }

    async fn has_record(&self, request_id: &str) -> Result<bool> {
        let row = self
            .client
            .query_one(
                r#"
                SELECT
                    EXISTS (SELECT 1 FROM delivery_attempts WHERE request_id = $1)
                    OR EXISTS (SELECT 1 FROM delivery_results WHERE request_id = $1) AS known
                "#,
                &[&request_id],
            )
            .await
            .map_err(|e| anyhow!("Failed to look up delivery records: {}", e))?;

        Ok(row.try_get("known")?)
    }
}

#[async_trait]
impl RecipientDirectory for DatabaseClient {
    async fn phone_number(&self, recipient_id: &str) -> Result<Option<String>> {
        let row = self
            .client
            .query_opt(
                "SELECT phone_number FROM recipients WHERE id = $1",
                &[&recipient_id],
            )
            .await
            .map_err(|e| anyhow!("Recipient lookup failed: {}", e))?;

        match row {
            Some(row) => Ok(row.try_get::<_, Option<String>>("phone_number")?),
            None => Ok(None),
        }
    }
}
