//! Delivery engine: escalation policy, immediate dispatch, supervised
//! retries and nearby fan-out behind one shared facade.

pub mod dispatcher;
pub mod executor;
pub mod nearby;
pub mod policy;
pub mod scheduler;

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::{
    clients::{channel::ChannelSet, store::Stores},
    engine::{
        dispatcher::NotificationDispatcher, executor::AttemptExecutor, nearby::NearbyCoordinator,
        scheduler::RetryScheduler,
    },
    error::DeliveryError,
    models::{
        delivery::DeliveryResult,
        nearby::{Candidate, NearbyConfig, NearbyEvent},
        notification::{NotificationRecord, NotificationRequest},
        retry::{BackoffConfig, RetryLadder, RetryState},
        stats::DeliveryStats,
    },
};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub ladder: RetryLadder,
    pub nearby: NearbyConfig,
    pub store_backoff: BackoffConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ladder: RetryLadder::default(),
            nearby: NearbyConfig::default(),
            store_backoff: BackoffConfig {
                max_attempts: 3,
                initial_delay_ms: 100,
                max_delay_ms: 2000,
                backoff_multiplier: 2,
            },
        }
    }
}

/// Start of a trailing stats window that ends now.
pub fn stats_window_start(window: Duration) -> Result<DateTime<Utc>, DeliveryError> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|window| Utc::now().checked_sub_signed(window))
        .ok_or_else(|| {
            DeliveryError::Validation(format!(
                "Stats window of {} seconds is out of range",
                window.as_secs()
            ))
        })
}

pub struct DeliveryEngine {
    dispatcher: Arc<NotificationDispatcher>,
    scheduler: Arc<RetryScheduler>,
    nearby: NearbyCoordinator,
    stores: Stores,
}

impl DeliveryEngine {
    pub fn new(channels: ChannelSet, stores: Stores, config: EngineConfig) -> Self {
        let executor = Arc::new(AttemptExecutor::new(
            channels,
            stores.clone(),
            config.store_backoff,
        ));
        let scheduler = Arc::new(RetryScheduler::new(Arc::clone(&executor), config.ladder));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            executor,
            Arc::clone(&scheduler),
        ));
        let nearby = NearbyCoordinator::new(Arc::clone(&dispatcher), config.nearby);

        info!("Delivery engine initialized");

        Self {
            dispatcher,
            scheduler,
            nearby,
            stores,
        }
    }

    pub async fn send_notification(
        &self,
        request: NotificationRequest,
    ) -> Result<DeliveryResult, DeliveryError> {
        self.dispatcher.send_notification(request).await
    }

    /// Stops any further attempts for `request_id`. Idempotent, and a no-op
    /// once the request is terminal.
    pub fn cancel(&self, request_id: &str) {
        let interrupted = self.dispatcher.cancel(request_id);
        let unscheduled = self.scheduler.cancel(request_id);

        if !interrupted && !unscheduled {
            info!(request_id, "Cancel requested for request with no pending work");
        }
    }

    pub async fn notify_nearby(
        &self,
        candidates: Vec<Candidate>,
        event: &NearbyEvent,
    ) -> Result<Vec<DeliveryResult>, DeliveryError> {
        self.nearby.notify_nearby(candidates, event).await
    }

    /// Aggregates terminal results resolved within the trailing `window`.
    pub async fn get_delivery_stats(&self, window: Duration) -> Result<DeliveryStats> {
        let since = stats_window_start(window)?;
        self.stores.stats.report_window(since).await
    }

    pub async fn mark_as_read(&self, request_id: &str) -> Result<bool> {
        self.stores.notifications.mark_as_read(request_id).await
    }

    pub async fn history(
        &self,
        recipient_id: &str,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>> {
        self.stores.notifications.history(recipient_id, limit).await
    }

    pub fn retry_state(&self, request_id: &str) -> Option<RetryState> {
        self.scheduler.state(request_id)
    }

    pub fn pending_retries(&self) -> usize {
        self.scheduler.pending_count()
    }

    pub async fn shutdown(&self, grace: Duration) {
        self.scheduler.shutdown(grace).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_window_start() {
        let since = stats_window_start(Duration::from_secs(3600)).unwrap();
        let age = Utc::now() - since;
        assert!(age >= chrono::Duration::seconds(3600));
        assert!(age < chrono::Duration::seconds(3601));

        let err = stats_window_start(Duration::from_secs(u64::MAX)).unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }
}
