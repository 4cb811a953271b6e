use std::{any::Any, panic::AssertUnwindSafe, time::Duration};

use chrono::Utc;
use futures_util::FutureExt;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::{
    clients::{channel::ChannelSet, store::Stores},
    error::DeliveryError,
    models::{
        delivery::{AttemptOutcome, ChannelKind, DeliveryAttempt, DeliveryResult, FinalOutcome},
        notification::NotificationRequest,
        retry::BackoffConfig,
    },
    utils::retry_with_backoff,
};

/// Runs single channel attempts and writes their bookkeeping. Shared by the
/// dispatcher and the retry scheduler.
pub struct AttemptExecutor {
    channels: ChannelSet,
    stores: Stores,
    store_backoff: BackoffConfig,
}

impl AttemptExecutor {
    pub fn new(channels: ChannelSet, stores: Stores, store_backoff: BackoffConfig) -> Self {
        Self {
            channels,
            stores,
            store_backoff,
        }
    }

    /// Makes one attempt on `kind`. Channel errors and panics both come back
    /// as a failed attempt; nothing is recorded here.
    pub async fn attempt(
        &self,
        request: &NotificationRequest,
        kind: ChannelKind,
        attempt_number: u32,
    ) -> DeliveryAttempt {
        let channel = self.channels.get(kind);
        let started_at = Utc::now();
        let clock = Instant::now();

        debug!(
            request_id = %request.id,
            channel = %kind,
            attempt_number,
            "Attempting delivery"
        );

        let outcome = AssertUnwindSafe(channel.attempt(request))
            .catch_unwind()
            .await;

        let elapsed = clock.elapsed();
        if let Some(timeout_seconds) = request.timeout_seconds {
            if elapsed > Duration::from_secs(timeout_seconds) {
                warn!(
                    request_id = %request.id,
                    channel = %kind,
                    elapsed_ms = elapsed.as_millis() as u64,
                    timeout_seconds,
                    "Channel attempt exceeded advisory timeout"
                );
            }
        }

        let (outcome, error_detail) = match outcome {
            Ok(Ok(())) => (AttemptOutcome::Success, None),
            Ok(Err(e)) => {
                let err = DeliveryError::from(e);
                warn!(
                    request_id = %request.id,
                    channel = %kind,
                    attempt_number,
                    error = %err,
                    error_code = err.error_code(),
                    retryable = err.is_retryable(),
                    "Delivery attempt failed"
                );
                (AttemptOutcome::Failure, Some(err.to_string()))
            }
            Err(panic) => {
                let detail = format!("Channel panicked: {}", panic_message(panic.as_ref()));
                error!(
                    request_id = %request.id,
                    channel = %kind,
                    attempt_number,
                    error = %detail,
                    "Delivery attempt panicked"
                );
                (AttemptOutcome::Failure, Some(detail))
            }
        };

        DeliveryAttempt {
            request_id: request.id.clone(),
            channel: kind,
            attempt_number,
            started_at,
            finished_at: Utc::now(),
            outcome,
            error_detail,
        }
    }

    /// Appends the attempt to the stats store. A failed write is logged and
    /// never affects delivery.
    pub async fn record_attempt(&self, attempt: &DeliveryAttempt) {
        if let Err(e) = self.stores.stats.record_attempt(attempt).await {
            warn!(
                request_id = %attempt.request_id,
                attempt_number = attempt.attempt_number,
                error = %e,
                "Failed to record delivery attempt"
            );
        }
    }

    /// Whether attempts or a result already exist for `request_id`. A failed
    /// lookup is logged and treated as unknown.
    pub async fn has_record(&self, request_id: &str) -> bool {
        match self.stores.stats.has_record(request_id).await {
            Ok(known) => known,
            Err(e) => {
                warn!(request_id, error = %e, "Failed to look up delivery records");
                false
            }
        }
    }

    /// Writes a terminal result, and marks the record sent when delivered.
    pub async fn finalize(&self, request: &NotificationRequest, result: &DeliveryResult) {
        let stats = &self.stores.stats;
        if let Err(e) = retry_with_backoff(&self.store_backoff, || stats.record_result(result)).await
        {
            warn!(
                request_id = %result.request_id,
                final_outcome = %result.final_outcome,
                error = %e,
                "Failed to record delivery result"
            );
        }

        if result.final_outcome == FinalOutcome::Delivered {
            let sent_at = result.resolved_at.unwrap_or_else(Utc::now);
            if let Err(e) = self
                .stores
                .notifications
                .mark_sent(&request.id, sent_at)
                .await
            {
                warn!(
                    request_id = %request.id,
                    error = %e,
                    "Failed to mark notification as sent"
                );
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "unknown panic payload".to_string()
}
