use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    engine::{
        executor::AttemptExecutor,
        policy::EscalationPolicy,
        scheduler::{RetryHandoff, RetryScheduler},
    },
    error::DeliveryError,
    models::{
        delivery::{ChannelKind, DeliveryResult},
        notification::NotificationRequest,
        validation::validate_request,
    },
};

/// Holds a request id in the in-flight set until dropped.
struct Claim<'a> {
    in_flight: &'a DashMap<String, CancellationToken>,
    request_id: String,
    token: CancellationToken,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.request_id);
    }
}

pub struct NotificationDispatcher {
    executor: Arc<AttemptExecutor>,
    scheduler: Arc<RetryScheduler>,
    in_flight: DashMap<String, CancellationToken>,
}

impl NotificationDispatcher {
    pub fn new(executor: Arc<AttemptExecutor>, scheduler: Arc<RetryScheduler>) -> Self {
        Self {
            executor,
            scheduler,
            in_flight: DashMap::new(),
        }
    }

    /// Runs the immediate tier and returns `delivered`, or hands the request
    /// to the retry scheduler and returns `pending`. Only validation failures
    /// come back as errors.
    pub async fn send_notification(
        &self,
        request: NotificationRequest,
    ) -> Result<DeliveryResult, DeliveryError> {
        validate_request(&request)?;
        let claim = self.claim(&request.id)?;

        // Attempt numbers are per id, so a used id is never run again.
        if self.executor.has_record(&request.id).await {
            return Err(DeliveryError::Validation(format!(
                "Request {} has already been processed",
                request.id
            )));
        }

        let plan = EscalationPolicy::plan(request.category, request.priority);
        debug!(
            request_id = %request.id,
            category = %request.category,
            priority = %request.priority,
            sms = ?plan.sms,
            "Escalation plan selected"
        );

        let mut attempts_made = 0u32;
        let mut sms_attempted = false;
        let mut last_error = None;

        for kind in plan.channels.iter().copied() {
            if claim.token.is_cancelled() {
                return Ok(self.cancelled(&request, attempts_made));
            }

            let attempt = self
                .executor
                .attempt(&request, kind, attempts_made + 1)
                .await;

            if claim.token.is_cancelled() {
                debug!(
                    request_id = %request.id,
                    channel = %kind,
                    "Discarding attempt that finished after cancellation"
                );
                return Ok(self.cancelled(&request, attempts_made));
            }

            self.executor.record_attempt(&attempt).await;
            attempts_made += 1;

            if attempt.is_success() {
                let result = DeliveryResult::delivered(
                    request.id.clone(),
                    kind,
                    attempts_made,
                    request.created_at,
                );
                self.executor.finalize(&request, &result).await;

                info!(
                    request_id = %request.id,
                    channel = %kind,
                    total_attempts = attempts_made,
                    "Notification delivered"
                );
                return Ok(result);
            }

            if kind == ChannelKind::Sms {
                sms_attempted = true;
            }
            last_error = attempt.error_detail;
        }

        let mut pending =
            DeliveryResult::pending(request.id.clone(), attempts_made, request.created_at);
        if let Some(error) = &last_error {
            pending = pending.with_error(error.clone());
        }

        let handoff = RetryHandoff {
            request: request.clone(),
            plan,
            attempts_made,
            sms_attempted,
            last_error,
        };

        // The claim is still held here, so the scheduler entry exists before
        // the id becomes claimable again.
        if !self.scheduler.schedule(handoff) {
            let result =
                DeliveryResult::failed(request.id.clone(), attempts_made, request.created_at)
                    .with_error("Retry scheduler is not accepting work".to_string());
            self.executor.finalize(&request, &result).await;
            return Ok(result);
        }

        if claim.token.is_cancelled() {
            self.scheduler.cancel(&request.id);
            return Ok(self.cancelled(&request, attempts_made));
        }

        drop(claim);
        Ok(pending)
    }

    /// Interrupts a request that is still in its immediate tier. The attempt
    /// in flight finishes but is discarded.
    pub fn cancel(&self, request_id: &str) -> bool {
        match self.in_flight.get(request_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn claim(&self, request_id: &str) -> Result<Claim<'_>, DeliveryError> {
        let token = CancellationToken::new();

        match self.in_flight.entry(request_id.to_string()) {
            Entry::Occupied(_) => {
                return Err(DeliveryError::Validation(format!(
                    "Request {} is already being delivered",
                    request_id
                )));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(token.clone());
            }
        }

        let claim = Claim {
            in_flight: &self.in_flight,
            request_id: request_id.to_string(),
            token,
        };

        if self.scheduler.is_tracked(request_id) {
            return Err(DeliveryError::Validation(format!(
                "Request {} is already scheduled for retry",
                request_id
            )));
        }

        Ok(claim)
    }

    fn cancelled(&self, request: &NotificationRequest, attempts_made: u32) -> DeliveryResult {
        let reason = DeliveryError::CancelledByCaller(request.id.clone());
        info!(
            request_id = %request.id,
            attempts_made,
            error_code = reason.error_code(),
            "{}",
            reason
        );

        DeliveryResult::pending(request.id.clone(), attempts_made, request.created_at)
            .with_error(reason.to_string())
    }
}
