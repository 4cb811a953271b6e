use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use chrono::Utc;
use dashmap::{DashMap, mapref::entry::Entry};
use tokio::time::{sleep, timeout};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info, warn};

use crate::{
    engine::{
        executor::AttemptExecutor,
        policy::{EscalationPlan, SmsEligibility},
    },
    error::DeliveryError,
    models::{
        delivery::{ChannelKind, DeliveryAttempt, DeliveryResult},
        notification::NotificationRequest,
        retry::{RetryLadder, RetryPhase, RetryState},
    },
    utils::jittered,
};

/// Everything the scheduler needs to continue a request the immediate tier
/// could not deliver.
#[derive(Debug, Clone)]
pub struct RetryHandoff {
    pub request: NotificationRequest,
    pub plan: EscalationPlan,
    pub attempts_made: u32,
    pub sms_attempted: bool,
    pub last_error: Option<String>,
}

struct RetryEntry {
    state: RetryState,
    token: CancellationToken,
    generation: u64,
}

struct SchedulerInner {
    entries: DashMap<String, RetryEntry>,
    executor: Arc<AttemptExecutor>,
    ladder: RetryLadder,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    generations: AtomicU64,
}

impl SchedulerInner {
    fn update(&self, request_id: &str, generation: u64, apply: impl FnOnce(&mut RetryState)) {
        if let Some(mut entry) = self.entries.get_mut(request_id) {
            if entry.generation == generation {
                apply(&mut entry.state);
            }
        }
    }

    /// `cancel` removes the entry before it signals the token, so the entry
    /// is checked as well.
    fn is_current(&self, request_id: &str, generation: u64) -> bool {
        self.entries
            .get(request_id)
            .is_some_and(|entry| entry.generation == generation)
    }

    fn release(&self, request_id: &str, generation: u64) {
        self.entries
            .remove_if(request_id, |_, entry| entry.generation == generation);
    }
}

/// Owns retry state for every request that left the immediate tier
/// unresolved. One supervised task per request walks the ladder.
pub struct RetryScheduler {
    inner: Arc<SchedulerInner>,
}

impl RetryScheduler {
    pub fn new(executor: Arc<AttemptExecutor>, ladder: RetryLadder) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                entries: DashMap::new(),
                executor,
                ladder,
                tracker: TaskTracker::new(),
                shutdown: CancellationToken::new(),
                generations: AtomicU64::new(0),
            }),
        }
    }

    /// Starts the retry task for `handoff`. Returns `false` when the id is
    /// already tracked or the scheduler is shutting down.
    pub fn schedule(&self, handoff: RetryHandoff) -> bool {
        if self.inner.tracker.is_closed() {
            warn!(
                request_id = %handoff.request.id,
                "Retry scheduler is shutting down, refusing new work"
            );
            return false;
        }

        let token = self.inner.shutdown.child_token();
        let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed);

        match self.inner.entries.entry(handoff.request.id.clone()) {
            Entry::Occupied(_) => {
                warn!(
                    request_id = %handoff.request.id,
                    "Request already has a retry in progress"
                );
                return false;
            }
            Entry::Vacant(vacant) => {
                vacant.insert(RetryEntry {
                    state: RetryState::new(handoff.request.id.clone(), handoff.attempts_made),
                    token: token.clone(),
                    generation,
                });
            }
        }

        info!(
            request_id = %handoff.request.id,
            attempts_made = handoff.attempts_made,
            ladder_len = self.inner.ladder.len(),
            "Request handed to retry scheduler"
        );

        let inner = Arc::clone(&self.inner);
        self.inner
            .tracker
            .spawn(run_retries(inner, handoff, token, generation));

        true
    }

    /// Drops the retry entry and signals its task. Safe to call for unknown
    /// or already finished ids.
    pub fn cancel(&self, request_id: &str) -> bool {
        match self.inner.entries.remove(request_id) {
            Some((_, entry)) => {
                entry.token.cancel();
                info!(
                    request_id,
                    attempts_made = entry.state.attempts_made,
                    "{}",
                    DeliveryError::CancelledByCaller(request_id.to_string())
                );
                true
            }
            None => {
                debug!(request_id, "No scheduled retry to cancel");
                false
            }
        }
    }

    pub fn state(&self, request_id: &str) -> Option<RetryState> {
        self.inner
            .entries
            .get(request_id)
            .map(|entry| entry.state.clone())
    }

    pub fn is_tracked(&self, request_id: &str) -> bool {
        self.inner.entries.contains_key(request_id)
    }

    pub fn pending_count(&self) -> usize {
        self.inner.entries.len()
    }

    /// Stops accepting work and lets pending retries drain for up to `grace`.
    /// Whatever is still running afterwards is abandoned.
    pub async fn shutdown(&self, grace: Duration) {
        self.inner.tracker.close();

        info!(
            pending = self.pending_count(),
            grace_seconds = grace.as_secs(),
            "Draining retry scheduler"
        );

        if timeout(grace, self.inner.tracker.wait()).await.is_err() {
            warn!(
                abandoned = self.pending_count(),
                "Grace period elapsed, abandoning pending retries"
            );
            self.inner.shutdown.cancel();
            self.inner.tracker.wait().await;
        }

        info!("Retry scheduler stopped");
    }
}

enum Step {
    Continue(DeliveryAttempt),
    Cancelled,
}

async fn attempt_once(
    inner: &SchedulerInner,
    request: &NotificationRequest,
    token: &CancellationToken,
    generation: u64,
    kind: ChannelKind,
    attempt_number: u32,
) -> Step {
    inner.update(&request.id, generation, |state| {
        state.phase = RetryPhase::Attempting;
        state.next_attempt_at = None;
    });

    let attempt = inner.executor.attempt(request, kind, attempt_number).await;

    if token.is_cancelled() || !inner.is_current(&request.id, generation) {
        debug!(
            request_id = %request.id,
            attempt_number,
            "Discarding attempt that finished after cancellation"
        );
        return Step::Cancelled;
    }

    inner.executor.record_attempt(&attempt).await;
    Step::Continue(attempt)
}

async fn run_retries(
    inner: Arc<SchedulerInner>,
    handoff: RetryHandoff,
    token: CancellationToken,
    generation: u64,
) {
    let RetryHandoff {
        request,
        plan,
        mut attempts_made,
        sms_attempted,
        mut last_error,
    } = handoff;

    for (index, base_delay) in inner.ladder.delays().iter().enumerate() {
        let delay = jittered(*base_delay, inner.ladder.jitter_ratio());
        let next_attempt_at =
            Utc::now() + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());

        inner.update(&request.id, generation, |state| {
            state.phase = RetryPhase::Scheduled;
            state.ladder_index = index;
            state.next_attempt_at = Some(next_attempt_at);
        });

        tokio::select! {
            _ = token.cancelled() => {
                debug!(request_id = %request.id, ladder_index = index, "Retry task stopped");
                inner.release(&request.id, generation);
                return;
            }
            _ = sleep(delay) => {}
        }

        let kind = plan.retry_channel(index + 1);
        let attempt =
            match attempt_once(&inner, &request, &token, generation, kind, attempts_made + 1).await
            {
                Step::Continue(attempt) => attempt,
                Step::Cancelled => {
                    inner.release(&request.id, generation);
                    return;
                }
            };
        attempts_made += 1;

        if attempt.is_success() {
            let result =
                DeliveryResult::delivered(request.id.clone(), kind, attempts_made, request.created_at);
            inner.executor.finalize(&request, &result).await;
            inner.release(&request.id, generation);

            info!(
                request_id = %request.id,
                channel = %kind,
                total_attempts = attempts_made,
                "Notification delivered on retry"
            );
            return;
        }

        last_error = attempt.error_detail;
        inner.update(&request.id, generation, |state| {
            state.attempts_made = attempts_made;
            state.ladder_index = index + 1;
        });
    }

    inner.update(&request.id, generation, |state| {
        state.exhausted = true;
        state.next_attempt_at = None;
    });

    if plan.sms == SmsEligibility::AfterExhaustion && !sms_attempted {
        info!(request_id = %request.id, "Retry ladder exhausted, escalating to SMS");

        let attempt = match attempt_once(
            &inner,
            &request,
            &token,
            generation,
            ChannelKind::Sms,
            attempts_made + 1,
        )
        .await
        {
            Step::Continue(attempt) => attempt,
            Step::Cancelled => {
                inner.release(&request.id, generation);
                return;
            }
        };
        attempts_made += 1;

        if attempt.is_success() {
            let result = DeliveryResult::delivered(
                request.id.clone(),
                ChannelKind::Sms,
                attempts_made,
                request.created_at,
            );
            inner.executor.finalize(&request, &result).await;
            inner.release(&request.id, generation);

            info!(
                request_id = %request.id,
                total_attempts = attempts_made,
                "Notification delivered by SMS escalation"
            );
            return;
        }

        last_error = attempt.error_detail;
    }

    let exhausted = DeliveryError::ExhaustedRetries {
        request_id: request.id.clone(),
        attempts: attempts_made,
    };
    let detail = match last_error {
        Some(last) => format!("{}; last error: {}", exhausted, last),
        None => exhausted.to_string(),
    };

    warn!(
        request_id = %request.id,
        total_attempts = attempts_made,
        error_code = exhausted.error_code(),
        "Notification delivery failed"
    );

    let result = DeliveryResult::failed(request.id.clone(), attempts_made, request.created_at)
        .with_error(detail);
    inner.executor.finalize(&request, &result).await;
    inner.release(&request.id, generation);
}
