use std::{collections::HashMap, sync::Arc};

use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::{
    engine::dispatcher::NotificationDispatcher,
    error::DeliveryError,
    models::{
        delivery::DeliveryResult,
        nearby::{Candidate, NearbyConfig, NearbyEvent},
        validation::validate_event,
    },
};

/// Fans one event out to the nearest candidates with distance-based
/// priority and pacing.
pub struct NearbyCoordinator {
    dispatcher: Arc<NotificationDispatcher>,
    config: NearbyConfig,
}

impl NearbyCoordinator {
    pub fn new(dispatcher: Arc<NotificationDispatcher>, config: NearbyConfig) -> Self {
        Self { dispatcher, config }
    }

    pub async fn notify_nearby(
        &self,
        candidates: Vec<Candidate>,
        event: &NearbyEvent,
    ) -> Result<Vec<DeliveryResult>, DeliveryError> {
        validate_event(event)?;

        let received = candidates.len();
        let selected = select_nearest(candidates, &self.config);

        info!(
            received,
            selected = selected.len(),
            category = %event.category,
            "Broadcasting nearby event"
        );

        let mut dispatches = Vec::with_capacity(selected.len());

        for (position, candidate) in selected.into_iter().enumerate() {
            if position > 0 && self.config.is_paced(candidate.distance_km) {
                sleep(self.config.pacing).await;
            }

            let priority = self.config.priority_for(candidate.distance_km);
            let request = event.to_request(&candidate.recipient_id, priority);

            debug!(
                request_id = %request.id,
                recipient_id = %candidate.recipient_id,
                distance_km = candidate.distance_km,
                priority = %priority,
                "Dispatching to nearby candidate"
            );

            let request_id = request.id.clone();
            let created_at = request.created_at;
            let dispatcher = Arc::clone(&self.dispatcher);
            let handle =
                tokio::spawn(async move { dispatcher.send_notification(request).await });

            dispatches.push((request_id, created_at, handle));
        }

        let mut results = Vec::with_capacity(dispatches.len());
        for (request_id, created_at, handle) in dispatches {
            let result = match handle.await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    warn!(request_id = %request_id, error = %e, "Nearby dispatch rejected");
                    DeliveryResult::failed(request_id, 0, created_at).with_error(e.to_string())
                }
                Err(e) => {
                    error!(request_id = %request_id, error = %e, "Nearby dispatch task failed");
                    DeliveryResult::failed(request_id, 0, created_at)
                        .with_error(format!("Dispatch task failed: {}", e))
                }
            };
            results.push(result);
        }

        Ok(results)
    }
}

/// Drops unusable candidates, keeps the closest entry per recipient and
/// returns the `max_recipients` nearest in ascending distance.
pub fn select_nearest(candidates: Vec<Candidate>, config: &NearbyConfig) -> Vec<Candidate> {
    let mut nearest: HashMap<String, Candidate> = HashMap::new();

    for candidate in candidates {
        if candidate.recipient_id.trim().is_empty()
            || !candidate.distance_km.is_finite()
            || candidate.distance_km < 0.0
        {
            warn!(
                recipient_id = %candidate.recipient_id,
                distance_km = candidate.distance_km,
                "Skipping invalid nearby candidate"
            );
            continue;
        }

        match nearest.get(&candidate.recipient_id) {
            Some(existing) if existing.distance_km <= candidate.distance_km => {}
            _ => {
                nearest.insert(candidate.recipient_id.clone(), candidate);
            }
        }
    }

    let mut selected: Vec<Candidate> = nearest.into_values().collect();
    selected.sort_by(|a, b| {
        a.distance_km
            .total_cmp(&b.distance_km)
            .then_with(|| a.recipient_id.cmp(&b.recipient_id))
    });
    selected.truncate(config.max_recipients);
    selected
}
