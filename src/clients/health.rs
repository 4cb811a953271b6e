use std::{collections::HashMap, sync::Arc, time::Instant};

use chrono::Utc;
use tracing::{debug, warn};

use crate::{
    clients::{database::DatabaseClient, redis::RedisBroadcaster},
    engine::DeliveryEngine,
    models::health::{HealthCheckResponse, HealthStatus, ServiceHealth},
};

/// Pending retries above this count report the scheduler as degraded.
const RETRY_BACKLOG_THRESHOLD: usize = 10_000;

pub struct HealthChecker {
    database: Arc<DatabaseClient>,
    redis: RedisBroadcaster,
    engine: Arc<DeliveryEngine>,
}

impl HealthChecker {
    pub fn new(
        database: Arc<DatabaseClient>,
        redis: RedisBroadcaster,
        engine: Arc<DeliveryEngine>,
    ) -> Self {
        Self {
            database,
            redis,
            engine,
        }
    }

    pub async fn check_all(&self) -> HealthCheckResponse {
        let mut checks = HashMap::new();

        checks.insert("database".to_string(), self.check_database().await);
        checks.insert("realtime_broker".to_string(), self.check_redis().await);
        checks.insert("retry_scheduler".to_string(), self.check_scheduler());

        HealthCheckResponse {
            status: determine_overall_status(&checks),
            timestamp: Utc::now(),
            checks,
        }
    }

    async fn check_database(&self) -> ServiceHealth {
        let start = Instant::now();

        match self.database.health_check().await {
            Ok(_) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "Database health check passed");
                ServiceHealth::healthy(elapsed)
            }
            Err(e) => {
                warn!(error = %e, "Database health check failed");
                ServiceHealth::unhealthy(format!("Health check query failed: {}", e))
            }
        }
    }

    async fn check_redis(&self) -> ServiceHealth {
        let start = Instant::now();

        match self.redis.health_check().await {
            Ok(_) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "Redis health check passed");
                ServiceHealth::healthy(elapsed)
            }
            Err(e) => {
                warn!(error = %e, "Redis ping failed");
                ServiceHealth::unhealthy(format!("Ping failed: {}", e))
            }
        }
    }

    fn check_scheduler(&self) -> ServiceHealth {
        let pending = self.engine.pending_retries();
        debug!(pending_retries = pending, "Retry scheduler backlog checked");
        ServiceHealth::retry_backlog(pending, RETRY_BACKLOG_THRESHOLD)
    }
}

pub fn determine_overall_status(checks: &HashMap<String, ServiceHealth>) -> HealthStatus {
    let has_unhealthy = checks
        .values()
        .any(|health| health.status == HealthStatus::Unhealthy);

    let has_degraded = checks
        .values()
        .any(|health| health.status == HealthStatus::Degraded);

    if has_unhealthy {
        HealthStatus::Unhealthy
    } else if has_degraded {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}
