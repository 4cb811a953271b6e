use std::{sync::Arc, time::Duration};

use anyhow::{Error, Result};
use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{
    clients::health::HealthChecker,
    engine::{DeliveryEngine, stats_window_start},
    error::DeliveryError,
    models::{
        delivery::DeliveryResult,
        health::HealthStatus,
        nearby::{Candidate, NearbyEvent},
        notification::{NewNotification, NotificationRecord, NotificationRequest},
        response::{ApiResponse, ReadReceipt},
        retry::RetryState,
        stats::DeliveryStats,
    },
};

const DEFAULT_STATS_WINDOW_SECONDS: u64 = 3600;
const DEFAULT_HISTORY_LIMIT: usize = 50;

pub struct AppState {
    pub engine: Arc<DeliveryEngine>,
    pub health_checker: HealthChecker,
}

#[derive(Debug, Deserialize)]
pub struct NearbyBroadcast {
    pub candidates: Vec<Candidate>,
    pub event: NearbyEvent,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub window_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, Response>;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/notifications", post(send_notification))
        .route("/notifications/{id}", delete(cancel_notification))
        .route("/notifications/{id}/read", post(mark_as_read))
        .route("/notifications/{id}/retry", get(retry_state))
        .route("/nearby", post(notify_nearby))
        .route("/stats", get(delivery_stats))
        .route("/recipients/{id}/notifications", get(history))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_api_server(
    state: Arc<AppState>,
    port: u16,
    shutdown: CancellationToken,
) -> Result<(), Error> {
    let app = router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!(address = %addr, "Delivery engine API started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            info!("API server shutting down");
        })
        .await?;

    Ok(())
}

fn internal_error(e: Error) -> Response {
    error!(error = %e, "Request failed");
    let body = ApiResponse::<()>::error(e.to_string(), "INTERNAL_ERROR");
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

async fn send_notification(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewNotification>,
) -> ApiResult<DeliveryResult> {
    let request = NotificationRequest::try_from(body).map_err(IntoResponse::into_response)?;
    let result = state
        .engine
        .send_notification(request)
        .await
        .map_err(IntoResponse::into_response)?;

    let message = format!("Notification {}", result.final_outcome);
    Ok(Json(ApiResponse::success(result, message)))
}

async fn cancel_notification(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<String> {
    state.engine.cancel(&id);
    Ok(Json(ApiResponse::success(id, "Cancellation accepted")))
}

async fn mark_as_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<ReadReceipt> {
    let updated = state
        .engine
        .mark_as_read(&id)
        .await
        .map_err(internal_error)?;

    let message = if updated {
        "Notification marked as read"
    } else {
        "Notification not found"
    };

    Ok(Json(ApiResponse::success(
        ReadReceipt {
            request_id: id,
            updated,
        },
        message,
    )))
}

async fn retry_state(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<RetryState> {
    match state.engine.retry_state(&id) {
        Some(retry) => Ok(Json(ApiResponse::success(retry, "Retry in progress"))),
        None => {
            let body = ApiResponse::<()>::error(
                format!("No scheduled retry for request {}", id),
                "NOT_FOUND",
            );
            Err((StatusCode::NOT_FOUND, Json(body)).into_response())
        }
    }
}

async fn notify_nearby(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NearbyBroadcast>,
) -> ApiResult<Vec<DeliveryResult>> {
    let results = state
        .engine
        .notify_nearby(body.candidates, &body.event)
        .await
        .map_err(|e: DeliveryError| e.into_response())?;

    let message = format!("Dispatched to {} recipients", results.len());
    Ok(Json(ApiResponse::success(results, message)))
}

async fn delivery_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> ApiResult<DeliveryStats> {
    let window = Duration::from_secs(
        query
            .window_seconds
            .unwrap_or(DEFAULT_STATS_WINDOW_SECONDS),
    );
    stats_window_start(window).map_err(IntoResponse::into_response)?;

    let stats = state
        .engine
        .get_delivery_stats(window)
        .await
        .map_err(internal_error)?;

    Ok(Json(ApiResponse::success(stats, "Delivery stats")))
}

async fn history(
    State(state): State<Arc<AppState>>,
    Path(recipient_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Vec<NotificationRecord>> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);

    let records = state
        .engine
        .history(&recipient_id, limit)
        .await
        .map_err(internal_error)?;

    Ok(Json(ApiResponse::success(records, "Notification history")))
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_checker.check_all().await;

    let status_code = match health.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}
