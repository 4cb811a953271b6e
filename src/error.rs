use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::models::response::ApiResponse;

/// Failure reported by a single channel attempt.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ChannelError {
    #[error("Channel transport error: {0}")]
    Transport(String),

    #[error("No phone number on file for recipient {0}")]
    NoPhoneNumber(String),
}

impl ChannelError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        ChannelError::Transport(err.to_string())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ChannelError::Transport(_))
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("Retries exhausted for request {request_id} after {attempts} attempts")]
    ExhaustedRetries { request_id: String, attempts: u32 },

    #[error("Request {0} cancelled by caller")]
    CancelledByCaller(String),
}

impl DeliveryError {
    pub fn is_retryable(&self) -> bool {
        match self {
            DeliveryError::Channel(e) => e.is_retryable(),
            DeliveryError::Validation(_)
            | DeliveryError::ExhaustedRetries { .. }
            | DeliveryError::CancelledByCaller(_) => false,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            DeliveryError::Validation(_) => "VALIDATION_ERROR",
            DeliveryError::Channel(ChannelError::Transport(_)) => "CHANNEL_TRANSPORT_ERROR",
            DeliveryError::Channel(ChannelError::NoPhoneNumber(_)) => "NO_PHONE_NUMBER",
            DeliveryError::ExhaustedRetries { .. } => "EXHAUSTED_RETRIES",
            DeliveryError::CancelledByCaller(_) => "CANCELLED_BY_CALLER",
        }
    }
}

impl IntoResponse for DeliveryError {
    fn into_response(self) -> Response {
        let status = match &self {
            DeliveryError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = ApiResponse::<()>::error(self.to_string(), self.error_code());
        (status, Json(body)).into_response()
    }
}
