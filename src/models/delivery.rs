use std::fmt::{Display, Formatter, Result as FmtResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Push,
    Realtime,
    Sms,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Push => "push",
            ChannelKind::Realtime => "realtime",
            ChannelKind::Sms => "sms",
        }
    }
}

impl Display for ChannelKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    Success,
    Failure,
}

impl Display for AttemptOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            AttemptOutcome::Success => write!(f, "success"),
            AttemptOutcome::Failure => write!(f, "failure"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalOutcome {
    Delivered,
    Failed,
    Pending,
}

impl FinalOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinalOutcome::Delivered => "delivered",
            FinalOutcome::Failed => "failed",
            FinalOutcome::Pending => "pending",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, FinalOutcome::Pending)
    }
}

impl Display for FinalOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// One try of one channel for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub request_id: String,
    pub channel: ChannelKind,
    pub attempt_number: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl DeliveryAttempt {
    pub fn is_success(&self) -> bool {
        self.outcome == AttemptOutcome::Success
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub request_id: String,
    pub final_outcome: FinalOutcome,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_method: Option<ChannelKind>,

    pub total_attempts: u32,
    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl DeliveryResult {
    pub fn delivered(
        request_id: String,
        channel: ChannelKind,
        total_attempts: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id,
            final_outcome: FinalOutcome::Delivered,
            delivery_method: Some(channel),
            total_attempts,
            created_at,
            resolved_at: Some(Utc::now()),
            error_detail: None,
        }
    }

    pub fn failed(request_id: String, total_attempts: u32, created_at: DateTime<Utc>) -> Self {
        Self {
            request_id,
            final_outcome: FinalOutcome::Failed,
            delivery_method: None,
            total_attempts,
            created_at,
            resolved_at: Some(Utc::now()),
            error_detail: None,
        }
    }

    pub fn pending(request_id: String, total_attempts: u32, created_at: DateTime<Utc>) -> Self {
        Self {
            request_id,
            final_outcome: FinalOutcome::Pending,
            delivery_method: None,
            total_attempts,
            created_at,
            resolved_at: None,
            error_detail: None,
        }
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error_detail = Some(error);
        self
    }
}
