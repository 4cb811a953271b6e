use std::{
    collections::HashMap,
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::DeliveryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    RideRequest,
    DeliveryRequest,
    MarketplaceOrder,
    System,
    Urgent,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::RideRequest => "ride_request",
            Category::DeliveryRequest => "delivery_request",
            Category::MarketplaceOrder => "marketplace_order",
            Category::System => "system",
            Category::Urgent => "urgent",
        }
    }
}

impl FromStr for Category {
    type Err = DeliveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ride_request" => Ok(Category::RideRequest),
            "delivery_request" => Ok(Category::DeliveryRequest),
            "marketplace_order" => Ok(Category::MarketplaceOrder),
            "system" => Ok(Category::System),
            "urgent" => Ok(Category::Urgent),
            other => Err(DeliveryError::Validation(format!(
                "Unknown notification category '{}'",
                other
            ))),
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl FromStr for Priority {
    type Err = DeliveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(DeliveryError::Validation(format!(
                "Unknown notification priority '{}'",
                other
            ))),
        }
    }
}

impl Display for Priority {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// A single notification to deliver to one recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub id: String,
    pub recipient_id: String,
    pub title: String,
    pub message: String,
    pub category: Category,
    pub priority: Priority,

    #[serde(default)]
    pub payload: HashMap<String, JsonValue>,

    pub sound_enabled: bool,
    pub vibration_enabled: bool,

    /// Advisory only. Channels bound their own latency.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    pub created_at: DateTime<Utc>,
}

impl NotificationRequest {
    pub fn new(
        recipient_id: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
        category: Category,
        priority: Priority,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            recipient_id: recipient_id.into(),
            title: title.into(),
            message: message.into(),
            category,
            priority,
            payload: HashMap::new(),
            sound_enabled: true,
            vibration_enabled: true,
            timeout_seconds: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_payload(mut self, payload: HashMap<String, JsonValue>) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }

    pub fn with_alerts(mut self, sound_enabled: bool, vibration_enabled: bool) -> Self {
        self.sound_enabled = sound_enabled;
        self.vibration_enabled = vibration_enabled;
        self
    }
}

/// Wire shape accepted from callers. Category and priority arrive as free text
/// and are only accepted once they parse.
#[derive(Debug, Clone, Deserialize)]
pub struct NewNotification {
    #[serde(default)]
    pub id: Option<String>,
    pub recipient_id: String,
    pub title: String,
    pub message: String,
    pub category: String,
    pub priority: String,

    #[serde(default)]
    pub payload: HashMap<String, JsonValue>,

    #[serde(default = "default_true")]
    pub sound_enabled: bool,
    #[serde(default = "default_true")]
    pub vibration_enabled: bool,

    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

fn default_true() -> bool {
    true
}

impl TryFrom<NewNotification> for NotificationRequest {
    type Error = DeliveryError;

    fn try_from(value: NewNotification) -> Result<Self, Self::Error> {
        let category = value.category.trim().parse::<Category>()?;
        let priority = value.priority.trim().parse::<Priority>()?;

        let mut request = NotificationRequest::new(
            value.recipient_id,
            value.title,
            value.message,
            category,
            priority,
        )
        .with_payload(value.payload)
        .with_alerts(value.sound_enabled, value.vibration_enabled);

        if let Some(id) = value.id {
            request = request.with_id(id);
        }
        request.timeout_seconds = value.timeout_seconds;

        Ok(request)
    }
}

/// Persisted notification as shown to history viewers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    pub recipient_id: String,
    pub title: String,
    pub message: String,
    pub category: Category,
    pub priority: Priority,
    pub payload: JsonValue,
    pub is_sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl NotificationRecord {
    pub fn from_request(request: &NotificationRequest) -> Self {
        Self {
            id: request.id.clone(),
            recipient_id: request.recipient_id.clone(),
            title: request.title.clone(),
            message: request.message.clone(),
            category: request.category,
            priority: request.priority,
            payload: serde_json::to_value(&request.payload).unwrap_or(JsonValue::Null),
            is_sent: false,
            sent_at: None,
            created_at: request.created_at,
            read_at: None,
        }
    }
}
