//! Channel seam shared by every transport.
//!
//! A channel makes exactly one delivery attempt and reports the outcome as a
//! `Result`. It never retries internally; retrying is the scheduler's job.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{
    error::ChannelError,
    models::{
        delivery::ChannelKind,
        notification::{Category, NotificationRequest, Priority},
    },
};

#[async_trait]
pub trait Channel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    async fn attempt(&self, request: &NotificationRequest) -> Result<(), ChannelError>;
}

/// Low-latency publish/subscribe fan-out scoped to one recipient.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn publish(&self, recipient_id: &str, event: &RealtimeEvent) -> Result<(), ChannelError>;
}

/// Outbound SMS provider. `Ok` means the gateway accepted the message.
#[async_trait]
pub trait SmsGateway: Send + Sync {
    async fn send(&self, phone_number: &str, body: &str, reference: &str)
    -> Result<(), ChannelError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeEvent {
    pub event: String,
    pub request_id: String,
    pub recipient_id: String,
    pub title: String,
    pub message: String,
    pub category: Category,
    pub priority: Priority,
    pub payload: HashMap<String, JsonValue>,
    pub sound_enabled: bool,
    pub vibration_enabled: bool,
    pub sent_at: DateTime<Utc>,
}

impl RealtimeEvent {
    pub const NOTIFICATION: &'static str = "notification";
    pub const NOTIFICATION_CREATED: &'static str = "notification_created";

    pub fn from_request(event: &str, request: &NotificationRequest) -> Self {
        Self {
            event: event.to_string(),
            request_id: request.id.clone(),
            recipient_id: request.recipient_id.clone(),
            title: request.title.clone(),
            message: request.message.clone(),
            category: request.category,
            priority: request.priority,
            payload: request.payload.clone(),
            sound_enabled: request.sound_enabled,
            vibration_enabled: request.vibration_enabled,
            sent_at: Utc::now(),
        }
    }
}

/// The three transports the engine escalates across.
#[derive(Clone)]
pub struct ChannelSet {
    pub push: Arc<dyn Channel>,
    pub realtime: Arc<dyn Channel>,
    pub sms: Arc<dyn Channel>,
}

impl ChannelSet {
    pub fn new(push: Arc<dyn Channel>, realtime: Arc<dyn Channel>, sms: Arc<dyn Channel>) -> Self {
        Self {
            push,
            realtime,
            sms,
        }
    }

    pub fn get(&self, kind: ChannelKind) -> &Arc<dyn Channel> {
        match kind {
            ChannelKind::Push => &self.push,
            ChannelKind::Realtime => &self.realtime,
            ChannelKind::Sms => &self.sms,
        }
    }
}
