use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    clients::channel::{Broadcaster, Channel, RealtimeEvent},
    error::ChannelError,
    models::{delivery::ChannelKind, notification::NotificationRequest},
};

/// Fire-and-forget publish to the recipient's topic. There is no device
/// acknowledgement, so a publish that does not error counts as delivered.
pub struct RealtimeChannel {
    broadcaster: Arc<dyn Broadcaster>,
}

impl RealtimeChannel {
    pub fn new(broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self { broadcaster }
    }
}

#[async_trait]
impl Channel for RealtimeChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Realtime
    }

    async fn attempt(&self, request: &NotificationRequest) -> Result<(), ChannelError> {
        let event = RealtimeEvent::from_request(RealtimeEvent::NOTIFICATION, request);
        self.broadcaster
            .publish(&request.recipient_id, &event)
            .await
    }
}
