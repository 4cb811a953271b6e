use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{
    clients::{
        channel::{Broadcaster, Channel, RealtimeEvent},
        store::NotificationStore,
    },
    error::ChannelError,
    models::{
        delivery::ChannelKind,
        notification::{NotificationRecord, NotificationRequest},
    },
};

/// Persists the notification record, then announces it on the recipient's
/// realtime topic. Only the persisted write decides the outcome.
pub struct PushChannel {
    store: Arc<dyn NotificationStore>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl PushChannel {
    pub fn new(store: Arc<dyn NotificationStore>, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self { store, broadcaster }
    }
}

#[async_trait]
impl Channel for PushChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Push
    }

    async fn attempt(&self, request: &NotificationRequest) -> Result<(), ChannelError> {
        let record = NotificationRecord::from_request(request);

        self.store
            .save(&record)
            .await
            .map_err(|e| ChannelError::Transport(format!("Notification write failed: {}", e)))?;

        debug!(request_id = %request.id, "Notification record persisted");

        let event = RealtimeEvent::from_request(RealtimeEvent::NOTIFICATION_CREATED, request);
        if let Err(e) = self.broadcaster.publish(&request.recipient_id, &event).await {
            warn!(
                request_id = %request.id,
                recipient_id = %request.recipient_id,
                error = %e,
                "Push companion broadcast failed, record already persisted"
            );
        }

        Ok(())
    }
}
