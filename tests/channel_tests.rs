use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use delivery_engine::{
    clients::{
        channel::{Broadcaster, Channel, RealtimeEvent},
        memory::MemoryNotificationStore,
        push::PushChannel,
        realtime::RealtimeChannel,
        store::NotificationStore,
    },
    error::ChannelError,
    models::notification::{Category, NotificationRecord, NotificationRequest, Priority},
};

#[derive(Default)]
struct RecordingBroadcaster {
    published: Mutex<Vec<(String, RealtimeEvent)>>,
    fail: bool,
}

impl RecordingBroadcaster {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn published(&self) -> Vec<(String, RealtimeEvent)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Broadcaster for RecordingBroadcaster {
    async fn publish(&self, recipient_id: &str, event: &RealtimeEvent) -> Result<(), ChannelError> {
        if self.fail {
            return Err(ChannelError::transport("broker unreachable"));
        }
        self.published
            .lock()
            .unwrap()
            .push((recipient_id.to_string(), event.clone()));
        Ok(())
    }
}

struct BrokenStore;

#[async_trait]
impl NotificationStore for BrokenStore {
    async fn save(&self, _record: &NotificationRecord) -> Result<()> {
        Err(anyhow!("connection refused"))
    }

    async fn mark_sent(&self, _id: &str, _sent_at: DateTime<Utc>) -> Result<()> {
        Err(anyhow!("connection refused"))
    }

    async fn mark_as_read(&self, _id: &str) -> Result<bool> {
        Err(anyhow!("connection refused"))
    }

    async fn history(&self, _recipient_id: &str, _limit: usize) -> Result<Vec<NotificationRecord>> {
        Err(anyhow!("connection refused"))
    }
}

fn order_update() -> NotificationRequest {
    NotificationRequest::new(
        "customer-3",
        "Order confirmed",
        "We are preparing your order",
        Category::MarketplaceOrder,
        Priority::Normal,
    )
}

/// Test: Push persists the record and announces it on the recipient topic
#[tokio::test]
async fn test_push_persists_and_announces() -> Result<()> {
    let store = Arc::new(MemoryNotificationStore::new());
    let broadcaster = Arc::new(RecordingBroadcaster::default());
    let channel = PushChannel::new(store.clone(), broadcaster.clone());

    let request = order_update();
    channel.attempt(&request).await?;

    let record = store.get(&request.id).expect("record persisted");
    assert_eq!(record.recipient_id, "customer-3");
    assert!(!record.is_sent);

    let published = broadcaster.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "customer-3");
    assert_eq!(published[0].1.event, RealtimeEvent::NOTIFICATION_CREATED);

    Ok(())
}

/// Test: Push succeeds when only the companion broadcast fails
#[tokio::test]
async fn test_push_ignores_broadcast_failure() -> Result<()> {
    let store = Arc::new(MemoryNotificationStore::new());
    let channel = PushChannel::new(store.clone(), Arc::new(RecordingBroadcaster::failing()));

    let request = order_update();
    channel.attempt(&request).await?;
    assert!(store.get(&request.id).is_some());

    Ok(())
}

/// Test: Push fails when the record cannot be written
#[tokio::test]
async fn test_push_fails_on_store_error() -> Result<()> {
    let channel = PushChannel::new(
        Arc::new(BrokenStore),
        Arc::new(RecordingBroadcaster::default()),
    );

    let err = channel.attempt(&order_update()).await.unwrap_err();
    assert!(matches!(err, ChannelError::Transport(_)));
    assert!(err.is_retryable());

    Ok(())
}

/// Test: Realtime publishes a notification event with the request content
#[tokio::test]
async fn test_realtime_publishes_notification_event() -> Result<()> {
    let broadcaster = Arc::new(RecordingBroadcaster::default());
    let channel = RealtimeChannel::new(broadcaster.clone());

    let request = order_update();
    channel.attempt(&request).await?;

    let published = broadcaster.published();
    assert_eq!(published.len(), 1);
    let (recipient, event) = &published[0];
    assert_eq!(recipient, "customer-3");
    assert_eq!(event.event, RealtimeEvent::NOTIFICATION);
    assert_eq!(event.request_id, request.id);
    assert_eq!(event.title, "Order confirmed");

    Ok(())
}

/// Test: Realtime surfaces publish errors as transport failures
#[tokio::test]
async fn test_realtime_publish_failure() -> Result<()> {
    let channel = RealtimeChannel::new(Arc::new(RecordingBroadcaster::failing()));

    let err = channel.attempt(&order_update()).await.unwrap_err();
    assert!(matches!(err, ChannelError::Transport(_)));

    Ok(())
}
