use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use tracing::{debug, info};

use crate::{
    clients::channel::{Broadcaster, RealtimeEvent},
    config::Config,
    error::ChannelError,
};

/// Publishes realtime events on `{prefix}:{recipient_id}` Redis channels.
#[derive(Clone)]
pub struct RedisBroadcaster {
    connection: MultiplexedConnection,
    channel_prefix: String,
}

impl RedisBroadcaster {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        Self::connect_with(&config.redis_url, &config.realtime_channel_prefix).await
    }

    pub async fn connect_with(redis_url: &str, channel_prefix: &str) -> Result<Self, Error> {
        info!("Connecting to Redis");

        let client =
            Client::open(redis_url).map_err(|e| anyhow!("Failed to create redis client: {}", e))?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| anyhow!("Failed to connect to redis: {}", e))?;

        info!("Redis connection established");

        Ok(Self {
            connection,
            channel_prefix: channel_prefix.to_string(),
        })
    }

    pub fn topic_for(&self, recipient_id: &str) -> String {
        format!("{}:{}", self.channel_prefix, recipient_id)
    }

    pub async fn health_check(&self) -> Result<(), Error> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow!("Redis ping failed: {}", e))?;
        Ok(())
    }
}

#[async_trait]
impl Broadcaster for RedisBroadcaster {
    async fn publish(&self, recipient_id: &str, event: &RealtimeEvent) -> Result<(), ChannelError> {
        let topic = self.topic_for(recipient_id);
        let payload = serde_json::to_string(event)
            .map_err(|e| ChannelError::Transport(format!("Event serialization failed: {}", e)))?;

        let mut conn = self.connection.clone();
        let receivers: i64 = conn
            .publish(&topic, payload)
            .await
            .map_err(|e| ChannelError::Transport(format!("Redis publish failed: {}", e)))?;

        debug!(
            topic = %topic,
            request_id = %event.request_id,
            receivers,
            "Realtime event published"
        );

        Ok(())
    }
}
