use std::{sync::Arc, time::Duration};

use anyhow::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    clients::{
        channel::{Channel, SmsGateway},
        store::RecipientDirectory,
    },
    config::Config,
    error::ChannelError,
    models::{delivery::ChannelKind, notification::NotificationRequest},
};

pub struct SmsChannel {
    directory: Arc<dyn RecipientDirectory>,
    gateway: Arc<dyn SmsGateway>,
}

impl SmsChannel {
    pub fn new(directory: Arc<dyn RecipientDirectory>, gateway: Arc<dyn SmsGateway>) -> Self {
        Self { directory, gateway }
    }

    fn render_body(request: &NotificationRequest) -> String {
        format!("{}\n{}", request.title, request.message)
    }
}

#[async_trait]
impl Channel for SmsChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Sms
    }

    async fn attempt(&self, request: &NotificationRequest) -> Result<(), ChannelError> {
        let phone_number = self
            .directory
            .phone_number(&request.recipient_id)
            .await
            .map_err(|e| ChannelError::Transport(format!("Recipient lookup failed: {}", e)))?
            .filter(|number| !number.trim().is_empty())
            .ok_or_else(|| ChannelError::NoPhoneNumber(request.recipient_id.clone()))?;

        self.gateway
            .send(&phone_number, &Self::render_body(request), &request.id)
            .await
    }
}

#[derive(Debug, Clone, Serialize)]
struct SmsGatewayRequest<'a> {
    to: &'a str,
    body: &'a str,
    reference: &'a str,
}

/// JSON-over-HTTP SMS provider. The client timeout is the channel's latency
/// bound.
pub struct HttpSmsGateway {
    http_client: Client,
    url: String,
    api_key: Option<String>,
}

impl HttpSmsGateway {
    pub fn new(url: String, api_key: Option<String>, timeout: Duration) -> Result<Self, Error> {
        let http_client = Client::builder().timeout(timeout).build()?;

        info!(url = %url, timeout_ms = timeout.as_millis() as u64, "SMS gateway client initialized");

        Ok(Self {
            http_client,
            url,
            api_key,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, Error> {
        Self::new(
            config.sms_gateway_url.clone(),
            config.sms_gateway_api_key.clone(),
            Duration::from_secs(config.sms_timeout_seconds),
        )
    }
}

#[async_trait]
impl SmsGateway for HttpSmsGateway {
    async fn send(
        &self,
        phone_number: &str,
        body: &str,
        reference: &str,
    ) -> Result<(), ChannelError> {
        debug!(reference, "Sending SMS through gateway");

        let mut request = self.http_client.post(&self.url).json(&SmsGatewayRequest {
            to: phone_number,
            body,
            reference,
        });

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(ChannelError::transport)?;

        if response.status().is_success() {
            info!(reference, "SMS accepted by gateway");
            Ok(())
        } else {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            Err(ChannelError::Transport(format!(
                "SMS gateway rejected message ({}): {}",
                status, error_text
            )))
        }
    }
}
