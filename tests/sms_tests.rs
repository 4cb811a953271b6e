use std::{sync::Arc, time::Duration};

use anyhow::Result;
use delivery_engine::{
    clients::{
        channel::{Channel, SmsGateway},
        memory::StaticDirectory,
        sms::{HttpSmsGateway, SmsChannel},
    },
    error::ChannelError,
    models::notification::{Category, NotificationRequest, Priority},
};
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, header, method, path},
};

fn gateway(server: &MockServer, api_key: Option<&str>) -> Result<HttpSmsGateway> {
    HttpSmsGateway::new(
        format!("{}/messages", server.uri()),
        api_key.map(str::to_string),
        Duration::from_millis(500),
    )
}

fn pickup_request() -> NotificationRequest {
    NotificationRequest::new(
        "driver-1",
        "Pickup now",
        "Rider waiting at gate 3",
        Category::RideRequest,
        Priority::Urgent,
    )
    .with_id("req-100")
}

/// Test: Gateway posts the message with bearer auth and accepts 2xx
#[tokio::test]
async fn test_gateway_accepts_message() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("authorization", "Bearer sms-key"))
        .and(body_json(json!({
            "to": "+15550100",
            "body": "Pickup now\nRider waiting at gate 3",
            "reference": "req-100"
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let directory = StaticDirectory::new().with_number("driver-1", "+15550100");
    let channel = SmsChannel::new(
        Arc::new(directory),
        Arc::new(gateway(&server, Some("sms-key"))?),
    );

    channel.attempt(&pickup_request()).await?;

    Ok(())
}

/// Test: Non-2xx responses become transport failures
#[tokio::test]
async fn test_gateway_rejection_is_transport_error() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(503).set_body_string("carrier down"))
        .mount(&server)
        .await;

    let err = gateway(&server, None)?
        .send("+15550100", "hello", "req-1")
        .await
        .unwrap_err();

    match err {
        ChannelError::Transport(detail) => {
            assert!(detail.contains("503"), "unexpected detail: {}", detail);
            assert!(detail.contains("carrier down"));
        }
        other => panic!("expected transport error, got {:?}", other),
    }

    Ok(())
}

/// Test: Slow gateways are cut off by the client timeout
#[tokio::test]
async fn test_gateway_timeout() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let err = gateway(&server, None)?
        .send("+15550100", "hello", "req-2")
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    Ok(())
}

/// Test: Missing phone number fails without calling the gateway
#[tokio::test]
async fn test_missing_phone_number() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let directory = StaticDirectory::new().with_number("someone-else", "+15550199");
    let channel = SmsChannel::new(Arc::new(directory), Arc::new(gateway(&server, None)?));

    let err = channel.attempt(&pickup_request()).await.unwrap_err();
    assert_eq!(err, ChannelError::NoPhoneNumber("driver-1".to_string()));
    assert!(!err.is_retryable());

    Ok(())
}

/// Test: Blank phone numbers count as missing
#[tokio::test]
async fn test_blank_phone_number() -> Result<()> {
    let server = MockServer::start().await;
    let directory = StaticDirectory::new().with_number("driver-1", "   ");
    let channel = SmsChannel::new(Arc::new(directory), Arc::new(gateway(&server, None)?));

    let err = channel.attempt(&pickup_request()).await.unwrap_err();
    assert!(matches!(err, ChannelError::NoPhoneNumber(_)));

    Ok(())
}
