use crate::{
    error::DeliveryError,
    models::{nearby::NearbyEvent, notification::NotificationRequest},
};

const MAX_ID_LEN: usize = 128;
const MAX_TITLE_LEN: usize = 200;
const MAX_MESSAGE_LEN: usize = 4000;

pub fn validate_request(request: &NotificationRequest) -> Result<(), DeliveryError> {
    validate_identifier("Request id", &request.id)?;
    validate_identifier("Recipient id", &request.recipient_id)?;
    validate_content(&request.title, &request.message)?;

    if request.timeout_seconds == Some(0) {
        return Err(DeliveryError::Validation(
            "timeout_seconds must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

pub fn validate_event(event: &NearbyEvent) -> Result<(), DeliveryError> {
    validate_content(&event.title, &event.message)?;

    if event.timeout_seconds == Some(0) {
        return Err(DeliveryError::Validation(
            "timeout_seconds must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_identifier(label: &str, value: &str) -> Result<(), DeliveryError> {
    if value.trim().is_empty() {
        return Err(DeliveryError::Validation(format!("{} cannot be empty", label)));
    }

    if value.len() > MAX_ID_LEN {
        return Err(DeliveryError::Validation(format!(
            "{} too long (maximum {} characters)",
            label, MAX_ID_LEN
        )));
    }

    Ok(())
}

fn validate_content(title: &str, message: &str) -> Result<(), DeliveryError> {
    if title.trim().is_empty() {
        return Err(DeliveryError::Validation("Title cannot be empty".to_string()));
    }

    if title.chars().count() > MAX_TITLE_LEN {
        return Err(DeliveryError::Validation(format!(
            "Title too long (maximum {} characters)",
            MAX_TITLE_LEN
        )));
    }

    if message.trim().is_empty() {
        return Err(DeliveryError::Validation("Message cannot be empty".to_string()));
    }

    if message.chars().count() > MAX_MESSAGE_LEN {
        return Err(DeliveryError::Validation(format!(
            "Message too long (maximum {} characters)",
            MAX_MESSAGE_LEN
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::notification::{Category, Priority};

    fn request() -> NotificationRequest {
        NotificationRequest::new(
            "rider-7",
            "Order ready",
            "Your order is ready for pickup",
            Category::MarketplaceOrder,
            Priority::Normal,
        )
    }

    #[test]
    fn test_valid_request_passes() {
        assert!(validate_request(&request()).is_ok());
    }

    #[test]
    fn test_blank_recipient_rejected() {
        let mut req = request();
        req.recipient_id = "   ".to_string();
        assert!(matches!(
            validate_request(&req),
            Err(DeliveryError::Validation(_))
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let req = request().with_timeout_seconds(0);
        assert!(validate_request(&req).is_err());
    }

    #[test]
    fn test_oversized_id_rejected() {
        let req = request().with_id("x".repeat(MAX_ID_LEN + 1));
        assert!(validate_request(&req).is_err());
    }
}
