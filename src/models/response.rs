use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: message.into(),
        }
    }

    pub fn error(error: String, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadReceipt {
    pub request_id: String,
    pub updated: bool,
}
