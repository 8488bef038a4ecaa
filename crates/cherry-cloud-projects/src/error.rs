//! Cherry Servers API error types

use cherry_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("API returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ApiError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        ApiError::Status {
            status,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => ApiError::status(status.as_u16(), e.to_string()),
            None => ApiError::Transport(e.to_string()),
        }
    }
}

impl From<ApiError> for CloudError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Transport(detail) => CloudError::Remote {
                status: None,
                detail,
            },
            ApiError::Status {
                status: 404,
                message,
            } => CloudError::NotFound(message),
            ApiError::Status {
                status: 409,
                message,
            } => CloudError::Conflict(message),
            ApiError::Status { status, message } => CloudError::Remote {
                status: Some(status),
                detail: message,
            },
            ApiError::Decode(e) => CloudError::Json(e),
            ApiError::InvalidConfig(msg) => CloudError::InvalidConfig(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
