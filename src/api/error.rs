use serde::Deserialize;
use thiserror::Error;

use crate::auth::error::AuthError;
use crate::error::QuillError;

/// Failure talking to the record backend.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message} (status {status})")]
    Status {
        status: u16,
        message: String,
        data: serde_json::Value,
    },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid response: {0}")]
    Decode(String),
    #[error("OAuth2 handshake failed: {0}")]
    OAuth2(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether any field error in the body carries `code`.
    pub fn has_field_code(&self, code: &str) -> bool {
        let Self::Status { data, .. } = self else {
            return false;
        };
        data.as_object()
            .map(|fields| {
                fields
                    .values()
                    .any(|field| field.get("code").and_then(|c| c.as_str()) == Some(code))
            })
            .unwrap_or(false)
    }

    /// Build a status error from a backend error body.
    pub(crate) fn from_body(status: u16, body: &str) -> Self {
        #[derive(Deserialize)]
        struct ErrorBody {
            #[serde(default)]
            message: String,
            #[serde(default)]
            data: serde_json::Value,
        }

        match serde_json::from_str::<ErrorBody>(body) {
            Ok(parsed) if !parsed.message.is_empty() => Self::Status {
                status,
                message: parsed.message,
                data: parsed.data,
            },
            _ => Self::Status {
                status,
                message: if body.trim().is_empty() {
                    format!("Request failed with status {status}")
                } else {
                    body.trim().to_string()
                },
                data: serde_json::Value::Null,
            },
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Network(error.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(error: serde_json::Error) -> Self {
        Self::Decode(error.to_string())
    }
}

impl From<ApiError> for AuthError {
    fn from(error: ApiError) -> Self {
        match error {
            ApiError::Status { status: 404, message, .. } => AuthError::NotFound(message),
            ApiError::Status { status, message, .. } => AuthError::Api { status, message },
            ApiError::Network(message) => AuthError::Network(message),
            ApiError::Decode(message) | ApiError::OAuth2(message) => {
                AuthError::InvalidResponse(message)
            }
        }
    }
}

impl From<ApiError> for QuillError {
    fn from(error: ApiError) -> Self {
        match error {
            ApiError::Status { status: 404, message, .. } => QuillError::NotFound(message),
            ApiError::Status { status, message, .. } => QuillError::Api { status, message },
            ApiError::Network(message) => QuillError::Network(message),
            ApiError::Decode(message) | ApiError::OAuth2(message) => {
                QuillError::InvalidResponse(message)
            }
        }
    }
}
