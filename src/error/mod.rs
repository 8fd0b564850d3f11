//! Error types for quillpad.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

use crate::auth::error::{AuthError, ValidationError};

/// Primary error type for crate-level operations.
///
/// Auth flows keep their own [`AuthError`]; this type is what the record
/// services and the CLI surface.
#[derive(Error, Debug)]
pub enum QuillError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl QuillError {
    /// Create an API error from a status code and message.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) => ErrorCategory::Validation,
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::Cancelled(_) => ErrorCategory::Cancelled,
            Self::Network(_) => ErrorCategory::Network,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Serialization(_) | Self::InvalidResponse(_) => ErrorCategory::Serialization,
            Self::NotFound(_) => ErrorCategory::Api,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                400..=499 => ErrorCategory::Api,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            Self::Io(_) => ErrorCategory::Unknown,
        }
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Validation => RecoverySuggestion::FixInput,
            ErrorCategory::Authentication => RecoverySuggestion::SignInAgain,
            ErrorCategory::Cancelled => RecoverySuggestion::TryAgain,
            ErrorCategory::Network | ErrorCategory::Server => RecoverySuggestion::TryAgain,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            _ => RecoverySuggestion::ContactSupport,
        }
    }
}

impl From<reqwest::Error> for QuillError {
    fn from(error: reqwest::Error) -> Self {
        Self::Network(error.to_string())
    }
}

impl From<AuthError> for QuillError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::Validation(inner) => QuillError::Validation(inner),
            AuthError::Network(message) => QuillError::Network(message),
            AuthError::Api { status, message } => QuillError::Api { status, message },
            AuthError::NotFound(message) => QuillError::NotFound(message),
            AuthError::InvalidResponse(message) => QuillError::InvalidResponse(message),
            other => QuillError::Authentication(other.to_string()),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, QuillError>;
